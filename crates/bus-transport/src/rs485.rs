use crate::{HalfDuplexBus, Parity, PortInfo, Result, SerialSettings, StopBits, TransportError};
use serialport::{SerialPort, SerialPortType};
use std::io::{Read, Write};
use std::time::{Duration, Instant};
use tracing::debug;

/// RS-485 line behind a USB/UART bridge, with the RTS pin wired to the
/// transceiver's driver-enable input. RTS asserted means transmit mode.
pub struct Rs485Port {
    port: Box<dyn SerialPort>,
}

impl Rs485Port {
    pub fn open(settings: &SerialSettings) -> Result<Self> {
        let mut port = serialport::new(&settings.path, settings.baud_rate)
            .parity(map_parity(settings.parity))
            .stop_bits(map_stop_bits(settings.stop_bits))
            .timeout(Duration::from_millis(50))
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => {
                    TransportError::PortNotFound(settings.path.clone())
                }
                _ => TransportError::Io(e.to_string()),
            })?;
        // Start listening; the driver stays enabled only inside write_frame
        port.write_request_to_send(false)
            .map_err(|e| TransportError::Io(e.to_string()))?;
        debug!("opened {settings}");
        Ok(Self { port })
    }

    /// List serial ports that could carry the bus.
    pub fn list() -> Result<Vec<PortInfo>> {
        let mut out = Vec::new();
        for p in serialport::available_ports().map_err(|e| TransportError::Io(e.to_string()))? {
            let driver = match p.port_type {
                SerialPortType::UsbPort(_) => "usb-serial",
                _ => "serial",
            };
            out.push(PortInfo {
                name: p.port_name,
                driver: driver.to_string(),
            });
        }
        Ok(out)
    }
}

impl HalfDuplexBus for Rs485Port {
    fn write_frame(&mut self, bytes: &[u8]) -> Result<()> {
        self.port
            .write_request_to_send(true)
            .map_err(|e| TransportError::Io(e.to_string()))?;
        let sent = self
            .port
            .write_all(bytes)
            .and_then(|()| self.port.flush())
            .map_err(|e| TransportError::Io(e.to_string()));
        // Release the line even when the write failed mid-burst
        let released = self
            .port
            .write_request_to_send(false)
            .map_err(|e| TransportError::Io(e.to_string()));
        sent?;
        released
    }

    fn read_exact(&mut self, buf: &mut [u8], timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut filled = 0usize;
        while filled < buf.len() {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .ok_or(TransportError::Timeout)?;
            self.port.set_timeout(remaining).ok();
            match self.port.read(&mut buf[filled..]) {
                Ok(0) => return Err(TransportError::Timeout),
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    return Err(TransportError::Timeout)
                }
                Err(e) => return Err(TransportError::Io(e.to_string())),
            }
        }
        Ok(())
    }
}

impl Drop for Rs485Port {
    fn drop(&mut self) {
        // Leave the transceiver in receive mode; the port itself closes with it
        let _ = self.port.write_request_to_send(false);
    }
}

fn map_parity(parity: Parity) -> serialport::Parity {
    match parity {
        Parity::None => serialport::Parity::None,
        Parity::Even => serialport::Parity::Even,
        Parity::Odd => serialport::Parity::Odd,
    }
}

fn map_stop_bits(stop_bits: StopBits) -> serialport::StopBits {
    match stop_bits {
        StopBits::One => serialport::StopBits::One,
        StopBits::Two => serialport::StopBits::Two,
    }
}
