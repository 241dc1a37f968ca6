use crate::{DataPointId, RegistryError, Result};
use bus_transport::HalfDuplexBus;
use frame_codec::{pack_value, unpack_value, unpack_wide, Address, Command, Frame, FRAME_LEN};
use std::time::Duration;
use tracing::trace;

/// One device's view of the bus for the duration of a single call chain.
///
/// A session borrows the registry's bus handle and holds no state of its
/// own across calls; it exists so that address bookkeeping and reply
/// validation live in one place.
pub struct DeviceSession<'a, B> {
    bus: &'a mut B,
    address: Address,
    reply_timeout: Duration,
}

impl<'a, B: HalfDuplexBus> DeviceSession<'a, B> {
    pub fn new(bus: &'a mut B, address: Address, reply_timeout: Duration) -> Self {
        Self {
            bus,
            address,
            reply_timeout,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Write one frame and return as soon as the bytes have left the
    /// transmitter. This is an unconfirmed write: the wire format has no
    /// acknowledgement for it, so success says nothing about delivery.
    pub fn send(&mut self, command: Command, payload: [u8; 3]) -> Result<()> {
        let frame = Frame::new(self.address, command, payload);
        trace!("tx {frame}");
        self.bus.write_frame(&frame.to_bytes())?;
        Ok(())
    }

    /// Unconfirmed write of one data-point value.
    pub fn set_value(&mut self, dp: DataPointId, value: i16) -> Result<()> {
        let [hi, lo] = pack_value(value);
        self.send(Command::Set, [dp.0, hi, lo])
    }

    /// Fetch one data point: a single Get, then exactly one bounded read.
    ///
    /// The reply must come from this session's address, carry `Return`,
    /// and name the requested data point in its first payload byte. There
    /// is no retry; a timeout or a mismatched reply is the caller's to
    /// handle.
    pub fn get_value(&mut self, dp: DataPointId) -> Result<i16> {
        self.send(Command::Get, [dp.0, 0, 0])?;
        let reply = self.read_reply(self.reply_timeout)?;
        let payload = reply.payload();
        if reply.command() != Command::Return || reply.address() != self.address {
            return Err(RegistryError::Protocol {
                header: reply.header(),
            });
        }
        if payload[0] != dp.0 {
            return Err(RegistryError::Protocol {
                header: reply.header(),
            });
        }
        Ok(unpack_value([payload[1], payload[2]]))
    }

    /// Probe this address for a device. A present device answers `Return`
    /// with its 24-bit product id across the payload.
    pub fn discover(&mut self, timeout: Duration) -> Result<u32> {
        self.send(Command::Discover, [0, 0, 0])?;
        let reply = self.read_reply(timeout)?;
        if reply.command() != Command::Return || reply.address() != self.address {
            return Err(RegistryError::Protocol {
                header: reply.header(),
            });
        }
        Ok(unpack_wide(reply.payload()))
    }

    fn read_reply(&mut self, timeout: Duration) -> Result<Frame> {
        let mut buf = [0u8; FRAME_LEN];
        self.bus.read_exact(&mut buf, timeout)?;
        let frame = Frame::parse(buf)?;
        trace!("rx {frame}");
        Ok(frame)
    }
}
