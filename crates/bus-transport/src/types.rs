use core::fmt;

/// Parity setting for the serial line.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

/// Stop-bit setting for the serial line.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum StopBits {
    #[default]
    One,
    Two,
}

/// Open parameters for a physical serial port.
#[derive(Clone, Debug)]
pub struct SerialSettings {
    pub path: String,
    pub baud_rate: u32,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl SerialSettings {
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

impl fmt::Display for SerialSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{path}@{baud} {parity:?}/{stop:?}",
            path = self.path,
            baud = self.baud_rate,
            parity = self.parity,
            stop = self.stop_bits
        )
    }
}

#[derive(Clone, Debug)]
pub struct PortInfo {
    pub name: String,
    pub driver: String,
}
