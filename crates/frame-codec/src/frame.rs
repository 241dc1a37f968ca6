use crate::{ProtocolError, Result};
use core::fmt;

/// Length of every frame on the wire: 1 header byte + 3 payload bytes.
pub const FRAME_LEN: usize = 4;

const ADDRESS_BITS: u8 = 5;
const ADDRESS_MASK: u8 = (1 << ADDRESS_BITS) - 1;

/// 5-bit device address. `0` is the broadcast/unconfigured sentinel; a
/// configured device always sits at 1..=31.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Address(u8);

impl Address {
    /// The sentinel an unconfigured device answers on, also used to reach
    /// every device at once.
    pub const BROADCAST: Address = Address(0);

    /// First and last assignable addresses.
    pub const MIN: u8 = 1;
    pub const MAX: u8 = ADDRESS_MASK;

    pub fn new(raw: u8) -> Option<Self> {
        if (Self::MIN..=Self::MAX).contains(&raw) {
            Some(Self(raw))
        } else {
            None
        }
    }

    pub fn raw(&self) -> u8 {
        self.0
    }

    pub fn is_broadcast(&self) -> bool {
        self.0 == 0
    }

    fn from_wire(bits: u8) -> Self {
        Self(bits & ADDRESS_MASK)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{raw}", raw = self.0)
    }
}

/// Command opcodes carried in the top 3 header bits.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Ask a device for one data point.
    Get = 1,
    /// Write one data point. The bus offers no delivery confirmation for
    /// this opcode; see the session layer for what that implies.
    Set = 2,
    /// A device's answer to `Get` or `Discover`.
    Return = 3,
    /// Probe an address for a device; a present device answers `Return`
    /// with its product id.
    Discover = 4,
    /// Tell an unconfigured device which address to adopt.
    Assign = 5,
}

impl Command {
    fn from_wire(bits: u8) -> Option<Self> {
        match bits {
            1 => Some(Self::Get),
            2 => Some(Self::Set),
            3 => Some(Self::Return),
            4 => Some(Self::Discover),
            5 => Some(Self::Assign),
            _ => None,
        }
    }
}

/// One bus frame. Header layout: `cccaaaaa` — command in the top 3 bits,
/// address in the low 5.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Frame {
    address: Address,
    command: Command,
    payload: [u8; 3],
}

impl Frame {
    pub fn new(address: Address, command: Command, payload: [u8; 3]) -> Self {
        Self {
            address,
            command,
            payload,
        }
    }

    /// Decode a frame from its wire bytes.
    pub fn parse(bytes: [u8; FRAME_LEN]) -> Result<Self> {
        let header = bytes[0];
        let command = Command::from_wire(header >> ADDRESS_BITS)
            .ok_or(ProtocolError::UnknownCommand { header })?;
        Ok(Self {
            address: Address::from_wire(header),
            command,
            payload: [bytes[1], bytes[2], bytes[3]],
        })
    }

    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        [
            self.header(),
            self.payload[0],
            self.payload[1],
            self.payload[2],
        ]
    }

    pub fn header(&self) -> u8 {
        ((self.command as u8) << ADDRESS_BITS) | self.address.raw()
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn payload(&self) -> [u8; 3] {
        self.payload
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{command:?}@{address} [{p0:02X} {p1:02X} {p2:02X}]",
            command = self.command,
            address = self.address,
            p0 = self.payload[0],
            p1 = self.payload[1],
            p2 = self.payload[2]
        )
    }
}
