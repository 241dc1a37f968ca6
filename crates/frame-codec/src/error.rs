use thiserror::Error;

pub type Result<T, E = ProtocolError> = core::result::Result<T, E>;

#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum ProtocolError {
    #[error("header 0x{header:02X} does not carry a known command")]
    UnknownCommand { header: u8 },
}
