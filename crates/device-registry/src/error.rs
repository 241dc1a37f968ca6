use bus_transport::TransportError;
use frame_codec::Address;
use thiserror::Error;

pub type Result<T, E = RegistryError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no reply within the window")]
    Timeout,
    #[error("unexpected reply header 0x{header:02X}")]
    Protocol { header: u8 },
    #[error("bus transport: {0}")]
    Transport(TransportError),
    #[error("no product with id {0} in the catalog")]
    UnknownProduct(u32),
    #[error("no device registered at address {0}")]
    UnknownAddress(Address),
    #[error("more than one device answered as address {0}")]
    AddressConflict(Address),
    #[error("no free address left to pair with")]
    AddressSpaceFull,
}

impl From<TransportError> for RegistryError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout => RegistryError::Timeout,
            other => RegistryError::Transport(other),
        }
    }
}

impl From<frame_codec::ProtocolError> for RegistryError {
    fn from(err: frame_codec::ProtocolError) -> Self {
        let frame_codec::ProtocolError::UnknownCommand { header } = err;
        RegistryError::Protocol { header }
    }
}
