//! bus-transport: half-duplex serial bus access
//!
//! This crate owns the physical line and its direction-control signal. Every
//! byte that reaches the bus goes through the [`HalfDuplexBus`] trait, which
//! performs the transmit/receive turnaround inside each write so that no
//! caller can ever observe the line in transmit mode. The default build
//! enables a `mock` backend so that binaries and tests compile on any host
//! without serial hardware; the `rs485` feature adds the serialport-backed
//! implementation.

mod types;
pub use types::{Parity, PortInfo, SerialSettings, StopBits};

mod error;
pub use error::{Result, TransportError};

mod traits;
pub use traits::HalfDuplexBus;

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::{ExchangeOp, ExchangeRecord, MockPort, Reply};

#[cfg(feature = "rs485")]
mod rs485;

#[cfg(feature = "rs485")]
pub use rs485::Rs485Port;
