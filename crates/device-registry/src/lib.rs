//! device-registry: the address space of the bus and everything on it
//!
//! The registry owns the bus handle and the map of known devices. Scanning
//! probes every assignable address for a device, pairing hands a fresh
//! address to an unconfigured one, and polling walks each device's declared
//! data points. Per-call sessions borrow the bus mutably, so the borrow
//! checker itself guarantees that no two frame exchanges overlap.

mod types;
pub use types::{DataPointId, Device, PairingEvent, RegistrySettings, RegistrySnapshot};

mod error;
pub use error::{RegistryError, Result};

mod catalog;
pub use catalog::{load_catalog_file, parse_catalog, Product, ProductCatalog};

mod session;
pub use session::DeviceSession;

mod registry;
pub use registry::DeviceRegistry;
