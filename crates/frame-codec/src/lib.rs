//! frame-codec: the fixed 4-byte wire format of the device bus
//!
//! Every exchange on the bus is one [`Frame`]: a header byte packing the
//! device [`Address`] and the [`Command`], followed by three payload bytes.
//! There is no length prefix and no checksum; the format is kept as the
//! deployed device firmware expects it.

mod error;
pub use error::{ProtocolError, Result};

mod frame;
pub use frame::{Address, Command, Frame, FRAME_LEN};

mod value;
pub use value::{pack_value, pack_wide, unpack_value, unpack_wide};
