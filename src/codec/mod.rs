//! Frame codec: packet framing plus primitive field (de)serialization.

pub mod field;
pub mod frame;

pub use field::{FieldType, FieldValue};
pub use frame::{PacketType, RawPacket};
