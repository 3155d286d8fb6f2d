//! Primitives shared by every format: byte order, platforms and cursors

pub mod cursor;
pub mod endian;
pub(crate) mod offsets;

pub use cursor::{ByteReader, ByteWriter, align_up};
pub use endian::{Endian, Platform, fourcc, tag_name};

pub(crate) use cursor::to_u32;
pub(crate) use offsets::{OffsetIndex, Table};
