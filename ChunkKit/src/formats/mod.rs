//! File format handlers
//!
//! `chunk` is the outer container. `model` and `material` are the packages
//! stored inside chunks, sharing the byte cursors in `common`.

pub mod common;
pub mod chunk;
pub mod model;
pub mod material;

// Re-export common types for convenience
pub use common::{Endian, Platform, fourcc, tag_name};

// Re-export main document types
pub use chunk::{Chunk, ChunkContainer, ChunkContent, parse_chunk_bytes, serialize_chunks};
pub use model::{ModelPackage, FormatProfile, VertexBuffer, IndexBuffer};
pub use material::{MaterialPackage, MaterialHandle};
