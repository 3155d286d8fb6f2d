//! Chunk container format
//!
//! The outer format of every asset file. A container is a small header, an
//! entry table and the child payloads; a child whose payload begins with the
//! container magic is itself a container.
//!
//! ```text
//! header (16)    magic 'CHNK', size (header included), count, revision (3)
//! entry  (16)    context, offset, version, description length, 2 opaque bytes, size
//! payload        at container base + offset
//! description    directly after the payload, NUL-terminated on write
//! ```

mod reader;
mod writer;

pub use reader::{detect_alignment, parse_chunk_bytes, parse_chunk_bytes_with, read_chunk_file};
pub use writer::{serialize_chunks, serialize_chunks_with, write_chunk_file};

use super::common::fourcc;

/// "CHNK" magic signature (little-endian)
pub const CHUNK_MAGIC: u32 = fourcc(b"CHNK");

/// The only container revision in use
pub const CHUNK_REVISION: u32 = 3;

/// Byte used to fill alignment gaps between payloads
pub const PAD_BYTE: u8 = 0xA1;

/// Size of the container header
pub const CONTAINER_HEADER_SIZE: usize = 16;

/// Size of each entry in the entry table
pub const ENTRY_SIZE: usize = 16;

/// Longest description the one-byte length field can carry
pub const MAX_DESCRIPTION_LEN: usize = u8::MAX as usize;

/// Payload of a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkContent {
    /// Opaque bytes, usually a resource such as a model package.
    Data(Vec<u8>),
    /// A nested container.
    Container(ChunkContainer),
}

/// A single node of the chunk tree.
///
/// Offsets and sizes are not stored; they are recomputed on write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Context tag identifying the payload type
    pub context: u32,
    /// Format version of the payload
    pub version: u8,
    /// Opaque entry bytes, preserved verbatim
    pub unknown: [u8; 2],
    /// Free-form description as stored, including any terminators inside
    /// the declared length; empty when the entry has none
    pub description: String,
    pub content: ChunkContent,
}

impl Chunk {
    /// Create a data chunk.
    #[must_use]
    pub fn new_data(context: u32, data: Vec<u8>) -> Self {
        Self {
            context,
            version: 0,
            unknown: [0; 2],
            description: String::new(),
            content: ChunkContent::Data(data),
        }
    }

    /// Create a chunk holding a nested container.
    #[must_use]
    pub fn new_container(context: u32, container: ChunkContainer) -> Self {
        Self {
            content: ChunkContent::Container(container),
            ..Self::new_data(context, Vec::new())
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    /// The description without trailing terminators, if the entry has one.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        let text = self.description.trim_end_matches('\0');
        if text.is_empty() { None } else { Some(text) }
    }

    #[must_use]
    pub fn is_container(&self) -> bool {
        matches!(self.content, ChunkContent::Container(_))
    }

    /// Raw payload of a data chunk.
    #[must_use]
    pub fn data(&self) -> Option<&[u8]> {
        match &self.content {
            ChunkContent::Data(data) => Some(data),
            ChunkContent::Container(_) => None,
        }
    }

    /// Replace the payload with raw bytes.
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.content = ChunkContent::Data(data);
    }

    #[must_use]
    pub fn nested(&self) -> Option<&ChunkContainer> {
        match &self.content {
            ChunkContent::Container(container) => Some(container),
            ChunkContent::Data(_) => None,
        }
    }

    pub fn nested_mut(&mut self) -> Option<&mut ChunkContainer> {
        match &mut self.content {
            ChunkContent::Container(container) => Some(container),
            ChunkContent::Data(_) => None,
        }
    }
}

/// An ordered list of chunks with its layout parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChunkContainer {
    /// Payload alignment detected on read; `None` for containers built in
    /// memory, which use [`WriteOptions::chunk_alignment`](crate::options::WriteOptions)
    pub alignment: Option<u32>,
    pub children: Vec<Chunk>,
}

impl ChunkContainer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_alignment(mut self, alignment: u32) -> Self {
        self.alignment = Some(alignment);
        self
    }

    pub fn push(&mut self, chunk: Chunk) {
        self.children.push(chunk);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// First direct child with the given context.
    #[must_use]
    pub fn find(&self, context: u32) -> Option<&Chunk> {
        self.children.iter().find(|c| c.context == context)
    }

    pub fn find_mut(&mut self, context: u32) -> Option<&mut Chunk> {
        self.children.iter_mut().find(|c| c.context == context)
    }

    /// Every chunk in the tree with the given context, depth-first.
    #[must_use]
    pub fn find_all(&self, context: u32) -> Vec<&Chunk> {
        self.walk()
            .into_iter()
            .filter_map(|(_, chunk)| (chunk.context == context).then_some(chunk))
            .collect()
    }

    /// Depth-first traversal yielding each chunk with its depth (0 = direct child).
    #[must_use]
    pub fn walk(&self) -> Vec<(usize, &Chunk)> {
        let mut out = Vec::new();
        let mut stack: Vec<(usize, &Chunk)> =
            self.children.iter().rev().map(|c| (0, c)).collect();
        while let Some((depth, chunk)) = stack.pop() {
            out.push((depth, chunk));
            if let Some(nested) = chunk.nested() {
                stack.extend(nested.children.iter().rev().map(|c| (depth + 1, c)));
            }
        }
        out
    }
}
