//! Chunk container serialization

use std::path::Path;

use super::{
    CHUNK_MAGIC, CHUNK_REVISION, CONTAINER_HEADER_SIZE, ChunkContainer, ChunkContent, ENTRY_SIZE,
    MAX_DESCRIPTION_LEN,
};
use crate::error::{Error, Result};
use crate::formats::common::{ByteWriter, align_up, to_u32};
use crate::options::WriteOptions;

/// Write a chunk tree to disk
///
/// # Errors
/// Returns [`Error::FileAccess`] if the file cannot be written, or any error
/// from [`serialize_chunks`].
pub fn write_chunk_file<P: AsRef<Path>>(container: &ChunkContainer, path: P) -> Result<()> {
    let path = path.as_ref();
    let bytes = serialize_chunks(container)?;
    std::fs::write(path, bytes).map_err(|source| Error::FileAccess {
        path: path.to_path_buf(),
        source,
    })
}

/// Serialize a chunk tree with default write options.
pub fn serialize_chunks(container: &ChunkContainer) -> Result<Vec<u8>> {
    serialize_chunks_with(container, &WriteOptions::default())
}

/// Serialize a chunk tree.
///
/// Children are laid out in order, each payload starting on the container's
/// alignment and followed by its NUL-terminated description.
///
/// # Errors
/// Returns [`Error::DescriptionTooLong`] for descriptions over 255 bytes.
pub fn serialize_chunks_with(container: &ChunkContainer, options: &WriteOptions) -> Result<Vec<u8>> {
    let alignment = container.alignment.unwrap_or(options.chunk_alignment).max(1) as usize;

    // Payloads first so nested sizes are known
    let mut payloads = Vec::with_capacity(container.len());
    for chunk in &container.children {
        if chunk.description.len() > MAX_DESCRIPTION_LEN {
            return Err(Error::DescriptionTooLong {
                len: chunk.description.len(),
            });
        }
        let payload = match &chunk.content {
            ChunkContent::Data(data) => std::borrow::Cow::Borrowed(data.as_slice()),
            ChunkContent::Container(nested) => {
                std::borrow::Cow::Owned(serialize_chunks_with(nested, options)?)
            }
        };
        payloads.push(payload);
    }

    let table_end = CONTAINER_HEADER_SIZE + ENTRY_SIZE * container.len();
    let mut offsets = Vec::with_capacity(payloads.len());
    let mut cursor = align_up(table_end, alignment);
    for (chunk, payload) in container.children.iter().zip(&payloads) {
        offsets.push(cursor);
        cursor += payload.len();
        if !chunk.description.is_empty() {
            cursor += chunk.description.len() + 1;
        }
        cursor = align_up(cursor, alignment);
    }
    let total = cursor;

    let mut writer = ByteWriter::new();
    writer.write_u32(CHUNK_MAGIC);
    writer.write_u32(to_u32(total, "chunk container")?);
    writer.write_u32(to_u32(container.len(), "chunk count")?);
    writer.write_u32(CHUNK_REVISION);

    for ((chunk, payload), &offset) in container.children.iter().zip(&payloads).zip(&offsets) {
        writer.write_u32(chunk.context);
        writer.write_u32(to_u32(offset, "chunk offset")?);
        writer.write_u8(chunk.version);
        writer.write_u8(chunk.description.len() as u8);
        writer.write_bytes(&chunk.unknown);
        writer.write_u32(to_u32(payload.len(), "chunk size")?);
    }

    for ((chunk, payload), &offset) in container.children.iter().zip(&payloads).zip(&offsets) {
        writer.pad_to(offset, options.pad_byte);
        writer.write_bytes(payload);
        if !chunk.description.is_empty() {
            writer.write_bytes(chunk.description.as_bytes());
            writer.write_u8(0);
        }
    }
    writer.pad_to(total, options.pad_byte);

    tracing::debug!(
        "Serialized chunk container: {} children, {} bytes, alignment {}",
        container.len(),
        total,
        alignment
    );
    Ok(writer.into_inner())
}
