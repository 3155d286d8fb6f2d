//! Chunk container parsing

use std::path::Path;

use super::{
    CHUNK_MAGIC, CHUNK_REVISION, CONTAINER_HEADER_SIZE, Chunk, ChunkContainer, ChunkContent,
    ENTRY_SIZE, PAD_BYTE,
};
use crate::error::{Error, Result};
use crate::formats::common::ByteReader;
use crate::options::ReadOptions;

/// Smallest and largest alignments considered when detecting a container's layout.
const MIN_ALIGNMENT: u32 = 4;
const MAX_ALIGNMENT: u32 = 4096;

/// Read a chunk file from disk
///
/// # Errors
///
/// Returns [`Error::FileAccess`] if the file cannot be read, or any parse error
/// from [`parse_chunk_bytes`].
pub fn read_chunk_file<P: AsRef<Path>>(path: P) -> Result<ChunkContainer> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|source| Error::FileAccess {
        path: path.to_path_buf(),
        source,
    })?;
    parse_chunk_bytes(&data)
}

/// Parse a chunk tree with default (lenient) options.
pub fn parse_chunk_bytes(data: &[u8]) -> Result<ChunkContainer> {
    parse_chunk_bytes_with(data, &ReadOptions::default())
}

/// Parse a chunk tree.
///
/// # Errors
///
/// - [`Error::BadMagic`] if the buffer does not start with a container header
/// - [`Error::UnsupportedVersion`] for a revision other than 3
/// - [`Error::CyclicChunk`] for offsets pointing back into a header or a
///   nesting deeper than [`ReadOptions::max_chunk_depth`]
/// - [`Error::ChunkOutOfBounds`] for payloads escaping their container
pub fn parse_chunk_bytes_with(data: &[u8], options: &ReadOptions) -> Result<ChunkContainer> {
    let reader = ByteReader::new(data);
    let found = reader.peek_magic_at(0).ok_or(Error::UnexpectedEof {
        offset: 0,
        needed: CONTAINER_HEADER_SIZE,
    })?;
    if u32::from_le_bytes(found) != CHUNK_MAGIC {
        return Err(Error::BadMagic {
            offset: 0,
            expected: CHUNK_MAGIC.to_le_bytes(),
            found,
        });
    }

    let container = ContainerParser { data, options }.parse(0, 0, None)?;
    tracing::debug!(
        "Parsed chunk tree: {} top-level chunks, alignment {:?}",
        container.len(),
        container.alignment
    );
    Ok(container)
}

/// Entry table row as stored on disk.
struct RawEntry {
    context: u32,
    offset: u32,
    version: u8,
    description_len: u8,
    unknown: [u8; 2],
    size: u32,
}

impl RawEntry {
    /// End of the payload plus description, relative to the container base.
    fn extent(&self) -> u64 {
        u64::from(self.offset) + u64::from(self.size) + u64::from(self.description_len)
    }
}

struct ContainerParser<'a> {
    data: &'a [u8],
    options: &'a ReadOptions,
}

impl ContainerParser<'_> {
    /// Parse the container starting at absolute offset `base`.
    ///
    /// `parent_size` is the size of the enclosing container; a nested container
    /// must be strictly smaller, which together with the depth cap guarantees
    /// the recursion ends.
    fn parse(&self, base: usize, depth: usize, parent_size: Option<usize>) -> Result<ChunkContainer> {
        if depth > self.options.max_chunk_depth {
            return Err(Error::CyclicChunk {
                offset: base,
                depth,
            });
        }

        let mut reader = ByteReader::new(self.data);
        reader.seek(base)?;
        let _magic = reader.read_u32()?;
        let size = reader.read_u32()? as usize;
        let count = reader.read_u32()? as usize;
        let revision = reader.read_u32()?;

        if revision != CHUNK_REVISION {
            return Err(Error::UnsupportedVersion {
                what: "chunk container",
                version: revision,
            });
        }
        if parent_size.is_some_and(|parent| size >= parent) {
            return Err(Error::CyclicChunk {
                offset: base,
                depth,
            });
        }

        let table_end = count
            .checked_mul(ENTRY_SIZE)
            .and_then(|t| t.checked_add(CONTAINER_HEADER_SIZE))
            .filter(|&end| end <= size)
            .ok_or_else(|| Error::size_mismatch("chunk entry table", size, count.saturating_mul(ENTRY_SIZE)))?;
        if base + size > self.data.len() {
            return Err(Error::UnexpectedEof {
                offset: base,
                needed: size,
            });
        }

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let context = reader.read_u32()?;
            let offset = reader.read_u32()?;
            let version = reader.read_u8()?;
            let description_len = reader.read_u8()?;
            let unknown = [reader.read_u8()?, reader.read_u8()?];
            let size = reader.read_u32()?;
            entries.push(RawEntry {
                context,
                offset,
                version,
                description_len,
                unknown,
                size,
            });
        }

        let mut children = Vec::with_capacity(count);
        for (index, entry) in entries.iter().enumerate() {
            children.push(self.parse_child(base, depth, size, table_end, index, entry)?);
        }

        self.check_padding(base, size, table_end, &entries);

        let offsets: Vec<u32> = entries.iter().map(|e| e.offset).collect();
        let alignment = detect_alignment(&offsets, size as u32);

        Ok(ChunkContainer {
            alignment: Some(alignment),
            children,
        })
    }

    fn parse_child(
        &self,
        base: usize,
        depth: usize,
        container_size: usize,
        table_end: usize,
        index: usize,
        entry: &RawEntry,
    ) -> Result<Chunk> {
        let offset = entry.offset as usize;
        if offset < table_end {
            return Err(Error::CyclicChunk {
                offset: base + offset,
                depth,
            });
        }
        if entry.extent() > container_size as u64 {
            return Err(Error::ChunkOutOfBounds {
                index,
                offset: entry.offset,
                size: entry.size,
                limit: container_size as u32,
            });
        }

        let start = base + offset;
        let end = start + entry.size as usize;
        let payload = &self.data[start..end];
        let description_bytes = &self.data[end..end + entry.description_len as usize];
        // Kept verbatim, terminators included, so the declared length survives a rewrite
        let description = match std::str::from_utf8(description_bytes) {
            Ok(text) => text.to_string(),
            Err(_) if self.options.is_strict() => {
                return Err(Error::InvalidDescription { index, offset: end });
            }
            Err(_) => {
                tracing::warn!(
                    "Description of chunk {} at {:#x} is not valid UTF-8; replacing invalid bytes",
                    index,
                    end
                );
                String::from_utf8_lossy(description_bytes).into_owned()
            }
        };

        let nested = payload.len() >= CONTAINER_HEADER_SIZE
            && ByteReader::new(payload).peek_magic() == Some(CHUNK_MAGIC.to_le_bytes());
        let content = if nested {
            ChunkContent::Container(self.parse(start, depth + 1, Some(container_size))?)
        } else {
            ChunkContent::Data(payload.to_vec())
        };

        Ok(Chunk {
            context: entry.context,
            version: entry.version,
            unknown: entry.unknown,
            description,
            content,
        })
    }

    /// Report gaps between payloads that hold something other than padding.
    fn check_padding(&self, base: usize, size: usize, table_end: usize, entries: &[RawEntry]) {
        let mut regions: Vec<(usize, usize, bool)> = entries
            .iter()
            .map(|e| (e.offset as usize, e.extent() as usize, e.description_len > 0))
            .collect();
        regions.sort_unstable();

        let mut cursor = table_end;
        let mut after_description = false;
        for (start, end, has_description) in regions.into_iter().chain(std::iter::once((size, size, false))) {
            if start < cursor {
                tracing::debug!(
                    "Chunk payload at {:#x} overlaps previous region ending at {:#x}",
                    base + start,
                    base + cursor
                );
            } else {
                let mut gap = &self.data[base + cursor..base + start];
                // Description terminator
                if after_description && gap.first() == Some(&0) {
                    gap = &gap[1..];
                }
                if let Some(pos) = gap.iter().position(|&b| b != PAD_BYTE) {
                    tracing::debug!(
                        "Unexpected padding byte {:#04x} at {:#x}",
                        gap[pos],
                        base + start - gap.len() + pos
                    );
                }
            }
            cursor = cursor.max(end);
            after_description = has_description;
        }
    }
}

/// Largest power of two (4..=4096) dividing every offset and the container size.
///
/// Returns 1 when the layout is not aligned to at least 4 bytes.
#[must_use]
pub fn detect_alignment(offsets: &[u32], container_size: u32) -> u32 {
    let mut alignment = MAX_ALIGNMENT;
    while alignment >= MIN_ALIGNMENT {
        let divides = |v: u32| v % alignment == 0;
        if divides(container_size) && offsets.iter().copied().all(divides) {
            return alignment;
        }
        alignment /= 2;
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(size: u32, count: u32, revision: u32) -> Vec<u8> {
        let mut out = Vec::new();
        for v in [CHUNK_MAGIC, size, count, revision] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    fn entry(context: u32, offset: u32, size: u32) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&context.to_le_bytes());
        out.extend_from_slice(&offset.to_le_bytes());
        out.extend_from_slice(&[0, 0, 0, 0]);
        out.extend_from_slice(&size.to_le_bytes());
        out
    }

    #[test]
    fn test_detect_alignment() {
        assert_eq!(detect_alignment(&[32, 64], 128), 32);
        assert_eq!(detect_alignment(&[], 16), 16);
        assert_eq!(detect_alignment(&[36], 48), 4);
        assert_eq!(detect_alignment(&[33], 48), 1);
    }

    #[test]
    fn test_bad_magic() {
        let data = [0u8; 16];
        assert!(matches!(parse_chunk_bytes(&data), Err(Error::BadMagic { offset: 0, .. })));
    }

    #[test]
    fn test_bad_revision() {
        let data = header(16, 0, 2);
        assert!(matches!(
            parse_chunk_bytes(&data),
            Err(Error::UnsupportedVersion { version: 2, .. })
        ));
    }

    #[test]
    fn test_single_data_chunk() {
        let mut data = header(48, 1, 3);
        data.extend(entry(7, 32, 4));
        data.extend([1, 2, 3, 4]);
        data.resize(48, PAD_BYTE);

        let root = parse_chunk_bytes(&data).unwrap();
        assert_eq!(root.len(), 1);
        assert_eq!(root.alignment, Some(16));
        assert_eq!(root.children[0].data(), Some(&[1u8, 2, 3, 4][..]));
    }

    #[test]
    fn test_offset_into_entry_table_is_cyclic() {
        let mut data = header(48, 1, 3);
        data.extend(entry(7, 16, 4));
        data.resize(48, PAD_BYTE);
        assert!(matches!(parse_chunk_bytes(&data), Err(Error::CyclicChunk { .. })));
    }

    #[test]
    fn test_self_referencing_container_is_cyclic() {
        // The child's payload is a copy of the root header with the same size
        let mut data = header(64, 1, 3);
        data.extend(entry(7, 32, 32));
        data.extend(header(64, 0, 3));
        data.resize(64, PAD_BYTE);
        assert!(matches!(parse_chunk_bytes(&data), Err(Error::CyclicChunk { .. })));
    }

    /// One data chunk whose description is `description`.
    fn described(description: &[u8]) -> Vec<u8> {
        let mut data = header(48, 1, 3);
        data.extend(entry(7, 32, 4));
        data[25] = description.len() as u8;
        data.extend([1, 2, 3, 4]);
        data.extend(description);
        data.resize(48, PAD_BYTE);
        data
    }

    #[test]
    fn test_description_keeps_declared_length() {
        let data = described(b"abc\0");
        let root = parse_chunk_bytes_with(&data, &ReadOptions::strict()).unwrap();
        let chunk = &root.children[0];
        assert_eq!(chunk.description, "abc\0");
        assert_eq!(chunk.description(), Some("abc"));

        let bytes = crate::formats::chunk::serialize_chunks(&root).unwrap();
        assert_eq!(bytes[25], 4);
        assert_eq!(&bytes[36..40], b"abc\0");
    }

    #[test]
    fn test_non_utf8_description() {
        let data = described(&[b'a', 0xFF, b'b']);
        assert!(matches!(
            parse_chunk_bytes_with(&data, &ReadOptions::strict()),
            Err(Error::InvalidDescription { index: 0, offset: 36 })
        ));

        let lenient = parse_chunk_bytes(&data).unwrap();
        assert_eq!(lenient.children[0].description(), Some("a\u{FFFD}b"));
    }

    #[test]
    fn test_payload_past_container_end() {
        let mut data = header(48, 1, 3);
        data.extend(entry(7, 32, 32));
        data.resize(48, PAD_BYTE);
        assert!(matches!(
            parse_chunk_bytes(&data),
            Err(Error::ChunkOutOfBounds { index: 0, offset: 32, size: 32, limit: 48 })
        ));
    }
}
