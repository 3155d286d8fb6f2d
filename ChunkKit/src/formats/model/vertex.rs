//! Vertex and index buffers
//!
//! Vertex data is kept as raw bytes in the platform's byte order so
//! unmodified buffers are written back exactly. Xbox buffers may store each
//! normal as one packed 11/11/10 word; those are widened to three floats on
//! read and cannot be packed again.

use std::ops::Range;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use glam::{Vec2, Vec3};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::formats::common::{Endian, Platform};

/// Field of a vertex layout, in storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Position,
    Normal,
    Uv,
    Weights,
    Color,
}

impl Field {
    const fn size(self, packed: bool) -> usize {
        match self {
            Self::Position => 12,
            Self::Normal if packed => 4,
            Self::Normal => 12,
            Self::Uv => 8,
            Self::Weights => 16,
            Self::Color => 4,
        }
    }
}

/// Known vertex layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum VertexLayout {
    /// Position, normal, uv
    Standard,
    /// Standard plus a colour
    Diffuse,
    /// Standard plus four blend weights and a colour
    Blended,
    /// Two position/normal pairs (intact and damaged), uv and colour
    Damage,
}

impl VertexLayout {
    /// # Errors
    /// Returns [`Error::UnimplementedFormat`] for layout ids without a decoder.
    pub fn from_id(id: u32) -> Result<Self> {
        match id {
            0 => Ok(Self::Standard),
            1 => Ok(Self::Diffuse),
            5 => Ok(Self::Blended),
            6 => Ok(Self::Damage),
            other => Err(Error::unimplemented(format!("vertex layout {other}"))),
        }
    }

    #[must_use]
    pub const fn id(self) -> u32 {
        match self {
            Self::Standard => 0,
            Self::Diffuse => 1,
            Self::Blended => 5,
            Self::Damage => 6,
        }
    }

    const fn fields(self) -> &'static [Field] {
        use Field::{Color, Normal, Position, Uv, Weights};
        match self {
            Self::Standard => &[Position, Normal, Uv],
            Self::Diffuse => &[Position, Normal, Uv, Color],
            Self::Blended => &[Position, Normal, Uv, Weights, Color],
            Self::Damage => &[Position, Normal, Position, Normal, Uv, Color],
        }
    }

    fn size(self, packed: bool) -> usize {
        self.fields().iter().map(|f| f.size(packed)).sum()
    }

    /// Bytes per vertex with float normals.
    #[must_use]
    pub fn stride(self) -> usize {
        self.size(false)
    }

    /// Bytes per vertex with packed normals.
    #[must_use]
    pub fn packed_stride(self) -> usize {
        self.size(true)
    }

    /// Byte offset of the first occurrence of `field` in an unpacked vertex.
    fn offset_of(self, field: Field) -> Option<usize> {
        let mut offset = 0;
        for &f in self.fields() {
            if f == field {
                return Some(offset);
            }
            offset += f.size(false);
        }
        None
    }
}

/// One decoded vertex, for inspection and tooling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    pub color: Option<u32>,
}

/// Raw vertices of one layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexBuffer {
    pub layout: VertexLayout,
    pub count: usize,
    /// `count * layout.stride()` bytes in `endian` order
    pub data: Vec<u8>,
    pub endian: Endian,
    /// Normals were widened from packed words on read; such a buffer
    /// cannot be written back
    pub expanded_from_packed: bool,
}

impl VertexBuffer {
    /// Create a buffer from unpacked vertex bytes.
    ///
    /// # Errors
    /// Returns [`Error::SizeMismatch`] if `data` is not a whole number of vertices.
    pub fn new(layout: VertexLayout, data: Vec<u8>, endian: Endian) -> Result<Self> {
        let stride = layout.stride();
        if data.len() % stride != 0 {
            return Err(Error::size_mismatch(
                "vertex buffer",
                data.len().next_multiple_of(stride),
                data.len(),
            ));
        }
        Ok(Self {
            layout,
            count: data.len() / stride,
            data,
            endian,
            expanded_from_packed: false,
        })
    }

    #[must_use]
    pub fn stride(&self) -> usize {
        self.layout.stride()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Raw bytes of vertex `index`.
    #[must_use]
    pub fn raw_vertex(&self, index: usize) -> Option<&[u8]> {
        let stride = self.stride();
        self.data.get(index * stride..(index + 1) * stride)
    }

    /// Decode vertex `index`.
    ///
    /// # Errors
    /// Returns [`Error::UnexpectedEof`] if `index` is out of range.
    pub fn vertex(&self, index: usize) -> Result<Vertex> {
        let raw = self.raw_vertex(index).ok_or(Error::UnexpectedEof {
            offset: index * self.stride(),
            needed: self.stride(),
        })?;
        let f32_at = |offset: usize| match self.endian {
            Endian::Little => LittleEndian::read_f32(&raw[offset..]),
            Endian::Big => BigEndian::read_f32(&raw[offset..]),
        };
        let vec3_at = |offset: usize| Vec3::new(f32_at(offset), f32_at(offset + 4), f32_at(offset + 8));

        let layout = self.layout;
        let position = layout.offset_of(Field::Position).map_or(Vec3::ZERO, vec3_at);
        let normal = layout.offset_of(Field::Normal).map_or(Vec3::ZERO, vec3_at);
        let uv = layout
            .offset_of(Field::Uv)
            .map_or(Vec2::ZERO, |o| Vec2::new(f32_at(o), f32_at(o + 4)));
        let color = layout.offset_of(Field::Color).map(|o| match self.endian {
            Endian::Little => LittleEndian::read_u32(&raw[o..]),
            Endian::Big => BigEndian::read_u32(&raw[o..]),
        });

        Ok(Vertex {
            position,
            normal,
            uv,
            color,
        })
    }

    /// Copy a range of vertices into a new buffer.
    ///
    /// # Errors
    /// Returns [`Error::UnexpectedEof`] if the range exceeds the buffer.
    pub fn slice(&self, range: Range<usize>) -> Result<Self> {
        let stride = self.stride();
        if range.start > range.end || range.end > self.count {
            return Err(Error::UnexpectedEof {
                offset: range.start * stride,
                needed: range.len() * stride,
            });
        }
        Ok(Self {
            layout: self.layout,
            count: range.len(),
            data: self.data[range.start * stride..range.end * stride].to_vec(),
            endian: self.endian,
            expanded_from_packed: self.expanded_from_packed,
        })
    }
}

/// Flat 16-bit index list shared by every submodel of a package.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct IndexBuffer {
    pub indices: Vec<u16>,
}

impl IndexBuffer {
    #[must_use]
    pub fn new(indices: Vec<u16>) -> Self {
        Self { indices }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Decode `count` vertices stored with `disk_stride` bytes each.
///
/// Buffers whose stride matches the layout are copied verbatim. On
/// platforms with packed normals a buffer at the packed stride has each
/// normal word widened to three floats (x: bits 0-10, y: bits 11-21,
/// z: bits 22-31, each scaled to 0..1 by its field maximum).
///
/// # Errors
/// - [`Error::UnimplementedFormat`] for any other stride
/// - [`Error::UnexpectedEof`] if `raw` holds fewer than `count` vertices
pub fn decode_vertices(
    raw: &[u8],
    layout: VertexLayout,
    count: usize,
    disk_stride: usize,
    platform: Platform,
    endian: Endian,
) -> Result<VertexBuffer> {
    let packed = if disk_stride == layout.stride() {
        false
    } else if platform.packs_normals() && disk_stride == layout.packed_stride() {
        true
    } else {
        return Err(Error::unimplemented(format!(
            "{layout:?} vertices with stride {disk_stride:#x} on {platform}"
        )));
    };

    let needed = count * disk_stride;
    if raw.len() < needed {
        return Err(Error::UnexpectedEof {
            offset: raw.len(),
            needed,
        });
    }
    if raw.len() > needed {
        tracing::warn!(
            "Vertex data size mismatch: {} bytes for {} vertices of {} bytes",
            raw.len(),
            count,
            disk_stride
        );
    }
    let raw = &raw[..needed];

    if !packed {
        return Ok(VertexBuffer {
            layout,
            count,
            data: raw.to_vec(),
            endian,
            expanded_from_packed: false,
        });
    }

    let mut data = Vec::with_capacity(count * layout.stride());
    for vertex in raw.chunks_exact(disk_stride) {
        let mut offset = 0;
        for &field in layout.fields() {
            let size = field.size(true);
            let bytes = &vertex[offset..offset + size];
            if field == Field::Normal {
                let word = match endian {
                    Endian::Little => LittleEndian::read_u32(bytes),
                    Endian::Big => BigEndian::read_u32(bytes),
                };
                for component in unpack_normal(word).to_array() {
                    let mut out = [0u8; 4];
                    match endian {
                        Endian::Little => LittleEndian::write_f32(&mut out, component),
                        Endian::Big => BigEndian::write_f32(&mut out, component),
                    }
                    data.extend_from_slice(&out);
                }
            } else {
                data.extend_from_slice(bytes);
            }
            offset += size;
        }
    }

    tracing::debug!("Expanded {} packed-normal {:?} vertices", count, layout);
    Ok(VertexBuffer {
        layout,
        count,
        data,
        endian,
        expanded_from_packed: true,
    })
}

/// Widen a packed 11/11/10 normal word.
#[must_use]
pub fn unpack_normal(word: u32) -> Vec3 {
    Vec3::new(
        (word & 0x7FF) as f32 / 2047.0,
        ((word >> 11) & 0x7FF) as f32 / 2047.0,
        (word >> 22) as f32 / 1023.0,
    )
}

/// Bytes and on-disk stride of a vertex buffer.
///
/// # Errors
/// Returns [`Error::UnimplementedFormat`] for buffers widened from packed
/// normals; the packed form is read-only.
pub fn encode_vertices(buffer: &VertexBuffer) -> Result<(&[u8], usize)> {
    if buffer.expanded_from_packed {
        return Err(Error::unimplemented("re-packing packed vertex normals"));
    }
    let stride = buffer.stride();
    if buffer.data.len() != buffer.count * stride {
        return Err(Error::size_mismatch(
            "vertex buffer",
            buffer.count * stride,
            buffer.data.len(),
        ));
    }
    Ok((&buffer.data, stride))
}

/// Decode `count` 16-bit indices.
pub fn decode_indices(raw: &[u8], count: usize, endian: Endian) -> Result<IndexBuffer> {
    let bytes = raw.get(..count * 2).ok_or(Error::UnexpectedEof {
        offset: raw.len(),
        needed: count * 2,
    })?;
    let indices = bytes
        .chunks_exact(2)
        .map(|pair| match endian {
            Endian::Little => LittleEndian::read_u16(pair),
            Endian::Big => BigEndian::read_u16(pair),
        })
        .collect();
    Ok(IndexBuffer { indices })
}

#[must_use]
pub fn encode_indices(buffer: &IndexBuffer, endian: Endian) -> Vec<u8> {
    let mut out = vec![0u8; buffer.len() * 2];
    match endian {
        Endian::Little => LittleEndian::write_u16_into(&buffer.indices, &mut out),
        Endian::Big => BigEndian::write_u16_into(&buffer.indices, &mut out),
    }
    out
}
