//! Positioned reader and writer over in-memory buffers
//!
//! Both sides carry an [`Endian`] mode so the same record code serves the
//! little-endian builds and the big-endian Wii build.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use glam::Vec4;

use super::endian::Endian;
use crate::error::{Error, Result};

macro_rules! read_primitive {
    ($name:ident, $ty:ty, $size:expr, $read:ident) => {
        pub fn $name(&mut self) -> Result<$ty> {
            let bytes = self.take($size)?;
            Ok(match self.endian {
                Endian::Little => LittleEndian::$read(bytes),
                Endian::Big => BigEndian::$read(bytes),
            })
        }
    };
}

macro_rules! write_primitive {
    ($name:ident, $ty:ty, $size:expr, $write:ident) => {
        pub fn $name(&mut self, value: $ty) {
            let mut bytes = [0u8; $size];
            match self.endian {
                Endian::Little => LittleEndian::$write(&mut bytes, value),
                Endian::Big => BigEndian::$write(&mut bytes, value),
            }
            self.buf.extend_from_slice(&bytes);
        }
    };
}

/// Stateful reader over a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    endian: Endian,
}

impl<'a> ByteReader<'a> {
    /// Create a little-endian reader positioned at 0.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_endian(data, Endian::Little)
    }

    #[must_use]
    pub fn with_endian(data: &'a [u8], endian: Endian) -> Self {
        Self {
            data,
            pos: 0,
            endian,
        }
    }

    #[must_use]
    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Move to an absolute position. Seeking to `len()` is allowed.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(Error::UnexpectedEof {
                offset: pos,
                needed: 0,
            });
        }
        self.pos = pos;
        Ok(())
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.take(count).map(|_| ())
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(count)
            .filter(|&end| end <= self.data.len())
            .ok_or(Error::UnexpectedEof {
                offset: self.pos,
                needed: count,
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    read_primitive!(read_u16, u16, 2, read_u16);
    read_primitive!(read_i16, i16, 2, read_i16);
    read_primitive!(read_u32, u32, 4, read_u32);
    read_primitive!(read_i32, i32, 4, read_i32);
    read_primitive!(read_f32, f32, 4, read_f32);

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        self.take(count)
    }

    /// Read four raw bytes; tags are compared as bytes so endianness does not apply.
    pub fn read_magic(&mut self) -> Result<[u8; 4]> {
        let bytes = self.take(4)?;
        Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    /// Read a fixed-length string, stopping at the first NUL.
    pub fn read_fixed_string(&mut self, len: usize) -> Result<String> {
        let bytes = self.take(len)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(len);
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    pub fn read_vec4(&mut self) -> Result<Vec4> {
        let x = self.read_f32()?;
        let y = self.read_f32()?;
        let z = self.read_f32()?;
        let w = self.read_f32()?;
        Ok(Vec4::new(x, y, z, w))
    }

    /// Read a u32 without advancing.
    pub fn peek_u32(&self) -> Result<u32> {
        self.clone().read_u32()
    }

    /// The next four raw bytes, without moving the cursor.
    #[must_use]
    pub fn peek_magic(&self) -> Option<[u8; 4]> {
        self.peek_magic_at(self.pos)
    }

    /// Read four raw bytes at an absolute offset without moving the cursor.
    #[must_use]
    pub fn peek_magic_at(&self, offset: usize) -> Option<[u8; 4]> {
        let bytes = self.data.get(offset..offset.checked_add(4)?)?;
        Some([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

/// Growable writer with the same primitive set as [`ByteReader`].
#[derive(Debug, Clone, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
    endian: Endian,
}

impl ByteWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::with_endian(Endian::Little)
    }

    #[must_use]
    pub fn with_endian(endian: Endian) -> Self {
        Self {
            buf: Vec::new(),
            endian,
        }
    }

    #[must_use]
    pub fn endian(&self) -> Endian {
        self.endian
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    write_primitive!(write_u16, u16, 2, write_u16);
    write_primitive!(write_i16, i16, 2, write_i16);
    write_primitive!(write_u32, u32, 4, write_u32);
    write_primitive!(write_i32, i32, 4, write_i32);
    write_primitive!(write_f32, f32, 4, write_f32);

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Write a string into a fixed-length NUL-padded field, truncating if needed.
    pub fn write_fixed_string(&mut self, value: &str, len: usize) {
        let bytes = value.as_bytes();
        let used = bytes.len().min(len);
        self.buf.extend_from_slice(&bytes[..used]);
        self.fill(0, len - used);
    }

    pub fn write_vec4(&mut self, value: Vec4) {
        for component in value.to_array() {
            self.write_f32(component);
        }
    }

    /// Append `count` copies of `byte`.
    pub fn fill(&mut self, byte: u8, count: usize) {
        self.buf.resize(self.buf.len() + count, byte);
    }

    /// Pad with `pad` until the position is a multiple of `alignment`.
    pub fn align(&mut self, alignment: usize, pad: u8) {
        let target = align_up(self.buf.len(), alignment);
        self.buf.resize(target, pad);
    }

    /// Pad with `pad` until the buffer reaches `target` bytes.
    pub fn pad_to(&mut self, target: usize, pad: u8) {
        if target > self.buf.len() {
            self.buf.resize(target, pad);
        }
    }

    /// Overwrite a u32 at an already written position.
    pub fn patch_u32(&mut self, at: usize, value: u32) -> Result<()> {
        let slot = self.buf.get_mut(at..at + 4).ok_or(Error::UnexpectedEof {
            offset: at,
            needed: 4,
        })?;
        match self.endian {
            Endian::Little => LittleEndian::write_u32(slot, value),
            Endian::Big => BigEndian::write_u32(slot, value),
        }
        Ok(())
    }
}

/// Round `value` up to a multiple of `alignment` (1 or 0 means no alignment).
#[must_use]
pub const fn align_up(value: usize, alignment: usize) -> usize {
    if alignment <= 1 {
        value
    } else {
        value.div_ceil(alignment) * alignment
    }
}

/// Convert a length or offset to the u32 used on disk.
pub(crate) fn to_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::size_mismatch(what, u32::MAX as usize, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_both_endians() {
        let data = [0x01, 0x02, 0x03, 0x04];
        let mut le = ByteReader::new(&data);
        assert_eq!(le.read_u32().unwrap(), 0x04030201);

        let mut be = ByteReader::with_endian(&data, Endian::Big);
        assert_eq!(be.read_u16().unwrap(), 0x0102);
        assert_eq!(be.read_u16().unwrap(), 0x0304);
        assert_eq!(be.remaining(), 0);
    }

    #[test]
    fn test_read_past_end_reports_offset() {
        let data = [0u8; 6];
        let mut reader = ByteReader::new(&data);
        reader.read_u32().unwrap();
        match reader.read_u32() {
            Err(Error::UnexpectedEof { offset, needed }) => {
                assert_eq!(offset, 4);
                assert_eq!(needed, 4);
            }
            other => panic!("expected EOF error, got {other:?}"),
        }
        // A failed read does not move the cursor
        assert_eq!(reader.position(), 4);
    }

    #[test]
    fn test_writer_mirrors_reader() {
        let mut writer = ByteWriter::with_endian(Endian::Big);
        writer.write_u32(0xDEADBEEF);
        writer.write_f32(1.5);
        writer.write_fixed_string("abc", 6);
        writer.write_vec4(Vec4::new(1.0, 2.0, 3.0, 4.0));
        let bytes = writer.into_inner();
        assert_eq!(bytes.len(), 4 + 4 + 6 + 16);

        let mut reader = ByteReader::with_endian(&bytes, Endian::Big);
        assert_eq!(reader.read_u32().unwrap(), 0xDEADBEEF);
        assert_eq!(reader.read_f32().unwrap(), 1.5);
        assert_eq!(reader.read_fixed_string(6).unwrap(), "abc");
        assert_eq!(reader.read_vec4().unwrap(), Vec4::new(1.0, 2.0, 3.0, 4.0));
    }

    #[test]
    fn test_align_and_patch() {
        let mut writer = ByteWriter::new();
        writer.write_u32(0);
        writer.write_u8(7);
        writer.align(16, 0xA1);
        assert_eq!(writer.position(), 16);
        assert_eq!(writer.as_slice()[5], 0xA1);
        writer.patch_u32(0, 0x11223344).unwrap();
        assert_eq!(&writer.as_slice()[..4], &[0x44, 0x33, 0x22, 0x11]);
        assert!(writer.patch_u32(14, 1).is_err());
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 16), 0);
        assert_eq!(align_up(1, 16), 16);
        assert_eq!(align_up(32, 16), 32);
        assert_eq!(align_up(5, 1), 5);
    }
}
