//! Palette expansion for indexed textures

use image::RgbaImage;

use super::types::{Palette, PixelFormat, Texture};
use crate::error::{Error, Result};

/// Entries per palette table
pub const TABLE_ENTRIES: usize = 256;

impl Palette {
    /// Number of 256-entry tables; a trailing partial table counts.
    #[must_use]
    pub fn table_count(&self) -> usize {
        self.entry_count().div_ceil(TABLE_ENTRIES)
    }

    /// RGBA colour of `entry` in `table`, transparent black when missing.
    fn color(&self, table: usize, entry: usize) -> [u8; 4] {
        let start = (table * TABLE_ENTRIES + entry) * 4;
        self.data
            .get(start..start + 4)
            .map_or([0; 4], |c| [c[0], c[1], c[2], c[3]])
    }
}

impl Texture {
    /// Expand the top mip level of an indexed texture to RGBA8.
    ///
    /// # Errors
    /// - [`Error::UnimplementedFormat`] if the texture is not indexed or the
    ///   palette does not store 4-byte entries
    /// - [`Error::InvalidPaletteTable`] if `table` is out of range
    /// - [`Error::UnexpectedEof`] if the payload is shorter than one surface
    pub fn depalettize(&self, palette: &Palette, table: usize) -> Result<Vec<u8>> {
        if palette.bytes_per_entry != 4 {
            return Err(Error::unimplemented(format!(
                "palette with {} bytes per entry",
                palette.bytes_per_entry
            )));
        }
        let available = palette.table_count();
        if table >= available {
            return Err(Error::InvalidPaletteTable { table, available });
        }

        let pixels = self.format.width() * self.format.height();
        let mut rgba = Vec::with_capacity(pixels * 4);
        match self.format.pixel_format {
            PixelFormat::Indexed8 => {
                let indices = self.data.get(..pixels).ok_or(Error::UnexpectedEof {
                    offset: self.data.len(),
                    needed: pixels,
                })?;
                for &index in indices {
                    rgba.extend_from_slice(&palette.color(table, usize::from(index)));
                }
            }
            PixelFormat::Indexed4 => {
                let needed = pixels.div_ceil(2);
                let packed = self.data.get(..needed).ok_or(Error::UnexpectedEof {
                    offset: self.data.len(),
                    needed,
                })?;
                for &byte in packed {
                    rgba.extend_from_slice(&palette.color(table, usize::from(byte & 0x0F)));
                    rgba.extend_from_slice(&palette.color(table, usize::from(byte >> 4)));
                }
                rgba.truncate(pixels * 4);
            }
            other => {
                return Err(Error::unimplemented(format!(
                    "depalettizing {other:?} texture"
                )));
            }
        }
        Ok(rgba)
    }

    /// Expand an indexed texture into an [`RgbaImage`].
    pub fn to_rgba_image(&self, palette: &Palette, table: usize) -> Result<RgbaImage> {
        let rgba = self.depalettize(palette, table)?;
        let (width, height) = (self.format.width(), self.format.height());
        let len = rgba.len();
        RgbaImage::from_raw(width as u32, height as u32, rgba)
            .ok_or_else(|| Error::size_mismatch("RGBA image", width * height * 4, len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::material::types::TextureFormat;

    fn palette(tables: usize) -> Palette {
        let mut data = Vec::new();
        for t in 0..tables {
            for e in 0..TABLE_ENTRIES {
                data.extend_from_slice(&[e as u8, t as u8, 0, 0xFF]);
            }
        }
        Palette {
            bytes_per_entry: 4,
            flags: 0,
            data,
        }
    }

    fn texture(pixel: PixelFormat, data: Vec<u8>) -> Texture {
        Texture {
            uid: 1,
            hash: 0,
            format: TextureFormat {
                pixel_format: pixel,
                width_log2: 1,
                height_log2: 1,
                mip_count: 1,
                flags: 0,
            },
            unknown: 0,
            data,
        }
    }

    #[test]
    fn test_indexed8() {
        let tex = texture(PixelFormat::Indexed8, vec![0, 1, 2, 255]);
        let rgba = tex.depalettize(&palette(2), 1).unwrap();
        assert_eq!(rgba.len(), 16);
        assert_eq!(&rgba[4..8], &[1, 1, 0, 0xFF]);
        assert_eq!(&rgba[12..16], &[255, 1, 0, 0xFF]);
    }

    #[test]
    fn test_indexed4_low_nibble_first() {
        let tex = texture(PixelFormat::Indexed4, vec![0x21, 0x43]);
        let rgba = tex.depalettize(&palette(1), 0).unwrap();
        let firsts: Vec<u8> = rgba.chunks(4).map(|c| c[0]).collect();
        assert_eq!(firsts, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_palette_checks() {
        let tex = texture(PixelFormat::Indexed8, vec![0; 4]);
        assert!(matches!(
            tex.depalettize(&palette(1), 1),
            Err(Error::InvalidPaletteTable { table: 1, available: 1 })
        ));

        let mut narrow = palette(1);
        narrow.bytes_per_entry = 2;
        assert!(matches!(
            tex.depalettize(&narrow, 0),
            Err(Error::UnimplementedFormat { .. })
        ));
    }

    #[test]
    fn test_rgba_image_dimensions() {
        let tex = texture(PixelFormat::Indexed8, vec![3; 4]);
        let image = tex.to_rgba_image(&palette(1), 0).unwrap();
        assert_eq!(image.dimensions(), (2, 2));
        assert_eq!(image.get_pixel(1, 1).0, [3, 0, 0, 0xFF]);
    }
}
