//! Byte order and platform identifiers

use serde::Serialize;

/// Byte order of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Endian {
    #[default]
    Little,
    Big,
}

/// Target platform of a package.
///
/// The platform selects byte order, header layouts and the vertex/submodel
/// quirks that only some builds have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Platform {
    Pc,
    Xbox,
    Ps2,
    Wii,
}

impl Platform {
    /// Byte order used by every multi-byte field on this platform.
    #[must_use]
    pub const fn endian(self) -> Endian {
        match self {
            Self::Wii => Endian::Big,
            Self::Pc | Self::Xbox | Self::Ps2 => Endian::Little,
        }
    }

    /// Whether vertex normals may be stored as packed 11/11/10 words.
    #[must_use]
    pub const fn packs_normals(self) -> bool {
        matches!(self, Self::Xbox)
    }

    /// Whether textures on this platform are palettized.
    #[must_use]
    pub const fn has_palettes(self) -> bool {
        matches!(self, Self::Ps2 | Self::Wii)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pc => "PC",
            Self::Xbox => "Xbox",
            Self::Ps2 => "PS2",
            Self::Wii => "Wii",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build a little-endian FourCC value from four ASCII bytes.
#[must_use]
pub const fn fourcc(tag: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*tag)
}

/// Render a tag as text when printable, hex otherwise.
#[must_use]
pub fn tag_name(tag: u32) -> String {
    let bytes = tag.to_le_bytes();
    if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        bytes.iter().map(|&b| char::from(b)).collect()
    } else {
        format!("{tag:#010x}")
    }
}
