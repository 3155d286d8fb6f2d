//! Material package object graph

use serde::Serialize;

use crate::formats::common::Platform;

/// Owner id of a handle that refers to no material.
pub const OWNER_NULL: u16 = 0xFFFF;
/// Owner id of the current level's material package.
pub const OWNER_LEVEL: u16 = 0xFFFE;
/// Owner id of the always-loaded global package.
pub const OWNER_GLOBAL: u16 = 0xFFFD;
/// Owner id of the package shared by all vehicles.
pub const OWNER_SHARED_VEHICLE: u16 = 0xFFFC;

/// Reference from a submodel to a material in some package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MaterialHandle {
    /// Owner id of the package holding the material, or a sentinel
    pub owner: u16,
    /// Index into that package's material list
    pub index: u16,
}

impl MaterialHandle {
    pub const NULL: Self = Self {
        owner: OWNER_NULL,
        index: 0,
    };

    #[must_use]
    pub const fn new(owner: u16, index: u16) -> Self {
        Self { owner, index }
    }

    #[must_use]
    pub const fn is_null(self) -> bool {
        self.owner == OWNER_NULL
    }

    /// Sentinel owners always resolve through the package manager.
    #[must_use]
    pub const fn is_sentinel(self) -> bool {
        self.owner >= OWNER_SHARED_VEHICLE
    }

    /// Whether the handle points into the package with owner id `uid`.
    #[must_use]
    pub const fn is_local_to(self, uid: u32) -> bool {
        !self.is_sentinel() && self.owner == (uid & 0xFFFF) as u16
    }
}

impl Default for MaterialHandle {
    fn default() -> Self {
        Self::NULL
    }
}

impl std::fmt::Display for MaterialHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.owner {
            OWNER_NULL => write!(f, "null"),
            OWNER_LEVEL => write!(f, "level:{}", self.index),
            OWNER_GLOBAL => write!(f, "global:{}", self.index),
            OWNER_SHARED_VEHICLE => write!(f, "vehicle:{}", self.index),
            owner => write!(f, "{owner:#06x}:{}", self.index),
        }
    }
}

/// Pixel layout of a texture payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PixelFormat {
    Dxt1,
    Dxt3,
    Dxt5,
    Rgba8,
    Rgb565,
    /// 8-bit palette indices
    Indexed8,
    /// 4-bit palette indices, low nibble first
    Indexed4,
    Unknown(u8),
}

impl PixelFormat {
    #[must_use]
    pub fn from_id(id: u8) -> Self {
        match id {
            0x01 => Self::Dxt1,
            0x03 => Self::Dxt3,
            0x05 => Self::Dxt5,
            0x10 => Self::Rgba8,
            0x11 => Self::Rgb565,
            0x20 => Self::Indexed8,
            0x21 => Self::Indexed4,
            other => Self::Unknown(other),
        }
    }

    #[must_use]
    pub fn id(self) -> u8 {
        match self {
            Self::Dxt1 => 0x01,
            Self::Dxt3 => 0x03,
            Self::Dxt5 => 0x05,
            Self::Rgba8 => 0x10,
            Self::Rgb565 => 0x11,
            Self::Indexed8 => 0x20,
            Self::Indexed4 => 0x21,
            Self::Unknown(id) => id,
        }
    }

    #[must_use]
    pub fn is_indexed(self) -> bool {
        matches!(self, Self::Indexed8 | Self::Indexed4)
    }

    /// Bits per pixel for uncompressed and indexed formats.
    #[must_use]
    pub fn bits_per_pixel(self) -> Option<usize> {
        match self {
            Self::Rgba8 => Some(32),
            Self::Rgb565 => Some(16),
            Self::Indexed8 => Some(8),
            Self::Indexed4 => Some(4),
            Self::Dxt1 | Self::Dxt3 | Self::Dxt5 | Self::Unknown(_) => None,
        }
    }
}

/// Texture description packed into one u32 on disk.
///
/// Bits 0-7 pixel format, 8-11 log2 width, 12-15 log2 height, 16-23 mip
/// count, 24-31 flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TextureFormat {
    pub pixel_format: PixelFormat,
    pub width_log2: u8,
    pub height_log2: u8,
    pub mip_count: u8,
    pub flags: u8,
}

impl TextureFormat {
    #[must_use]
    pub fn from_packed(value: u32) -> Self {
        Self {
            pixel_format: PixelFormat::from_id((value & 0xFF) as u8),
            width_log2: ((value >> 8) & 0xF) as u8,
            height_log2: ((value >> 12) & 0xF) as u8,
            mip_count: ((value >> 16) & 0xFF) as u8,
            flags: (value >> 24) as u8,
        }
    }

    #[must_use]
    pub fn packed(self) -> u32 {
        u32::from(self.pixel_format.id())
            | (u32::from(self.width_log2 & 0xF) << 8)
            | (u32::from(self.height_log2 & 0xF) << 12)
            | (u32::from(self.mip_count) << 16)
            | (u32::from(self.flags) << 24)
    }

    #[must_use]
    pub fn width(self) -> usize {
        1 << self.width_log2
    }

    #[must_use]
    pub fn height(self) -> usize {
        1 << self.height_log2
    }

    /// Number of mip levels stored, at least 1.
    #[must_use]
    pub fn levels(self) -> usize {
        usize::from(self.mip_count.max(1))
    }
}

/// A texture record and its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Texture {
    pub uid: u32,
    pub hash: u32,
    pub format: TextureFormat,
    pub unknown: u32,
    /// Payload: a DDS file on PC/Xbox, raw palette indices on PS2/Wii
    #[serde(skip)]
    pub data: Vec<u8>,
}

/// A colour table for indexed textures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Palette {
    pub bytes_per_entry: u16,
    pub flags: u16,
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl Palette {
    /// Number of colour entries in the payload.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        if self.bytes_per_entry == 0 {
            0
        } else {
            self.data.len() / usize::from(self.bytes_per_entry)
        }
    }
}

/// The texture set of one render pass.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct Substance {
    pub flags: u32,
    pub mode: u16,
    pub kind: u16,
    pub textures: Vec<Texture>,
    /// Only stored on platforms with palettized textures
    pub palettes: Vec<Palette>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct Material {
    pub flags: u32,
    pub anim_speed: f32,
    pub substances: Vec<Substance>,
}

impl Material {
    /// Iterate every texture of every substance.
    pub fn textures(&self) -> impl Iterator<Item = &Texture> {
        self.substances.iter().flat_map(|s| s.textures.iter())
    }
}

/// All materials owned by one package.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialPackage {
    pub platform: Platform,
    pub version: u32,
    /// Owner id; handles whose owner matches it are local to this package
    pub uid: u32,
    pub materials: Vec<Material>,
}

impl MaterialPackage {
    #[must_use]
    pub fn new(platform: Platform, uid: u32) -> Self {
        Self {
            platform,
            version: super::LATEST_VERSION,
            uid,
            materials: Vec::new(),
        }
    }

    #[must_use]
    pub fn get(&self, index: u16) -> Option<&Material> {
        self.materials.get(usize::from(index))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    #[must_use]
    pub fn texture_count(&self) -> usize {
        self.materials.iter().map(|m| m.textures().count()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_format_packing() {
        let format = TextureFormat::from_packed(0x0304_7601);
        assert_eq!(format.pixel_format, PixelFormat::Dxt1);
        assert_eq!(format.width(), 64);
        assert_eq!(format.height(), 128);
        assert_eq!(format.mip_count, 4);
        assert_eq!(format.flags, 3);
        assert_eq!(format.packed(), 0x0304_7601);
    }

    #[test]
    fn test_handle_classification() {
        assert!(MaterialHandle::NULL.is_null());
        assert!(MaterialHandle::new(OWNER_LEVEL, 3).is_sentinel());
        assert!(!MaterialHandle::new(OWNER_GLOBAL, 3).is_local_to(0xFFFD));
        assert!(MaterialHandle::new(0x1234, 0).is_local_to(0xAB_1234));
        assert!(!MaterialHandle::new(0x1234, 0).is_local_to(0x1235));
        assert_eq!(MaterialHandle::new(OWNER_LEVEL, 2).to_string(), "level:2");
    }
}
