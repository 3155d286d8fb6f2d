//! Material packages
//!
//! A material package owns a tree of materials, each made of substances
//! (one per render pass) that own their textures and, on PS2 and Wii, their
//! palettes. On disk the tree is flattened into record tables linked by
//! offsets, with side tables of record offsets ("reference tables") between
//! materials and substances and between substances and textures. Texture and
//! palette payloads live in one data block after the tables.

mod palette;
mod reader;
pub mod texture;
mod types;
mod writer;

pub use palette::TABLE_ENTRIES;
pub use reader::{parse_material_package, parse_material_package_with};
pub use types::{
    Material, MaterialHandle, MaterialPackage, OWNER_GLOBAL, OWNER_LEVEL, OWNER_NULL,
    OWNER_SHARED_VEHICLE, Palette, PixelFormat, Substance, Texture, TextureFormat,
};
pub use writer::serialize_material_package;

pub(crate) use reader::data_block_offset;

use crate::error::{Error, Result};
pub(crate) use crate::formats::common::Table;
use crate::formats::common::{Platform, align_up, fourcc};
use crate::resource::Resource;

/// Magic signatures per platform
pub mod magic {
    pub const PC: [u8; 4] = *b"PCMP";
    pub const XBOX: [u8; 4] = *b"XBMP";
    pub const PS2: [u8; 4] = *b"PS2M";
    /// Big-endian
    pub const WII: [u8; 4] = *b"WIMP";
}

/// Chunk context of a standalone material package
pub const MATERIAL_PACKAGE_CONTEXT: u32 = fourcc(b"MTPK");

/// Newest material package version
pub const LATEST_VERSION: u32 = 2;

pub const MATERIAL_RECORD_SIZE: usize = 16;
pub const SUBSTANCE_RECORD_SIZE: usize = 16;
/// Substance record with the trailing palette run
pub const SUBSTANCE_PALETTE_RECORD_SIZE: usize = 24;
pub const TEXTURE_RECORD_SIZE: usize = 24;
pub const PALETTE_RECORD_SIZE: usize = 12;
pub const REFERENCE_SIZE: usize = 4;

/// Alignment of the data block and of every payload inside it
pub const DATA_ALIGNMENT: usize = 16;

pub(crate) fn platform_from_magic(magic: [u8; 4]) -> Option<Platform> {
    match magic {
        magic::PC => Some(Platform::Pc),
        magic::XBOX => Some(Platform::Xbox),
        magic::PS2 => Some(Platform::Ps2),
        magic::WII => Some(Platform::Wii),
        _ => None,
    }
}

pub(crate) fn magic_for(platform: Platform) -> [u8; 4] {
    match platform {
        Platform::Pc => magic::PC,
        Platform::Xbox => magic::XBOX,
        Platform::Ps2 => magic::PS2,
        Platform::Wii => magic::WII,
    }
}

pub(crate) fn check_version(version: u32) -> Result<()> {
    if matches!(version, 1 | 2) {
        Ok(())
    } else {
        Err(Error::UnsupportedVersion {
            what: "material package",
            version,
        })
    }
}

/// Header fields shared by every platform layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MaterialHeader {
    pub platform: Platform,
    pub version: u32,
    pub uid: u32,
    pub materials: Table,
    pub substance_refs: Table,
    pub substances: Table,
    pub texture_refs: Table,
    pub textures: Table,
    pub palettes: Table,
    pub data_offset: usize,
    pub data_size: usize,
}

impl MaterialHeader {
    /// Header size in bytes for a platform.
    pub(crate) const fn size(platform: Platform) -> usize {
        match platform {
            Platform::Pc | Platform::Xbox => 64,
            Platform::Wii => 72,
            Platform::Ps2 => 32,
        }
    }

    pub(crate) const fn substance_record_size(platform: Platform) -> usize {
        if platform.has_palettes() {
            SUBSTANCE_PALETTE_RECORD_SIZE
        } else {
            SUBSTANCE_RECORD_SIZE
        }
    }

    /// Canonical layout: tables in header order right after the header,
    /// then the 16-aligned data block. PS2 headers store no offsets and are
    /// always read with this layout.
    pub(crate) fn canonical(
        platform: Platform,
        version: u32,
        uid: u32,
        counts: [usize; 6],
        data_size: usize,
    ) -> Self {
        let sizes = [
            MATERIAL_RECORD_SIZE,
            REFERENCE_SIZE,
            Self::substance_record_size(platform),
            REFERENCE_SIZE,
            TEXTURE_RECORD_SIZE,
            PALETTE_RECORD_SIZE,
        ];
        let mut cursor = Self::size(platform);
        let mut tables = [Table::default(); 6];
        for ((table, count), size) in tables.iter_mut().zip(counts).zip(sizes) {
            *table = Table {
                count,
                offset: cursor,
            };
            cursor += count * size;
        }
        Self {
            platform,
            version,
            uid,
            materials: tables[0],
            substance_refs: tables[1],
            substances: tables[2],
            texture_refs: tables[3],
            textures: tables[4],
            palettes: tables[5],
            data_offset: align_up(cursor, DATA_ALIGNMENT),
            data_size,
        }
    }
}

impl Resource for MaterialPackage {
    const CONTEXT: u32 = MATERIAL_PACKAGE_CONTEXT;

    fn load(data: &[u8]) -> Result<Self> {
        parse_material_package(data)
    }

    fn save(&self) -> Result<Vec<u8>> {
        serialize_material_package(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_layout() {
        let header = MaterialHeader::canonical(Platform::Ps2, 2, 7, [1, 2, 2, 3, 3, 1], 0);
        assert_eq!(header.materials.offset, 32);
        assert_eq!(header.substance_refs.offset, 48);
        assert_eq!(header.substances.offset, 56);
        assert_eq!(header.texture_refs.offset, 56 + 48);
        assert_eq!(header.textures.offset, 104 + 12);
        assert_eq!(header.palettes.offset, 116 + 72);
        assert_eq!(header.data_offset, 208);
    }

    #[test]
    fn test_platform_magic() {
        for platform in [Platform::Pc, Platform::Xbox, Platform::Ps2, Platform::Wii] {
            assert_eq!(platform_from_magic(magic_for(platform)), Some(platform));
        }
        assert_eq!(platform_from_magic(*b"MDPC"), None);
    }
}
