//! Platform and version profiles of the model package layout

use serde::Serialize;

use crate::error::{Error, Result};
use crate::formats::common::{Endian, Platform};

/// Magic signatures per platform
pub mod magic {
    pub const PC: [u8; 4] = *b"MDPC";
    pub const XBOX: [u8; 4] = *b"MDXB";
    pub const PS2: [u8; 4] = *b"MDP2";
    /// Big-endian
    pub const WII: [u8; 4] = *b"MDWI";
}

/// Size of the package header on every platform
pub const HEADER_SIZE: usize = 0x40;

/// Size of one vertex declaration record
pub const VERTEX_DECL_SIZE: usize = 16;

/// Size of a compact submodel record
pub const COMPACT_SUB_MODEL_SIZE: usize = 0x24;

/// Record sizes and quirks of one platform/version combination.
///
/// Every model package is decoded and encoded through one of these, so the
/// codec itself has no per-platform branches beyond what the profile says.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FormatProfile {
    pub platform: Platform,
    pub version: u32,
    pub model_record_size: usize,
    pub lod_instance_record_size: usize,
    /// Size of a full submodel record
    pub sub_model_record_size: usize,
    /// Number of bounding vectors stored per model
    pub bounds_count: usize,
    /// Submodels are stored in the 0x24-byte compact layout (Xbox only)
    pub compact_sub_models: bool,
}

impl FormatProfile {
    /// Find the profile for a platform and version.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedVersion`] for versions other than 1 and 6
    /// and [`Error::UnimplementedFormat`] for known combinations this codec
    /// does not handle (Xbox v1, Wii v1 and every PS2 model package).
    pub fn lookup(platform: Platform, version: u32) -> Result<Self> {
        let (model_record_size, lod_instance_record_size, sub_model_record_size, bounds_count) =
            match version {
                1 => (0x94, 0x50, 0x20, 2),
                6 => (0xF4, 0x60, 0x30, 8),
                _ => {
                    return Err(Error::UnsupportedVersion {
                        what: "model package",
                        version,
                    });
                }
            };

        match (platform, version) {
            (Platform::Pc, _) | (Platform::Xbox | Platform::Wii, 6) => Ok(Self {
                platform,
                version,
                model_record_size,
                lod_instance_record_size,
                sub_model_record_size,
                bounds_count,
                compact_sub_models: false,
            }),
            _ => Err(Error::unimplemented(format!("{platform} model package version {version}"))),
        }
    }

    /// Platform identified by a header magic.
    #[must_use]
    pub fn platform_from_magic(magic: [u8; 4]) -> Option<Platform> {
        match magic {
            magic::PC => Some(Platform::Pc),
            magic::XBOX => Some(Platform::Xbox),
            magic::PS2 => Some(Platform::Ps2),
            magic::WII => Some(Platform::Wii),
            _ => None,
        }
    }

    #[must_use]
    pub fn magic(&self) -> [u8; 4] {
        match self.platform {
            Platform::Pc => magic::PC,
            Platform::Xbox => magic::XBOX,
            Platform::Ps2 => magic::PS2,
            Platform::Wii => magic::WII,
        }
    }

    #[must_use]
    pub fn endian(&self) -> Endian {
        self.platform.endian()
    }

    /// Whether vertex buffers may store packed normals.
    #[must_use]
    pub fn packs_normals(&self) -> bool {
        self.platform.packs_normals()
    }

    /// Switch to compact submodel records.
    ///
    /// # Errors
    /// Returns [`Error::UnimplementedFormat`] on platforms other than Xbox.
    pub fn with_compact_sub_models(mut self, compact: bool) -> Result<Self> {
        if compact && self.platform != Platform::Xbox {
            return Err(Error::unimplemented(format!(
                "compact submodels on {}",
                self.platform
            )));
        }
        self.compact_sub_models = compact;
        Ok(self)
    }

    /// Size of the submodel records actually stored.
    #[must_use]
    pub fn stored_sub_model_size(&self) -> usize {
        if self.compact_sub_models {
            COMPACT_SUB_MODEL_SIZE
        } else {
            self.sub_model_record_size
        }
    }
}
