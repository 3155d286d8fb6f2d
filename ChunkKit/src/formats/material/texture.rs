//! Texture payload sizing
//!
//! Some packages store a texture size of zero and rely on the payload
//! itself to say where it ends. PC and Xbox payloads are DDS files; PS2 and
//! Wii payloads are raw palette indices described by the packed format word.

use ddsfile::{D3DFormat, Dds, DxgiFormat};

use super::types::{PixelFormat, TextureFormat};
use crate::error::{Error, Result};

/// "DDS " magic
pub const DDS_MAGIC: [u8; 4] = *b"DDS ";

/// What a DDS header says about the surfaces that follow it.
#[derive(Debug, Clone)]
pub struct DdsInfo {
    pub width: u32,
    pub height: u32,
    pub mip_count: u32,
    pub d3d_format: Option<D3DFormat>,
    pub dxgi_format: Option<DxgiFormat>,
    /// Magic, header and the DX10 extension when present
    pub header_size: usize,
    /// Byte size of the top-level surface, if the pixel format is known
    pub surface_size: Option<usize>,
}

impl DdsInfo {
    /// Parse the header at the start of `data`.
    ///
    /// # Errors
    /// Returns [`Error::DdsParseFailed`] if `data` is not a DDS file.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let dds = Dds::read(data).map_err(|e| Error::DdsParseFailed {
            message: e.to_string(),
        })?;
        let header_size = data.len().saturating_sub(dds.data.len());

        Ok(Self {
            width: dds.get_width(),
            height: dds.get_height(),
            mip_count: dds.get_num_mipmap_levels(),
            d3d_format: dds.get_d3d_format(),
            dxgi_format: dds.get_dxgi_format(),
            header_size,
            surface_size: dds.get_main_texture_size().map(|size| size as usize),
        })
    }
}

/// Total size of an indexed payload: every mip level at 4 or 8 bits per pixel.
#[must_use]
pub fn indexed_size(format: TextureFormat) -> Option<usize> {
    let bits = match format.pixel_format {
        PixelFormat::Indexed8 => 8,
        PixelFormat::Indexed4 => 4,
        _ => return None,
    };
    let size = (0..format.levels())
        .map(|level| {
            let w = (format.width() >> level).max(1);
            let h = (format.height() >> level).max(1);
            (w * h * bits).div_ceil(8)
        })
        .sum();
    Some(size)
}

/// Work out the payload size of a texture whose stored size is zero.
///
/// `data` runs from the texture's start to the nearest bound: the end of the
/// material data block or the start of the next texture, whichever comes
/// first. The result never exceeds `data.len()`.
pub fn infer_texture_size(data: &[u8], format: TextureFormat) -> Result<usize> {
    let bound = data.len();

    if data.starts_with(&DDS_MAGIC) {
        let info = DdsInfo::parse(data)?;
        if info.mip_count <= 1 {
            if let Some(surface) = info.surface_size {
                return Ok(clamp(info.header_size + surface, bound));
            }
            tracing::debug!(
                "No surface size for DDS format {:?}/{:?}; scanning for the next payload",
                info.d3d_format,
                info.dxgi_format
            );
        }
        // Mip chains are not sized from the header; the next payload starts
        // at the next DDS magic
        let next = data[DDS_MAGIC.len()..]
            .windows(DDS_MAGIC.len())
            .position(|w| w == DDS_MAGIC)
            .map_or(bound, |pos| pos + DDS_MAGIC.len());
        return Ok(next);
    }

    if let Some(size) = indexed_size(format) {
        return Ok(clamp(size, bound));
    }

    tracing::debug!(
        "Cannot size {:?} payload from its contents; using {} bytes up to the next bound",
        format.pixel_format,
        bound
    );
    Ok(bound)
}

fn clamp(size: usize, bound: usize) -> usize {
    if size > bound {
        tracing::warn!("Inferred texture size {size} exceeds available {bound} bytes; clamping");
        bound
    } else {
        size
    }
}
