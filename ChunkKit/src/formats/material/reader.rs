//! Material package parsing
//!
//! Tables are decoded bottom-up so every reference can be resolved against
//! a table that has already been read: textures, texture references,
//! palettes, substances, substance references, then materials.

use std::ops::Range;

use super::texture::infer_texture_size;
use super::types::{Material, MaterialPackage, Palette, Substance, Texture, TextureFormat};
use super::{
    MaterialHeader, PALETTE_RECORD_SIZE, REFERENCE_SIZE, TEXTURE_RECORD_SIZE, Table,
    check_version, magic, platform_from_magic,
};
use crate::error::{Error, Result};
use crate::formats::common::{ByteReader, OffsetIndex, Platform};
use crate::options::ReadOptions;

/// Parse a material package with default (lenient) options.
pub fn parse_material_package(data: &[u8]) -> Result<MaterialPackage> {
    parse_material_package_with(data, &ReadOptions::default())
}

/// Parse a material package.
///
/// # Errors
///
/// - [`Error::BadMagic`] for an unknown platform tag
/// - [`Error::UnsupportedVersion`] for versions other than 1 and 2
/// - [`Error::DanglingReference`], [`Error::DuplicateReference`] and
///   [`Error::UnreferencedRecord`] for broken ownership in strict mode
pub fn parse_material_package_with(data: &[u8], options: &ReadOptions) -> Result<MaterialPackage> {
    let header = read_header(data)?;
    let endian = header.platform.endian();

    let data_end = header
        .data_offset
        .checked_add(header.data_size)
        .filter(|&end| end <= data.len())
        .ok_or(Error::UnexpectedEof {
            offset: header.data_offset,
            needed: header.data_size,
        })?;
    let block = &data[header.data_offset..data_end];

    let mut reader = ByteReader::with_endian(data, endian);

    // Textures
    let raw_textures = read_table(&mut reader, header.textures, RawTexture::read)?;
    let textures = load_texture_payloads(&raw_textures, block, options)?;
    let texture_index =
        OffsetIndex::for_table("texture", header.textures.offset, TEXTURE_RECORD_SIZE, textures.len());

    // Texture reference table
    let texture_refs = read_references(&mut reader, header.texture_refs, &texture_index, options)?;
    let texture_ref_index = OffsetIndex::for_table(
        "texture reference",
        header.texture_refs.offset,
        REFERENCE_SIZE,
        texture_refs.len(),
    );

    // Palettes
    let raw_palettes = read_table(&mut reader, header.palettes, RawPalette::read)?;
    let palettes = raw_palettes
        .iter()
        .map(|raw| raw.load(block))
        .collect::<Result<Vec<_>>>()?;
    let palette_index =
        OffsetIndex::for_table("palette", header.palettes.offset, PALETTE_RECORD_SIZE, palettes.len());

    // Substances
    let has_palettes = header.platform.has_palettes();
    let raw_substances = read_table(&mut reader, header.substances, |r| RawSubstance::read(r, has_palettes))?;
    let substance_size = MaterialHeader::substance_record_size(header.platform);
    let substance_index =
        OffsetIndex::for_table("substance", header.substances.offset, substance_size, raw_substances.len());

    let mut texture_claims = Claims::new("texture", textures.len());
    let mut palette_claims = Claims::new("palette", palettes.len());
    let mut substances = Vec::with_capacity(raw_substances.len());
    for raw in &raw_substances {
        let refs = texture_ref_index.resolve_run(raw.texture_refs.offset, raw.texture_refs.count, options)?;
        let texture_ids = &texture_refs[refs];
        texture_claims.claim_all(texture_ids.iter().copied(), options)?;

        let palette_run = palette_index.resolve_run(raw.palettes.offset, raw.palettes.count, options)?;
        palette_claims.claim_all(palette_run.clone(), options)?;

        substances.push(Substance {
            flags: raw.flags,
            mode: raw.mode,
            kind: raw.kind,
            textures: texture_ids.iter().map(|&t| textures[t].clone()).collect(),
            palettes: palettes[palette_run].to_vec(),
        });
    }
    texture_claims.check_unreferenced(options)?;
    palette_claims.check_unreferenced(options)?;

    // Substance reference table
    let substance_refs = read_references(&mut reader, header.substance_refs, &substance_index, options)?;
    let substance_ref_index = OffsetIndex::for_table(
        "substance reference",
        header.substance_refs.offset,
        REFERENCE_SIZE,
        substance_refs.len(),
    );

    // Materials
    let raw_materials = read_table(&mut reader, header.materials, RawMaterial::read)?;
    let mut substance_claims = Claims::new("substance", substances.len());
    let mut materials = Vec::with_capacity(raw_materials.len());
    for raw in &raw_materials {
        let refs = substance_ref_index.resolve_run(raw.substance_refs.offset, raw.substance_refs.count, options)?;
        let substance_ids = &substance_refs[refs];
        substance_claims.claim_all(substance_ids.iter().copied(), options)?;

        materials.push(Material {
            flags: raw.flags,
            anim_speed: raw.anim_speed,
            substances: substance_ids.iter().map(|&s| substances[s].clone()).collect(),
        });
    }
    substance_claims.check_unreferenced(options)?;

    tracing::debug!(
        "Parsed {} material package {:#x}: {} materials, {} substances, {} textures, {} palettes",
        header.platform,
        header.uid,
        materials.len(),
        substances.len(),
        textures.len(),
        palettes.len()
    );

    Ok(MaterialPackage {
        platform: header.platform,
        version: header.version,
        uid: header.uid,
        materials,
    })
}

/// Offset of the data block from the package base.
pub(crate) fn data_block_offset(data: &[u8]) -> Result<usize> {
    read_header(data).map(|header| header.data_offset)
}

fn read_header(data: &[u8]) -> Result<MaterialHeader> {
    let mut reader = ByteReader::new(data);
    let found = reader.read_magic()?;
    let platform = platform_from_magic(found).ok_or(Error::BadMagic {
        offset: 0,
        expected: magic::PC,
        found,
    })?;
    reader.set_endian(platform.endian());

    let version = reader.read_u32()?;
    check_version(version)?;
    let uid = reader.read_u32()?;

    if platform == Platform::Ps2 {
        let mut counts = [0usize; 6];
        for count in &mut counts {
            *count = reader.read_u16()? as usize;
        }
        let data_size = reader.read_u32()? as usize;
        return Ok(MaterialHeader::canonical(platform, version, uid, counts, data_size));
    }

    let mut table = || -> Result<Table> {
        let count = reader.read_u32()? as usize;
        let offset = reader.read_u32()? as usize;
        Ok(Table { count, offset })
    };
    let materials = table()?;
    let substance_refs = table()?;
    let substances = table()?;
    let texture_refs = table()?;
    let textures = table()?;
    let palettes = if platform.has_palettes() {
        table()?
    } else {
        Table::default()
    };
    let data_offset = reader.read_u32()? as usize;
    let data_size = reader.read_u32()? as usize;

    Ok(MaterialHeader {
        platform,
        version,
        uid,
        materials,
        substance_refs,
        substances,
        texture_refs,
        textures,
        palettes,
        data_offset,
        data_size,
    })
}

fn read_table<'a, T>(
    reader: &mut ByteReader<'a>,
    table: Table,
    mut read: impl FnMut(&mut ByteReader<'a>) -> Result<T>,
) -> Result<Vec<T>> {
    reader.seek(table.offset)?;
    let mut out = Vec::with_capacity(table.count.min(reader.remaining()));
    for _ in 0..table.count {
        out.push(read(reader)?);
    }
    Ok(out)
}

/// Read a reference table and resolve each entry to a record index.
fn read_references(
    reader: &mut ByteReader<'_>,
    table: Table,
    targets: &OffsetIndex,
    options: &ReadOptions,
) -> Result<Vec<usize>> {
    let offsets = read_table(reader, table, |r| r.read_u32())?;
    offsets
        .into_iter()
        .map(|offset| targets.resolve(offset as usize, options))
        .collect()
}

fn load_texture_payloads(raw: &[RawTexture], block: &[u8], options: &ReadOptions) -> Result<Vec<Texture>> {
    let mut starts: Vec<usize> = raw.iter().map(|t| t.data_offset).collect();
    starts.sort_unstable();
    starts.dedup();

    raw.iter()
        .map(|texture| {
            let range = texture.payload_range(block, &starts, options)?;
            Ok(Texture {
                uid: texture.uid,
                hash: texture.hash,
                format: texture.format,
                unknown: texture.unknown,
                data: block[range].to_vec(),
            })
        })
        .collect()
}

/// Tracks how many parents claim each record of one table.
struct Claims {
    kind: &'static str,
    counts: Vec<usize>,
}

impl Claims {
    fn new(kind: &'static str, len: usize) -> Self {
        Self {
            kind,
            counts: vec![0; len],
        }
    }

    fn claim_all(&mut self, indices: impl IntoIterator<Item = usize>, options: &ReadOptions) -> Result<()> {
        for index in indices {
            self.counts[index] += 1;
            if self.counts[index] == 2 {
                if options.is_strict() {
                    return Err(Error::DuplicateReference {
                        kind: self.kind,
                        index,
                    });
                }
                tracing::warn!("{} {} has more than one parent; duplicating it", self.kind, index);
            }
        }
        Ok(())
    }

    fn check_unreferenced(&self, options: &ReadOptions) -> Result<()> {
        for (index, _) in self.counts.iter().enumerate().filter(|(_, c)| **c == 0) {
            if options.is_strict() {
                return Err(Error::UnreferencedRecord {
                    kind: self.kind,
                    index,
                });
            }
            tracing::warn!("{} {} is not referenced by any parent; dropping it", self.kind, index);
        }
        Ok(())
    }
}

struct RawTexture {
    uid: u32,
    hash: u32,
    data_offset: usize,
    data_size: usize,
    format: TextureFormat,
    unknown: u32,
}

impl RawTexture {
    fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            uid: reader.read_u32()?,
            hash: reader.read_u32()?,
            data_offset: reader.read_u32()? as usize,
            data_size: reader.read_u32()? as usize,
            format: TextureFormat::from_packed(reader.read_u32()?),
            unknown: reader.read_u32()?,
        })
    }

    /// Payload range inside the data block.
    ///
    /// `starts` holds the sorted payload offsets of every texture and bounds
    /// size inference together with the end of the block.
    fn payload_range(&self, block: &[u8], starts: &[usize], options: &ReadOptions) -> Result<Range<usize>> {
        let start = self.data_offset;
        if start > block.len() {
            return Err(Error::UnexpectedEof {
                offset: start,
                needed: self.data_size,
            });
        }

        if self.data_size != 0 {
            let end = start + self.data_size;
            if end > block.len() {
                return Err(Error::size_mismatch(
                    format!("texture {:#x} payload", self.uid),
                    block.len() - start,
                    self.data_size,
                ));
            }
            return Ok(start..end);
        }

        let bound = starts
            .iter()
            .copied()
            .find(|&s| s > start)
            .unwrap_or(block.len())
            .min(block.len());
        if bound == start {
            return Ok(start..start);
        }
        let size = if options.infer_texture_sizes {
            infer_texture_size(&block[start..bound], self.format)?
        } else {
            bound - start
        };
        tracing::debug!("Texture {:#x}: inferred payload size {}", self.uid, size);
        Ok(start..start + size)
    }
}

struct RawPalette {
    data_offset: usize,
    entry_count: usize,
    bytes_per_entry: u16,
    flags: u16,
}

impl RawPalette {
    fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            data_offset: reader.read_u32()? as usize,
            entry_count: reader.read_u32()? as usize,
            bytes_per_entry: reader.read_u16()?,
            flags: reader.read_u16()?,
        })
    }

    fn load(&self, block: &[u8]) -> Result<Palette> {
        let len = self.entry_count * usize::from(self.bytes_per_entry);
        let data = block
            .get(self.data_offset..self.data_offset + len)
            .ok_or(Error::UnexpectedEof {
                offset: self.data_offset,
                needed: len,
            })?;
        Ok(Palette {
            bytes_per_entry: self.bytes_per_entry,
            flags: self.flags,
            data: data.to_vec(),
        })
    }
}

struct RawSubstance {
    flags: u32,
    mode: u16,
    kind: u16,
    texture_refs: Table,
    palettes: Table,
}

impl RawSubstance {
    fn read(reader: &mut ByteReader<'_>, has_palettes: bool) -> Result<Self> {
        let flags = reader.read_u32()?;
        let mode = reader.read_u16()?;
        let kind = reader.read_u16()?;
        let texture_refs = Table {
            offset: reader.read_u32()? as usize,
            count: reader.read_u32()? as usize,
        };
        let palettes = if has_palettes {
            Table {
                offset: reader.read_u32()? as usize,
                count: reader.read_u32()? as usize,
            }
        } else {
            Table::default()
        };
        Ok(Self {
            flags,
            mode,
            kind,
            texture_refs,
            palettes,
        })
    }
}

struct RawMaterial {
    substance_refs: Table,
    flags: u32,
    anim_speed: f32,
}

impl RawMaterial {
    fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            substance_refs: Table {
                offset: reader.read_u32()? as usize,
                count: reader.read_u32()? as usize,
            },
            flags: reader.read_u32()?,
            anim_speed: reader.read_f32()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_magic() {
        let data = *b"NOPE\x01\x00\x00\x00";
        assert!(matches!(
            parse_material_package(&data),
            Err(Error::BadMagic { .. })
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let mut data = b"PCMP".to_vec();
        data.extend_from_slice(&3u32.to_le_bytes());
        data.resize(64, 0);
        assert!(matches!(
            parse_material_package(&data),
            Err(Error::UnsupportedVersion { version: 3, .. })
        ));
    }

    #[test]
    fn test_empty_pc_package() {
        let mut data = b"PCMP".to_vec();
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&0x55u32.to_le_bytes());
        for _ in 0..5 {
            data.extend_from_slice(&0u32.to_le_bytes());
            data.extend_from_slice(&64u32.to_le_bytes());
        }
        data.extend_from_slice(&64u32.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.resize(64, 0);

        let package = parse_material_package_with(&data, &ReadOptions::strict()).unwrap();
        assert_eq!(package.platform, Platform::Pc);
        assert_eq!(package.uid, 0x55);
        assert!(package.is_empty());
        assert_eq!(data_block_offset(&data).unwrap(), 64);
    }
}
