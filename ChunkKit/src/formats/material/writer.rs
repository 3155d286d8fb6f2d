//! Material package serialization
//!
//! The tree is flattened depth-first: each material's substances occupy a
//! contiguous run of the substance table and of the substance reference
//! table, and the same holds for each substance's textures and palettes.

use super::types::{MaterialPackage, Palette, Texture};
use super::{
    DATA_ALIGNMENT, MaterialHeader, PALETTE_RECORD_SIZE, REFERENCE_SIZE, TEXTURE_RECORD_SIZE,
    check_version, magic_for,
};
use crate::error::{Error, Result};
use crate::formats::common::{ByteWriter, Platform, to_u32};

/// A run of consecutive records, as written into a parent record.
#[derive(Clone, Copy)]
struct Run {
    start: usize,
    count: usize,
}

impl Run {
    /// Offset of the first record, or 0 for an empty run.
    fn offset(self, table_offset: usize, record_size: usize) -> usize {
        if self.count == 0 {
            0
        } else {
            table_offset + self.start * record_size
        }
    }
}

struct FlatSubstance {
    flags: u32,
    mode: u16,
    kind: u16,
    textures: Run,
    palettes: Run,
}

struct FlatMaterial {
    flags: u32,
    anim_speed: f32,
    substances: Run,
}

/// The package tree flattened into record tables.
#[derive(Default)]
struct Flattened<'a> {
    materials: Vec<FlatMaterial>,
    substances: Vec<FlatSubstance>,
    textures: Vec<&'a Texture>,
    palettes: Vec<&'a Palette>,
}

impl<'a> Flattened<'a> {
    fn new(package: &'a MaterialPackage) -> Self {
        let mut flat = Self::default();
        for material in &package.materials {
            let substances = Run {
                start: flat.substances.len(),
                count: material.substances.len(),
            };
            for substance in &material.substances {
                let textures = Run {
                    start: flat.textures.len(),
                    count: substance.textures.len(),
                };
                flat.textures.extend(&substance.textures);
                let palettes = Run {
                    start: flat.palettes.len(),
                    count: substance.palettes.len(),
                };
                flat.palettes.extend(&substance.palettes);
                flat.substances.push(FlatSubstance {
                    flags: substance.flags,
                    mode: substance.mode,
                    kind: substance.kind,
                    textures,
                    palettes,
                });
            }
            flat.materials.push(FlatMaterial {
                flags: material.flags,
                anim_speed: material.anim_speed,
                substances,
            });
        }
        flat
    }
}

/// Serialize a material package.
///
/// # Errors
/// - [`Error::UnsupportedVersion`] for versions other than 1 and 2
/// - [`Error::UnimplementedFormat`] for palettes on a platform without them
/// - [`Error::SizeMismatch`] for counts that do not fit the PS2 header, and
///   for palettes whose data is not a whole number of entries
pub fn serialize_material_package(package: &MaterialPackage) -> Result<Vec<u8>> {
    check_version(package.version)?;
    let platform = package.platform;
    let flat = Flattened::new(package);

    if !platform.has_palettes() && !flat.palettes.is_empty() {
        return Err(Error::unimplemented(format!("palettes in a {platform} material package")));
    }

    for palette in &flat.palettes {
        check_palette(palette)?;
    }

    // Data block: texture payloads, then palette payloads, each 16-aligned
    let mut block = ByteWriter::new();
    let mut texture_offsets = Vec::with_capacity(flat.textures.len());
    for texture in &flat.textures {
        if texture.data.is_empty() {
            texture_offsets.push(None);
            continue;
        }
        block.align(DATA_ALIGNMENT, 0);
        texture_offsets.push(Some(block.position()));
        block.write_bytes(&texture.data);
    }
    let mut palette_offsets = Vec::with_capacity(flat.palettes.len());
    for palette in &flat.palettes {
        block.align(DATA_ALIGNMENT, 0);
        palette_offsets.push(block.position());
        block.write_bytes(&palette.data);
    }
    block.align(DATA_ALIGNMENT, 0);
    let block = block.into_inner();
    // Empty payloads sit at the end of the block so there is nothing to infer
    let texture_offsets: Vec<usize> = texture_offsets
        .into_iter()
        .map(|offset| offset.unwrap_or(block.len()))
        .collect();

    let counts = [
        flat.materials.len(),
        flat.substances.len(),
        flat.substances.len(),
        flat.textures.len(),
        flat.textures.len(),
        flat.palettes.len(),
    ];
    let header = MaterialHeader::canonical(platform, package.version, package.uid, counts, block.len());
    let substance_size = MaterialHeader::substance_record_size(platform);

    let mut writer = ByteWriter::with_endian(platform.endian());
    write_header(&mut writer, &header, counts)?;

    // Materials
    for material in &flat.materials {
        writer.write_u32(to_u32(
            material.substances.offset(header.substance_refs.offset, REFERENCE_SIZE),
            "substance reference offset",
        )?);
        writer.write_u32(to_u32(material.substances.count, "substance count")?);
        writer.write_u32(material.flags);
        writer.write_f32(material.anim_speed);
    }

    // Substance references, one per substance in table order
    for index in 0..flat.substances.len() {
        writer.write_u32(to_u32(header.substances.offset + index * substance_size, "substance offset")?);
    }

    // Substances
    for substance in &flat.substances {
        writer.write_u32(substance.flags);
        writer.write_u16(substance.mode);
        writer.write_u16(substance.kind);
        writer.write_u32(to_u32(
            substance.textures.offset(header.texture_refs.offset, REFERENCE_SIZE),
            "texture reference offset",
        )?);
        writer.write_u32(to_u32(substance.textures.count, "texture count")?);
        if platform.has_palettes() {
            writer.write_u32(to_u32(
                substance.palettes.offset(header.palettes.offset, PALETTE_RECORD_SIZE),
                "palette offset",
            )?);
            writer.write_u32(to_u32(substance.palettes.count, "palette count")?);
        }
    }

    // Texture references
    for index in 0..flat.textures.len() {
        writer.write_u32(to_u32(header.textures.offset + index * TEXTURE_RECORD_SIZE, "texture offset")?);
    }

    // Textures
    for (texture, &offset) in flat.textures.iter().zip(&texture_offsets) {
        writer.write_u32(texture.uid);
        writer.write_u32(texture.hash);
        writer.write_u32(to_u32(offset, "texture data offset")?);
        writer.write_u32(to_u32(texture.data.len(), "texture data size")?);
        writer.write_u32(texture.format.packed());
        writer.write_u32(texture.unknown);
    }

    // Palettes
    for (palette, &offset) in flat.palettes.iter().zip(&palette_offsets) {
        writer.write_u32(to_u32(offset, "palette data offset")?);
        writer.write_u32(to_u32(palette.entry_count(), "palette entry count")?);
        writer.write_u16(palette.bytes_per_entry);
        writer.write_u16(palette.flags);
    }

    writer.pad_to(header.data_offset, 0);
    writer.write_bytes(&block);

    tracing::debug!(
        "Serialized {} material package {:#x}: {} bytes",
        platform,
        package.uid,
        writer.position()
    );
    Ok(writer.into_inner())
}

/// Palettes must hold whole entries, or the stored entry count would drop bytes.
fn check_palette(palette: &Palette) -> Result<()> {
    let bytes_per_entry = usize::from(palette.bytes_per_entry);
    if bytes_per_entry == 0 {
        return Err(Error::size_mismatch("palette bytes per entry", 4, 0));
    }
    if palette.data.len() % bytes_per_entry != 0 {
        return Err(Error::size_mismatch(
            "palette data",
            palette.entry_count() * bytes_per_entry,
            palette.data.len(),
        ));
    }
    Ok(())
}

fn write_header(writer: &mut ByteWriter, header: &MaterialHeader, counts: [usize; 6]) -> Result<()> {
    writer.write_bytes(&magic_for(header.platform));
    writer.write_u32(header.version);
    writer.write_u32(header.uid);

    if header.platform == Platform::Ps2 {
        for count in counts {
            let count = u16::try_from(count)
                .map_err(|_| Error::size_mismatch("PS2 material table count", usize::from(u16::MAX), count))?;
            writer.write_u16(count);
        }
        writer.write_u32(to_u32(header.data_size, "material data size")?);
        writer.write_u32(0);
        return Ok(());
    }

    let mut tables = vec![
        header.materials,
        header.substance_refs,
        header.substances,
        header.texture_refs,
        header.textures,
    ];
    if header.platform.has_palettes() {
        tables.push(header.palettes);
    }
    for table in tables {
        writer.write_u32(to_u32(table.count, "material table count")?);
        writer.write_u32(to_u32(table.offset, "material table offset")?);
    }
    writer.write_u32(to_u32(header.data_offset, "material data offset")?);
    writer.write_u32(to_u32(header.data_size, "material data size")?);
    writer.write_u32(0);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::material::types::{Material, PixelFormat, Substance, TextureFormat};
    use crate::formats::material::{parse_material_package, parse_material_package_with};
    use crate::options::ReadOptions;
    use pretty_assertions::assert_eq;

    fn texture(uid: u32, len: usize) -> Texture {
        Texture {
            uid,
            hash: uid.wrapping_mul(31),
            format: TextureFormat {
                pixel_format: PixelFormat::Indexed8,
                width_log2: 2,
                height_log2: 2,
                mip_count: 1,
                flags: 0,
            },
            unknown: 0,
            data: vec![uid as u8; len],
        }
    }

    fn package(platform: Platform) -> MaterialPackage {
        let palettes = if platform.has_palettes() {
            vec![Palette {
                bytes_per_entry: 4,
                flags: 1,
                data: vec![0x7F; 1024],
            }]
        } else {
            Vec::new()
        };
        let mut package = MaterialPackage::new(platform, 0x4242);
        package.materials = vec![
            Material {
                flags: 1,
                anim_speed: 0.5,
                substances: vec![
                    Substance {
                        flags: 2,
                        mode: 1,
                        kind: 3,
                        textures: vec![texture(1, 16), texture(2, 20)],
                        palettes,
                    },
                    Substance::default(),
                ],
            },
            Material::default(),
            Material {
                flags: 9,
                anim_speed: 0.0,
                substances: vec![Substance {
                    textures: vec![texture(3, 5)],
                    ..Substance::default()
                }],
            },
        ];
        package
    }

    #[test]
    fn test_round_trip_every_platform() {
        for platform in [Platform::Pc, Platform::Xbox, Platform::Ps2, Platform::Wii] {
            let original = package(platform);
            let bytes = serialize_material_package(&original).unwrap();
            let parsed = parse_material_package_with(&bytes, &ReadOptions::strict()).unwrap();
            assert_eq!(parsed, original, "{platform}");
            assert_eq!(serialize_material_package(&parsed).unwrap(), bytes);
        }
    }

    #[test]
    fn test_palettes_rejected_on_pc() {
        let mut original = package(Platform::Wii);
        original.platform = Platform::Pc;
        assert!(matches!(
            serialize_material_package(&original),
            Err(Error::UnimplementedFormat { .. })
        ));
    }

    #[test]
    fn test_duplicate_texture_claims() {
        // Point the second texture reference at the first texture
        let bytes = serialize_material_package(&package(Platform::Pc)).unwrap();
        let header = MaterialHeader::canonical(Platform::Pc, 2, 0, [3, 3, 3, 3, 3, 0], 0);
        let mut patched = bytes.clone();
        let second_ref = header.texture_refs.offset + REFERENCE_SIZE;
        let first_texture = (header.textures.offset as u32).to_le_bytes();
        patched[second_ref..second_ref + 4].copy_from_slice(&first_texture);

        assert!(matches!(
            parse_material_package_with(&patched, &ReadOptions::strict()),
            Err(Error::DuplicateReference { kind: "texture", index: 0 })
        ));

        // Lenient: duplicated into both slots, the orphan is dropped
        let lenient = parse_material_package(&patched).unwrap();
        let uids: Vec<u32> = lenient.materials[0].textures().map(|t| t.uid).collect();
        assert_eq!(uids, vec![1, 1]);
    }

    #[test]
    fn test_empty_texture_payloads_round_trip() {
        for platform in [Platform::Pc, Platform::Wii] {
            let mut original = MaterialPackage::new(platform, 0x51);
            original.materials = vec![Material {
                substances: vec![Substance {
                    textures: vec![texture(1, 0), texture(2, 16), texture(3, 0)],
                    ..Substance::default()
                }],
                ..Material::default()
            }];
            let bytes = serialize_material_package(&original).unwrap();

            let parsed = parse_material_package_with(&bytes, &ReadOptions::strict()).unwrap();
            let lens: Vec<usize> = parsed.materials[0].textures().map(|t| t.data.len()).collect();
            assert_eq!(lens, vec![0, 16, 0], "{platform}");
            assert_eq!(parsed, original, "{platform}");
            assert_eq!(serialize_material_package(&parsed).unwrap(), bytes);
        }
    }

    #[test]
    fn test_partial_palette_entries_rejected() {
        let mut original = package(Platform::Wii);
        original.materials[0].substances[0].palettes[0].data = vec![1, 2, 3, 4, 5, 6];
        assert!(matches!(
            serialize_material_package(&original),
            Err(Error::SizeMismatch { expected: 4, actual: 6, .. })
        ));

        original.materials[0].substances[0].palettes[0] = Palette {
            bytes_per_entry: 0,
            flags: 0,
            data: vec![1, 2, 3, 4],
        };
        assert!(matches!(
            serialize_material_package(&original),
            Err(Error::SizeMismatch { actual: 0, .. })
        ));
    }
}
