//! Model package parsing
//!
//! Records are decoded leaves first so every offset can be resolved against
//! a table that is already indexed: submodels, lod instances, models, then
//! the vertex and index buffers and the embedded material package.

use glam::Vec4;

use super::profile::{FormatProfile, magic};
use super::types::{LOD_COUNT, Lod, LodInstance, Model, ModelPackage, SubModel};
use super::vertex::{VertexLayout, decode_indices, decode_vertices};
use crate::error::{Error, Result};
use crate::formats::common::{ByteReader, OffsetIndex, Platform, Table};
use crate::formats::material::{
    MaterialHandle, MaterialPackage, data_block_offset, parse_material_package_with,
};
use crate::options::ReadOptions;

/// Bytes of a submodel record before its reserved tail
const SUB_MODEL_FIELDS_SIZE: usize = 0x20;
/// Bytes of a lod instance record before its reserved tail
const LOD_INSTANCE_FIELDS_SIZE: usize = 0x4C;

/// Parse a model package with default (lenient) options.
pub fn parse_model_package(data: &[u8]) -> Result<ModelPackage> {
    parse_model_package_with(data, &ReadOptions::default())
}

/// Parse a model package.
///
/// # Errors
///
/// - [`Error::BadMagic`] for an unknown platform tag
/// - [`Error::UnsupportedVersion`] / [`Error::UnimplementedFormat`] for
///   platform and version combinations without a profile
/// - [`Error::DanglingReference`] for unresolved offsets in strict mode
/// - [`Error::UnexpectedEof`] for tables or buffers past the end of `data`
pub fn parse_model_package_with(data: &[u8], options: &ReadOptions) -> Result<ModelPackage> {
    let mut reader = ByteReader::new(data);
    let found = reader.read_magic()?;
    let platform = FormatProfile::platform_from_magic(found).ok_or(Error::BadMagic {
        offset: 0,
        expected: magic::PC,
        found,
    })?;
    reader.set_endian(platform.endian());

    let version = reader.read_u32()?;
    let mut profile = FormatProfile::lookup(platform, version)?;
    let header = Header::read(&mut reader)?;

    // Submodels
    if platform == Platform::Xbox && header.sub_models.count > 0 {
        reader.seek(header.sub_models.offset)?;
        // Compact records mark the high half of the first primitive field;
        // the first record decides for the whole table
        let compact = reader.peek_u32()? >> 16 == 0xFFFF;
        profile = profile.with_compact_sub_models(compact)?;
    }
    let sub_model_size = profile.stored_sub_model_size();
    reader.seek(header.sub_models.offset)?;
    let mut sub_models = Vec::with_capacity(header.sub_models.count.min(reader.remaining()));
    for _ in 0..header.sub_models.count {
        sub_models.push(read_sub_model(&mut reader, sub_model_size, profile.compact_sub_models)?);
    }
    let sub_model_index =
        OffsetIndex::for_table("submodel", header.sub_models.offset, sub_model_size, sub_models.len());

    // Lod instances
    reader.seek(header.lod_instances.offset)?;
    let mut lod_instances = Vec::with_capacity(header.lod_instances.count.min(reader.remaining()));
    for _ in 0..header.lod_instances.count {
        let raw = read_lod_instance(&mut reader, profile.lod_instance_record_size)?;
        lod_instances.push(LodInstance {
            transform: raw.transform,
            use_transform: raw.use_transform,
            sub_models: sub_model_index.resolve_run(raw.sub_models.offset, raw.sub_models.count, options)?,
            unknown: raw.unknown,
        });
    }
    let lod_instance_index = OffsetIndex::for_table(
        "lod instance",
        header.lod_instances.offset,
        profile.lod_instance_record_size,
        lod_instances.len(),
    );

    // Models
    reader.seek(header.models.offset)?;
    let mut models = Vec::with_capacity(header.models.count.min(reader.remaining()));
    for _ in 0..header.models.count {
        models.push(read_model(&mut reader, &profile, &lod_instance_index, options)?);
    }

    // Vertex buffers
    reader.seek(header.vertex_decls.offset)?;
    let mut vertex_buffers = Vec::with_capacity(header.vertex_decls.count.min(reader.remaining()));
    for _ in 0..header.vertex_decls.count {
        let layout = VertexLayout::from_id(reader.read_u32()?)?;
        let count = reader.read_u32()? as usize;
        let stride = reader.read_u32()? as usize;
        let offset = reader.read_u32()? as usize;
        let size = count.saturating_mul(stride);
        let end = offset.saturating_add(size).min(data.len());
        let raw = data.get(offset..end).ok_or(Error::UnexpectedEof { offset, needed: size })?;
        vertex_buffers.push(decode_vertices(raw, layout, count, stride, platform, platform.endian())?);
    }

    // Indices
    let index_data = data.get(header.indices.offset..).ok_or(Error::UnexpectedEof {
        offset: header.indices.offset,
        needed: header.indices.count * 2,
    })?;
    let index_buffer = decode_indices(index_data, header.indices.count, platform.endian())?;

    let materials = read_materials(data, &header, platform, options)?;

    let flags = if version >= 6 {
        header.flags
    } else {
        if header.flags != 0 {
            tracing::debug!("Non-zero reserved header word {:#x} in v1 package", header.flags);
        }
        0
    };

    let package = ModelPackage {
        profile,
        uid: header.uid,
        flags,
        models,
        lod_instances,
        sub_models,
        vertex_buffers,
        index_buffer,
        materials,
    };
    check_consistency(&package, options)?;

    tracing::debug!(
        "Parsed {} v{} model package {:#x}: {} models, {} submodels, {} vertex buffers, {} indices",
        platform,
        version,
        package.uid,
        package.models.len(),
        package.sub_models.len(),
        package.vertex_buffers.len(),
        package.index_buffer.len()
    );
    Ok(package)
}

/// Header fields after the magic and version.
struct Header {
    uid: u32,
    models: Table,
    lod_instances: Table,
    sub_models: Table,
    vertex_decls: Table,
    indices: Table,
    material_offset: usize,
    texture_data_offset: usize,
    flags: u32,
}

impl Header {
    fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let uid = reader.read_u32()?;
        let mut table = || -> Result<Table> {
            let count = reader.read_u32()? as usize;
            let offset = reader.read_u32()? as usize;
            Ok(Table { count, offset })
        };
        let models = table()?;
        let lod_instances = table()?;
        let sub_models = table()?;
        let vertex_decls = table()?;
        let indices = table()?;
        Ok(Self {
            uid,
            models,
            lod_instances,
            sub_models,
            vertex_decls,
            indices,
            material_offset: reader.read_u32()? as usize,
            texture_data_offset: reader.read_u32()? as usize,
            flags: reader.read_u32()?,
        })
    }
}

/// Skip a record's reserved tail, noting anything that is not zero.
fn skip_reserved(reader: &mut ByteReader<'_>, len: usize, what: &str) -> Result<()> {
    let start = reader.position();
    let reserved = reader.read_bytes(len)?;
    if reserved.iter().any(|&b| b != 0) {
        tracing::debug!("Non-zero reserved bytes in {} at {:#x}", what, start);
    }
    Ok(())
}

fn read_sub_model(reader: &mut ByteReader<'_>, record_size: usize, compact: bool) -> Result<SubModel> {
    let primitive = reader.read_u32()?;
    let sub_model = SubModel {
        primitive: if compact { primitive & 0xFFFF } else { primitive },
        vertex_base: reader.read_u32()?,
        vertex_offset: reader.read_u32()?,
        vertex_count: reader.read_u32()?,
        index_offset: reader.read_u32()?,
        index_count: reader.read_u32()?,
        material: {
            let index = reader.read_u16()?;
            let owner = reader.read_u16()?;
            MaterialHandle::new(owner, index)
        },
        flags: reader.read_u32()?,
    };
    skip_reserved(reader, record_size - SUB_MODEL_FIELDS_SIZE, "submodel")?;
    Ok(sub_model)
}

struct RawLodInstance {
    transform: [Vec4; 4],
    sub_models: Table,
    use_transform: bool,
    unknown: u32,
}

fn read_lod_instance(reader: &mut ByteReader<'_>, record_size: usize) -> Result<RawLodInstance> {
    let transform = [
        reader.read_vec4()?,
        reader.read_vec4()?,
        reader.read_vec4()?,
        reader.read_vec4()?,
    ];
    let offset = reader.read_u32()? as usize;
    let count = usize::from(reader.read_u16()?);
    let use_transform = reader.read_u16()? != 0;
    let unknown = reader.read_u32()?;
    skip_reserved(reader, record_size - LOD_INSTANCE_FIELDS_SIZE, "lod instance")?;
    Ok(RawLodInstance {
        transform,
        sub_models: Table { count, offset },
        use_transform,
        unknown,
    })
}

fn read_model(
    reader: &mut ByteReader<'_>,
    profile: &FormatProfile,
    lod_instances: &OffsetIndex,
    options: &ReadOptions,
) -> Result<Model> {
    let uid = reader.read_u32()?;
    let handle = reader.read_u32()?;
    let layout = reader.read_u16()?;
    let vertex_buffer = reader.read_u16()?;
    let flags = reader.read_u32()?;
    let scale = reader.read_vec4()?;
    let mut bounds = Vec::with_capacity(profile.bounds_count);
    for _ in 0..profile.bounds_count {
        bounds.push(reader.read_vec4()?);
    }

    let mut lods: [Lod; LOD_COUNT] = Default::default();
    for lod in &mut lods {
        let offset = reader.read_u32()? as usize;
        let count = reader.read_u32()? as usize;
        lod.mask = reader.read_u32()?;
        lod.instances = lod_instances.resolve_run(offset, count, options)?;
    }

    Ok(Model {
        uid,
        handle,
        layout,
        vertex_buffer,
        flags,
        scale,
        bounds,
        lods,
    })
}

fn read_materials(
    data: &[u8],
    header: &Header,
    platform: Platform,
    options: &ReadOptions,
) -> Result<Option<MaterialPackage>> {
    if header.material_offset == 0 {
        return Ok(None);
    }
    let material_data = data.get(header.material_offset..).ok_or(Error::UnexpectedEof {
        offset: header.material_offset,
        needed: 0,
    })?;
    let materials = parse_material_package_with(material_data, options)?;

    if materials.platform != platform {
        tracing::warn!(
            "{} model package embeds a {} material package",
            platform,
            materials.platform
        );
    }
    let expected = header.material_offset + data_block_offset(material_data)?;
    if header.texture_data_offset != expected {
        tracing::warn!(
            "Texture data offset {:#x} disagrees with material header ({:#x})",
            header.texture_data_offset,
            expected
        );
    }
    Ok(Some(materials))
}

/// Invariant checks on a freshly decoded package.
///
/// Original game data is allowed some slack: layout mismatches are only
/// logged, and range violations are fatal only for strict reads.
fn check_consistency(package: &ModelPackage, options: &ReadOptions) -> Result<()> {
    for (i, model) in package.models.iter().enumerate() {
        let buffer = package.vertex_buffers.get(usize::from(model.vertex_buffer));
        if let Some(buffer) = buffer.filter(|b| u32::from(model.layout) != b.layout.id()) {
            tracing::warn!(
                "Model {} (uid {:#x}) expects vertex layout {} but buffer {} holds {:?}",
                i,
                model.uid,
                model.layout,
                model.vertex_buffer,
                buffer.layout
            );
        }
    }

    if let Err(err) = package.validate() {
        if options.is_strict() {
            return Err(err);
        }
        tracing::warn!("Model package {:#x} failed validation: {}", package.uid, err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(magic: &[u8; 4], version: u32) -> Vec<u8> {
        let mut data = magic.to_vec();
        data.extend_from_slice(&version.to_le_bytes());
        data.resize(0x40, 0);
        data
    }

    #[test]
    fn test_bad_magic() {
        assert!(matches!(
            parse_model_package(&header(b"XXXX", 6)),
            Err(Error::BadMagic { .. })
        ));
    }

    #[test]
    fn test_ps2_is_unimplemented() {
        assert!(matches!(
            parse_model_package(&header(b"MDP2", 6)),
            Err(Error::UnimplementedFormat { .. })
        ));
    }

    #[test]
    fn test_unknown_version() {
        assert!(matches!(
            parse_model_package(&header(b"MDPC", 3)),
            Err(Error::UnsupportedVersion { version: 3, .. })
        ));
    }

    #[test]
    fn test_empty_package_with_zero_offsets() {
        let package = parse_model_package_with(&header(b"MDPC", 1), &ReadOptions::strict()).unwrap();
        assert!(package.models.is_empty());
        assert!(package.materials.is_none());
        assert_eq!(package.profile.bounds_count, 2);
    }
}
