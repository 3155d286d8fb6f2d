//! Model package serialization
//!
//! Packages are always written in one canonical layout: header, models,
//! lod instances, submodels, vertex declarations and indices back to back,
//! then the 16-aligned vertex data and the 16-aligned material package.

use super::profile::{FormatProfile, HEADER_SIZE, VERTEX_DECL_SIZE};
use super::types::{LodInstance, Model, ModelPackage, SubModel};
use super::vertex::{encode_indices, encode_vertices};
use crate::error::{Error, Result};
use crate::formats::common::{ByteWriter, align_up, to_u32};
use crate::formats::material::{data_block_offset, serialize_material_package};

/// Alignment of vertex data and of the embedded material package
const DATA_ALIGNMENT: usize = 16;

/// Offset of the material offset word in the header
const MATERIAL_OFFSET_FIELD: usize = 0x34;
/// Offset of the texture data offset word in the header
const TEXTURE_DATA_OFFSET_FIELD: usize = 0x38;

/// Table offsets of the canonical layout.
struct Layout {
    profile: FormatProfile,
    models: usize,
    lod_instances: usize,
    sub_models: usize,
    vertex_decls: usize,
    indices: usize,
}

impl Layout {
    fn new(package: &ModelPackage, profile: FormatProfile) -> Self {
        let models = HEADER_SIZE;
        let lod_instances = models + package.models.len() * profile.model_record_size;
        let sub_models = lod_instances + package.lod_instances.len() * profile.lod_instance_record_size;
        let vertex_decls = sub_models + package.sub_models.len() * profile.stored_sub_model_size();
        let indices = vertex_decls + package.vertex_buffers.len() * VERTEX_DECL_SIZE;
        Self {
            profile,
            models,
            lod_instances,
            sub_models,
            vertex_decls,
            indices,
        }
    }

    /// Offset of the first record of a run, or 0 for an empty run.
    fn lod_instance_run(&self, run: &std::ops::Range<usize>) -> usize {
        if run.is_empty() {
            0
        } else {
            self.lod_instances + run.start * self.profile.lod_instance_record_size
        }
    }

    fn sub_model_run(&self, run: &std::ops::Range<usize>) -> usize {
        if run.is_empty() {
            0
        } else {
            self.sub_models + run.start * self.profile.stored_sub_model_size()
        }
    }
}

/// Serialize a model package.
///
/// The package is validated first; a package that would not read back
/// identically is rejected rather than written.
///
/// # Errors
/// - [`Error::DanglingReference`] / [`Error::SizeMismatch`] from validation
/// - [`Error::UnimplementedFormat`] for vertex buffers widened from packed
///   normals or stored in the wrong byte order, and for a compact submodel
///   layout with no submodels
pub fn serialize_model_package(package: &ModelPackage) -> Result<Vec<u8>> {
    let profile = canonical_profile(&package.profile)?;
    if profile.compact_sub_models && package.sub_models.is_empty() {
        return Err(Error::unimplemented(
            "compact submodel layout without a submodel record to carry its marker",
        ));
    }
    package.validate()?;

    let layout = Layout::new(package, profile);
    let mut writer = ByteWriter::with_endian(profile.endian());

    // Vertex data offsets are known once the index table size is
    let mut vertex_offsets = Vec::with_capacity(package.vertex_buffers.len());
    let mut cursor = align_up(layout.indices + package.index_buffer.len() * 2, DATA_ALIGNMENT);
    for buffer in &package.vertex_buffers {
        if buffer.endian != profile.endian() {
            return Err(Error::unimplemented(format!(
                "{:?} vertex data in a {} package",
                buffer.endian, profile.platform
            )));
        }
        vertex_offsets.push(cursor);
        cursor = align_up(cursor + buffer.data.len(), DATA_ALIGNMENT);
    }

    write_header(&mut writer, package, &layout)?;

    for model in &package.models {
        write_model(&mut writer, model, &layout)?;
    }
    for instance in &package.lod_instances {
        write_lod_instance(&mut writer, instance, &layout)?;
    }
    for sub_model in &package.sub_models {
        write_sub_model(&mut writer, sub_model, &profile);
    }
    for (buffer, &offset) in package.vertex_buffers.iter().zip(&vertex_offsets) {
        let (_, stride) = encode_vertices(buffer)?;
        writer.write_u32(buffer.layout.id());
        writer.write_u32(to_u32(buffer.count, "vertex count")?);
        writer.write_u32(to_u32(stride, "vertex stride")?);
        writer.write_u32(to_u32(offset, "vertex data offset")?);
    }
    writer.write_bytes(&encode_indices(&package.index_buffer, profile.endian()));

    for (buffer, &offset) in package.vertex_buffers.iter().zip(&vertex_offsets) {
        writer.pad_to(offset, 0);
        writer.write_bytes(encode_vertices(buffer)?.0);
    }

    if let Some(materials) = &package.materials {
        writer.align(DATA_ALIGNMENT, 0);
        let material_offset = writer.position();
        let bytes = serialize_material_package(materials)?;
        let texture_data_offset = material_offset + data_block_offset(&bytes)?;
        writer.write_bytes(&bytes);
        writer.patch_u32(MATERIAL_OFFSET_FIELD, to_u32(material_offset, "material offset")?)?;
        writer.patch_u32(
            TEXTURE_DATA_OFFSET_FIELD,
            to_u32(texture_data_offset, "texture data offset")?,
        )?;
    }

    tracing::debug!(
        "Serialized {} v{} model package {:#x} ({} bytes)",
        profile.platform,
        profile.version,
        package.uid,
        writer.position()
    );
    Ok(writer.into_inner())
}

/// Re-derive the profile so hand-built packages cannot carry bogus record sizes.
fn canonical_profile(profile: &FormatProfile) -> Result<FormatProfile> {
    let canonical = FormatProfile::lookup(profile.platform, profile.version)?
        .with_compact_sub_models(profile.compact_sub_models)?;
    if canonical != *profile {
        return Err(Error::size_mismatch(
            "model record size",
            canonical.model_record_size,
            profile.model_record_size,
        ));
    }
    Ok(canonical)
}

fn write_header(writer: &mut ByteWriter, package: &ModelPackage, layout: &Layout) -> Result<()> {
    let profile = &layout.profile;
    writer.write_bytes(&profile.magic());
    writer.write_u32(profile.version);
    writer.write_u32(package.uid);
    for (count, offset) in [
        (package.models.len(), layout.models),
        (package.lod_instances.len(), layout.lod_instances),
        (package.sub_models.len(), layout.sub_models),
        (package.vertex_buffers.len(), layout.vertex_decls),
        (package.index_buffer.len(), layout.indices),
    ] {
        writer.write_u32(to_u32(count, "record count")?);
        writer.write_u32(to_u32(offset, "table offset")?);
    }
    // Material and texture data offsets are patched once known
    writer.write_u32(0);
    writer.write_u32(0);
    writer.write_u32(if profile.version >= 6 { package.flags } else { 0 });
    Ok(())
}

fn write_model(writer: &mut ByteWriter, model: &Model, layout: &Layout) -> Result<()> {
    writer.write_u32(model.uid);
    writer.write_u32(model.handle);
    writer.write_u16(model.layout);
    writer.write_u16(model.vertex_buffer);
    writer.write_u32(model.flags);
    writer.write_vec4(model.scale);
    for &bound in &model.bounds {
        writer.write_vec4(bound);
    }
    for lod in &model.lods {
        writer.write_u32(to_u32(layout.lod_instance_run(&lod.instances), "lod instance offset")?);
        writer.write_u32(to_u32(lod.instances.len(), "lod instance count")?);
        writer.write_u32(lod.mask);
    }
    Ok(())
}

fn write_lod_instance(writer: &mut ByteWriter, instance: &LodInstance, layout: &Layout) -> Result<()> {
    let start = writer.position();
    for row in instance.transform {
        writer.write_vec4(row);
    }
    let count = instance.sub_models.len();
    let count = u16::try_from(count)
        .map_err(|_| Error::size_mismatch("lod instance submodel run", usize::from(u16::MAX), count))?;
    writer.write_u32(to_u32(layout.sub_model_run(&instance.sub_models), "submodel offset")?);
    writer.write_u16(count);
    writer.write_u16(u16::from(instance.use_transform));
    writer.write_u32(instance.unknown);
    writer.pad_to(start + layout.profile.lod_instance_record_size, 0);
    Ok(())
}

fn write_sub_model(writer: &mut ByteWriter, sub_model: &SubModel, profile: &FormatProfile) {
    let start = writer.position();
    // Compact records are recognised by the marker in the high half
    let primitive = if profile.compact_sub_models {
        0xFFFF_0000 | (sub_model.primitive & 0xFFFF)
    } else {
        sub_model.primitive
    };
    writer.write_u32(primitive);
    writer.write_u32(sub_model.vertex_base);
    writer.write_u32(sub_model.vertex_offset);
    writer.write_u32(sub_model.vertex_count);
    writer.write_u32(sub_model.index_offset);
    writer.write_u32(sub_model.index_count);
    writer.write_u16(sub_model.material.index);
    writer.write_u16(sub_model.material.owner);
    writer.write_u32(sub_model.flags);
    writer.pad_to(start + profile.stored_sub_model_size(), 0);
}
