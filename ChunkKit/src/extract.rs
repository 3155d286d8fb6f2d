//! Model extraction
//!
//! Copies the models of one owner out of a package into a new, self-contained
//! package. Only the vertex and index ranges the copied submodels touch are
//! kept, so every submodel is rebased against the smaller buffers, and the
//! materials the copy uses are renumbered into a fresh material table.

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

use crate::error::{Error, Result};
use crate::formats::material::{LATEST_VERSION, Material, MaterialHandle, MaterialPackage};
use crate::formats::model::{IndexBuffer, Lod, LodInstance, Model, ModelPackage, SubModel};
use crate::manager::PackageManager;

/// Copy every model whose uid is `owner_filter` into a new package owned by `new_uid`.
///
/// Material handles owned by the source package (or by `owner_filter`) are
/// renumbered into the new package's own material table; sentinel and
/// foreign handles are kept as they are.
///
/// # Errors
/// - [`Error::NoMatchingModels`] if no model has the uid `owner_filter`
/// - validation errors if the source package's ranges are inconsistent
pub fn extract_models(package: &ModelPackage, owner_filter: u32, new_uid: u32) -> Result<ModelPackage> {
    Extractor::new(package, owner_filter, new_uid, None).run()
}

/// Like [`extract_models`], but materials owned by `owner_filter` that are
/// not in the source package are looked up in `manager`.
///
/// # Errors
/// Same as [`extract_models`].
pub fn extract_models_resolving(
    package: &ModelPackage,
    owner_filter: u32,
    new_uid: u32,
    manager: &PackageManager,
) -> Result<ModelPackage> {
    Extractor::new(package, owner_filter, new_uid, Some(manager)).run()
}

/// Vertex range touched in one source buffer.
#[derive(Debug, Clone, Copy)]
struct Extent {
    start: u64,
    end: u64,
}

impl Extent {
    fn include(slot: &mut Option<Self>, start: u64, end: u64) {
        *slot = Some(match *slot {
            Some(extent) => Self {
                start: extent.start.min(start),
                end: extent.end.max(end),
            },
            None => Self { start, end },
        });
    }

    fn range(self) -> Range<usize> {
        self.start as usize..self.end as usize
    }
}

struct Extractor<'a> {
    source: &'a ModelPackage,
    owner_filter: u32,
    new_uid: u32,
    manager: Option<&'a PackageManager>,
    target: ModelPackage,
    /// Source buffer of every copied submodel, parallel to `target.sub_models`
    sub_model_buffers: Vec<u16>,
    vertex_extents: BTreeMap<u16, Option<Extent>>,
    index_extent: Option<Extent>,
    remapped: HashMap<MaterialHandle, u16>,
    materials: Vec<Material>,
}

impl<'a> Extractor<'a> {
    fn new(
        source: &'a ModelPackage,
        owner_filter: u32,
        new_uid: u32,
        manager: Option<&'a PackageManager>,
    ) -> Self {
        let mut target = ModelPackage::new(source.profile, new_uid);
        target.flags = source.flags;
        Self {
            source,
            owner_filter,
            new_uid,
            manager,
            target,
            sub_model_buffers: Vec::new(),
            vertex_extents: BTreeMap::new(),
            index_extent: None,
            remapped: HashMap::new(),
            materials: Vec::new(),
        }
    }

    fn run(mut self) -> Result<ModelPackage> {
        let source = self.source;
        let owner_filter = self.owner_filter;
        // Pass one: deep copy and collect the touched ranges
        for model in source.models.iter().filter(|m| m.uid == owner_filter) {
            self.copy_model(model)?;
        }
        if self.target.models.is_empty() {
            return Err(Error::NoMatchingModels { uid: owner_filter });
        }

        // Pass two: cut the buffers down and rebase onto them
        let mut buffer_map = HashMap::new();
        let mut vertex_starts = HashMap::new();
        for (&buffer_index, extent) in &self.vertex_extents {
            let extent = extent.unwrap_or(Extent { start: 0, end: 0 });
            let buffer = source
                .vertex_buffers
                .get(usize::from(buffer_index))
                .ok_or(Error::DanglingReference {
                    kind: "vertex buffer",
                    offset: usize::from(buffer_index),
                })?;
            buffer_map.insert(buffer_index, self.target.vertex_buffers.len() as u16);
            vertex_starts.insert(buffer_index, extent.start);
            self.target.vertex_buffers.push(buffer.slice(extent.range())?);
        }

        for model in &mut self.target.models {
            model.vertex_buffer = buffer_map[&model.vertex_buffer];
        }

        let index_extent = self.index_extent.unwrap_or(Extent { start: 0, end: 0 });
        let indices = source
            .index_buffer
            .indices
            .get(index_extent.range())
            .ok_or_else(|| {
                Error::size_mismatch("index buffer", index_extent.end as usize, source.index_buffer.len())
            })?;
        self.target.index_buffer = IndexBuffer::new(indices.to_vec());

        for (sub_model, buffer) in self.target.sub_models.iter_mut().zip(&self.sub_model_buffers) {
            sub_model.vertex_base -= vertex_starts[buffer] as u32;
            sub_model.index_offset -= index_extent.start as u32;
        }

        // Compactness is only visible through the first submodel record
        if self.target.sub_models.is_empty() && self.target.profile.compact_sub_models {
            self.target.profile = self.target.profile.with_compact_sub_models(false)?;
        }

        if !self.materials.is_empty() {
            let (platform, version) = source
                .materials
                .as_ref()
                .map_or((source.profile.platform, LATEST_VERSION), |m| (m.platform, m.version));
            let mut materials = MaterialPackage::new(platform, self.new_uid);
            materials.version = version;
            materials.materials = self.materials;
            self.target.materials = Some(materials);
        }

        self.target.validate()?;
        tracing::debug!(
            "Extracted {} models of owner {:#x} into package {:#x}: {} vertex buffers, {} indices, {} materials",
            self.target.models.len(),
            self.owner_filter,
            self.new_uid,
            self.target.vertex_buffers.len(),
            self.target.index_buffer.len(),
            self.target.materials.as_ref().map_or(0, MaterialPackage::len)
        );
        Ok(self.target)
    }

    fn copy_model(&mut self, model: &Model) -> Result<()> {
        let source = self.source;
        let mut copy = model.clone();
        self.vertex_extents.entry(model.vertex_buffer).or_insert(None);

        for (lod, source_lod) in copy.lods.iter_mut().zip(&model.lods) {
            let start = self.target.lod_instances.len();
            let instances = source.lod_instances.get(source_lod.instances.clone()).ok_or(
                Error::DanglingReference {
                    kind: "lod instance",
                    offset: source_lod.instances.end,
                },
            )?;
            for instance in instances {
                let copied = self.copy_instance(instance, model.vertex_buffer)?;
                self.target.lod_instances.push(copied);
            }
            *lod = Lod {
                instances: if source_lod.instances.is_empty() {
                    0..0
                } else {
                    start..self.target.lod_instances.len()
                },
                mask: source_lod.mask,
            };
        }

        self.target.models.push(copy);
        Ok(())
    }

    fn copy_instance(&mut self, instance: &LodInstance, buffer: u16) -> Result<LodInstance> {
        let source = self.source;
        let start = self.target.sub_models.len();
        let sub_models = source.sub_models.get(instance.sub_models.clone()).ok_or(
            Error::DanglingReference {
                kind: "submodel",
                offset: instance.sub_models.end,
            },
        )?;
        for sub_model in sub_models {
            let copied = self.copy_sub_model(sub_model, buffer)?;
            self.target.sub_models.push(copied);
            self.sub_model_buffers.push(buffer);
        }
        Ok(LodInstance {
            sub_models: if instance.sub_models.is_empty() {
                0..0
            } else {
                start..self.target.sub_models.len()
            },
            ..instance.clone()
        })
    }

    fn copy_sub_model(&mut self, sub_model: &SubModel, buffer: u16) -> Result<SubModel> {
        if let Some(extent) = self.vertex_extents.get_mut(&buffer) {
            Extent::include(extent, u64::from(sub_model.vertex_base), sub_model.vertex_end());
        }
        let index_range = sub_model.index_range();
        Extent::include(
            &mut self.index_extent,
            index_range.start as u64,
            index_range.end as u64,
        );

        Ok(SubModel {
            material: self.remap_material(sub_model.material)?,
            ..*sub_model
        })
    }

    fn remap_material(&mut self, handle: MaterialHandle) -> Result<MaterialHandle> {
        let owned = handle.is_local_to(self.source.uid) || handle.is_local_to(self.owner_filter);
        if !owned {
            if handle.is_local_to(self.new_uid) {
                tracing::warn!(
                    "Foreign material {} shares the owner id of extracted package {:#x}; it will resolve locally",
                    handle,
                    self.new_uid
                );
            }
            return Ok(handle);
        }
        let owner = (self.new_uid & 0xFFFF) as u16;
        if let Some(&index) = self.remapped.get(&handle) {
            return Ok(MaterialHandle::new(owner, index));
        }

        let material = self.source_material(handle).cloned().unwrap_or_else(|| {
            tracing::warn!("Material {} not found; extracting a placeholder", handle);
            Material::default()
        });
        let index = material_index(self.materials.len())?;
        self.materials.push(material);
        self.remapped.insert(handle, index);
        Ok(MaterialHandle::new(owner, index))
    }

    fn source_material(&self, handle: MaterialHandle) -> Option<&'a Material> {
        let local = self
            .source
            .materials
            .as_ref()
            .filter(|_| handle.is_local_to(self.source.uid))
            .and_then(|m| m.get(handle.index));
        local.or_else(|| self.manager?.resolve(handle))
    }
}

/// Handle index of the next material in the extracted table.
fn material_index(len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| {
        Error::size_mismatch("extracted material count", usize::from(u16::MAX) + 1, len + 1)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::common::{Endian, Platform};
    use crate::formats::material::OWNER_GLOBAL;
    use crate::formats::model::{
        FormatProfile, PRIMITIVE_TRIANGLE_LIST, VertexBuffer, VertexLayout,
    };
    use pretty_assertions::assert_eq;

    const PACKAGE_UID: u32 = 0x40;
    const MODEL_UID: u32 = 0x41;

    /// One model, one lod, one instance and two submodels over 100 vertices
    /// and 300 indices.
    fn package() -> ModelPackage {
        let profile = FormatProfile::lookup(Platform::Pc, 6).unwrap();
        let mut package = ModelPackage::new(profile, PACKAGE_UID);

        let stride = VertexLayout::Standard.stride();
        let data: Vec<u8> = (0..100 * stride).map(|i| (i / stride) as u8).collect();
        package
            .vertex_buffers
            .push(VertexBuffer::new(VertexLayout::Standard, data, Endian::Little).unwrap());
        package.index_buffer = IndexBuffer::new((0..300).map(|i| (i % 30) as u16).collect());

        let mut materials = MaterialPackage::new(Platform::Pc, PACKAGE_UID);
        materials.materials = (0..4)
            .map(|i| Material {
                flags: i,
                ..Material::default()
            })
            .collect();
        package.materials = Some(materials);

        package.sub_models = vec![
            SubModel {
                primitive: PRIMITIVE_TRIANGLE_LIST,
                vertex_base: 10,
                vertex_count: 30,
                index_offset: 30,
                index_count: 120,
                material: MaterialHandle::new(PACKAGE_UID as u16, 3),
                ..SubModel::default()
            },
            SubModel {
                primitive: PRIMITIVE_TRIANGLE_LIST,
                vertex_base: 40,
                vertex_offset: 5,
                vertex_count: 15,
                index_offset: 150,
                index_count: 60,
                material: MaterialHandle::new(OWNER_GLOBAL, 7),
                ..SubModel::default()
            },
        ];
        package.lod_instances.push(LodInstance {
            sub_models: 0..2,
            ..LodInstance::default()
        });
        let mut model = Model::new(MODEL_UID, &profile);
        model.lods[0].instances = 0..1;
        package.models.push(model);
        package.validate().unwrap();
        package
    }

    #[test]
    fn test_extract_rebases_to_zero() {
        let source = package();
        let extracted = extract_models(&source, MODEL_UID, 0x90).unwrap();

        assert_eq!(extracted.uid, 0x90);
        assert_eq!(extracted.models.len(), 1);
        assert_eq!(extracted.vertex_buffers[0].count, 50);
        assert_eq!(extracted.index_buffer.len(), 180);

        let subs = &extracted.sub_models;
        assert_eq!((subs[0].vertex_base, subs[0].index_offset), (0, 0));
        assert_eq!((subs[1].vertex_base, subs[1].index_offset), (30, 120));
        assert_eq!(subs[1].vertex_offset, 5);

        // Vertex 0 of the copy is vertex 10 of the source
        assert_eq!(
            extracted.vertex_buffers[0].raw_vertex(0),
            source.vertex_buffers[0].raw_vertex(10)
        );
    }

    #[test]
    fn test_extract_preserves_topology() {
        let source = package();
        let extracted = extract_models(&source, MODEL_UID, 0x90).unwrap();
        assert_eq!(extracted.triangle_count(), source.triangle_count());

        for (copy, original) in extracted.sub_models.iter().zip(&source.sub_models) {
            assert_eq!(
                &extracted.index_buffer.indices[copy.index_range()],
                &source.index_buffer.indices[original.index_range()]
            );
            assert_eq!(copy.vertex_count, original.vertex_count);
        }
    }

    #[test]
    fn test_extract_remaps_local_materials() {
        let extracted = extract_models(&package(), MODEL_UID, 0x90).unwrap();
        assert_eq!(extracted.sub_models[0].material, MaterialHandle::new(0x90, 0));
        assert_eq!(extracted.sub_models[1].material, MaterialHandle::new(OWNER_GLOBAL, 7));

        let materials = extracted.materials.as_ref().unwrap();
        assert_eq!(materials.len(), 1);
        assert_eq!(materials.materials[0].flags, 3);
        assert_eq!(materials.uid, 0x90);
    }

    #[test]
    fn test_shared_material_is_deduplicated() {
        let mut source = package();
        source.sub_models[1].material = source.sub_models[0].material;
        let extracted = extract_models(&source, MODEL_UID, 0x90).unwrap();
        assert_eq!(extracted.sub_models[0].material, extracted.sub_models[1].material);
        assert_eq!(extracted.materials.unwrap().len(), 1);
    }

    #[test]
    fn test_other_models_are_left_behind() {
        let mut source = package();
        source.sub_models.push(SubModel {
            primitive: PRIMITIVE_TRIANGLE_LIST,
            vertex_base: 90,
            vertex_count: 10,
            index_offset: 270,
            index_count: 30,
            ..SubModel::default()
        });
        source.lod_instances.push(LodInstance {
            sub_models: 2..3,
            ..LodInstance::default()
        });
        let mut other = Model::new(0x55, &source.profile);
        other.lods[0].instances = 1..2;
        source.models.push(other);

        let extracted = extract_models(&source, MODEL_UID, 0x90).unwrap();
        assert_eq!(extracted.sub_models.len(), 2);
        assert_eq!(extracted.vertex_buffers[0].count, 50);

        let other = extract_models(&source, 0x55, 0x91).unwrap();
        assert_eq!(other.vertex_buffers[0].count, 10);
        assert_eq!(other.index_buffer.len(), 30);
        assert!(other.materials.is_none());
    }

    #[test]
    fn test_no_matching_models() {
        assert!(matches!(
            extract_models(&package(), 0x1234, 0x90),
            Err(Error::NoMatchingModels { uid: 0x1234 })
        ));
    }

    #[test]
    fn test_owner_filter_materials_resolve_through_manager() {
        let mut source = package();
        source.sub_models[1].material = MaterialHandle::new(MODEL_UID as u16, 1);

        let mut foreign = MaterialPackage::new(Platform::Pc, MODEL_UID);
        foreign.materials = vec![
            Material::default(),
            Material {
                flags: 0x77,
                ..Material::default()
            },
        ];
        let mut manager = PackageManager::new();
        manager.register(foreign).unwrap();

        let extracted = extract_models_resolving(&source, MODEL_UID, 0x90, &manager).unwrap();
        let materials = extracted.materials.unwrap();
        assert_eq!(materials.len(), 2);
        assert_eq!(materials.materials[1].flags, 0x77);

        // Without the manager the material becomes a placeholder
        let extracted = extract_models(&source, MODEL_UID, 0x90).unwrap();
        assert_eq!(extracted.materials.unwrap().materials[1], Material::default());
    }

    #[test]
    fn test_foreign_handle_matching_new_owner_is_kept() {
        let mut source = package();
        source.sub_models[1].material = MaterialHandle::new(0x90, 2);
        let extracted = extract_models(&source, MODEL_UID, 0x90).unwrap();
        assert_eq!(extracted.sub_models[1].material, MaterialHandle::new(0x90, 2));
        assert_eq!(extracted.materials.unwrap().len(), 1);
    }

    #[test]
    fn test_material_index_overflow() {
        assert_eq!(material_index(0).unwrap(), 0);
        assert_eq!(material_index(usize::from(u16::MAX)).unwrap(), u16::MAX);
        assert!(matches!(
            material_index(usize::from(u16::MAX) + 1),
            Err(Error::SizeMismatch { expected: 0x10000, actual: 0x10001, .. })
        ));
    }

    #[test]
    fn test_compact_layout_dropped_without_submodels() {
        let profile = FormatProfile::lookup(Platform::Xbox, 6)
            .unwrap()
            .with_compact_sub_models(true)
            .unwrap();
        // A model with no lods next to one with submodels
        let mut source = package();
        source.profile = profile;
        source.models.push(Model::new(0x77, &profile));

        let extracted = extract_models(&source, 0x77, 0x90).unwrap();
        assert!(extracted.sub_models.is_empty());
        assert!(!extracted.profile.compact_sub_models);
    }
}
