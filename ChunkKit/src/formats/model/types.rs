//! Model package object graph
//!
//! Records that reference each other by offset on disk are stored in flat
//! arenas here and linked by index ranges: a model's lods select a run of
//! `lod_instances`, and each lod instance selects a run of `sub_models`.

use std::ops::Range;

use glam::Vec4;
use serde::Serialize;

use super::profile::FormatProfile;
use super::vertex::{IndexBuffer, VertexBuffer};
use crate::error::{Error, Result};
use crate::formats::material::{Material, MaterialHandle, MaterialPackage};
use crate::manager::PackageManager;

/// Level-of-detail slots per model
pub const LOD_COUNT: usize = 7;

/// Primitive type of an indexed triangle list
pub const PRIMITIVE_TRIANGLE_LIST: u32 = 4;
/// Primitive type of an indexed triangle strip
pub const PRIMITIVE_TRIANGLE_STRIP: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Lod {
    /// Run of `ModelPackage::lod_instances`
    pub instances: Range<usize>,
    pub mask: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Model {
    pub uid: u32,
    /// Opaque engine handle
    pub handle: u32,
    /// Vertex layout id the model was built for
    pub layout: u16,
    /// Index into `ModelPackage::vertex_buffers`
    pub vertex_buffer: u16,
    pub flags: u32,
    pub scale: Vec4,
    /// Bounding volume; two vectors in v1 packages, eight in v6
    pub bounds: Vec<Vec4>,
    pub lods: [Lod; LOD_COUNT],
}

impl Model {
    /// Create a model with empty lods and zeroed bounds for `profile`.
    #[must_use]
    pub fn new(uid: u32, profile: &FormatProfile) -> Self {
        Self {
            uid,
            handle: 0,
            layout: 0,
            vertex_buffer: 0,
            flags: 0,
            scale: Vec4::ONE,
            bounds: vec![Vec4::ZERO; profile.bounds_count],
            lods: Default::default(),
        }
    }
}

/// One placement of geometry inside a lod.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LodInstance {
    pub transform: [Vec4; 4],
    pub use_transform: bool,
    /// Run of `ModelPackage::sub_models`
    pub sub_models: Range<usize>,
    pub unknown: u32,
}

impl Default for LodInstance {
    fn default() -> Self {
        Self {
            transform: [Vec4::X, Vec4::Y, Vec4::Z, Vec4::W],
            use_transform: false,
            sub_models: 0..0,
            unknown: 0,
        }
    }
}

/// A draw call: a vertex range, an index range and a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SubModel {
    pub primitive: u32,
    pub vertex_base: u32,
    pub vertex_offset: u32,
    pub vertex_count: u32,
    pub index_offset: u32,
    pub index_count: u32,
    pub material: MaterialHandle,
    pub flags: u32,
}

impl SubModel {
    /// One past the last vertex used, relative to the buffer start.
    #[must_use]
    pub fn vertex_end(&self) -> u64 {
        u64::from(self.vertex_base) + u64::from(self.vertex_offset) + u64::from(self.vertex_count)
    }

    #[must_use]
    pub fn index_range(&self) -> Range<usize> {
        let start = self.index_offset as usize;
        start..start + self.index_count as usize
    }

    #[must_use]
    pub fn triangle_count(&self) -> usize {
        let count = self.index_count as usize;
        match self.primitive {
            PRIMITIVE_TRIANGLE_LIST => count / 3,
            PRIMITIVE_TRIANGLE_STRIP => count.saturating_sub(2),
            _ => 0,
        }
    }
}

/// A decoded model package.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelPackage {
    pub profile: FormatProfile,
    /// Owner id; submodel handles with this owner are local
    pub uid: u32,
    /// Header flags (v6), zero in v1
    pub flags: u32,
    pub models: Vec<Model>,
    pub lod_instances: Vec<LodInstance>,
    pub sub_models: Vec<SubModel>,
    pub vertex_buffers: Vec<VertexBuffer>,
    pub index_buffer: IndexBuffer,
    pub materials: Option<MaterialPackage>,
}

impl ModelPackage {
    #[must_use]
    pub fn new(profile: FormatProfile, uid: u32) -> Self {
        Self {
            profile,
            uid,
            flags: 0,
            models: Vec::new(),
            lod_instances: Vec::new(),
            sub_models: Vec::new(),
            vertex_buffers: Vec::new(),
            index_buffer: IndexBuffer::default(),
            materials: None,
        }
    }

    /// Indices of every submodel drawn by `model`, in lod order.
    #[must_use]
    pub fn sub_models_of(&self, model: &Model) -> Vec<usize> {
        model
            .lods
            .iter()
            .flat_map(|lod| self.lod_instances.get(lod.instances.clone()).unwrap_or_default())
            .flat_map(|instance| instance.sub_models.clone())
            .collect()
    }

    /// Triangles drawn by every submodel of the package.
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.sub_models.iter().map(SubModel::triangle_count).sum()
    }

    /// Look up the material a handle refers to.
    ///
    /// Local handles resolve against this package's own materials; sentinel
    /// and foreign owners resolve through `manager`.
    #[must_use]
    pub fn resolve_material<'a>(
        &'a self,
        handle: MaterialHandle,
        manager: &'a PackageManager,
    ) -> Option<&'a Material> {
        if handle.is_null() {
            return None;
        }
        if handle.is_local_to(self.uid) {
            return self.materials.as_ref()?.get(handle.index);
        }
        manager.resolve(handle)
    }

    /// Check every cross-reference and range.
    ///
    /// # Errors
    /// - [`Error::DanglingReference`] for an index outside its arena or a
    ///   local material handle without a material
    /// - [`Error::SizeMismatch`] for bounds counts, vertex and index ranges
    ///   that do not fit their buffers
    pub fn validate(&self) -> Result<()> {
        for (i, buffer) in self.vertex_buffers.iter().enumerate() {
            if buffer.data.len() != buffer.count * buffer.stride() {
                return Err(Error::size_mismatch(
                    format!("vertex buffer {i}"),
                    buffer.count * buffer.stride(),
                    buffer.data.len(),
                ));
            }
        }

        for instance in &self.lod_instances {
            if instance.sub_models.end > self.sub_models.len() {
                return Err(Error::DanglingReference {
                    kind: "submodel",
                    offset: instance.sub_models.end,
                });
            }
        }

        for (m, model) in self.models.iter().enumerate() {
            if model.bounds.len() != self.profile.bounds_count {
                return Err(Error::size_mismatch(
                    format!("model {m} bounds"),
                    self.profile.bounds_count,
                    model.bounds.len(),
                ));
            }
            for lod in &model.lods {
                if lod.instances.end > self.lod_instances.len() {
                    return Err(Error::DanglingReference {
                        kind: "lod instance",
                        offset: lod.instances.end,
                    });
                }
            }

            let buffer = self
                .vertex_buffers
                .get(usize::from(model.vertex_buffer))
                .ok_or(Error::DanglingReference {
                    kind: "vertex buffer",
                    offset: usize::from(model.vertex_buffer),
                })?;
            for s in self.sub_models_of(model) {
                let sub_model = &self.sub_models[s];
                if sub_model.vertex_end() > buffer.count as u64 {
                    return Err(Error::size_mismatch(
                        format!("submodel {s} vertex range"),
                        buffer.count,
                        sub_model.vertex_end() as usize,
                    ));
                }
            }
        }

        for (s, sub_model) in self.sub_models.iter().enumerate() {
            if sub_model.index_range().end > self.index_buffer.len() {
                return Err(Error::size_mismatch(
                    format!("submodel {s} index range"),
                    self.index_buffer.len(),
                    sub_model.index_range().end,
                ));
            }
            if sub_model.material.is_local_to(self.uid)
                && self
                    .materials
                    .as_ref()
                    .and_then(|m| m.get(sub_model.material.index))
                    .is_none()
            {
                return Err(Error::DanglingReference {
                    kind: "material",
                    offset: usize::from(sub_model.material.index),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::common::{Endian, Platform};
    use crate::formats::model::vertex::VertexLayout;

    fn package() -> ModelPackage {
        let profile = FormatProfile::lookup(Platform::Pc, 6).unwrap();
        let mut package = ModelPackage::new(profile, 0x10);
        package.vertex_buffers.push(
            VertexBuffer::new(VertexLayout::Standard, vec![0; 0x20 * 4], Endian::Little).unwrap(),
        );
        package.index_buffer = IndexBuffer::new(vec![0, 1, 2, 1, 2, 3]);
        package.sub_models.push(SubModel {
            primitive: PRIMITIVE_TRIANGLE_LIST,
            vertex_count: 4,
            index_count: 6,
            material: MaterialHandle::NULL,
            ..SubModel::default()
        });
        package.lod_instances.push(LodInstance {
            sub_models: 0..1,
            ..LodInstance::default()
        });
        let mut model = Model::new(1, &profile);
        model.lods[0].instances = 0..1;
        package.models.push(model);
        package
    }

    #[test]
    fn test_valid_package() {
        let package = package();
        package.validate().unwrap();
        assert_eq!(package.triangle_count(), 2);
        assert_eq!(package.sub_models_of(&package.models[0]), vec![0]);
    }

    #[test]
    fn test_vertex_range_violation() {
        let mut package = package();
        package.sub_models[0].vertex_offset = 1;
        assert!(matches!(package.validate(), Err(Error::SizeMismatch { .. })));
    }

    #[test]
    fn test_index_range_violation() {
        let mut package = package();
        package.sub_models[0].index_offset = 3;
        assert!(matches!(package.validate(), Err(Error::SizeMismatch { .. })));
    }

    #[test]
    fn test_dangling_local_material() {
        let mut package = package();
        package.sub_models[0].material = MaterialHandle::new(0x10, 0);
        assert!(matches!(
            package.validate(),
            Err(Error::DanglingReference { kind: "material", .. })
        ));
    }

    #[test]
    fn test_strip_triangles() {
        let strip = SubModel {
            primitive: PRIMITIVE_TRIANGLE_STRIP,
            index_count: 6,
            ..SubModel::default()
        };
        assert_eq!(strip.triangle_count(), 4);
    }
}
