//! Inspection summaries
//!
//! Serializable overviews of a chunk tree and of a model package, for
//! dumping to JSON without exposing raw payloads.

use std::path::Path;

use serde::Serialize;

use crate::error::Result;
use crate::formats::chunk::{Chunk, ChunkContainer, read_chunk_file};
use crate::formats::common::{Platform, tag_name};
use crate::formats::model::{ModelPackage, SubModel};

/// One chunk and its nested chunks.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkSummary {
    pub context: String,
    pub version: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Payload size, or the summed payload sizes of nested chunks
    pub size: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ChunkSummary>,
}

impl ChunkSummary {
    #[must_use]
    pub fn from_chunk(chunk: &Chunk) -> Self {
        let children: Vec<Self> = chunk
            .nested()
            .map(|nested| nested.children.iter().map(Self::from_chunk).collect())
            .unwrap_or_default();
        let size = match chunk.data() {
            Some(data) => data.len(),
            None => children.iter().map(|c| c.size).sum(),
        };
        Self {
            context: tag_name(chunk.context),
            version: chunk.version,
            description: chunk.description().map(str::to_string),
            size,
            children,
        }
    }
}

/// Summaries of every top-level chunk of a container.
#[must_use]
pub fn summarize_chunks(container: &ChunkContainer) -> Vec<ChunkSummary> {
    container.children.iter().map(ChunkSummary::from_chunk).collect()
}

/// Read a chunk file and summarize it.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed.
pub fn inspect_chunk_file<P: AsRef<Path>>(path: P) -> Result<Vec<ChunkSummary>> {
    let container = read_chunk_file(path)?;
    Ok(summarize_chunks(&container))
}

/// Counts and totals of a model package.
#[derive(Debug, Clone, Serialize)]
pub struct PackageSummary {
    pub uid: u32,
    pub platform: Platform,
    pub version: u32,
    pub compact_sub_models: bool,
    pub model_count: usize,
    pub lod_instance_count: usize,
    pub sub_model_count: usize,
    pub vertex_buffers: Vec<VertexBufferSummary>,
    pub index_count: usize,
    pub triangle_count: usize,
    pub models: Vec<ModelSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub materials: Option<MaterialSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VertexBufferSummary {
    pub layout: String,
    pub vertex_count: usize,
    pub stride: usize,
    pub packed_normals: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub uid: u32,
    pub vertex_buffer: u16,
    /// Lod slots holding at least one instance
    pub lods_used: usize,
    pub sub_model_count: usize,
    pub triangle_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaterialSummary {
    pub uid: u32,
    pub platform: Platform,
    pub version: u32,
    pub material_count: usize,
    pub texture_count: usize,
}

impl PackageSummary {
    #[must_use]
    pub fn from_package(package: &ModelPackage) -> Self {
        let models = package
            .models
            .iter()
            .map(|model| {
                let sub_models = package.sub_models_of(model);
                ModelSummary {
                    uid: model.uid,
                    vertex_buffer: model.vertex_buffer,
                    lods_used: model.lods.iter().filter(|lod| !lod.instances.is_empty()).count(),
                    triangle_count: sub_models
                        .iter()
                        .filter_map(|&s| package.sub_models.get(s))
                        .map(SubModel::triangle_count)
                        .sum(),
                    sub_model_count: sub_models.len(),
                }
            })
            .collect();

        Self {
            uid: package.uid,
            platform: package.profile.platform,
            version: package.profile.version,
            compact_sub_models: package.profile.compact_sub_models,
            model_count: package.models.len(),
            lod_instance_count: package.lod_instances.len(),
            sub_model_count: package.sub_models.len(),
            vertex_buffers: package
                .vertex_buffers
                .iter()
                .map(|buffer| VertexBufferSummary {
                    layout: format!("{:?}", buffer.layout),
                    vertex_count: buffer.count,
                    stride: buffer.stride(),
                    packed_normals: buffer.expanded_from_packed,
                })
                .collect(),
            index_count: package.index_buffer.len(),
            triangle_count: package.triangle_count(),
            models,
            materials: package.materials.as_ref().map(|m| MaterialSummary {
                uid: m.uid,
                platform: m.platform,
                version: m.version,
                material_count: m.len(),
                texture_count: m.texture_count(),
            }),
        }
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Pretty-printed JSON of a chunk tree summary.
///
/// # Errors
/// Returns an error if serialization fails.
pub fn chunks_to_json(summaries: &[ChunkSummary]) -> Result<String> {
    Ok(serde_json::to_string_pretty(summaries)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::common::fourcc;
    use crate::formats::model::FormatProfile;

    #[test]
    fn test_chunk_summary() {
        let mut inner = ChunkContainer::new();
        inner.push(Chunk::new_data(fourcc(b"LEAF"), vec![0; 12]).with_description("leaf"));
        inner.push(Chunk::new_data(fourcc(b"LEAF"), vec![0; 4]));
        let mut root = ChunkContainer::new();
        root.push(Chunk::new_container(fourcc(b"NODE"), inner));

        let summaries = summarize_chunks(&root);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].context, "NODE");
        assert_eq!(summaries[0].size, 16);
        assert_eq!(summaries[0].children[0].description.as_deref(), Some("leaf"));

        let json = chunks_to_json(&summaries).unwrap();
        assert!(json.contains("\"context\": \"LEAF\""));
    }

    #[test]
    fn test_package_summary_json() {
        let profile = FormatProfile::lookup(Platform::Xbox, 6).unwrap();
        let summary = PackageSummary::from_package(&ModelPackage::new(profile, 0x31));
        assert_eq!(summary.model_count, 0);
        let json = summary.to_json().unwrap();
        assert!(json.contains("\"platform\": \"Xbox\""));
        assert!(!json.contains("materials\""));
    }
}
