//! Model packages
//!
//! A model package holds the geometry of one or more models: vertex buffers,
//! a shared index buffer and the record graph that carves them into draw
//! calls (model, lod, lod instance, submodel). It may embed the material
//! package its submodels refer to.
//!
//! The record layout differs between platforms and versions only in record
//! sizes and a few quirks, all captured by [`FormatProfile`].

mod profile;
mod reader;
mod types;
mod vertex;
mod writer;

pub use profile::{COMPACT_SUB_MODEL_SIZE, FormatProfile, HEADER_SIZE, VERTEX_DECL_SIZE, magic};
pub use reader::{parse_model_package, parse_model_package_with};
pub use types::{
    LOD_COUNT, Lod, LodInstance, Model, ModelPackage, PRIMITIVE_TRIANGLE_LIST,
    PRIMITIVE_TRIANGLE_STRIP, SubModel,
};
pub use vertex::{
    IndexBuffer, Vertex, VertexBuffer, VertexLayout, decode_indices, decode_vertices,
    encode_indices, encode_vertices, unpack_normal,
};
pub use writer::serialize_model_package;

use crate::error::Result;
use crate::formats::common::fourcc;
use crate::resource::Resource;

/// Chunk context of a model package
pub const MODEL_PACKAGE_CONTEXT: u32 = fourcc(b"MDPK");

impl Resource for ModelPackage {
    const CONTEXT: u32 = MODEL_PACKAGE_CONTEXT;

    fn load(data: &[u8]) -> Result<Self> {
        parse_model_package(data)
    }

    fn save(&self) -> Result<Vec<u8>> {
        serialize_model_package(self)
    }
}
