//! # ChunkKit
//!
//! A pure-Rust library for the chunked asset containers and model packages
//! of a multi-platform racing game engine.
//!
//! ## Supported Formats
//!
//! - **Chunk containers** - Recursive tagged containers with descriptions
//! - **Model packages** - Models, lods, submodels, vertex and index buffers
//!   for PC (v1, v6), Xbox (v6, full and compact submodels) and Wii (v6)
//! - **Material packages** - Materials, substances, textures and palettes
//!   for PC, Xbox, PS2 and Wii
//!
//! ## Quick Start
//!
//! ### Reading a Chunk File
//!
//! ```no_run
//! use chunkkit::formats::chunk::read_chunk_file;
//!
//! let container = read_chunk_file("track.bin")?;
//! for (depth, chunk) in container.walk() {
//!     println!("{}{}", "  ".repeat(depth), chunkkit::formats::tag_name(chunk.context));
//! }
//! # Ok::<(), chunkkit::Error>(())
//! ```
//!
//! ### Editing a Model Package
//!
//! ```no_run
//! use chunkkit::prelude::*;
//!
//! let mut container = read_chunk_file("car.bin")?;
//! if let Some(chunk) = container.find_mut(MODEL_PACKAGE_CONTEXT) {
//!     let mut slot = ResourceSlot::<ModelPackage>::from_chunk(chunk)?;
//!     let extracted = extract_models(slot.get()?, 0x31, 0x90)?;
//!     println!("{} triangles", extracted.triangle_count());
//!     slot.get_mut()?.flags |= 1;
//!     slot.commit_to(chunk)?;
//! }
//! write_chunk_file(&container, "car_out.bin")?;
//! # Ok::<(), chunkkit::Error>(())
//! ```
//!
//! ## Logging
//!
//! Tolerated anomalies in source data are reported through `tracing`;
//! install a subscriber to see them.

pub mod error;
pub mod options;
pub mod formats;
pub mod resource;
pub mod manager;
pub mod extract;
pub mod inspect;

// Re-exports for convenience
pub use error::{Error, Result};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::options::{ReadOptions, Strictness, WriteOptions};
    pub use crate::formats::common::{Endian, Platform, fourcc, tag_name};
    pub use crate::formats::chunk::{
        Chunk, ChunkContainer, ChunkContent, parse_chunk_bytes, parse_chunk_bytes_with,
        read_chunk_file, serialize_chunks, serialize_chunks_with, write_chunk_file,
    };
    pub use crate::formats::model::{
        FormatProfile, IndexBuffer, Lod, LodInstance, MODEL_PACKAGE_CONTEXT, Model, ModelPackage,
        SubModel, VertexBuffer, VertexLayout, parse_model_package, parse_model_package_with,
        serialize_model_package,
    };
    pub use crate::formats::material::{
        MATERIAL_PACKAGE_CONTEXT, Material, MaterialHandle, MaterialPackage, Palette, Substance,
        Texture, parse_material_package, parse_material_package_with, serialize_material_package,
    };
    pub use crate::resource::{Resource, ResourceSlot, SlotState};
    pub use crate::manager::PackageManager;
    pub use crate::extract::{extract_models, extract_models_resolving};
    pub use crate::inspect::{ChunkSummary, PackageSummary};
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
