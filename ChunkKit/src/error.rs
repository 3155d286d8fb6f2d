//! Error types for `ChunkKit`

use std::path::PathBuf;

use thiserror::Error;

/// The error type for `ChunkKit` operations.
///
/// Every variant is fatal for the load or save call that produced it. Anomalies
/// that the readers tolerate (padding noise, degraded references on original
/// game data) are reported through `tracing` instead and never reach this type.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    // ==================== IO Errors ====================
    /// A file could not be read or written.
    #[error("failed to access {path}: {source}")]
    FileAccess {
        /// The path that was being accessed.
        path: PathBuf,
        /// The underlying IO error.
        source: std::io::Error,
    },

    // ==================== Format Boundary Errors ====================
    /// A magic tag at a required boundary did not match.
    #[error("bad magic at offset {offset:#x}: expected {expected:?}, found {found:?}")]
    BadMagic {
        /// Absolute offset of the tag.
        offset: usize,
        /// The expected tag bytes.
        expected: [u8; 4],
        /// The bytes actually found.
        found: [u8; 4],
    },

    /// A format revision is not in the known table.
    #[error("unsupported {what} version: {version}")]
    UnsupportedVersion {
        /// Which structure carried the version.
        what: &'static str,
        /// The version number found.
        version: u32,
    },

    /// A known platform/version combination that this codec does not handle.
    #[error("unimplemented format: {what}")]
    UnimplementedFormat {
        /// Description of the combination.
        what: String,
    },

    /// The buffer ended before a read completed.
    #[error("unexpected end of data at offset {offset:#x} (needed {needed} bytes)")]
    UnexpectedEof {
        /// Offset where the read started.
        offset: usize,
        /// Number of bytes requested.
        needed: usize,
    },

    // ==================== Chunk Container Errors ====================
    /// A chunk's data or description lies outside its parent.
    #[error("chunk {index} out of bounds: offset {offset:#x} size {size:#x} exceeds container size {limit:#x}")]
    ChunkOutOfBounds {
        /// Index of the child inside its container.
        index: usize,
        /// Parent-relative offset.
        offset: u32,
        /// Declared size.
        size: u32,
        /// Size of the enclosing container.
        limit: u32,
    },

    /// A chunk offset points back into its own header or ancestors.
    #[error("cyclic or self-referential chunk at offset {offset:#x} (depth {depth})")]
    CyclicChunk {
        /// Absolute offset of the offending chunk.
        offset: usize,
        /// Nesting depth at which it was found.
        depth: usize,
    },

    /// A description string does not fit the one-byte length field.
    #[error("chunk description too long: {len} bytes (max 255)")]
    DescriptionTooLong {
        /// Length of the description.
        len: usize,
    },

    /// A description is not valid UTF-8.
    #[error("chunk {index} description at offset {offset:#x} is not valid UTF-8")]
    InvalidDescription {
        /// Index of the child inside its container.
        index: usize,
        /// Absolute offset of the description.
        offset: usize,
    },

    // ==================== Cross-Reference Errors ====================
    /// An offset-based lookup did not resolve to any record.
    #[error("dangling {kind} reference to offset {offset:#x}")]
    DanglingReference {
        /// The kind of record that was referenced.
        kind: &'static str,
        /// The unresolved offset (or index, on write).
        offset: usize,
    },

    /// A record is claimed by more than one parent.
    #[error("{kind} record {index} referenced by more than one parent")]
    DuplicateReference {
        /// The kind of record.
        kind: &'static str,
        /// Arena index of the record.
        index: usize,
    },

    /// A record is not reachable from any parent.
    #[error("{kind} record {index} is not referenced by any parent")]
    UnreferencedRecord {
        /// The kind of record.
        kind: &'static str,
        /// Arena index of the record.
        index: usize,
    },

    /// A declared length disagrees with the computed one.
    #[error("size mismatch in {what}: expected {expected}, actual {actual}")]
    SizeMismatch {
        /// What was being measured.
        what: String,
        /// The declared or required size.
        expected: usize,
        /// The computed size.
        actual: usize,
    },

    // ==================== Resource / Registry Errors ====================
    /// A destructive operation was attempted while edits are uncommitted.
    #[error("resource has uncommitted changes")]
    PendingChanges,

    /// A chunk does not carry the context a resource expects.
    #[error("chunk context mismatch: expected {expected:#010x}, found {found:#010x}")]
    ContextMismatch {
        /// Context expected by the resource type.
        expected: u32,
        /// Context found on the chunk.
        found: u32,
    },

    /// A package with this owner id is already registered.
    #[error("package {uid:#x} is already registered")]
    PackageAlreadyRegistered {
        /// The owner id.
        uid: u32,
    },

    // ==================== Texture Errors ====================
    /// An embedded DDS header could not be parsed.
    #[error("failed to parse DDS: {message}")]
    DdsParseFailed {
        /// The parse error message.
        message: String,
    },

    /// A palette table index is out of range.
    #[error("palette table {table} out of range ({available} available)")]
    InvalidPaletteTable {
        /// Requested table.
        table: usize,
        /// Number of tables present.
        available: usize,
    },

    // ==================== Extraction Errors ====================
    /// No model in the package matched the owner filter.
    #[error("no models owned by {uid:#x}")]
    NoMatchingModels {
        /// The owner filter.
        uid: u32,
    },

    // ==================== Serialization Errors ====================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for [`Error::UnimplementedFormat`].
    pub(crate) fn unimplemented(what: impl Into<String>) -> Self {
        Error::UnimplementedFormat { what: what.into() }
    }

    /// Shorthand for [`Error::SizeMismatch`].
    pub(crate) fn size_mismatch(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        Error::SizeMismatch {
            what: what.into(),
            expected,
            actual,
        }
    }
}

/// A specialized Result type for `ChunkKit` operations.
pub type Result<T> = std::result::Result<T, Error>;
