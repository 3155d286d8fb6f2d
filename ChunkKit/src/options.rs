//! Read and write options
//!
//! Controls how strictly readers treat anomalies in the source data and how
//! writers lay out containers.

/// How readers react to offsets that do not resolve and similar violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strictness {
    /// Any violation aborts the load.
    Strict,
    /// Original game data: degrade to a best-effort match and log a warning.
    #[default]
    Lenient,
}

/// Options for parsing chunk files and packages.
///
/// # Example
///
/// ```
/// use chunkkit::options::{ReadOptions, Strictness};
///
/// // Reject anything this engine would not have written itself
/// let options = ReadOptions::strict();
///
/// // Or configure individually
/// let options = ReadOptions::new()
///     .with_strictness(Strictness::Lenient)
///     .with_max_chunk_depth(8);
/// ```
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Reaction to dangling, duplicate or unreferenced records
    pub strictness: Strictness,

    /// Maximum nesting depth of chunk containers
    /// Default: 32
    pub max_chunk_depth: usize,

    /// Infer texture payload sizes that are stored as zero
    /// Default: true
    pub infer_texture_sizes: bool,
}

impl ReadOptions {
    /// Default chunk nesting limit.
    pub const DEFAULT_MAX_CHUNK_DEPTH: usize = 32;

    /// Create lenient options suitable for original game data.
    #[must_use]
    pub fn new() -> Self {
        Self {
            strictness: Strictness::Lenient,
            max_chunk_depth: Self::DEFAULT_MAX_CHUNK_DEPTH,
            infer_texture_sizes: true,
        }
    }

    /// Create options that reject every violation.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            strictness: Strictness::Strict,
            ..Self::new()
        }
    }

    /// Whether violations are fatal.
    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.strictness == Strictness::Strict
    }

    /// Set the strictness.
    #[must_use]
    pub fn with_strictness(mut self, strictness: Strictness) -> Self {
        self.strictness = strictness;
        self
    }

    /// Set the maximum chunk nesting depth.
    #[must_use]
    pub fn with_max_chunk_depth(mut self, depth: usize) -> Self {
        self.max_chunk_depth = depth;
        self
    }

    /// Set whether zero texture sizes are inferred from the payload.
    #[must_use]
    pub fn with_infer_texture_sizes(mut self, infer: bool) -> Self {
        self.infer_texture_sizes = infer;
        self
    }
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Options for serializing new chunk containers.
///
/// Containers that were parsed keep the alignment detected on read; these
/// options only apply to containers created in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Alignment of child data inside new containers (power of two)
    pub chunk_alignment: u32,

    /// Byte used to fill alignment gaps
    pub pad_byte: u8,
}

impl WriteOptions {
    /// Default alignment of new containers.
    pub const DEFAULT_ALIGNMENT: u32 = 16;

    /// Create the default write options.
    #[must_use]
    pub fn new() -> Self {
        Self {
            chunk_alignment: Self::DEFAULT_ALIGNMENT,
            pad_byte: crate::formats::chunk::PAD_BYTE,
        }
    }

    /// Set the alignment used for new containers.
    #[must_use]
    pub fn with_chunk_alignment(mut self, alignment: u32) -> Self {
        self.chunk_alignment = alignment;
        self
    }

    /// Set the padding byte.
    #[must_use]
    pub fn with_pad_byte(mut self, pad: u8) -> Self {
        self.pad_byte = pad;
        self
    }
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self::new()
    }
}
