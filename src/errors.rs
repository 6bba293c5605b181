use thiserror::Error;

/// Errors raised by the storage, refinement and error-ranking layers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SGError
{
    /// Refinement or coarsening was attempted on a storage without points.
    #[error("storage empty")]
    EmptyStorage,
    /// A point with the same level/index vector already exists.
    #[error("grid point already present in storage")]
    DuplicateKey,
    /// The queried point is not part of the storage.
    #[error("grid point not found in storage")]
    NotFound,
    #[error("sequence number {index} out of range for storage of size {len}")]
    IndexOutOfRange { index: usize, len: usize },
    /// Pop/peek on an error storage without entries.
    #[error("error storage is empty")]
    EmptyStore,
    #[error("expected {expected} dimensions, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    /// Level/index pair violates the dyadic encoding.
    #[error("invalid level/index pair")]
    InvalidPoint,
    #[error("level limits must have one entry per dimension")]
    InvalidLevelLimits,
    #[error("serialization failed")]
    SerializationFailed,
    #[error("deserialization failed")]
    DeserializationFailed,
    #[error("LZ4 decompression failed")]
    LZ4DecompressionFailed,
    #[error("file I/O error")]
    FileIOError,
}
