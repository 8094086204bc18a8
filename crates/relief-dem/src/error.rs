//! Elevation data error types.

/// Errors raised while decoding or encoding packed elevation buffers.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DemError {
    /// The base resolution is not a power of two of at least 2.
    #[error("base level size must be a power of two >= 2, got {0}")]
    InvalidBaseSize(u32),

    /// The buffer ended before a level could be sliced out of it.
    #[error(
        "packed elevation buffer truncated at level {level}: needed {needed} bytes, {available} available"
    )]
    Truncated {
        level: usize,
        needed: usize,
        available: usize,
    },

    /// Bytes were left over after the last level; the buffer came from a
    /// different encoder configuration.
    #[error("packed elevation buffer has trailing bytes: {consumed} of {len} consumed")]
    TrailingBytes { consumed: usize, len: usize },

    /// The elevation grid handed to the encoder has the wrong sample count.
    #[error("elevation grid has {actual} samples, expected {expected} ({side}x{side})")]
    GridSizeMismatch {
        actual: usize,
        expected: usize,
        side: usize,
    },
}
