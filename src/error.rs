//! Error types for pca-stats.

use thiserror::Error;

/// Numerical failures raised while building or decomposing a matrix.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NumericalError {
    /// A field has zero variance and cannot be standardised.
    #[error("field `{field}` has zero variance")]
    ZeroVariance { field: String },

    /// The matrix contains NaN or infinite entries.
    #[error("matrix contains non-finite entries")]
    NonFiniteMatrix,

    /// A matrix or vector had the wrong number of entries.
    #[error("dimension mismatch: expected {expected} entries, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The eigensolver ran out of sweeps.
    #[error("eigensolver did not converge within {sweeps} sweeps")]
    NotConverged { sweeps: u32 },
}

/// Malformed or truncated encoded state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SerializationError {
    /// Fewer bytes left than the next primitive needs.
    #[error("truncated input: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    /// A string payload was not valid UTF-8.
    #[error("invalid UTF-8 in string payload")]
    InvalidUtf8,

    /// An enum tag or boolean byte had an unknown value.
    #[error("invalid tag {tag} for {what}")]
    InvalidTag { what: &'static str, tag: u8 },

    /// Bytes were left over after the value was read.
    #[error("{0} trailing bytes after decoded value")]
    TrailingBytes(usize),

    /// Decoded parts disagree with each other.
    #[error("inconsistent payload: {0}")]
    Inconsistent(String),

    /// A length prefix does not fit the platform.
    #[error("length {0} exceeds addressable size")]
    LengthOverflow(u64),
}

/// pca-stats error types.
#[derive(Error, Debug)]
pub enum PcaError {
    /// Two states built under different configurations were merged.
    #[error("schema mismatch: cannot merge {left} with {right}")]
    SchemaMismatch { left: String, right: String },

    /// Encoded state could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// Matrix construction or decomposition failed.
    #[error("numerical error: {0}")]
    Numerical(#[from] NumericalError),

    /// `render` was called on a state that was never finalized.
    #[error("aggregation `{0}` rendered before finalize")]
    NotFinalized(String),

    /// JSON parsing error (configuration, metadata)
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Empty input where non-empty was required
    #[error("Empty input: {0}")]
    EmptyInput(String),
}

/// Result type alias for pca-stats operations.
pub type Result<T> = std::result::Result<T, PcaError>;
