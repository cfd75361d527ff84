//! Error types for core primitives

use thiserror::Error;

/// Errors raised while decoding or encoding core primitives
#[derive(Error, Debug)]
pub enum CoreError {
    /// Bytes do not decode to a curve point
    #[error("Invalid public key")]
    InvalidKey,

    /// Scalar is not reduced
    #[error("Invalid secret key")]
    InvalidSecretKey,

    /// Hex decoding failed
    #[error("Invalid hex encoding: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Wrong byte length
    #[error("Invalid length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Varint ran past the end of the buffer or overflowed
    #[error("Malformed varint")]
    MalformedVarint,

    /// A tx extra field claims more bytes than remain
    #[error("Truncated tx extra field with tag {0:#04x}")]
    TruncatedExtra(u8),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;
