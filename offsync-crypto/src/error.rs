//! Crypto error types.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur during key handling and record encryption.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("session key not initialized")]
    KeyNotInitialized,

    #[error("session key already initialized")]
    KeyAlreadyInitialized,

    /// Wrong key, truncated input and tampering are indistinguishable.
    #[error("data corruption detected")]
    DataCorruption,

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
