//! Engine error types.

use offsync_crypto::CryptoError;
use offsync_storage::StorageError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur below the gateway.
///
/// None of these escape [`ApiGateway::request`](crate::gateway::ApiGateway::request);
/// the gateway turns them into failure envelopes.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("network failure: {0}")]
    Network(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("request not queueable: {0}")]
    NotQueueable(String),

    #[error("offline storage unavailable")]
    OfflineUnavailable,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    /// True for failures of the live call itself (unreachable, non-2xx,
    /// non-JSON). These trigger the cache-then-queue fallback.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            EngineError::Network(_) | EngineError::Http { .. } | EngineError::InvalidResponse(_)
        )
    }

    /// True when the session key has not been installed yet.
    pub fn is_key_missing(&self) -> bool {
        matches!(
            self,
            EngineError::Crypto(CryptoError::KeyNotInitialized)
                | EngineError::Storage(StorageError::Crypto(CryptoError::KeyNotInitialized))
        )
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        EngineError::Network(e.to_string())
    }
}
