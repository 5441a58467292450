//! Encryption layer for Offsync.
//!
//! Provides the session key and per-record encryption used by the local
//! store:
//! - Argon2id derives a 256-bit key from `(user_id, session_token)` and a
//!   fixed application salt
//! - ChaCha20-Poly1305 seals every record with a fresh 96-bit nonce
//! - The key lives only in memory and is zeroized when cleared
//!
//! Sealed records are plain base64 text so the storage layer never handles
//! raw key material or plaintext.

mod cipher;
mod error;
mod key;
mod manager;

pub use cipher::{decrypt_bytes, encrypt_bytes, open, seal, NONCE_SIZE, TAG_SIZE};
pub use error::{CryptoError, CryptoResult};
pub use key::{derive_session_key, KdfParams, SessionKey, DEFAULT_APP_SALT, KEY_SIZE, MIN_SALT_SIZE};
pub use manager::KeyManager;
