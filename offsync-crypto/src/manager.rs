//! Session-scoped key holder.
//!
//! `KeyManager` owns the only copy of the session key. Every encrypt and
//! decrypt in the engine goes through it, so nothing can touch durable
//! storage until `initialize` has run.

use crate::cipher;
use crate::error::{CryptoError, CryptoResult};
use crate::key::{derive_session_key, KdfParams, SessionKey, DEFAULT_APP_SALT};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::RwLock;
use tracing::{debug, info};

/// Holds the per-session AEAD key in memory.
pub struct KeyManager {
    salt: Vec<u8>,
    params: KdfParams,
    key: RwLock<Option<SessionKey>>,
}

impl KeyManager {
    pub fn new() -> Self {
        Self::with_salt(DEFAULT_APP_SALT.to_vec(), KdfParams::default())
    }

    /// Creates a manager with an explicit application salt and cost profile.
    pub fn with_salt(salt: Vec<u8>, params: KdfParams) -> Self {
        Self {
            salt,
            params,
            key: RwLock::new(None),
        }
    }

    /// Derives and installs the session key.
    ///
    /// Fails with `KeyAlreadyInitialized` if a key is installed; call
    /// [`clear`](Self::clear) first to start a new session.
    pub fn initialize(&self, user_id: &str, session_token: &str) -> CryptoResult<()> {
        if self.is_initialized() {
            return Err(CryptoError::KeyAlreadyInitialized);
        }

        let key = derive_session_key(user_id, session_token, &self.salt, &self.params)?;

        let mut guard = self.key.write().map_err(|_| CryptoError::KeyNotInitialized)?;
        if guard.is_some() {
            return Err(CryptoError::KeyAlreadyInitialized);
        }
        *guard = Some(key);
        info!("session key derived for user {user_id}");
        Ok(())
    }

    /// Drops (and zeroizes) the session key.
    pub fn clear(&self) {
        if let Ok(mut guard) = self.key.write() {
            if guard.take().is_some() {
                debug!("session key cleared");
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.key.read().map(|k| k.is_some()).unwrap_or(false)
    }

    /// Serializes and encrypts `value` into base64 text.
    pub fn encrypt<T: Serialize + ?Sized>(&self, value: &T) -> CryptoResult<String> {
        let guard = self.key.read().map_err(|_| CryptoError::KeyNotInitialized)?;
        let key = guard.as_ref().ok_or(CryptoError::KeyNotInitialized)?;
        cipher::seal(key, value)
    }

    /// Decrypts base64 text produced by [`encrypt`](Self::encrypt).
    pub fn decrypt<T: DeserializeOwned>(&self, text: &str) -> CryptoResult<T> {
        let guard = self.key.read().map_err(|_| CryptoError::KeyNotInitialized)?;
        let key = guard.as_ref().ok_or(CryptoError::KeyNotInitialized)?;
        cipher::open(key, text)
    }
}

impl Default for KeyManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("params", &self.params)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
