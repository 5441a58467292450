//! ChaCha20-Poly1305 record encryption.
//!
//! Sealed records are text: `base64(nonce || ciphertext || tag)`.

use crate::error::{CryptoError, CryptoResult};
use crate::key::SessionKey;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Nonce size in bytes (96 bits).
pub const NONCE_SIZE: usize = 12;

/// Poly1305 tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// Encrypts raw bytes, returning `nonce || ciphertext`.
pub fn encrypt_bytes(key: &SessionKey, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    let mut nonce = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypts `nonce || ciphertext` produced by [`encrypt_bytes`].
pub fn decrypt_bytes(key: &SessionKey, sealed: &[u8]) -> CryptoResult<Vec<u8>> {
    if sealed.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::DataCorruption);
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::DataCorruption)
}

/// Serializes `value` to JSON and seals it into base64 text.
pub fn seal<T: Serialize + ?Sized>(key: &SessionKey, value: &T) -> CryptoResult<String> {
    let plaintext = serde_json::to_vec(value)?;
    let sealed = encrypt_bytes(key, &plaintext)?;
    Ok(STANDARD.encode(sealed))
}

/// Opens base64 text produced by [`seal`] and deserializes it.
pub fn open<T: DeserializeOwned>(key: &SessionKey, text: &str) -> CryptoResult<T> {
    let sealed = STANDARD
        .decode(text.trim())
        .map_err(|_| CryptoError::DataCorruption)?;
    let plaintext = decrypt_bytes(key, &sealed)?;
    serde_json::from_slice(&plaintext).map_err(|_| CryptoError::DataCorruption)
}
