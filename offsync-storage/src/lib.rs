//! Encrypted local storage for Offsync.
//!
//! A single SQLite table holds four namespaces (`userData`, `adminData`,
//! `actionQueue`, `cache`). Every value is sealed with the session key before
//! it is written, and each namespace carries its own expiry policy.
//!
//! # Recovery policy
//!
//! A record that fails to decrypt (wrong key, tampering, truncation) reads as
//! absent instead of failing the caller. One bad row never takes the rest of
//! the store down with it.

mod clock;
mod config;
mod error;
mod namespace;
mod secure_store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::StoreConfig;
pub use error::{StorageError, StorageResult};
pub use namespace::Namespace;
pub use secure_store::{RawRecord, SecureStore, SCHEMA_VERSION};
