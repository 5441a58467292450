//! Engine configuration.

use offsync_crypto::KdfParams;
use offsync_storage::StoreConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for one offline session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base URL all endpoints are resolved against (same origin).
    pub api_base_url: String,

    /// SQLite file for the secure store. `None` keeps everything in memory,
    /// so queued actions are lost on restart; a warning is logged at startup.
    pub db_path: Option<PathBuf>,

    /// Fixed application salt for session key derivation.
    pub kdf_salt: String,

    /// Argon2id cost profile.
    pub kdf: KdfParams,

    /// Lifetime of cached user data (seconds).
    pub user_data_ttl_secs: i64,

    /// Lifetime of cached admin data (seconds).
    pub admin_data_ttl_secs: i64,

    /// Default lifetime of cached GET results (seconds).
    pub cache_ttl_secs: i64,

    /// Failed replays before an action is dead-lettered.
    pub max_retries: u32,

    /// Health endpoint used by the connectivity probe.
    pub probe_path: String,

    /// Connectivity probe interval (seconds).
    pub probe_interval_secs: u64,

    /// Optional timeout for live calls. `None` leaves it to the network stack.
    pub request_timeout_secs: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000".to_string(),
            db_path: None,
            kdf_salt: "offsync-session-key-salt-v1".to_string(),
            kdf: KdfParams::default(),
            user_data_ttl_secs: 24 * 60 * 60,
            admin_data_ttl_secs: 60 * 60,
            cache_ttl_secs: 24 * 60 * 60,
            max_retries: 3,
            probe_path: "/api/health".to_string(),
            probe_interval_secs: 30,
            request_timeout_secs: None,
        }
    }
}

impl EngineConfig {
    /// Expiry policy handed to the secure store.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            user_data_ttl_secs: self.user_data_ttl_secs,
            admin_data_ttl_secs: self.admin_data_ttl_secs,
            cache_ttl_secs: self.cache_ttl_secs,
        }
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Creates a config for tests: in-memory store, cheap key derivation.
    pub fn testing(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            kdf: KdfParams::testing(),
            ..Self::default()
        }
    }
}
