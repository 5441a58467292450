//! Store expiry configuration.

use crate::namespace::Namespace;
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Per-namespace expiry policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Lifetime of `userData` records, in seconds.
    pub user_data_ttl_secs: i64,

    /// Lifetime of `adminData` records, in seconds.
    pub admin_data_ttl_secs: i64,

    /// Default lifetime of `cache` records when the writer passes no TTL.
    pub cache_ttl_secs: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            user_data_ttl_secs: 24 * 60 * 60,
            admin_data_ttl_secs: 60 * 60,
            cache_ttl_secs: 24 * 60 * 60,
        }
    }
}

impl StoreConfig {
    /// Default TTL applied to a namespace when the writer passes none.
    /// `None` means records never expire.
    pub fn default_ttl(&self, namespace: Namespace) -> Option<Duration> {
        match namespace {
            Namespace::UserData => Some(Duration::seconds(self.user_data_ttl_secs)),
            Namespace::AdminData => Some(Duration::seconds(self.admin_data_ttl_secs)),
            Namespace::Cache => Some(Duration::seconds(self.cache_ttl_secs)),
            Namespace::ActionQueue => None,
        }
    }
}
