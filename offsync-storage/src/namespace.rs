//! Logical partitions of the secure store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One isolated partition of the store, each with its own keying and
/// expiry policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Namespace {
    /// Keyed by user id. Expires 24h after write by default.
    #[serde(rename = "userData")]
    UserData,
    /// Keyed by admin id. Expires 1h after write by default.
    #[serde(rename = "adminData")]
    AdminData,
    /// Keyed by action id. Never expires.
    #[serde(rename = "actionQueue")]
    ActionQueue,
    /// Keyed by cache key. Per-entry TTL.
    #[serde(rename = "cache")]
    Cache,
}

impl Namespace {
    pub const ALL: [Namespace; 4] = [
        Namespace::UserData,
        Namespace::AdminData,
        Namespace::ActionQueue,
        Namespace::Cache,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::UserData => "userData",
            Namespace::AdminData => "adminData",
            Namespace::ActionQueue => "actionQueue",
            Namespace::Cache => "cache",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
