//! Read-through cache over the secure store.
//!
//! GET results live in the `cache` namespace with a per-entry TTL. User and
//! admin profiles get their own namespaces and the store's fixed lifetimes.
//! Writes are last-write-wins; nothing is merged or versioned.

use crate::error::EngineResult;
use chrono::Duration;
use offsync_storage::{Namespace, SecureStore};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Cache key for a GET endpoint.
pub fn endpoint_key(endpoint: &str) -> String {
    format!("GET {endpoint}")
}

#[derive(Clone, Debug)]
pub struct CacheManager {
    store: SecureStore,
}

impl CacheManager {
    pub fn new(store: SecureStore) -> Self {
        Self { store }
    }

    /// Stores a payload. `ttl` of `None` uses the store's cache default.
    pub fn put(&self, key: &str, payload: &Value, ttl: Option<Duration>) -> EngineResult<()> {
        self.store.put(Namespace::Cache, key, payload, ttl)?;
        Ok(())
    }

    /// Returns the payload if present and unexpired.
    pub fn get(&self, key: &str) -> EngineResult<Option<Value>> {
        Ok(self.store.get(Namespace::Cache, key)?)
    }

    pub fn invalidate(&self, key: &str) -> EngineResult<bool> {
        Ok(self.store.delete(Namespace::Cache, key)?)
    }

    pub fn clear(&self) -> EngineResult<usize> {
        Ok(self.store.clear_namespace(Namespace::Cache)?)
    }

    pub fn store_user_data<T: Serialize + ?Sized>(
        &self,
        user_id: &str,
        data: &T,
    ) -> EngineResult<()> {
        self.store.put(Namespace::UserData, user_id, data, None)?;
        Ok(())
    }

    pub fn get_user_data<T: DeserializeOwned>(&self, user_id: &str) -> EngineResult<Option<T>> {
        Ok(self.store.get(Namespace::UserData, user_id)?)
    }

    pub fn store_admin_data<T: Serialize + ?Sized>(
        &self,
        admin_id: &str,
        data: &T,
    ) -> EngineResult<()> {
        self.store.put(Namespace::AdminData, admin_id, data, None)?;
        Ok(())
    }

    pub fn get_admin_data<T: DeserializeOwned>(&self, admin_id: &str) -> EngineResult<Option<T>> {
        Ok(self.store.get(Namespace::AdminData, admin_id)?)
    }
}
