//! Encrypted, namespaced key-value store backed by SQLite.
//!
//! Every value is sealed through the session [`KeyManager`] before it hits
//! disk; the database only ever sees base64 ciphertext plus timestamps.
//! Expiry is lazy: a record read at or past its `expires_at` is deleted and
//! reported as absent. Timestamps are stored in milliseconds; `expires_at` is
//! rounded up so a record is never dropped before its TTL has elapsed.

use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::error::{StorageError, StorageResult};
use crate::namespace::Namespace;
use chrono::{DateTime, Duration, Utc};
use offsync_crypto::{CryptoError, KeyManager};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Version of the on-disk layout. A mismatch recreates empty namespaces.
pub const SCHEMA_VERSION: i64 = 1;

/// A stored row as it exists on disk, without decryption.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawRecord {
    pub namespace: String,
    pub key: String,
    /// `base64(nonce || ciphertext)`.
    pub payload: String,
    pub written_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Encrypted key-value store with four namespaces.
#[derive(Clone)]
pub struct SecureStore {
    conn: Arc<Mutex<Connection>>,
    keys: Arc<KeyManager>,
    clock: Arc<dyn Clock>,
    config: StoreConfig,
}

impl SecureStore {
    /// Opens or creates a store at `path`.
    pub fn open(path: &Path, keys: Arc<KeyManager>, config: StoreConfig) -> StorageResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| StorageError::StorageUnavailable(format!("{}: {e}", path.display())))?;
        initialize_schema(&conn)
            .map_err(|e| StorageError::StorageUnavailable(e.to_string()))?;
        info!("secure store opened at {}", path.display());
        Ok(Self::from_connection(conn, keys, config))
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory(keys: Arc<KeyManager>, config: StoreConfig) -> StorageResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::StorageUnavailable(e.to_string()))?;
        initialize_schema(&conn)?;
        Ok(Self::from_connection(conn, keys, config))
    }

    fn from_connection(conn: Connection, keys: Arc<KeyManager>, config: StoreConfig) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            keys,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Replaces the time source used for timestamps and expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn keys(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Encrypts and writes `value`, replacing any previous record.
    ///
    /// `ttl` overrides the namespace default from [`StoreConfig`].
    pub fn put<T: Serialize + ?Sized>(
        &self,
        namespace: Namespace,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> StorageResult<()> {
        let payload = self.keys.encrypt(value)?;
        let written_at = self.clock.now();
        let expires_at = ttl
            .or_else(|| self.config.default_ttl(namespace))
            .map(|ttl| written_at + ttl);

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO records (namespace, key, payload, written_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(namespace, key) DO UPDATE SET
                payload = excluded.payload,
                written_at = excluded.written_at,
                expires_at = excluded.expires_at",
            params![
                namespace.as_str(),
                key,
                payload,
                written_at.timestamp_millis(),
                expires_at.map(ceil_millis),
            ],
        )?;
        debug!("put {namespace}/{key}");
        Ok(())
    }

    /// Reads and decrypts a record.
    ///
    /// Expired and corrupted records read as `None`. Only a missing session
    /// key or a storage failure is returned as an error.
    pub fn get<T: DeserializeOwned>(
        &self,
        namespace: Namespace,
        key: &str,
    ) -> StorageResult<Option<T>> {
        let now_ms = self.clock.now().timestamp_millis();
        let payload: Option<String> = {
            let conn = self.lock()?;
            let expired = conn.execute(
                "DELETE FROM records
                 WHERE namespace = ?1 AND key = ?2
                   AND expires_at IS NOT NULL AND expires_at <= ?3",
                params![namespace.as_str(), key, now_ms],
            )?;
            if expired > 0 {
                debug!("{namespace}/{key} expired, removed");
                return Ok(None);
            }
            conn.query_row(
                "SELECT payload FROM records WHERE namespace = ?1 AND key = ?2",
                params![namespace.as_str(), key],
                |row| row.get(0),
            )
            .optional()?
        };

        match payload {
            Some(payload) => self.open_payload(namespace, key, &payload),
            None => Ok(None),
        }
    }

    /// Decrypts a payload, converting corruption into absence.
    fn open_payload<T: DeserializeOwned>(
        &self,
        namespace: Namespace,
        key: &str,
        payload: &str,
    ) -> StorageResult<Option<T>> {
        match self.keys.decrypt(payload) {
            Ok(value) => Ok(Some(value)),
            Err(CryptoError::DataCorruption) => {
                warn!("record {namespace}/{key} failed to decrypt, treating as absent");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the stored row without decrypting it or checking expiry.
    pub fn raw_record(&self, namespace: Namespace, key: &str) -> StorageResult<Option<RawRecord>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT payload, written_at, expires_at FROM records
                 WHERE namespace = ?1 AND key = ?2",
                params![namespace.as_str(), key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                    ))
                },
            )
            .optional()?;

        Ok(row.map(|(payload, written_at, expires_at)| RawRecord {
            namespace: namespace.as_str().to_string(),
            key: key.to_string(),
            payload,
            written_at: millis_to_datetime(written_at),
            expires_at: expires_at.map(millis_to_datetime),
        }))
    }

    /// Deletes one record. Returns true if it existed.
    pub fn delete(&self, namespace: Namespace, key: &str) -> StorageResult<bool> {
        let conn = self.lock()?;
        let n = conn.execute(
            "DELETE FROM records WHERE namespace = ?1 AND key = ?2",
            params![namespace.as_str(), key],
        )?;
        Ok(n > 0)
    }

    /// Deletes every record in a namespace. Returns the number removed.
    pub fn clear_namespace(&self, namespace: Namespace) -> StorageResult<usize> {
        let conn = self.lock()?;
        let n = conn.execute(
            "DELETE FROM records WHERE namespace = ?1",
            params![namespace.as_str()],
        )?;
        debug!("cleared {n} records from {namespace}");
        Ok(n)
    }

    /// Wipes all four namespaces.
    pub fn clear_all(&self) -> StorageResult<()> {
        for namespace in Namespace::ALL {
            self.clear_namespace(namespace)?;
        }
        info!("secure store wiped");
        Ok(())
    }

    /// Returns every live, decryptable record of a namespace in insertion
    /// order. Expired and corrupted records are skipped.
    pub fn entries<T: DeserializeOwned>(
        &self,
        namespace: Namespace,
    ) -> StorageResult<Vec<(String, T)>> {
        let now_ms = self.clock.now().timestamp_millis();
        let rows: Vec<(String, String)> = {
            let conn = self.lock()?;
            let mut stmt = conn.prepare(
                "SELECT key, payload FROM records
                 WHERE namespace = ?1 AND (expires_at IS NULL OR expires_at > ?2)
                 ORDER BY rowid",
            )?;
            let rows = stmt
                .query_map(params![namespace.as_str(), now_ms], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut out = Vec::with_capacity(rows.len());
        for (key, payload) in rows {
            if let Some(value) = self.open_payload(namespace, &key, &payload)? {
                out.push((key, value));
            }
        }
        Ok(out)
    }

    /// Raw row count for a namespace, including expired and undecryptable rows.
    pub fn count(&self, namespace: Namespace) -> StorageResult<usize> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE namespace = ?1",
            params![namespace.as_str()],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// Deletes every expired record across all namespaces.
    pub fn purge_expired(&self) -> StorageResult<usize> {
        let now_ms = self.clock.now().timestamp_millis();
        let conn = self.lock()?;
        let n = conn.execute(
            "DELETE FROM records WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            params![now_ms],
        )?;
        if n > 0 {
            debug!("purged {n} expired records");
        }
        Ok(n)
    }
}

impl std::fmt::Debug for SecureStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureStore")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

/// Epoch milliseconds, rounded up when `t` has a sub-millisecond part.
fn ceil_millis(t: DateTime<Utc>) -> i64 {
    let ms = t.timestamp_millis();
    if t.timestamp_subsec_nanos() % 1_000_000 == 0 {
        ms
    } else {
        ms + 1
    }
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn initialize_schema(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;

    let version: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(found) = version {
        if found.parse::<i64>().ok() != Some(SCHEMA_VERSION) {
            warn!("schema version {found} does not match {SCHEMA_VERSION}, recreating namespaces");
            conn.execute_batch("DROP TABLE IF EXISTS records;")?;
        }
    }

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS records (
            namespace TEXT NOT NULL,
            key TEXT NOT NULL,
            payload TEXT NOT NULL,
            written_at INTEGER NOT NULL,
            expires_at INTEGER,
            PRIMARY KEY (namespace, key)
        );
        CREATE INDEX IF NOT EXISTS idx_records_expiry ON records (expires_at);",
    )?;

    conn.execute(
        "INSERT INTO meta (key, value) VALUES ('schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}
