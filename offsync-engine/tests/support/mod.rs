//! Shared test helpers: store setup and scripted transports.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use offsync_crypto::{KdfParams, KeyManager};
use offsync_engine::{ApiResponse, EngineError, EngineResult, OutboundRequest, Transport};
use offsync_storage::{ManualClock, SecureStore, StoreConfig};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

/// Routes engine logs to the test writer. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("offsync_engine=debug,offsync_storage=debug"))
        .with_test_writer()
        .try_init();
}

pub fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn initialized_keys() -> Arc<KeyManager> {
    let km = KeyManager::with_salt(b"test-application-salt".to_vec(), KdfParams::testing());
    km.initialize("u1", "session-token").unwrap();
    Arc::new(km)
}

/// In-memory store on a manual clock.
pub fn test_store() -> (SecureStore, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(t0()));
    let store = SecureStore::open_in_memory(initialized_keys(), StoreConfig::default())
        .unwrap()
        .with_clock(clock.clone());
    (store, clock)
}

type Responder = dyn Fn(&OutboundRequest) -> EngineResult<ApiResponse> + Send + Sync;

/// Transport that records every call and answers from a closure.
pub struct ScriptedTransport {
    calls: Mutex<Vec<OutboundRequest>>,
    responder: Box<Responder>,
}

impl ScriptedTransport {
    pub fn new(
        responder: impl Fn(&OutboundRequest) -> EngineResult<ApiResponse> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        })
    }

    /// Answers every call with `{success: true, data: {"ok": true}}`.
    pub fn always_ok() -> Arc<Self> {
        Self::new(|_| Ok(ApiResponse::ok(serde_json::json!({ "ok": true }))))
    }

    /// Fails every call as unreachable.
    pub fn always_down() -> Arc<Self> {
        Self::new(|_| Err(EngineError::Network("connection refused".into())))
    }

    pub fn calls(&self) -> Vec<OutboundRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_urls(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.url).collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &OutboundRequest) -> EngineResult<ApiResponse> {
        self.calls.lock().unwrap().push(request.clone());
        (self.responder)(request)
    }
}
