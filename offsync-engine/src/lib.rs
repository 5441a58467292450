//! Offline-first request engine for Offsync.
//!
//! Provides:
//! - A request gateway with live → cache → queue fallback
//! - A durable, encrypted FIFO of mutating requests made while offline
//! - A sync coordinator that replays the queue when connectivity returns
//! - A network observer fed by platform signals or a health probe
//! - `OfflineClient`, the per-session context tying it all together

pub mod action_queue;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod network;
pub mod sync_coordinator;
pub mod transport;
pub mod types;

pub use action_queue::{ActionQueue, ActionState, QueuedAction};
pub use cache::CacheManager;
pub use client::{OfflineClient, OfflineClientBuilder};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use gateway::ApiGateway;
pub use network::{NetworkObserver, NetworkStatus, NetworkSubscription};
pub use sync_coordinator::{SyncCoordinator, SyncEvent, SyncOutcome, SyncReport};
pub use transport::{HttpTransport, Transport};
pub use types::*;
