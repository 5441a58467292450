//! Durable FIFO of mutating requests awaiting replay.
//!
//! Actions live in the `actionQueue` namespace of the secure store, one
//! encrypted record per action. An action that fails `max_retries` replays is
//! dead-lettered: it stays on disk but is never offered as a sync candidate
//! again until an operator requeues or discards it.

use crate::error::{EngineError, EngineResult};
use crate::types::{HttpMethod, OutboundRequest};
use chrono::{DateTime, Utc};
use offsync_storage::{Namespace, SecureStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default replay budget.
pub const MAX_RETRIES: u32 = 3;

/// Header carrying the action id on every replay.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Lifecycle of a queued action:
/// `Enqueued → Syncing → {Done | Failed | DeadLettered}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionState {
    Enqueued,
    Syncing,
    Done,
    Failed { retry_count: u32 },
    DeadLettered,
}

/// A deferred mutating request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueuedAction {
    pub id: Uuid,
    pub url: String,
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<Value>,
    pub enqueued_at: DateTime<Utc>,
    pub retry_count: u32,
}

impl QueuedAction {
    /// Resting state of a stored action.
    pub fn state(&self, max_retries: u32) -> ActionState {
        match self.retry_count {
            0 => ActionState::Enqueued,
            n if n >= max_retries => ActionState::DeadLettered,
            n => ActionState::Failed { retry_count: n },
        }
    }

    /// The request to replay, tagged with the action id as idempotency key.
    pub fn to_request(&self) -> OutboundRequest {
        let mut headers = self.headers.clone();
        headers.insert(IDEMPOTENCY_HEADER.to_string(), self.id.to_string());
        OutboundRequest {
            url: self.url.clone(),
            method: self.method,
            headers,
            body: self.body.clone(),
        }
    }
}

/// Durable queue of pending mutating requests.
#[derive(Clone, Debug)]
pub struct ActionQueue {
    store: SecureStore,
    max_retries: u32,
}

impl ActionQueue {
    pub fn new(store: SecureStore) -> Self {
        Self::with_max_retries(store, MAX_RETRIES)
    }

    pub fn with_max_retries(store: SecureStore, max_retries: u32) -> Self {
        Self { store, max_retries }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Persists a mutating request. Reads are rejected with `NotQueueable`.
    pub fn enqueue(&self, request: OutboundRequest) -> EngineResult<QueuedAction> {
        if !request.method.is_mutating() {
            return Err(EngineError::NotQueueable(format!(
                "{} {} is a read",
                request.method, request.url
            )));
        }

        let action = QueuedAction {
            id: Uuid::new_v4(),
            url: request.url,
            method: request.method,
            headers: request.headers,
            body: request.body,
            enqueued_at: self.store.clock().now(),
            retry_count: 0,
        };
        self.save(&action)?;
        info!("queued {} {} as action {}", action.method, action.url, action.id);
        Ok(action)
    }

    fn save(&self, action: &QueuedAction) -> EngineResult<()> {
        self.store
            .put(Namespace::ActionQueue, &action.id.to_string(), action, None)?;
        Ok(())
    }

    pub fn get(&self, id: Uuid) -> EngineResult<Option<QueuedAction>> {
        Ok(self.store.get(Namespace::ActionQueue, &id.to_string())?)
    }

    /// Every readable action, in FIFO order, including dead-lettered ones.
    pub fn all(&self) -> EngineResult<Vec<QueuedAction>> {
        let mut actions: Vec<QueuedAction> = self
            .store
            .entries::<QueuedAction>(Namespace::ActionQueue)?
            .into_iter()
            .map(|(_, action)| action)
            .collect();
        // Stable: equal timestamps keep insertion order.
        actions.sort_by_key(|a| a.enqueued_at);
        Ok(actions)
    }

    /// Actions still eligible for replay, oldest first.
    pub fn candidates(&self) -> EngineResult<Vec<QueuedAction>> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|a| a.retry_count < self.max_retries)
            .collect())
    }

    /// Actions that exhausted their replay budget.
    pub fn dead_lettered(&self) -> EngineResult<Vec<QueuedAction>> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|a| a.retry_count >= self.max_retries)
            .collect())
    }

    /// Removes an action after a confirmed successful replay.
    pub fn remove(&self, id: Uuid) -> EngineResult<bool> {
        let removed = self.store.delete(Namespace::ActionQueue, &id.to_string())?;
        if removed {
            debug!("action {id} removed from queue");
        }
        Ok(removed)
    }

    /// Records a failed replay. Returns the new retry count, or `None` if
    /// the action no longer exists.
    pub fn bump_retry(&self, id: Uuid) -> EngineResult<Option<u32>> {
        let Some(mut action) = self.get(id)? else {
            return Ok(None);
        };
        action.retry_count += 1;
        self.save(&action)?;
        if action.retry_count >= self.max_retries {
            warn!(
                "action {id} ({} {}) dead-lettered after {} failed replays",
                action.method, action.url, action.retry_count
            );
        }
        Ok(Some(action.retry_count))
    }

    /// Resets a dead-lettered action so the next cycle replays it again.
    pub fn requeue(&self, id: Uuid) -> EngineResult<bool> {
        let Some(mut action) = self.get(id)? else {
            return Ok(false);
        };
        action.retry_count = 0;
        self.save(&action)?;
        info!("action {id} requeued");
        Ok(true)
    }

    /// Drops an action without replaying it.
    pub fn discard(&self, id: Uuid) -> EngineResult<bool> {
        let removed = self.remove(id)?;
        if removed {
            info!("action {id} discarded");
        }
        Ok(removed)
    }

    /// Raw number of stored actions, dead-lettered ones included.
    pub fn len(&self) -> EngineResult<usize> {
        Ok(self.store.count(Namespace::ActionQueue)?)
    }

    pub fn is_empty(&self) -> EngineResult<bool> {
        Ok(self.len()? == 0)
    }
}
