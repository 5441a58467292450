//! Replays queued actions when connectivity returns.
//!
//! The coordinator is a two-state machine (`Idle` → `Syncing` → `Idle`)
//! guarded by a busy flag. A cycle snapshots the current candidates once and
//! gives each exactly one attempt, in FIFO order, with no backoff. A cycle
//! that has started runs to completion even if the network drops again.
//!
//! The busy flag only covers this instance. Two sessions sharing one store
//! can both replay the same action; replays carry the action id as an
//! `Idempotency-Key` so a server that honours it can drop the duplicate.

use crate::action_queue::{ActionQueue, ActionState, QueuedAction};
use crate::error::EngineResult;
use crate::network::NetworkObserver;
use crate::transport::Transport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Outcome of one action within a cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionOutcome {
    pub id: Uuid,
    pub state: ActionState,
}

/// Summary of one sync cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub dead_lettered: usize,
    pub actions: Vec<ActionOutcome>,
}

/// Result of a trigger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// Another cycle was already running on this instance.
    AlreadyRunning,
}

/// Events emitted while syncing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncEvent {
    CycleStarted { candidates: usize },
    ActionSyncing { id: Uuid },
    ActionReplayed { id: Uuid },
    ActionFailed { id: Uuid, retry_count: u32, error: String },
    ActionDeadLettered { id: Uuid },
    CycleCompleted { report: SyncReport },
}

/// Resets the busy flag and the in-flight marker when a cycle ends, however
/// it ends.
struct BusyGuard<'a>(&'a SyncCoordinator);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.set_in_flight(None);
        self.0.busy.store(false, Ordering::Release);
    }
}

pub struct SyncCoordinator {
    queue: ActionQueue,
    transport: Arc<dyn Transport>,
    busy: AtomicBool,
    in_flight: Mutex<Option<Uuid>>,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncCoordinator {
    pub fn new(queue: ActionQueue, transport: Arc<dyn Transport>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            queue,
            transport,
            busy: AtomicBool::new(false),
            in_flight: Mutex::new(None),
            events,
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Current state of a queued action: `Syncing` while its replay is on
    /// the wire, otherwise derived from its retry count. `None` once the
    /// action has left the queue.
    pub fn action_state(&self, id: Uuid) -> EngineResult<Option<ActionState>> {
        if self.in_flight() == Some(id) {
            return Ok(Some(ActionState::Syncing));
        }
        Ok(self
            .queue
            .get(id)?
            .map(|action| action.state(self.queue.max_retries())))
    }

    fn in_flight(&self) -> Option<Uuid> {
        *self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_in_flight(&self, id: Option<Uuid>) {
        *self.in_flight.lock().unwrap_or_else(|e| e.into_inner()) = id;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn queue(&self) -> &ActionQueue {
        &self.queue
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Runs one sync cycle unless one is already in flight.
    pub async fn trigger(&self) -> EngineResult<SyncOutcome> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("sync already running, ignoring trigger");
            return Ok(SyncOutcome::AlreadyRunning);
        }
        let _guard = BusyGuard(self);

        let report = self.run_cycle().await?;
        Ok(SyncOutcome::Completed(report))
    }

    async fn run_cycle(&self) -> EngineResult<SyncReport> {
        let candidates = self.queue.candidates()?;
        let mut report = SyncReport::default();
        if candidates.is_empty() {
            debug!("sync cycle: nothing to replay");
            return Ok(report);
        }

        info!("sync cycle started with {} candidates", candidates.len());
        self.emit(SyncEvent::CycleStarted {
            candidates: candidates.len(),
        });

        for action in candidates {
            report.attempted += 1;
            let state = self.replay(&action).await;
            match state {
                ActionState::Done => report.succeeded += 1,
                ActionState::DeadLettered => {
                    report.failed += 1;
                    report.dead_lettered += 1;
                }
                _ => report.failed += 1,
            }
            report.actions.push(ActionOutcome { id: action.id, state });
        }

        info!(
            "sync cycle finished: {} replayed, {} failed, {} dead-lettered",
            report.succeeded, report.failed, report.dead_lettered
        );
        self.emit(SyncEvent::CycleCompleted {
            report: report.clone(),
        });
        Ok(report)
    }

    /// One network attempt for one action. Storage errors while recording the
    /// result are logged; they do not stop the cycle.
    async fn replay(&self, action: &QueuedAction) -> ActionState {
        debug!("replaying action {} ({} {})", action.id, action.method, action.url);
        self.set_in_flight(Some(action.id));
        self.emit(SyncEvent::ActionSyncing { id: action.id });

        let failure = match self.transport.send(&action.to_request()).await {
            Ok(resp) if resp.success => None,
            Ok(resp) => Some(
                resp.error
                    .or(resp.message)
                    .unwrap_or_else(|| "server reported failure".to_string()),
            ),
            Err(e) => Some(e.to_string()),
        };
        self.set_in_flight(None);

        let Some(reason) = failure else {
            if let Err(e) = self.queue.remove(action.id) {
                error!("replayed action {} but could not remove it: {e}", action.id);
            }
            self.emit(SyncEvent::ActionReplayed { id: action.id });
            return ActionState::Done;
        };

        match self.queue.bump_retry(action.id) {
            Ok(Some(retry_count)) if retry_count >= self.queue.max_retries() => {
                self.emit(SyncEvent::ActionFailed {
                    id: action.id,
                    retry_count,
                    error: reason,
                });
                self.emit(SyncEvent::ActionDeadLettered { id: action.id });
                ActionState::DeadLettered
            }
            Ok(Some(retry_count)) => {
                debug!("action {} failed (attempt {retry_count}): {reason}", action.id);
                self.emit(SyncEvent::ActionFailed {
                    id: action.id,
                    retry_count,
                    error: reason,
                });
                ActionState::Failed { retry_count }
            }
            Ok(None) => {
                // Removed concurrently (another session replayed it).
                debug!("action {} vanished during replay", action.id);
                ActionState::Done
            }
            Err(e) => {
                error!("could not record failed replay of {}: {e}", action.id);
                ActionState::Failed {
                    retry_count: action.retry_count,
                }
            }
        }
    }

    /// Spawns a task that triggers a cycle on every offline → online edge.
    pub fn watch_network(self: &Arc<Self>, network: &NetworkObserver) -> JoinHandle<()> {
        let mut subscription = network.subscribe();
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let mut was_online = subscription.current().is_online;
            while let Some(status) = subscription.changed().await {
                if status.is_online && !was_online {
                    info!("back online, starting sync");
                    if let Err(e) = coordinator.trigger().await {
                        warn!("sync after reconnect failed: {e}");
                    }
                }
                was_online = status.is_online;
            }
            debug!("network observer dropped, stopping sync listener");
        })
    }
}
