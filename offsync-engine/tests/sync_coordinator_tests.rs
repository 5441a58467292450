mod support;

use async_trait::async_trait;
use chrono::Duration;
use offsync_engine::action_queue::IDEMPOTENCY_HEADER;
use offsync_engine::sync_coordinator::ActionOutcome;
use offsync_engine::{
    ActionQueue, ActionState, ApiResponse, EngineError, EngineResult, NetworkObserver,
    OutboundRequest, RequestOptions, SyncCoordinator, SyncEvent, SyncOutcome, Transport,
};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use support::{test_store, ScriptedTransport};
use tokio::sync::Notify;
use uuid::Uuid;

fn post(url: &str) -> OutboundRequest {
    RequestOptions::post(json!({ "to": url })).into_request(url)
}

fn outcome(id: Uuid, state: ActionState) -> ActionOutcome {
    ActionOutcome { id, state }
}

fn completed(outcome: SyncOutcome) -> offsync_engine::SyncReport {
    match outcome {
        SyncOutcome::Completed(report) => report,
        SyncOutcome::AlreadyRunning => panic!("expected a completed cycle"),
    }
}

#[tokio::test]
async fn empty_queue_completes_without_calls() {
    let (store, _) = test_store();
    let transport = ScriptedTransport::always_ok();
    let coordinator = SyncCoordinator::new(ActionQueue::new(store), transport.clone());

    let report = completed(coordinator.trigger().await.unwrap());
    assert_eq!(report.attempted, 0);
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn replays_in_fifo_order_and_drains() {
    let (store, clock) = test_store();
    let queue = ActionQueue::new(store);
    for url in ["/a", "/b", "/c"] {
        queue.enqueue(post(url)).unwrap();
        clock.advance(Duration::seconds(1));
    }
    let transport = ScriptedTransport::always_ok();
    let coordinator = SyncCoordinator::new(queue.clone(), transport.clone());

    let report = completed(coordinator.trigger().await.unwrap());

    assert_eq!(transport.call_urls(), vec!["/a", "/b", "/c"]);
    assert_eq!(report.attempted, 3);
    assert_eq!(report.succeeded, 3);
    assert!(queue.is_empty().unwrap());
}

#[tokio::test]
async fn replay_carries_the_original_request() {
    let (store, _) = test_store();
    let queue = ActionQueue::new(store);
    let request = RequestOptions::patch(json!({"limit": 10}))
        .header("X-Trace", "t1")
        .into_request("/limits");
    let action = queue.enqueue(request).unwrap();
    let transport = ScriptedTransport::always_ok();
    let coordinator = SyncCoordinator::new(queue, transport.clone());

    coordinator.trigger().await.unwrap();

    let calls = transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].method, offsync_engine::HttpMethod::Patch);
    assert_eq!(calls[0].body, Some(json!({"limit": 10})));
    assert_eq!(calls[0].headers.get("X-Trace").map(String::as_str), Some("t1"));
    assert_eq!(calls[0].headers.get(IDEMPOTENCY_HEADER), Some(&action.id.to_string()));
}

#[tokio::test]
async fn one_failure_does_not_stop_the_cycle() {
    let (store, clock) = test_store();
    let queue = ActionQueue::new(store);
    let a = queue.enqueue(post("/a")).unwrap();
    clock.advance(Duration::seconds(1));
    let b = queue.enqueue(post("/b")).unwrap();
    clock.advance(Duration::seconds(1));
    let c = queue.enqueue(post("/c")).unwrap();

    let transport = ScriptedTransport::new(|req| {
        if req.url == "/b" {
            Err(EngineError::Http {
                status: 500,
                body: "boom".into(),
            })
        } else {
            Ok(ApiResponse::ok(json!({})))
        }
    });
    let coordinator = SyncCoordinator::new(queue.clone(), transport.clone());

    let report = completed(coordinator.trigger().await.unwrap());

    assert_eq!(transport.call_urls(), vec!["/a", "/b", "/c"]);
    assert_eq!(
        report.actions,
        vec![
            outcome(a.id, ActionState::Done),
            outcome(b.id, ActionState::Failed { retry_count: 1 }),
            outcome(c.id, ActionState::Done),
        ]
    );
    let remaining = queue.candidates().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, b.id);
    assert_eq!(remaining[0].retry_count, 1);
}

#[tokio::test]
async fn server_reported_failure_counts_as_failure() {
    let (store, _) = test_store();
    let queue = ActionQueue::new(store);
    let action = queue.enqueue(post("/a")).unwrap();
    let transport = ScriptedTransport::new(|_| Ok(ApiResponse::failure("insufficient funds")));
    let coordinator = SyncCoordinator::new(queue.clone(), transport);

    let report = completed(coordinator.trigger().await.unwrap());

    assert_eq!(report.failed, 1);
    assert_eq!(queue.get(action.id).unwrap().unwrap().retry_count, 1);
}

#[tokio::test]
async fn action_is_dead_lettered_after_three_failed_cycles() {
    let (store, _) = test_store();
    let queue = ActionQueue::new(store);
    let action = queue.enqueue(post("/a")).unwrap();
    let transport = ScriptedTransport::always_down();
    let coordinator = SyncCoordinator::new(queue.clone(), transport.clone());

    for _ in 0..3 {
        coordinator.trigger().await.unwrap();
    }
    let report = completed(coordinator.trigger().await.unwrap());

    assert_eq!(transport.calls().len(), 3);
    assert_eq!(report.attempted, 0);
    assert!(queue.candidates().unwrap().is_empty());
    assert_eq!(queue.len().unwrap(), 1);
    assert_eq!(queue.get(action.id).unwrap().unwrap().retry_count, 3);
}

#[tokio::test]
async fn third_failure_is_reported_as_dead_letter() {
    let (store, _) = test_store();
    let queue = ActionQueue::new(store);
    let action = queue.enqueue(post("/a")).unwrap();
    let coordinator = SyncCoordinator::new(queue, ScriptedTransport::always_down());

    coordinator.trigger().await.unwrap();
    coordinator.trigger().await.unwrap();
    let report = completed(coordinator.trigger().await.unwrap());

    assert_eq!(report.dead_lettered, 1);
    assert_eq!(
        report.actions,
        vec![outcome(action.id, ActionState::DeadLettered)]
    );
}

#[tokio::test]
async fn idle_action_state_follows_retry_count() {
    let (store, _) = test_store();
    let queue = ActionQueue::new(store);
    let action = queue.enqueue(post("/a")).unwrap();
    let coordinator = SyncCoordinator::new(queue, ScriptedTransport::always_down());
    assert_eq!(coordinator.action_state(action.id).unwrap(), Some(ActionState::Enqueued));

    coordinator.trigger().await.unwrap();
    assert_eq!(
        coordinator.action_state(action.id).unwrap(),
        Some(ActionState::Failed { retry_count: 1 })
    );

    coordinator.trigger().await.unwrap();
    coordinator.trigger().await.unwrap();
    assert_eq!(coordinator.action_state(action.id).unwrap(), Some(ActionState::DeadLettered));
}

#[tokio::test]
async fn requeued_action_is_replayed_again() {
    let (store, _) = test_store();
    let queue = ActionQueue::with_max_retries(store, 1);
    let action = queue.enqueue(post("/a")).unwrap();
    let down = SyncCoordinator::new(queue.clone(), ScriptedTransport::always_down());
    down.trigger().await.unwrap();
    assert_eq!(queue.dead_lettered().unwrap().len(), 1);

    queue.requeue(action.id).unwrap();
    let up = SyncCoordinator::new(queue.clone(), ScriptedTransport::always_ok());
    let report = completed(up.trigger().await.unwrap());

    assert_eq!(report.succeeded, 1);
    assert!(queue.is_empty().unwrap());
}

#[tokio::test]
async fn events_follow_the_cycle() {
    let (store, clock) = test_store();
    let queue = ActionQueue::new(store);
    let a = queue.enqueue(post("/a")).unwrap();
    clock.advance(Duration::seconds(1));
    let b = queue.enqueue(post("/b")).unwrap();

    let transport = ScriptedTransport::new(|req| {
        if req.url == "/a" {
            Ok(ApiResponse::ok(json!({})))
        } else {
            Err(EngineError::Network("down".into()))
        }
    });
    let coordinator = SyncCoordinator::new(queue, transport);
    let mut events = coordinator.subscribe();

    let report = completed(coordinator.trigger().await.unwrap());

    assert_eq!(events.recv().await.unwrap(), SyncEvent::CycleStarted { candidates: 2 });
    assert_eq!(events.recv().await.unwrap(), SyncEvent::ActionSyncing { id: a.id });
    assert_eq!(events.recv().await.unwrap(), SyncEvent::ActionReplayed { id: a.id });
    assert_eq!(events.recv().await.unwrap(), SyncEvent::ActionSyncing { id: b.id });
    assert_eq!(
        events.recv().await.unwrap(),
        SyncEvent::ActionFailed {
            id: b.id,
            retry_count: 1,
            error: "network failure: down".into(),
        }
    );
    assert_eq!(events.recv().await.unwrap(), SyncEvent::CycleCompleted { report });
}

/// Blocks every send until released, counting entries.
struct GatedTransport {
    entered: Notify,
    release: Notify,
    sends: AtomicUsize,
}

#[async_trait]
impl Transport for GatedTransport {
    async fn send(&self, _request: &OutboundRequest) -> EngineResult<ApiResponse> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.release.notified().await;
        Ok(ApiResponse::ok(json!({})))
    }
}

#[tokio::test]
async fn trigger_while_busy_is_a_no_op() {
    let (store, _) = test_store();
    let queue = ActionQueue::new(store);
    let action = queue.enqueue(post("/a")).unwrap();
    let transport = Arc::new(GatedTransport {
        entered: Notify::new(),
        release: Notify::new(),
        sends: AtomicUsize::new(0),
    });
    let coordinator = Arc::new(SyncCoordinator::new(queue.clone(), transport.clone()));

    let first = tokio::spawn({
        let coordinator = Arc::clone(&coordinator);
        async move { coordinator.trigger().await }
    });
    transport.entered.notified().await;
    assert!(coordinator.is_syncing());
    assert_eq!(coordinator.action_state(action.id).unwrap(), Some(ActionState::Syncing));

    assert_eq!(coordinator.trigger().await.unwrap(), SyncOutcome::AlreadyRunning);

    transport.release.notify_one();
    let report = completed(first.await.unwrap().unwrap());
    assert_eq!(report.succeeded, 1);
    assert_eq!(transport.sends.load(Ordering::SeqCst), 1);
    assert!(!coordinator.is_syncing());
    assert_eq!(coordinator.action_state(action.id).unwrap(), None);
    assert!(queue.is_empty().unwrap());
}

#[tokio::test]
async fn disconnect_mid_cycle_does_not_abort_it() {
    let (store, clock) = test_store();
    let queue = ActionQueue::new(store);
    let a = queue.enqueue(post("/a")).unwrap();
    clock.advance(Duration::seconds(1));
    let b = queue.enqueue(post("/b")).unwrap();
    let transport = Arc::new(GatedTransport {
        entered: Notify::new(),
        release: Notify::new(),
        sends: AtomicUsize::new(0),
    });
    let network = NetworkObserver::new(false);
    let coordinator = Arc::new(SyncCoordinator::new(queue.clone(), transport.clone()));
    let mut events = coordinator.subscribe();
    let handle = coordinator.watch_network(&network);

    network.set_online(true);
    transport.entered.notified().await;
    assert_eq!(coordinator.action_state(a.id).unwrap(), Some(ActionState::Syncing));
    assert_eq!(coordinator.action_state(b.id).unwrap(), Some(ActionState::Enqueued));
    network.set_online(false);
    transport.release.notify_one();
    transport.entered.notified().await;
    transport.release.notify_one();

    let report = tokio::time::timeout(std::time::Duration::from_secs(2), async {
        loop {
            if let SyncEvent::CycleCompleted { report } = events.recv().await.unwrap() {
                return report;
            }
        }
    })
    .await
    .unwrap();
    handle.abort();

    assert_eq!(transport.sends.load(Ordering::SeqCst), 2);
    assert_eq!(
        report.actions,
        vec![
            outcome(a.id, ActionState::Done),
            outcome(b.id, ActionState::Done),
        ]
    );
    assert!(queue.is_empty().unwrap());
}

#[tokio::test]
async fn reconnect_triggers_a_cycle() {
    let (store, _) = test_store();
    let queue = ActionQueue::new(store);
    queue.enqueue(post("/a")).unwrap();
    let network = NetworkObserver::new(false);
    let coordinator = Arc::new(SyncCoordinator::new(queue.clone(), ScriptedTransport::always_ok()));
    let mut events = coordinator.subscribe();
    let handle = coordinator.watch_network(&network);

    network.set_online(true);

    let completed_report = tokio::time::timeout(std::time::Duration::from_secs(2), async {
        loop {
            if let SyncEvent::CycleCompleted { report } = events.recv().await.unwrap() {
                return report;
            }
        }
    })
    .await
    .unwrap();
    handle.abort();

    assert_eq!(completed_report.succeeded, 1);
    assert!(queue.is_empty().unwrap());
}

#[tokio::test]
async fn going_offline_does_not_trigger() {
    let (store, _) = test_store();
    let queue = ActionQueue::new(store);
    queue.enqueue(post("/a")).unwrap();
    let network = NetworkObserver::new(true);
    let transport = ScriptedTransport::always_ok();
    let coordinator = Arc::new(SyncCoordinator::new(queue.clone(), transport.clone()));
    let handle = coordinator.watch_network(&network);

    network.set_online(false);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    handle.abort();

    assert!(transport.calls().is_empty());
    assert_eq!(queue.len().unwrap(), 1);
}
