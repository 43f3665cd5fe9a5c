//! Restart Coordinator Integration Tests
//!
//! The fake cluster hosts a runtime deployment that scales down and back up
//! on request, so every restart cycle runs the full five-step recycle.

mod common;

use appstore_core::events::{LogNotifier, RestartEvent};
use appstore_core::monitoring::{
    ConnectivityTracker, IgnoreReason, ProcessControl, RestartCoordinator, RestartDecision,
    SelfRestartOutcome,
};
use appstore_core::orchestration::Orchestrator;
use appstore_core::persistence::{JsonFileStore, RestartRecord};
use async_trait::async_trait;
use common::{FakeCluster, RECYCLE_ARMS};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast::Receiver;

#[derive(Default)]
struct RecordingControl {
    restarts: AtomicUsize,
}

#[async_trait]
impl ProcessControl for RecordingControl {
    async fn service_active(&self, _unit: &str) -> bool {
        true
    }

    async fn restart_service(&self, _unit: &str) -> bool {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        true
    }

    async fn relaunch_self(&self) -> bool {
        false
    }
}

struct Harness {
    coordinator: RestartCoordinator,
    control: Arc<RecordingControl>,
    state_dir: TempDir,
    cluster: FakeCluster,
}

impl Harness {
    fn scale_calls(&self, replicas: u32) -> usize {
        let call = format!("scale deployment sdv-runtime --replicas={replicas} -n default");
        self.cluster.calls().iter().filter(|c| **c == call).count()
    }
}

fn harness() -> Harness {
    let cluster = FakeCluster::new(RECYCLE_ARMS);
    let config = cluster.config();

    let state_dir = tempfile::tempdir().unwrap();
    let control = Arc::new(RecordingControl::default());
    let (orchestrator, _owner) = Orchestrator::start(Arc::new(config), Arc::new(LogNotifier));
    let coordinator = RestartCoordinator::new(
        orchestrator,
        control.clone(),
        Arc::new(JsonFileStore::new(state_dir.path())),
        Arc::new(LogNotifier),
    );

    Harness {
        coordinator,
        control,
        state_dir,
        cluster,
    }
}

async fn next_event(events: &mut Receiver<RestartEvent>) -> RestartEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for a restart event")
        .expect("restart event channel closed")
}

async fn complete_one_cycle(
    coordinator: &RestartCoordinator,
    events: &mut Receiver<RestartEvent>,
    cycle: u32,
) {
    assert!(matches!(
        coordinator.on_connection_restored(),
        RestartDecision::Scheduled { cycle: c, .. } if c == cycle
    ));
    assert_eq!(next_event(events).await, RestartEvent::RestartStarted { cycle });
    assert_eq!(
        next_event(events).await,
        RestartEvent::RestartCompleted {
            cycle,
            success: true
        }
    );
}

#[tokio::test]
async fn test_cycle_limit_stops_restarts_until_reset() {
    let harness = harness();
    let coordinator = &harness.coordinator;
    let mut events = coordinator.subscribe();

    for cycle in 1..=3 {
        complete_one_cycle(coordinator, &mut events, cycle).await;
    }
    assert_eq!(coordinator.policy_state().cycle_count, 3);
    assert_eq!(harness.scale_calls(0), 3);
    assert_eq!(harness.scale_calls(1), 3);

    assert_eq!(
        coordinator.on_connection_restored(),
        RestartDecision::Ignored(IgnoreReason::CycleLimitReached)
    );
    assert_eq!(
        next_event(&mut events).await,
        RestartEvent::RestartCycleLimitReached {
            cycle_count: 3,
            cycle_limit: 3
        }
    );
    assert_eq!(coordinator.policy_state().cycle_count, 3);

    coordinator.reset_cycle_count();
    complete_one_cycle(coordinator, &mut events, 1).await;
    assert_eq!(harness.scale_calls(0), 4);
}

#[tokio::test]
async fn test_raised_limit_allows_more_cycles() {
    let harness = harness();
    let coordinator = &harness.coordinator;
    let mut events = coordinator.subscribe();

    coordinator.set_cycle_limit(1).unwrap();
    complete_one_cycle(coordinator, &mut events, 1).await;
    assert_eq!(
        coordinator.on_connection_restored(),
        RestartDecision::Ignored(IgnoreReason::CycleLimitReached)
    );

    coordinator.set_cycle_limit(2).unwrap();
    // Drain the limit-reached event
    next_event(&mut events).await;
    complete_one_cycle(coordinator, &mut events, 2).await;
}

#[tokio::test]
async fn test_connectivity_edges_drive_restarts() {
    let harness = harness();
    let coordinator = &harness.coordinator;
    let mut events = coordinator.subscribe();

    let tracker = Arc::new(ConnectivityTracker::default());
    let _listener = coordinator.attach(Arc::clone(&tracker));

    // First observation only establishes the baseline
    tracker.observe(true);
    tracker.observe(false);
    tracker.observe(true);

    assert_eq!(next_event(&mut events).await, RestartEvent::RestartStarted { cycle: 1 });
    assert!(matches!(
        next_event(&mut events).await,
        RestartEvent::RestartCompleted { cycle: 1, .. }
    ));
}

#[tokio::test]
async fn test_self_restart_goes_through_service_manager() {
    let harness = harness();
    let coordinator = &harness.coordinator;
    let mut events = coordinator.subscribe();

    let outcome = coordinator.restart_self("Manual restart").await.unwrap();
    assert_eq!(outcome, SelfRestartOutcome::ServiceManager);
    assert_eq!(harness.control.restarts.load(Ordering::SeqCst), 1);
    assert_eq!(
        next_event(&mut events).await,
        RestartEvent::ShutdownRequested { exit_code: 0 }
    );

    let store = JsonFileStore::new(harness.state_dir.path());
    let record = RestartRecord::load(&store, "auto_restart_state")
        .unwrap()
        .expect("restart record should be written before recycling");
    assert_eq!(record.reason, "Manual restart");
}

#[tokio::test]
async fn test_force_restart_recycles_runtime_then_self() {
    let harness = harness();
    let outcome = harness.coordinator.force_restart_both().await.unwrap();
    assert_eq!(outcome, SelfRestartOutcome::ServiceManager);
    assert_eq!(harness.control.restarts.load(Ordering::SeqCst), 1);
}
