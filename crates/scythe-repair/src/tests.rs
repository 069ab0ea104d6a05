//! Tests for the repair runner.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use scythe_ring::{Partitioner, RingRange};
use scythe_store::{MemoryStore, RepairStore};
use scythe_types::{
    Cluster, ColumnFamily, NewColumnFamily, RunId, RunState, SegmentState,
};

use crate::{RepairError, RepairRunner, RunnerConfig, SegmentRepairer};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

const THREE_NODE_RING: [&str; 3] = [
    "-9223372036854775808",
    "-3074457345618258603",
    "3074457345618258602",
];

/// A repairer that records what it was asked to do.
#[derive(Default)]
struct MockRepairer {
    delay: Duration,
    /// Fail this many attempts before succeeding.
    fail_first: AtomicUsize,
    always_fail: bool,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    ranges: Mutex<Vec<RingRange>>,
    snapshots: AtomicUsize,
}

impl MockRepairer {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }
}

#[async_trait::async_trait]
impl SegmentRepairer for MockRepairer {
    async fn repair_segment(
        &self,
        _cluster: &Cluster,
        keyspace: &str,
        tables: &[String],
        range: &RingRange,
        snapshot: bool,
    ) -> Result<(), RepairError> {
        assert_eq!(keyspace, "ks");
        if snapshot {
            self.snapshots.fetch_add(1, Ordering::SeqCst);
        }
        assert_eq!(tables, ["events".to_string()]);

        self.calls.fetch_add(1, Ordering::SeqCst);
        self.ranges.lock().unwrap().push(range.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.always_fail {
            return Err(RepairError::Transport("node unreachable".to_string()));
        }
        let failed = self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(RepairError::Transport("repair session timed out".to_string()));
        }
        Ok(())
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    runner: Arc<RepairRunner>,
    repairer: Arc<MockRepairer>,
    cluster: Cluster,
    table: ColumnFamily,
}

impl Harness {
    fn new(repairer: MockRepairer, run_threads: usize, tokens: &[&str]) -> Self {
        let store = Arc::new(MemoryStore::new());
        let repairer = Arc::new(repairer);
        let runner = RepairRunner::new(
            store.clone(),
            repairer.clone(),
            RunnerConfig {
                run_threads,
                max_segment_failures: 3,
                poll_interval_ms: 5,
                max_segment_count: 1000,
            },
        );

        let cluster = store
            .add_cluster(Cluster {
                name: "prod".to_string(),
                partitioner: Partitioner::Murmur3,
                seed_hosts: vec!["10.0.0.1".to_string()],
                ring_tokens: tokens.iter().map(|t| t.to_string()).collect(),
            })
            .unwrap();
        let table = store
            .add_column_family(NewColumnFamily {
                cluster_name: "prod".to_string(),
                keyspace_name: "ks".to_string(),
                name: "events".to_string(),
                segment_count: 10,
                snapshot_repair: false,
            })
            .unwrap();

        Self {
            store,
            runner,
            repairer,
            cluster,
            table,
        }
    }

    fn create_run(&self, segment_count: u64) -> RunId {
        let (run, _) = self
            .runner
            .create_run(
                &self.cluster,
                &self.table,
                segment_count,
                "ops".to_string(),
                "test".to_string(),
                1.0,
            )
            .unwrap();
        run.id
    }

    fn state(&self, run_id: RunId) -> RunState {
        self.store.get_repair_run(run_id).unwrap().unwrap().state
    }

    fn done(&self, run_id: RunId) -> usize {
        self.store
            .segments_amount(run_id, SegmentState::Done)
            .unwrap()
    }

    async fn wait_for(&self, run_id: RunId, state: RunState) {
        for _ in 0..500 {
            if self.state(run_id) == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "run {run_id} never reached {state:?}, stuck in {:?}",
            self.state(run_id)
        );
    }
}

// ---------------------------------------------------------------------------
// Run creation
// ---------------------------------------------------------------------------

#[test]
fn test_create_run_stores_segments() {
    let h = Harness::new(MockRepairer::default(), 1, &THREE_NODE_RING);
    let (run, segments) = h
        .runner
        .create_run(&h.cluster, &h.table, 9, "ops".into(), "nightly".into(), 0.5)
        .unwrap();

    assert_eq!(run.state, RunState::NotStarted);
    assert_eq!(run.intensity, 0.5);
    assert!(segments.len() >= 9);
    assert_eq!(h.store.get_repair_segments(run.id).unwrap(), segments);
}

#[test]
fn test_create_run_rejects_bad_ring_without_storing() {
    let h = Harness::new(MockRepairer::default(), 1, &["0", "0"]);
    let err = h
        .runner
        .create_run(&h.cluster, &h.table, 4, "ops".into(), "test".into(), 1.0)
        .unwrap_err();
    assert!(matches!(err, RepairError::Ring(_)));
    assert!(h.store.get_repair_runs_for_cluster("prod").unwrap().is_empty());
}

#[test]
fn test_create_run_rejects_bad_intensity() {
    let h = Harness::new(MockRepairer::default(), 1, &THREE_NODE_RING);
    for intensity in [0.0, -1.0, 1.5] {
        let err = h
            .runner
            .create_run(&h.cluster, &h.table, 4, "ops".into(), "test".into(), intensity)
            .unwrap_err();
        assert!(matches!(err, RepairError::InvalidIntensity(_)));
    }
}

#[test]
fn test_create_run_rejects_too_many_segments() {
    let h = Harness::new(MockRepairer::default(), 1, &THREE_NODE_RING);
    let err = h
        .runner
        .create_run(&h.cluster, &h.table, 1001, "ops".into(), "test".into(), 1.0)
        .unwrap_err();
    assert!(matches!(
        err,
        RepairError::TooManySegments {
            requested: 1001,
            max: 1000
        }
    ));
    assert!(h.store.get_repair_runs_for_cluster("prod").unwrap().is_empty());
    assert_eq!(h.runner.max_segment_count(), 1000);
}

// ---------------------------------------------------------------------------
// Run lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_run_completes() {
    let h = Harness::new(MockRepairer::default(), 4, &THREE_NODE_RING);
    let run_id = h.create_run(12);
    let total = h.store.get_repair_segments(run_id).unwrap().len();

    let run = h.runner.trigger(run_id).unwrap();
    assert_eq!(run.state, RunState::Running);
    assert!(run.start_time.is_some());

    h.wait_for(run_id, RunState::Done).await;
    assert_eq!(h.done(run_id), total);
    assert_eq!(h.repairer.calls.load(Ordering::SeqCst), total);

    let run = h.store.get_repair_run(run_id).unwrap().unwrap();
    assert!(run.end_time.is_some());
    assert!(
        h.store
            .get_repair_segments(run_id)
            .unwrap()
            .iter()
            .all(|s| s.end_time.is_some() && s.fail_count == 0)
    );
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let h = Harness::new(
        MockRepairer::with_delay(Duration::from_millis(20)),
        2,
        &THREE_NODE_RING,
    );
    let run_id = h.create_run(12);

    h.runner.trigger(run_id).unwrap();
    h.wait_for(run_id, RunState::Done).await;

    let max = h.repairer.max_in_flight.load(Ordering::SeqCst);
    assert!(max <= 2, "saw {max} concurrent repairs");
    assert!(max >= 1);
}

#[tokio::test]
async fn test_failed_segments_are_retried() {
    let repairer = MockRepairer {
        fail_first: AtomicUsize::new(2),
        ..MockRepairer::default()
    };
    let h = Harness::new(repairer, 1, &THREE_NODE_RING);
    let run_id = h.create_run(6);
    let total = h.store.get_repair_segments(run_id).unwrap().len();

    h.runner.trigger(run_id).unwrap();
    h.wait_for(run_id, RunState::Done).await;

    assert_eq!(h.repairer.calls.load(Ordering::SeqCst), total + 2);
    let failures: u32 = h
        .store
        .get_repair_segments(run_id)
        .unwrap()
        .iter()
        .map(|s| s.fail_count)
        .sum();
    assert_eq!(failures, 2);
}

#[tokio::test]
async fn test_run_errors_after_failure_limit() {
    let repairer = MockRepairer {
        always_fail: true,
        ..MockRepairer::default()
    };
    let h = Harness::new(repairer, 1, &THREE_NODE_RING);
    let run_id = h.create_run(6);

    h.runner.trigger(run_id).unwrap();
    h.wait_for(run_id, RunState::Error).await;

    let run = h.store.get_repair_run(run_id).unwrap().unwrap();
    assert!(run.end_time.is_some());
    assert!(run.last_event.contains("failed 3 times"), "{}", run.last_event);
    assert_eq!(h.done(run_id), 0);
    assert!(
        h.store
            .get_repair_segments(run_id)
            .unwrap()
            .iter()
            .any(|s| s.fail_count == 3)
    );

    // A failed run cannot be restarted.
    let err = h.runner.trigger(run_id).unwrap_err();
    assert!(matches!(
        err,
        RepairError::InvalidState {
            state: RunState::Error,
            ..
        }
    ));
}

#[tokio::test]
async fn test_pause_stops_dispatch_and_resume_finishes() {
    let h = Harness::new(
        MockRepairer::with_delay(Duration::from_millis(30)),
        1,
        &["0"],
    );
    let run_id = h.create_run(16);

    h.runner.trigger(run_id).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let run = h.runner.pause(run_id).unwrap();
    assert_eq!(run.state, RunState::Paused);
    assert!(run.pause_time.is_some());

    // Let the in-flight segment drain, then make sure nothing else starts.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let done_after_pause = h.done(run_id);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(h.done(run_id), done_after_pause);
    assert!(done_after_pause < 16);
    assert_eq!(h.state(run_id), RunState::Paused);

    let run = h.runner.trigger(run_id).unwrap();
    assert_eq!(run.last_event, "run resumed");
    h.wait_for(run_id, RunState::Done).await;
    assert_eq!(h.done(run_id), 16);
}

#[tokio::test]
async fn test_invalid_transitions() {
    let h = Harness::new(MockRepairer::default(), 1, &THREE_NODE_RING);
    let run_id = h.create_run(3);

    let err = h.runner.pause(run_id).unwrap_err();
    assert!(matches!(
        err,
        RepairError::InvalidState {
            state: RunState::NotStarted,
            action: "pause",
            ..
        }
    ));

    let err = h.runner.trigger(RunId::from(999)).unwrap_err();
    assert!(matches!(err, RepairError::NotFound { .. }));

    h.runner.trigger(run_id).unwrap();
    h.wait_for(run_id, RunState::Done).await;
    let err = h.runner.trigger(run_id).unwrap_err();
    assert!(matches!(
        err,
        RepairError::InvalidState {
            state: RunState::Done,
            ..
        }
    ));
}

#[tokio::test]
async fn test_dispatch_rotates_over_owned_ranges() {
    let h = Harness::new(MockRepairer::default(), 1, &THREE_NODE_RING);
    let run_id = h.create_run(6);
    let segments = h.store.get_repair_segments(run_id).unwrap();
    // Two segments per owned range for the first two nodes.
    assert_eq!(segments.len(), 7);

    h.runner.trigger(run_id).unwrap();
    h.wait_for(run_id, RunState::Done).await;

    let ranges = h.repairer.ranges.lock().unwrap().clone();
    assert_eq!(ranges[0], segments[0].token_range);
    assert_eq!(ranges[1], segments[2].token_range);
    assert_eq!(ranges[2], segments[4].token_range);
    assert_eq!(ranges[3], segments[1].token_range);
}

#[tokio::test]
async fn test_segment_ending_at_zero_stays_with_its_owner() {
    // Two tiny ranges right after position 0 and one covering the rest of the
    // ring, whose last segment ends at zero.
    let h = Harness::new(
        MockRepairer::default(),
        1,
        &[
            "-9223372036854775808",
            "-9223372036854775708",
            "-9223372036854775608",
        ],
    );
    let run_id = h.create_run(3);
    let segments = h.store.get_repair_segments(run_id).unwrap();
    assert_eq!(segments.len(), 5);
    assert_eq!(segments[4].token_range.end().to_string(), "0");

    h.runner.trigger(run_id).unwrap();
    h.wait_for(run_id, RunState::Done).await;

    // The small ranges run dry after one segment each, so the rest come from
    // the large range in ring order.
    let ranges = h.repairer.ranges.lock().unwrap().clone();
    let expected: Vec<RingRange> = segments.iter().map(|s| s.token_range.clone()).collect();
    assert_eq!(ranges, expected);
}

#[tokio::test]
async fn test_snapshot_setting_reaches_repairer() {
    let h = Harness::new(MockRepairer::default(), 2, &THREE_NODE_RING);
    let cluster = h
        .store
        .add_cluster(Cluster {
            name: "snap".to_string(),
            ..h.cluster.clone()
        })
        .unwrap();
    let table = h
        .store
        .add_column_family(NewColumnFamily {
            cluster_name: "snap".to_string(),
            keyspace_name: "ks".to_string(),
            name: "events".to_string(),
            segment_count: 6,
            snapshot_repair: true,
        })
        .unwrap();

    let (plain, _) = h
        .runner
        .create_run(&h.cluster, &h.table, 6, "ops".into(), "test".into(), 1.0)
        .unwrap();
    h.runner.trigger(plain.id).unwrap();
    h.wait_for(plain.id, RunState::Done).await;
    assert_eq!(h.repairer.snapshots.load(Ordering::SeqCst), 0);

    let (snap, segments) = h
        .runner
        .create_run(&cluster, &table, 6, "ops".into(), "test".into(), 1.0)
        .unwrap();
    h.runner.trigger(snap.id).unwrap();
    h.wait_for(snap.id, RunState::Done).await;
    assert_eq!(h.repairer.snapshots.load(Ordering::SeqCst), segments.len());
}

#[tokio::test]
async fn test_resume_running_runs_after_restart() {
    let h = Harness::new(MockRepairer::default(), 2, &THREE_NODE_RING);
    let run_id = h.create_run(6);

    // Simulate a process that died mid-run.
    let mut run = h.store.get_repair_run(run_id).unwrap().unwrap();
    run.state = RunState::Running;
    h.store.update_repair_run(&run).unwrap();
    let mut stale = h.store.get_next_free_segment(run_id).unwrap().unwrap();
    stale.state = SegmentState::Running;
    h.store.update_repair_segment(&stale).unwrap();

    assert_eq!(h.runner.resume_running_runs().unwrap(), 1);
    h.wait_for(run_id, RunState::Done).await;
    assert_eq!(h.done(run_id), 7);
}
