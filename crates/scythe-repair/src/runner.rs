//! Repair runner: walks a run's segments and dispatches them to the
//! [`SegmentRepairer`], bounded by a semaphore shared across all runs.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use scythe_ring::{Natural, RingRange, SegmentGenerator};
use scythe_store::RepairStore;
use scythe_types::{
    Cluster, ColumnFamily, NewRepairRun, RepairRun, RepairSegment, RunId, RunState,
    SegmentState, now_secs,
};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use crate::error::RepairError;
use crate::repairer::SegmentRepairer;

/// Runner tuning.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Maximum number of segments repaired at once, across all runs.
    pub run_threads: usize,
    /// Failed attempts after which a segment aborts its run.
    pub max_segment_failures: u32,
    /// How long a run loop waits when every remaining segment is in flight.
    pub poll_interval_ms: u64,
    /// Largest segment count a run may ask for.
    pub max_segment_count: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            run_threads: 15,
            max_segment_failures: 3,
            poll_interval_ms: 100,
            max_segment_count: 100_000,
        }
    }
}

/// What a run loop needs to hand a segment to the repairer.
struct RunContext {
    cluster: Cluster,
    table: ColumnFamily,
    intensity: f64,
    total: usize,
}

/// Drives repair runs.
///
/// Each running run has one dispatch loop. The loop picks the next
/// not-started segment, rotating over the node-owned token ranges so that
/// consecutive repairs land on different replicas, waits for a permit and
/// spawns the repair. Pausing is cooperative: in-flight repairs finish,
/// nothing new is dispatched.
pub struct RepairRunner {
    store: Arc<dyn RepairStore>,
    repairer: Arc<dyn SegmentRepairer>,
    /// Bounds concurrent segment repairs.
    concurrency: Arc<Semaphore>,
    max_segment_failures: u32,
    max_segment_count: u64,
    poll_interval: Duration,
    /// Runs with a live dispatch loop.
    active: Mutex<HashSet<RunId>>,
    /// Serializes read-modify-write of run records.
    run_lock: Mutex<()>,
}

impl RepairRunner {
    /// Create a runner.
    pub fn new(
        store: Arc<dyn RepairStore>,
        repairer: Arc<dyn SegmentRepairer>,
        config: RunnerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            repairer,
            concurrency: Arc::new(Semaphore::new(config.run_threads.max(1))),
            max_segment_failures: config.max_segment_failures.max(1),
            max_segment_count: config.max_segment_count,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            active: Mutex::new(HashSet::new()),
            run_lock: Mutex::new(()),
        })
    }

    /// Largest segment count [`create_run`](Self::create_run) accepts.
    pub fn max_segment_count(&self) -> u64 {
        self.max_segment_count
    }

    /// The store this runner reads and updates.
    pub fn store(&self) -> &Arc<dyn RepairStore> {
        &self.store
    }

    /// Create a run for `table`, split into segments over the cluster's ring.
    ///
    /// Segments are generated before anything is stored, so a bad ring
    /// leaves no half-created run behind.
    pub fn create_run(
        &self,
        cluster: &Cluster,
        table: &ColumnFamily,
        segment_count: u64,
        owner: String,
        cause: String,
        intensity: f64,
    ) -> Result<(RepairRun, Vec<RepairSegment>), RepairError> {
        if !(intensity > 0.0 && intensity <= 1.0) {
            return Err(RepairError::InvalidIntensity(intensity));
        }
        if segment_count > self.max_segment_count {
            return Err(RepairError::TooManySegments {
                requested: segment_count,
                max: self.max_segment_count,
            });
        }

        let generator = SegmentGenerator::new(cluster.partitioner);
        let ranges = generator.generate_segments(segment_count, &cluster.tokens()?)?;

        let run = self.store.add_repair_run(NewRepairRun {
            cluster_name: cluster.name.clone(),
            column_family_id: table.id,
            cause,
            owner,
            intensity,
        })?;
        let segments = self.store.add_repair_segments(run.id, ranges)?;

        info!(
            run_id = %run.id,
            cluster = %cluster.name,
            keyspace = %table.keyspace_name,
            table = %table.name,
            segments = segments.len(),
            "repair run created"
        );
        Ok((run, segments))
    }

    /// Start or resume a run that is not started or paused.
    pub fn trigger(self: &Arc<Self>, run_id: RunId) -> Result<RepairRun, RepairError> {
        let run = {
            let _guard = self.run_lock.lock().expect("lock poisoned");
            let mut run = self.load_run(run_id)?;
            run.last_event = match run.state {
                RunState::NotStarted => "run started".to_string(),
                RunState::Paused => "run resumed".to_string(),
                state => {
                    return Err(RepairError::InvalidState {
                        run_id,
                        state,
                        action: "start",
                    });
                }
            };
            run.state = RunState::Running;
            run.start_time.get_or_insert_with(now_secs);
            self.store.update_repair_run(&run)?;
            run
        };

        info!(%run_id, "repair run triggered");
        self.spawn_loop(run_id);
        Ok(run)
    }

    /// Pause a running run. In-flight segments finish.
    pub fn pause(&self, run_id: RunId) -> Result<RepairRun, RepairError> {
        let _guard = self.run_lock.lock().expect("lock poisoned");
        let mut run = self.load_run(run_id)?;
        if run.state != RunState::Running {
            return Err(RepairError::InvalidState {
                run_id,
                state: run.state,
                action: "pause",
            });
        }
        run.state = RunState::Paused;
        run.pause_time = Some(now_secs());
        run.last_event = "run paused".to_string();
        self.store.update_repair_run(&run)?;
        info!(%run_id, "repair run paused");
        Ok(run)
    }

    /// Restart dispatch loops for runs left `Running` by a previous process.
    ///
    /// Segments that were in flight when the process stopped are put back
    /// to not started. Returns the number of resumed runs.
    pub fn resume_running_runs(self: &Arc<Self>) -> Result<usize, RepairError> {
        let mut resumed = 0;
        for cluster in self.store.get_clusters()? {
            for run in self.store.get_repair_runs_for_cluster(&cluster.name)? {
                if run.state != RunState::Running {
                    continue;
                }
                for mut segment in self.store.get_repair_segments(run.id)? {
                    if segment.state == SegmentState::Running {
                        segment.state = SegmentState::NotStarted;
                        self.store.update_repair_segment(&segment)?;
                    }
                }
                info!(run_id = %run.id, cluster = %cluster.name, "resuming repair run");
                self.spawn_loop(run.id);
                resumed += 1;
            }
        }
        Ok(resumed)
    }

    fn load_run(&self, run_id: RunId) -> Result<RepairRun, RepairError> {
        self.store
            .get_repair_run(run_id)?
            .ok_or_else(|| RepairError::NotFound {
                kind: "repair run",
                id: run_id.to_string(),
            })
    }

    fn spawn_loop(self: &Arc<Self>, run_id: RunId) {
        if !self.active.lock().expect("lock poisoned").insert(run_id) {
            debug!(%run_id, "dispatch loop already active");
            return;
        }

        let runner = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = Arc::clone(&runner).run_loop(run_id).await {
                error!(%run_id, error = %e, "repair run loop failed");
                runner.active.lock().expect("lock poisoned").remove(&run_id);
            }
        });
    }

    /// Whether the loop for `run_id` should stop, deregistering it if so.
    ///
    /// Checked under the `active` lock so a concurrent [`trigger`](Self::trigger)
    /// either sees the loop still registered after its state change, or
    /// registers a fresh one.
    fn should_exit(&self, run_id: RunId) -> Result<bool, RepairError> {
        let mut active = self.active.lock().expect("lock poisoned");
        let run = self.load_run(run_id)?;
        if run.state == RunState::Running {
            return Ok(false);
        }
        active.remove(&run_id);
        debug!(%run_id, state = ?run.state, "dispatch loop stopping");
        Ok(true)
    }

    async fn run_loop(self: Arc<Self>, run_id: RunId) -> Result<(), RepairError> {
        let run = self.load_run(run_id)?;
        let cluster = self
            .store
            .get_cluster(&run.cluster_name)?
            .ok_or_else(|| RepairError::NotFound {
                kind: "cluster",
                id: run.cluster_name.clone(),
            })?;
        let table = self
            .store
            .get_column_family(run.column_family_id)?
            .ok_or_else(|| RepairError::NotFound {
                kind: "column family",
                id: run.column_family_id.to_string(),
            })?;
        let generator = SegmentGenerator::new(cluster.partitioner);
        let owned = generator.token_ranges(&cluster.tokens()?)?;
        let ring_size = generator.ring_size().clone();
        let total = self.store.get_repair_segments(run_id)?.len();
        let ctx = Arc::new(RunContext {
            cluster,
            table,
            intensity: run.intensity,
            total,
        });

        info!(%run_id, segments = total, "repair run dispatch started");
        let mut cursor = 0;

        loop {
            if self.should_exit(run_id)? {
                return Ok(());
            }

            let permit = match self.concurrency.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => {
                    warn!("concurrency semaphore closed");
                    self.active.lock().expect("lock poisoned").remove(&run_id);
                    return Ok(());
                }
            };

            // The run may have been paused while we waited for the permit.
            if self.should_exit(run_id)? {
                return Ok(());
            }

            match self.next_segment(run_id, &owned, &ring_size, &mut cursor)? {
                Some(segment) => self.dispatch(segment, permit, Arc::clone(&ctx))?,
                None => {
                    drop(permit);
                    if self.store.segments_amount(run_id, SegmentState::Running)? == 0 {
                        self.finish_run(run_id, total)?;
                    } else {
                        tokio::time::sleep(self.poll_interval).await;
                    }
                }
            }
        }
    }

    /// The next not-started segment, taken from the owned ranges in turn.
    ///
    /// Falls back to plain id order for a segment that lies within no owned
    /// range.
    fn next_segment(
        &self,
        run_id: RunId,
        owned: &[RingRange],
        ring_size: &Natural,
        cursor: &mut usize,
    ) -> Result<Option<RepairSegment>, RepairError> {
        for step in 0..owned.len() {
            let i = (*cursor + step) % owned.len();
            let next = self
                .store
                .get_next_free_segment_owned_by(run_id, &owned[i], ring_size)?;
            if let Some(segment) = next {
                *cursor = i + 1;
                return Ok(Some(segment));
            }
        }
        Ok(self.store.get_next_free_segment(run_id)?)
    }

    fn dispatch(
        self: &Arc<Self>,
        mut segment: RepairSegment,
        permit: OwnedSemaphorePermit,
        ctx: Arc<RunContext>,
    ) -> Result<(), RepairError> {
        segment.state = SegmentState::Running;
        segment.start_time = Some(now_secs());
        self.store.update_repair_segment(&segment)?;

        let runner = Arc::clone(self);
        tokio::spawn(async move {
            let _permit = permit;
            let started = Instant::now();
            let result = runner.repair_one(&ctx, &segment).await;
            let elapsed = started.elapsed();
            let segment_id = segment.id;
            let run_id = segment.run_id;

            match runner.record_outcome(segment, result, ctx.total) {
                Ok(true) => {
                    // Keep the permit idle for a while so the cluster spends
                    // only `intensity` of its time repairing.
                    let idle = elapsed.mul_f64(1.0 / ctx.intensity - 1.0);
                    if !idle.is_zero() {
                        debug!(%run_id, %segment_id, ?idle, "pausing between segments");
                        tokio::time::sleep(idle).await;
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    error!(%run_id, %segment_id, error = %e, "failed to record segment outcome");
                }
            }
        });
        Ok(())
    }

    #[tracing::instrument(
        skip(self, ctx, segment),
        fields(run_id = %segment.run_id, segment_id = %segment.id, range = %segment.token_range)
    )]
    async fn repair_one(
        &self,
        ctx: &RunContext,
        segment: &RepairSegment,
    ) -> Result<(), RepairError> {
        debug!("repairing segment");
        self.repairer
            .repair_segment(
                &ctx.cluster,
                &ctx.table.keyspace_name,
                std::slice::from_ref(&ctx.table.name),
                &segment.token_range,
                ctx.table.snapshot_repair,
            )
            .await
    }

    /// Store the result of one attempt. Returns whether it succeeded.
    fn record_outcome(
        &self,
        mut segment: RepairSegment,
        result: Result<(), RepairError>,
        total: usize,
    ) -> Result<bool, RepairError> {
        let run_id = segment.run_id;
        match result {
            Ok(()) => {
                segment.state = SegmentState::Done;
                segment.end_time = Some(now_secs());
                self.store.update_repair_segment(&segment)?;

                let done = self.store.segments_amount(run_id, SegmentState::Done)?;
                info!(
                    %run_id,
                    segment_id = %segment.id,
                    progress = %format!("{done}/{total}"),
                    "segment repair completed"
                );
                Ok(true)
            }
            Err(e) => {
                segment.fail_count += 1;
                segment.state = SegmentState::NotStarted;

                if segment.fail_count >= self.max_segment_failures {
                    error!(
                        %run_id,
                        segment_id = %segment.id,
                        failures = segment.fail_count,
                        error = %e,
                        "segment exceeded failure limit, aborting run"
                    );
                    self.fail_run(
                        run_id,
                        format!(
                            "segment {} failed {} times: {e}",
                            segment.id, segment.fail_count
                        ),
                    )?;
                    // Fail the run first so the loop cannot pick the
                    // segment up again.
                    self.store.update_repair_segment(&segment)?;
                } else {
                    self.store.update_repair_segment(&segment)?;
                    warn!(
                        %run_id,
                        segment_id = %segment.id,
                        failures = segment.fail_count,
                        error = %e,
                        "segment repair failed, will retry"
                    );
                }
                Ok(false)
            }
        }
    }

    fn finish_run(&self, run_id: RunId, total: usize) -> Result<(), RepairError> {
        let _guard = self.run_lock.lock().expect("lock poisoned");
        let mut run = self.load_run(run_id)?;
        if run.state != RunState::Running {
            return Ok(());
        }
        let done = self.store.segments_amount(run_id, SegmentState::Done)?;
        if done < total {
            // Left-over segments are at their failure limit; the run has
            // already been failed or is about to be.
            return Ok(());
        }
        run.state = RunState::Done;
        run.end_time = Some(now_secs());
        run.last_event = format!("all {total} segments repaired");
        self.store.update_repair_run(&run)?;
        info!(%run_id, segments = total, "repair run finished");
        Ok(())
    }

    fn fail_run(&self, run_id: RunId, reason: String) -> Result<(), RepairError> {
        let _guard = self.run_lock.lock().expect("lock poisoned");
        let mut run = self.load_run(run_id)?;
        if run.state.is_terminal() {
            return Ok(());
        }
        run.state = RunState::Error;
        run.end_time = Some(now_secs());
        run.last_event = reason;
        self.store.update_repair_run(&run)?;
        Ok(())
    }
}
