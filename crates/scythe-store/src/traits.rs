//! Core trait for repair bookkeeping storage.

use scythe_ring::{Natural, RingRange};
use scythe_types::{
    Cluster, ColumnFamily, ColumnFamilyId, NewColumnFamily, NewRepairRun, RepairRun,
    RepairSegment, RunId, SegmentId, SegmentState,
};

use crate::error::StoreError;

/// Trait for persisting clusters, tables, repair runs and segments.
///
/// All implementations must be `Send + Sync` so the HTTP layer and the repair
/// runner can share one store. Segments of a run are always returned in id
/// order, which is the ring order they were generated in.
pub trait RepairStore: Send + Sync {
    /// Whether the backend is usable.
    fn is_connected(&self) -> bool;

    /// Register a cluster. Fails if the name is taken.
    fn add_cluster(&self, cluster: Cluster) -> Result<Cluster, StoreError>;

    /// Look up a cluster by name.
    fn get_cluster(&self, name: &str) -> Result<Option<Cluster>, StoreError>;

    /// All registered clusters, ordered by name.
    fn get_clusters(&self) -> Result<Vec<Cluster>, StoreError>;

    /// Register a table. Fails if the cluster/keyspace/table triple exists.
    fn add_column_family(&self, new: NewColumnFamily) -> Result<ColumnFamily, StoreError>;

    /// Look up a table by id.
    fn get_column_family(&self, id: ColumnFamilyId) -> Result<Option<ColumnFamily>, StoreError>;

    /// Look up a table by cluster, keyspace and table name.
    fn get_column_family_by_name(
        &self,
        cluster_name: &str,
        keyspace_name: &str,
        name: &str,
    ) -> Result<Option<ColumnFamily>, StoreError>;

    /// Create a run in [`RunState::NotStarted`](scythe_types::RunState::NotStarted).
    fn add_repair_run(&self, new: NewRepairRun) -> Result<RepairRun, StoreError>;

    /// Look up a run by id.
    fn get_repair_run(&self, id: RunId) -> Result<Option<RepairRun>, StoreError>;

    /// All runs against a cluster, ordered by id.
    fn get_repair_runs_for_cluster(&self, cluster_name: &str)
    -> Result<Vec<RepairRun>, StoreError>;

    /// Overwrite a stored run. Fails if it does not exist.
    fn update_repair_run(&self, run: &RepairRun) -> Result<(), StoreError>;

    /// Store one not-started segment per range, in order, for an existing run.
    fn add_repair_segments(
        &self,
        run_id: RunId,
        ranges: Vec<RingRange>,
    ) -> Result<Vec<RepairSegment>, StoreError>;

    /// Look up a segment by id.
    fn get_repair_segment(&self, id: SegmentId) -> Result<Option<RepairSegment>, StoreError>;

    /// All segments of a run, ordered by id.
    fn get_repair_segments(&self, run_id: RunId) -> Result<Vec<RepairSegment>, StoreError>;

    /// Overwrite a stored segment. Fails if it does not exist.
    fn update_repair_segment(&self, segment: &RepairSegment) -> Result<(), StoreError>;

    /// The lowest-id segment of the run that has not been started.
    fn get_next_free_segment(&self, run_id: RunId) -> Result<Option<RepairSegment>, StoreError> {
        Ok(self
            .get_repair_segments(run_id)?
            .into_iter()
            .find(|s| s.state == SegmentState::NotStarted))
    }

    /// The lowest-id not-started segment whose range is enclosed by `range`.
    fn get_next_free_segment_in_range(
        &self,
        run_id: RunId,
        range: &RingRange,
    ) -> Result<Option<RepairSegment>, StoreError> {
        Ok(self
            .get_repair_segments(run_id)?
            .into_iter()
            .find(|s| s.state == SegmentState::NotStarted && range.encloses(&s.token_range)))
    }

    /// The lowest-id not-started segment that is a sub-arc of `owner` on a
    /// ring of `ring_size` positions.
    ///
    /// Use this to group segments by the token range they were cut from:
    /// an arc ending at zero is only matched by the owner that reaches zero.
    fn get_next_free_segment_owned_by(
        &self,
        run_id: RunId,
        owner: &RingRange,
        ring_size: &Natural,
    ) -> Result<Option<RepairSegment>, StoreError> {
        Ok(self.get_repair_segments(run_id)?.into_iter().find(|s| {
            s.state == SegmentState::NotStarted && s.token_range.lies_within(owner, ring_size)
        }))
    }

    /// Number of segments of the run in the given state.
    fn segments_amount(&self, run_id: RunId, state: SegmentState) -> Result<usize, StoreError> {
        Ok(self
            .get_repair_segments(run_id)?
            .iter()
            .filter(|s| s.state == state)
            .count())
    }
}
