//! In-memory repair storage backend.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use scythe_ring::RingRange;
use scythe_types::{
    Cluster, ColumnFamily, ColumnFamilyId, NewColumnFamily, NewRepairRun, RepairRun,
    RepairSegment, RunId, SegmentId, now_secs,
};
use tracing::debug;

use crate::error::StoreError;
use crate::traits::RepairStore;

/// In-memory repair store backed by `RwLock`ed maps.
///
/// Everything is lost on restart. Useful for tests and for running without
/// a data directory.
pub struct MemoryStore {
    clusters: RwLock<BTreeMap<String, Cluster>>,
    column_families: RwLock<BTreeMap<ColumnFamilyId, ColumnFamily>>,
    runs: RwLock<BTreeMap<RunId, RepairRun>>,
    segments: RwLock<BTreeMap<SegmentId, RepairSegment>>,
    /// Segment ids per run, in ring order.
    run_segments: RwLock<HashMap<RunId, Vec<SegmentId>>>,
    next_column_family_id: AtomicU64,
    next_run_id: AtomicU64,
    next_segment_id: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            clusters: RwLock::new(BTreeMap::new()),
            column_families: RwLock::new(BTreeMap::new()),
            runs: RwLock::new(BTreeMap::new()),
            segments: RwLock::new(BTreeMap::new()),
            run_segments: RwLock::new(HashMap::new()),
            next_column_family_id: AtomicU64::new(1),
            next_run_id: AtomicU64::new(1),
            next_segment_id: AtomicU64::new(1),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RepairStore for MemoryStore {
    fn is_connected(&self) -> bool {
        true
    }

    fn add_cluster(&self, cluster: Cluster) -> Result<Cluster, StoreError> {
        let mut clusters = self.clusters.write().expect("lock poisoned");
        if clusters.contains_key(&cluster.name) {
            return Err(StoreError::AlreadyExists {
                kind: "cluster",
                id: cluster.name,
            });
        }
        debug!(cluster = %cluster.name, "storing cluster in memory");
        clusters.insert(cluster.name.clone(), cluster.clone());
        Ok(cluster)
    }

    fn get_cluster(&self, name: &str) -> Result<Option<Cluster>, StoreError> {
        let clusters = self.clusters.read().expect("lock poisoned");
        Ok(clusters.get(name).cloned())
    }

    fn get_clusters(&self) -> Result<Vec<Cluster>, StoreError> {
        let clusters = self.clusters.read().expect("lock poisoned");
        Ok(clusters.values().cloned().collect())
    }

    fn add_column_family(&self, new: NewColumnFamily) -> Result<ColumnFamily, StoreError> {
        let mut tables = self.column_families.write().expect("lock poisoned");
        let duplicate = tables.values().any(|cf| {
            cf.cluster_name == new.cluster_name
                && cf.keyspace_name == new.keyspace_name
                && cf.name == new.name
        });
        if duplicate {
            return Err(StoreError::AlreadyExists {
                kind: "column family",
                id: format!("{}/{}/{}", new.cluster_name, new.keyspace_name, new.name),
            });
        }

        let id = ColumnFamilyId::from(self.next_column_family_id.fetch_add(1, Ordering::Relaxed));
        let cf = new.with_id(id);
        debug!(%id, keyspace = %cf.keyspace_name, table = %cf.name, "stored column family");
        tables.insert(id, cf.clone());
        Ok(cf)
    }

    fn get_column_family(&self, id: ColumnFamilyId) -> Result<Option<ColumnFamily>, StoreError> {
        let tables = self.column_families.read().expect("lock poisoned");
        Ok(tables.get(&id).cloned())
    }

    fn get_column_family_by_name(
        &self,
        cluster_name: &str,
        keyspace_name: &str,
        name: &str,
    ) -> Result<Option<ColumnFamily>, StoreError> {
        let tables = self.column_families.read().expect("lock poisoned");
        Ok(tables
            .values()
            .find(|cf| {
                cf.cluster_name == cluster_name && cf.keyspace_name == keyspace_name && cf.name == name
            })
            .cloned())
    }

    fn add_repair_run(&self, new: NewRepairRun) -> Result<RepairRun, StoreError> {
        let id = RunId::from(self.next_run_id.fetch_add(1, Ordering::Relaxed));
        let run = new.with_id(id, now_secs());
        self.runs
            .write()
            .expect("lock poisoned")
            .insert(id, run.clone());
        debug!(run_id = %id, "stored repair run");
        Ok(run)
    }

    fn get_repair_run(&self, id: RunId) -> Result<Option<RepairRun>, StoreError> {
        let runs = self.runs.read().expect("lock poisoned");
        Ok(runs.get(&id).cloned())
    }

    fn get_repair_runs_for_cluster(
        &self,
        cluster_name: &str,
    ) -> Result<Vec<RepairRun>, StoreError> {
        let runs = self.runs.read().expect("lock poisoned");
        Ok(runs
            .values()
            .filter(|r| r.cluster_name == cluster_name)
            .cloned()
            .collect())
    }

    fn update_repair_run(&self, run: &RepairRun) -> Result<(), StoreError> {
        let mut runs = self.runs.write().expect("lock poisoned");
        match runs.get_mut(&run.id) {
            Some(stored) => {
                *stored = run.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                kind: "repair run",
                id: run.id.to_string(),
            }),
        }
    }

    fn add_repair_segments(
        &self,
        run_id: RunId,
        ranges: Vec<RingRange>,
    ) -> Result<Vec<RepairSegment>, StoreError> {
        let column_family_id = self
            .get_repair_run(run_id)?
            .ok_or(StoreError::NotFound {
                kind: "repair run",
                id: run_id.to_string(),
            })?
            .column_family_id;

        let mut segments = self.segments.write().expect("lock poisoned");
        let mut run_segments = self.run_segments.write().expect("lock poisoned");
        let ids = run_segments.entry(run_id).or_default();

        let mut added = Vec::with_capacity(ranges.len());
        for range in ranges {
            let id = SegmentId::from(self.next_segment_id.fetch_add(1, Ordering::Relaxed));
            let segment = RepairSegment::new(id, run_id, column_family_id, range);
            segments.insert(id, segment.clone());
            ids.push(id);
            added.push(segment);
        }
        debug!(%run_id, count = added.len(), "stored repair segments");
        Ok(added)
    }

    fn get_repair_segment(&self, id: SegmentId) -> Result<Option<RepairSegment>, StoreError> {
        let segments = self.segments.read().expect("lock poisoned");
        Ok(segments.get(&id).cloned())
    }

    fn get_repair_segments(&self, run_id: RunId) -> Result<Vec<RepairSegment>, StoreError> {
        let segments = self.segments.read().expect("lock poisoned");
        let run_segments = self.run_segments.read().expect("lock poisoned");
        Ok(run_segments
            .get(&run_id)
            .map(|ids| ids.iter().filter_map(|id| segments.get(id).cloned()).collect())
            .unwrap_or_default())
    }

    fn update_repair_segment(&self, segment: &RepairSegment) -> Result<(), StoreError> {
        let mut segments = self.segments.write().expect("lock poisoned");
        match segments.get_mut(&segment.id) {
            Some(stored) => {
                *stored = segment.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                kind: "repair segment",
                id: segment.id.to_string(),
            }),
        }
    }
}
