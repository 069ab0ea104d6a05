//! [`FjallStore`]: persistent repair storage in Fjall keyspaces.

use std::path::Path;
use std::sync::Mutex;

use fjall::{Database, Keyspace, KeyspaceCreateOptions};
use scythe_ring::RingRange;
use scythe_types::{
    Cluster, ColumnFamily, ColumnFamilyId, NewColumnFamily, NewRepairRun, RepairRun,
    RepairSegment, RunId, SegmentId, now_secs,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::StoreError;
use crate::traits::RepairStore;

type Result<T> = std::result::Result<T, StoreError>;

const COLUMN_FAMILY_COUNTER: &[u8] = b"column_family";
const RUN_COUNTER: &[u8] = b"repair_run";
const SEGMENT_COUNTER: &[u8] = b"repair_segment";

/// Repair store backed by Fjall.
///
/// Keyspaces:
///
/// - `clusters`: cluster name → [`Cluster`]
/// - `column_families`: id (8 bytes BE) → [`ColumnFamily`]
/// - `repair_runs`: id (8 bytes BE) → [`RepairRun`]
/// - `repair_segments`: run id ++ segment id (BE) → [`RepairSegment`]
/// - `segment_runs`: segment id → run id, to find a segment without its run
/// - `counters`: id counter name → last assigned id
pub struct FjallStore {
    #[allow(dead_code)]
    db: Database,
    clusters: Keyspace,
    column_families: Keyspace,
    repair_runs: Keyspace,
    repair_segments: Keyspace,
    segment_runs: Keyspace,
    counters: Keyspace,
    /// Serializes read-check-write sequences (id allocation, uniqueness checks).
    write_lock: Mutex<()>,
}

impl FjallStore {
    /// Open a persistent store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::builder(path).open()?;
        Self::init_keyspaces(db)
    }

    /// Open a temporary store that is cleaned up on drop.
    ///
    /// Useful for tests.
    pub fn open_temporary() -> Result<Self> {
        // Fjall removes a temporary database's folder itself on drop.
        let path = tempfile::tempdir()?.keep();
        let db = Database::builder(path).temporary(true).open()?;
        Self::init_keyspaces(db)
    }

    fn init_keyspaces(db: Database) -> Result<Self> {
        let clusters = db.keyspace("clusters", KeyspaceCreateOptions::default)?;
        let column_families = db.keyspace("column_families", KeyspaceCreateOptions::default)?;
        let repair_runs = db.keyspace("repair_runs", KeyspaceCreateOptions::default)?;
        let repair_segments = db.keyspace("repair_segments", KeyspaceCreateOptions::default)?;
        let segment_runs = db.keyspace("segment_runs", KeyspaceCreateOptions::default)?;
        let counters = db.keyspace("counters", KeyspaceCreateOptions::default)?;
        Ok(Self {
            db,
            clusters,
            column_families,
            repair_runs,
            repair_segments,
            segment_runs,
            counters,
            write_lock: Mutex::new(()),
        })
    }

    /// Bump and return the named id counter. Caller holds `write_lock`.
    fn next_id(&self, counter: &[u8]) -> Result<u64> {
        let current = match self.counters.get(counter)? {
            Some(bytes) => decode_u64(&bytes)?,
            None => 0,
        };
        let next = current + 1;
        self.counters.insert(counter, next.to_be_bytes().as_slice())?;
        Ok(next)
    }

    fn scan_values<T: DeserializeOwned>(&self, keyspace: &Keyspace) -> Result<Vec<T>> {
        let mut values = Vec::new();
        for guard in keyspace.iter() {
            let v = guard.value()?;
            values.push(postcard::from_bytes(&v)?);
        }
        Ok(values)
    }

    fn get_value<T: DeserializeOwned>(&self, keyspace: &Keyspace, key: &[u8]) -> Result<Option<T>> {
        match keyspace.get(key)? {
            Some(bytes) => Ok(Some(postcard::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_value<T: Serialize>(&self, keyspace: &Keyspace, key: &[u8], value: &T) -> Result<()> {
        let value = postcard::to_allocvec(value)?;
        keyspace.insert(key, value.as_slice())?;
        Ok(())
    }
}

impl RepairStore for FjallStore {
    fn is_connected(&self) -> bool {
        true
    }

    // ----- Clusters -----

    fn add_cluster(&self, cluster: Cluster) -> Result<Cluster> {
        let _guard = self.write_lock.lock().expect("lock poisoned");
        if self.clusters.get(cluster.name.as_bytes())?.is_some() {
            return Err(StoreError::AlreadyExists {
                kind: "cluster",
                id: cluster.name,
            });
        }
        self.put_value(&self.clusters, cluster.name.as_bytes(), &cluster)?;
        debug!(cluster = %cluster.name, "stored cluster");
        Ok(cluster)
    }

    fn get_cluster(&self, name: &str) -> Result<Option<Cluster>> {
        self.get_value(&self.clusters, name.as_bytes())
    }

    fn get_clusters(&self) -> Result<Vec<Cluster>> {
        self.scan_values(&self.clusters)
    }

    // ----- Column families -----

    fn add_column_family(&self, new: NewColumnFamily) -> Result<ColumnFamily> {
        let _guard = self.write_lock.lock().expect("lock poisoned");
        if self
            .get_column_family_by_name(&new.cluster_name, &new.keyspace_name, &new.name)?
            .is_some()
        {
            return Err(StoreError::AlreadyExists {
                kind: "column family",
                id: format!("{}/{}/{}", new.cluster_name, new.keyspace_name, new.name),
            });
        }

        let id = ColumnFamilyId::from(self.next_id(COLUMN_FAMILY_COUNTER)?);
        let cf = new.with_id(id);
        self.put_value(&self.column_families, &id.to_be_bytes(), &cf)?;
        debug!(%id, keyspace = %cf.keyspace_name, table = %cf.name, "stored column family");
        Ok(cf)
    }

    fn get_column_family(&self, id: ColumnFamilyId) -> Result<Option<ColumnFamily>> {
        self.get_value(&self.column_families, &id.to_be_bytes())
    }

    fn get_column_family_by_name(
        &self,
        cluster_name: &str,
        keyspace_name: &str,
        name: &str,
    ) -> Result<Option<ColumnFamily>> {
        let tables: Vec<ColumnFamily> = self.scan_values(&self.column_families)?;
        Ok(tables.into_iter().find(|cf| {
            cf.cluster_name == cluster_name && cf.keyspace_name == keyspace_name && cf.name == name
        }))
    }

    // ----- Repair runs -----

    fn add_repair_run(&self, new: NewRepairRun) -> Result<RepairRun> {
        let _guard = self.write_lock.lock().expect("lock poisoned");
        let id = RunId::from(self.next_id(RUN_COUNTER)?);
        let run = new.with_id(id, now_secs());
        self.put_value(&self.repair_runs, &id.to_be_bytes(), &run)?;
        debug!(run_id = %id, "stored repair run");
        Ok(run)
    }

    fn get_repair_run(&self, id: RunId) -> Result<Option<RepairRun>> {
        self.get_value(&self.repair_runs, &id.to_be_bytes())
    }

    fn get_repair_runs_for_cluster(&self, cluster_name: &str) -> Result<Vec<RepairRun>> {
        let runs: Vec<RepairRun> = self.scan_values(&self.repair_runs)?;
        Ok(runs
            .into_iter()
            .filter(|r| r.cluster_name == cluster_name)
            .collect())
    }

    fn update_repair_run(&self, run: &RepairRun) -> Result<()> {
        let key = run.id.to_be_bytes();
        if self.repair_runs.get(key.as_slice())?.is_none() {
            return Err(StoreError::NotFound {
                kind: "repair run",
                id: run.id.to_string(),
            });
        }
        self.put_value(&self.repair_runs, &key, run)
    }

    // ----- Repair segments -----

    fn add_repair_segments(
        &self,
        run_id: RunId,
        ranges: Vec<RingRange>,
    ) -> Result<Vec<RepairSegment>> {
        let column_family_id = self
            .get_repair_run(run_id)?
            .ok_or(StoreError::NotFound {
                kind: "repair run",
                id: run_id.to_string(),
            })?
            .column_family_id;

        let _guard = self.write_lock.lock().expect("lock poisoned");
        let mut added = Vec::with_capacity(ranges.len());
        for range in ranges {
            let id = SegmentId::from(self.next_id(SEGMENT_COUNTER)?);
            let segment = RepairSegment::new(id, run_id, column_family_id, range);
            self.put_value(&self.repair_segments, &segment_key(run_id, id), &segment)?;
            self.segment_runs
                .insert(id.to_be_bytes().as_slice(), run_id.to_be_bytes().as_slice())?;
            added.push(segment);
        }
        debug!(%run_id, count = added.len(), "stored repair segments");
        Ok(added)
    }

    fn get_repair_segment(&self, id: SegmentId) -> Result<Option<RepairSegment>> {
        let run_id = match self.segment_runs.get(id.to_be_bytes().as_slice())? {
            Some(bytes) => RunId::from(decode_u64(&bytes)?),
            None => return Ok(None),
        };
        self.get_value(&self.repair_segments, &segment_key(run_id, id))
    }

    fn get_repair_segments(&self, run_id: RunId) -> Result<Vec<RepairSegment>> {
        let prefix = run_id.to_be_bytes();
        let mut segments = Vec::new();
        for guard in self.repair_segments.prefix(prefix.as_slice()) {
            let v = guard.value()?;
            segments.push(postcard::from_bytes(&v)?);
        }
        Ok(segments)
    }

    fn update_repair_segment(&self, segment: &RepairSegment) -> Result<()> {
        let key = segment_key(segment.run_id, segment.id);
        if self.repair_segments.get(key.as_slice())?.is_none() {
            return Err(StoreError::NotFound {
                kind: "repair segment",
                id: segment.id.to_string(),
            });
        }
        self.put_value(&self.repair_segments, &key, segment)
    }
}

/// Build the segment key: `run_id (8 bytes BE) ++ segment_id (8 bytes BE)`.
///
/// Big-endian keeps a run's segments contiguous and in id order.
fn segment_key(run_id: RunId, segment_id: SegmentId) -> Vec<u8> {
    let mut key = Vec::with_capacity(16);
    key.extend_from_slice(&run_id.to_be_bytes());
    key.extend_from_slice(&segment_id.to_be_bytes());
    key
}

fn decode_u64(bytes: &[u8]) -> Result<u64> {
    let arr: [u8; 8] = bytes.get(..8).and_then(|b| b.try_into().ok()).ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, "expected an 8-byte id")
    })?;
    Ok(u64::from_be_bytes(arr))
}
