//! Shared types and identifiers for Scythe.
//!
//! This crate defines the repair bookkeeping model used across the workspace:
//! identifiers ([`ColumnFamilyId`], [`RunId`], [`SegmentId`]),
//! registered targets ([`Cluster`], [`ColumnFamily`]),
//! repair work ([`RepairRun`], [`RepairSegment`] and their states),
//! and storage selection ([`StorageBackend`]).

use std::fmt;
use std::str::FromStr;

use scythe_ring::{Integer, Partitioner, RingError, RingRange, parse_token};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ID types
// ---------------------------------------------------------------------------

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Return the raw numeric value.
            pub fn get(&self) -> u64 {
                self.0
            }

            /// Big-endian key bytes, so byte order matches numeric order.
            pub fn to_be_bytes(&self) -> [u8; 8] {
                self.0.to_be_bytes()
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

define_id!(
    /// Store-assigned identifier of a registered table.
    ColumnFamilyId
);

define_id!(
    /// Store-assigned identifier of a repair run.
    RunId
);

define_id!(
    /// Store-assigned identifier of a repair segment.
    SegmentId
);

// ---------------------------------------------------------------------------
// Registered targets
// ---------------------------------------------------------------------------

/// A cluster registered for repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    /// Unique cluster name.
    pub name: String,
    /// Token space of the cluster.
    pub partitioner: Partitioner,
    /// Hosts used to reach the cluster.
    pub seed_hosts: Vec<String>,
    /// Tokens owned by the cluster's nodes, ascending, as decimal strings.
    pub ring_tokens: Vec<String>,
}

impl Cluster {
    /// Parse the stored ring tokens.
    pub fn tokens(&self) -> Result<Vec<Integer>, RingError> {
        self.ring_tokens.iter().map(|t| parse_token(t)).collect()
    }
}

/// A table registered for repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnFamily {
    /// Store-assigned identifier.
    pub id: ColumnFamilyId,
    /// Owning cluster.
    pub cluster_name: String,
    /// Keyspace the table lives in.
    pub keyspace_name: String,
    /// Table name.
    pub name: String,
    /// Default number of segments a run on this table is split into.
    pub segment_count: u64,
    /// Whether repairs should snapshot before running.
    pub snapshot_repair: bool,
}

/// Fields supplied when registering a table; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewColumnFamily {
    pub cluster_name: String,
    pub keyspace_name: String,
    pub name: String,
    pub segment_count: u64,
    pub snapshot_repair: bool,
}

impl NewColumnFamily {
    /// Attach a store-assigned id.
    pub fn with_id(self, id: ColumnFamilyId) -> ColumnFamily {
        ColumnFamily {
            id,
            cluster_name: self.cluster_name,
            keyspace_name: self.keyspace_name,
            name: self.name,
            segment_count: self.segment_count,
            snapshot_repair: self.snapshot_repair,
        }
    }
}

// ---------------------------------------------------------------------------
// Repair work
// ---------------------------------------------------------------------------

/// Lifecycle of a repair run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    /// Created, segments generated, nothing dispatched yet.
    NotStarted,
    /// Segments are being dispatched.
    Running,
    /// Dispatch stopped by an operator; may be resumed.
    Paused,
    /// Every segment repaired.
    Done,
    /// A segment exhausted its retries.
    Error,
}

impl RunState {
    /// Whether the run can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

/// A repair of one table across the whole ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairRun {
    /// Store-assigned identifier.
    pub id: RunId,
    /// Cluster being repaired.
    pub cluster_name: String,
    /// Table being repaired.
    pub column_family_id: ColumnFamilyId,
    /// Why the run was created.
    pub cause: String,
    /// Who created the run.
    pub owner: String,
    /// Current state.
    pub state: RunState,
    /// Fraction of time spent repairing, in `(0, 1]`.
    pub intensity: f64,
    /// Unix seconds at creation.
    pub created_at: u64,
    /// Unix seconds when first started.
    pub start_time: Option<u64>,
    /// Unix seconds when finished (done or error).
    pub end_time: Option<u64>,
    /// Unix seconds of the most recent pause.
    pub pause_time: Option<u64>,
    /// Human-readable description of the latest transition.
    pub last_event: String,
}

/// Fields supplied when creating a run; the store assigns the id and state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRepairRun {
    pub cluster_name: String,
    pub column_family_id: ColumnFamilyId,
    pub cause: String,
    pub owner: String,
    pub intensity: f64,
}

impl NewRepairRun {
    /// Attach a store-assigned id; the run starts out [`RunState::NotStarted`].
    pub fn with_id(self, id: RunId, created_at: u64) -> RepairRun {
        RepairRun {
            id,
            cluster_name: self.cluster_name,
            column_family_id: self.column_family_id,
            cause: self.cause,
            owner: self.owner,
            state: RunState::NotStarted,
            intensity: self.intensity,
            created_at,
            start_time: None,
            end_time: None,
            pause_time: None,
            last_event: "run created".to_string(),
        }
    }
}

/// Lifecycle of a single segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SegmentState {
    /// Waiting to be dispatched (possibly after a failed attempt).
    NotStarted,
    /// A repair is in flight.
    Running,
    /// Repaired.
    Done,
}

/// One unit of repair work: a ring arc of one table in one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairSegment {
    /// Store-assigned identifier, ascending in ring order within a run.
    pub id: SegmentId,
    /// Owning run.
    pub run_id: RunId,
    /// Table being repaired.
    pub column_family_id: ColumnFamilyId,
    /// Arc of the ring, in position space.
    pub token_range: RingRange,
    /// Current state.
    pub state: SegmentState,
    /// Failed attempts so far.
    pub fail_count: u32,
    /// Unix seconds when the latest attempt started.
    pub start_time: Option<u64>,
    /// Unix seconds when the segment finished.
    pub end_time: Option<u64>,
}

impl RepairSegment {
    /// A fresh, not yet started segment.
    pub fn new(
        id: SegmentId,
        run_id: RunId,
        column_family_id: ColumnFamilyId,
        token_range: RingRange,
    ) -> Self {
        Self {
            id,
            run_id,
            column_family_id,
            token_range,
            state: SegmentState::NotStarted,
            fail_count: 0,
            start_time: None,
            end_time: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Volatile in-memory storage.
    Memory,
    /// Persistent on-disk database.
    Database,
}

/// A storage backend name that is neither `memory` nor `database`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid storage type: {0}")]
pub struct InvalidStorageBackend(pub String);

impl FromStr for StorageBackend {
    type Err = InvalidStorageBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("memory") {
            Ok(Self::Memory)
        } else if s.eq_ignore_ascii_case("database") {
            Ok(Self::Database)
        } else {
            Err(InvalidStorageBackend(s.to_string()))
        }
    }
}

/// Current time in Unix seconds.
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
