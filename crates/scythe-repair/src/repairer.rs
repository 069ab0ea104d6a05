//! The seam between the runner and whatever performs the repair.

use scythe_ring::RingRange;
use scythe_types::Cluster;

use crate::error::RepairError;

/// Repairs one segment of one or more tables.
///
/// Implementations talk to the data store; tests mock them.
#[async_trait::async_trait]
pub trait SegmentRepairer: Send + Sync {
    /// Repair `tables` of `keyspace` over `range` and wait for completion.
    ///
    /// With `snapshot` set, replicas snapshot the data before comparing it,
    /// which makes the repair sequential across replicas.
    async fn repair_segment(
        &self,
        cluster: &Cluster,
        keyspace: &str,
        tables: &[String],
        range: &RingRange,
        snapshot: bool,
    ) -> Result<(), RepairError>;
}
