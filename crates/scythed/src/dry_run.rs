//! A [`SegmentRepairer`] that only logs and waits.

use std::time::Duration;

use scythe_repair::{RepairError, SegmentRepairer};
use scythe_ring::RingRange;
use scythe_types::Cluster;
use tracing::info;

/// Pretends to repair each segment, taking a fixed amount of time.
///
/// Lets the scheduler run end to end without a connection to the cluster.
pub struct DryRunRepairer {
    delay: Duration,
}

impl DryRunRepairer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait::async_trait]
impl SegmentRepairer for DryRunRepairer {
    async fn repair_segment(
        &self,
        cluster: &Cluster,
        keyspace: &str,
        tables: &[String],
        range: &RingRange,
        snapshot: bool,
    ) -> Result<(), RepairError> {
        info!(
            cluster = %cluster.name,
            keyspace,
            tables = ?tables,
            %range,
            snapshot,
            "dry-run repair"
        );
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}
