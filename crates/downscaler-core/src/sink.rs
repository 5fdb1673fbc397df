//! Snapshot sinks — optional write-only records of the peak capacity.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The record written whenever the remembered peak is raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacitySnapshot {
    #[serde(rename = "ASGSize")]
    pub asg_size: u32,
}

/// Destination for [`CapacitySnapshot`]s.
///
/// Failures are reported to the reconciler, which logs them and carries on;
/// a sink is never allowed to stop the loop.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    /// Short name used in log fields.
    fn name(&self) -> &str;

    /// Upsert the snapshot for `group`.
    async fn record(&self, group: &str, snapshot: CapacitySnapshot) -> anyhow::Result<()>;
}
