//! Persisted record types.

use serde::{Deserialize, Serialize};

use downscaler_core::CapacitySnapshot;

/// A snapshot as stored in the local file, with the group it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSnapshot {
    pub group: String,
    #[serde(flatten)]
    pub snapshot: CapacitySnapshot,
    /// Unix timestamp (seconds) of the write.
    pub updated_at: u64,
}
