//! redb table definitions for the snapshot file.

use redb::TableDefinition;

/// Capacity snapshots keyed by autoscaling group name.
pub const SNAPSHOTS: TableDefinition<&str, &[u8]> = TableDefinition::new("snapshots");
