//! FileStore — redb-backed snapshot persistence.
//!
//! Holds one JSON-serialized [`StoredSnapshot`] per autoscaling group. The
//! daemon writes to it whenever the peak is raised and reads it once at
//! startup to seed the reconciler.

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use downscaler_core::{CapacitySnapshot, SnapshotSink};

use crate::error::{StateError, StateResult};
use crate::tables::SNAPSHOTS;
use crate::types::StoredSnapshot;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe snapshot store backed by redb.
#[derive(Clone)]
pub struct FileStore {
    db: Arc<Database>,
}

impl FileStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "snapshot store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(SNAPSHOTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Insert or replace the snapshot for `group`.
    pub fn put_snapshot(&self, group: &str, snapshot: CapacitySnapshot) -> StateResult<()> {
        let record = StoredSnapshot {
            group: group.to_string(),
            snapshot,
            updated_at: epoch_secs(),
        };
        let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(SNAPSHOTS).map_err(map_err!(Table))?;
            table
                .insert(group, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%group, asg_size = snapshot.asg_size, "snapshot stored");
        Ok(())
    }

    /// Latest snapshot for `group`, if any.
    pub fn get_snapshot(&self, group: &str) -> StateResult<Option<StoredSnapshot>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SNAPSHOTS).map_err(map_err!(Table))?;
        match table.get(group).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: StoredSnapshot =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Starting peak for `group`: the stored size when it exceeds `default`,
    /// otherwise `default`.
    pub fn seed_peak(&self, group: &str, default: u32) -> StateResult<u32> {
        let stored = self
            .get_snapshot(group)?
            .map(|r| r.snapshot.asg_size)
            .unwrap_or(0);
        Ok(stored.max(default))
    }
}

#[async_trait]
impl SnapshotSink for FileStore {
    fn name(&self) -> &str {
        "state-file"
    }

    async fn record(&self, group: &str, snapshot: CapacitySnapshot) -> anyhow::Result<()> {
        let store = self.clone();
        let group = group.to_string();
        tokio::task::spawn_blocking(move || store.put_snapshot(&group, snapshot)).await??;
        Ok(())
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
