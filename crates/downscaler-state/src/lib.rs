//! downscaler-state — where the remembered peak capacity is written.
//!
//! Two [`SnapshotSink`](downscaler_core::SnapshotSink) implementations:
//!
//! - [`FileStore`] — a local [redb](https://docs.rs/redb) file keyed by group
//!   name. Also read once at startup so that the peak survives a restart.
//! - [`ConfigMapSink`] — upserts `{ASGSize: n}` into a Kubernetes ConfigMap
//!   with server-side apply. Write-only.

pub mod configmap;
pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use configmap::ConfigMapSink;
pub use error::{StateError, StateResult};
pub use store::FileStore;
pub use types::StoredSnapshot;
