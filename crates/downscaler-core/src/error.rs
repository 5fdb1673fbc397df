//! Error taxonomy for the downscaler.
//!
//! Configuration errors stop the daemon before the loop starts. Gateway
//! errors are fatal unless they carry a transient provider condition, in
//! which case the reconciler abandons the tick and tries again later.

use thiserror::Error;

/// Result type alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Invalid startup configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("start of working day should be between 1 and 24, have: {0}")]
    StartOutOfRange(i64),

    #[error("end of working day should be between 1 and 24, have: {0}")]
    EndOutOfRange(i64),

    #[error("end of working day {end} should not be before start {start}")]
    EndBeforeStart { start: u8, end: u8 },

    #[error("no autoscaling group name provided and autodetect is disabled")]
    MissingGroupName,

    #[error("initial capacity should be at least 1, have: 0")]
    ZeroInitialCapacity,

    #[error("invalid interval {0:?}")]
    InvalidInterval(String),

    #[error("failed to read config file {path}: {reason}")]
    File { path: String, reason: String },
}

/// Errors surfaced by a [`CapacityGateway`](crate::CapacityGateway).
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A self-resolving provider condition (scaling already in progress,
    /// resource contention). Never fatal.
    #[error("transient provider condition {code}: {message}")]
    Transient { code: String, message: String },

    #[error("autoscaling group not found: {0}")]
    GroupNotFound(String),

    #[error("autoscaling group {0} reports no desired capacity")]
    NoDesiredCapacity(String),

    #[error("expected exactly one autoscaling group for member {member}, found {found}")]
    AmbiguousGroup { member: String, found: usize },

    #[error("instance metadata error: {0}")]
    Metadata(String),

    #[error("provider error: {0}")]
    Provider(String),
}

impl GatewayError {
    /// Whether the reconciler may ignore this error and retry next tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient { .. })
    }
}

/// A fatal reconciliation failure. The daemon exits on this and relies on
/// its supervisor to restart it.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("error getting current capacity of {group}: {source}")]
    ReadCapacity {
        group: String,
        #[source]
        source: GatewayError,
    },

    #[error("error setting capacity of {group} to {target}: {source}")]
    SetCapacity {
        group: String,
        target: u32,
        #[source]
        source: GatewayError,
    },
}
