//! downscaler-core — schedule-driven capacity reconciliation.
//!
//! Keeps an autoscaling group at zero outside working hours and restores
//! it to its remembered peak when the working day starts. The crate holds
//! the pure decision function, the gateway and snapshot-sink seams, and
//! the reconciler that drives one tick at a time.
//!
//! # Decision Policy
//!
//! ```text
//! if hour > end or hour < start:
//!     target = 0                       // out of window, always wins
//! elif weekend and not consultant_mode:
//!     target = 0
//! elif hour >= start:
//!     target = peak                    // weekday, or consultant weekend
//! else:
//!     target = current                 // no change
//! ```
//!
//! The peak is raised whenever the observed capacity exceeds it, so a
//! manual upsize survives the next scale-down/scale-up cycle.

pub mod config;
pub mod error;
pub mod gateway;
pub mod reconciler;
pub mod schedule;
pub mod sink;

pub use config::{ScheduleConfig, parse_interval};
pub use error::{ConfigError, GatewayError, GatewayResult, ReconcileError};
pub use gateway::CapacityGateway;
pub use reconciler::{Reconciler, ReconcilerState, TickOutcome};
pub use schedule::{Phase, TimeSample, decide};
pub use sink::{CapacitySnapshot, SnapshotSink};
