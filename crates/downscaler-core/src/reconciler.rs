//! Reconciler — the downscaler control loop.
//!
//! Each tick reads the group's current capacity, remembers it if it is the
//! highest seen so far, evaluates the schedule and, when the target differs,
//! asks the gateway for the new capacity. Transient provider conditions
//! abandon the tick; every other gateway failure ends the loop so that the
//! process supervisor can restart the daemon.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use tracing::{debug, info, warn};

use crate::config::ScheduleConfig;
use crate::error::ReconcileError;
use crate::gateway::CapacityGateway;
use crate::schedule::{Phase, TimeSample, decide};
use crate::sink::{CapacitySnapshot, SnapshotSink};

/// Outcome of a single tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Current capacity already matches the schedule.
    Unchanged { capacity: u32 },
    /// The gateway accepted a new capacity.
    Scaled { from: u32, to: u32 },
    /// The provider reported a transient condition; retried next tick.
    Deferred { target: u32, reason: String },
}

/// Mutable state carried across ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerState {
    /// Highest capacity observed so far; the scale-up target.
    pub peak_capacity: u32,
}

/// Drives the managed group towards the scheduled capacity.
pub struct Reconciler {
    group: String,
    schedule: ScheduleConfig,
    gateway: Arc<dyn CapacityGateway>,
    sinks: Vec<Box<dyn SnapshotSink>>,
    state: ReconcilerState,
}

impl Reconciler {
    /// Create a reconciler for `group`, starting from `initial_peak`.
    pub fn new(
        group: impl Into<String>,
        schedule: ScheduleConfig,
        gateway: Arc<dyn CapacityGateway>,
        initial_peak: u32,
    ) -> Self {
        Self {
            group: group.into(),
            schedule,
            gateway,
            sinks: Vec::new(),
            state: ReconcilerState {
                peak_capacity: initial_peak,
            },
        }
    }

    /// Add a sink that receives a snapshot whenever the peak is raised.
    pub fn with_sink(mut self, sink: Box<dyn SnapshotSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn state(&self) -> ReconcilerState {
        self.state
    }

    /// Run one tick against the instant `now`.
    ///
    /// Weekday and hour are sampled once, before any I/O.
    pub fn tick<Tz: TimeZone>(
        &mut self,
        now: &DateTime<Tz>,
    ) -> impl Future<Output = Result<TickOutcome, ReconcileError>> {
        let sample = TimeSample::from_datetime(now);
        self.reconcile(sample)
    }

    /// Run one tick for an already-taken time sample.
    pub async fn reconcile(&mut self, sample: TimeSample) -> Result<TickOutcome, ReconcileError> {
        let current = self
            .gateway
            .current_capacity(&self.group)
            .await
            .map_err(|source| ReconcileError::ReadCapacity {
                group: self.group.clone(),
                source,
            })?;

        if current > self.state.peak_capacity {
            info!(
                group = %self.group,
                previous = self.state.peak_capacity,
                peak = current,
                "observed capacity above remembered peak"
            );
            self.state.peak_capacity = current;
            self.emit_snapshot().await;
        }

        let target = decide(&self.schedule, sample, current, self.state.peak_capacity);
        if target == current {
            debug!(
                group = %self.group,
                %sample,
                capacity = current,
                phase = %Phase::of(current),
                "capacity matches schedule"
            );
            return Ok(TickOutcome::Unchanged { capacity: current });
        }

        info!(
            group = %self.group,
            %sample,
            from = current,
            to = target,
            phase = %Phase::of(target),
            "setting capacity"
        );

        match self.gateway.set_capacity(&self.group, target).await {
            Ok(()) => Ok(TickOutcome::Scaled {
                from: current,
                to: target,
            }),
            Err(e) if e.is_transient() => {
                warn!(
                    group = %self.group,
                    target,
                    error = %e,
                    "transient provider condition, retrying next tick"
                );
                Ok(TickOutcome::Deferred {
                    target,
                    reason: e.to_string(),
                })
            }
            Err(source) => Err(ReconcileError::SetCapacity {
                group: self.group.clone(),
                target,
                source,
            }),
        }
    }

    async fn emit_snapshot(&self) {
        let snapshot = CapacitySnapshot {
            asg_size: self.state.peak_capacity,
        };
        for sink in &self.sinks {
            if let Err(e) = sink.record(&self.group, snapshot).await {
                warn!(
                    group = %self.group,
                    sink = sink.name(),
                    error = %e,
                    "failed to record capacity snapshot"
                );
            }
        }
    }

    /// Run the control loop until a fatal error or shutdown.
    ///
    /// Ticks against local wall-clock time, then sleeps `interval`. A
    /// shutdown signal is only observed while sleeping, so a tick always
    /// runs to completion.
    pub async fn run(
        &mut self,
        interval: Duration,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> Result<(), ReconcileError> {
        info!(
            group = %self.group,
            start = self.schedule.start_hour(),
            end = self.schedule.end_hour(),
            consultant_mode = self.schedule.consultant_mode(),
            interval_secs = interval.as_secs(),
            "starting the loop"
        );

        loop {
            let now = Local::now();
            self.tick(&now).await?;

            debug!(interval = ?interval, "nothing left to do, going to sleep");
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {
                    info!(group = %self.group, "downscaler shutting down");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc, Weekday};

    use crate::error::{GatewayError, GatewayResult};

    /// In-memory gateway recording every capacity change.
    #[derive(Default)]
    struct MockGateway {
        capacity: Mutex<u32>,
        set_calls: Mutex<Vec<u32>>,
        set_error: Mutex<Option<&'static str>>,
        read_fails: bool,
    }

    impl MockGateway {
        fn with_capacity(capacity: u32) -> Arc<Self> {
            Arc::new(Self {
                capacity: Mutex::new(capacity),
                ..Default::default()
            })
        }

        fn fail_set_with(&self, code: &'static str) {
            *self.set_error.lock().unwrap() = Some(code);
        }

        fn clear_set_error(&self) {
            *self.set_error.lock().unwrap() = None;
        }

        fn capacity(&self) -> u32 {
            *self.capacity.lock().unwrap()
        }

        fn set_calls(&self) -> Vec<u32> {
            self.set_calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CapacityGateway for MockGateway {
        async fn current_capacity(&self, group: &str) -> GatewayResult<u32> {
            if self.read_fails {
                return Err(GatewayError::GroupNotFound(group.to_string()));
            }
            Ok(self.capacity())
        }

        async fn set_capacity(&self, _group: &str, target: u32) -> GatewayResult<()> {
            self.set_calls.lock().unwrap().push(target);
            match *self.set_error.lock().unwrap() {
                Some(code @ ("ScalingActivityInProgress" | "ResourceContention")) => {
                    Err(GatewayError::Transient {
                        code: code.to_string(),
                        message: "error".to_string(),
                    })
                }
                Some(code) => Err(GatewayError::Provider(code.to_string())),
                None => {
                    *self.capacity.lock().unwrap() = target;
                    Ok(())
                }
            }
        }

        async fn resolve_group_for_member(&self, _member_id: &str) -> GatewayResult<String> {
            Ok("asg".to_string())
        }
    }

    struct RecordingSink {
        records: Arc<Mutex<Vec<(String, CapacitySnapshot)>>>,
        fail: bool,
    }

    #[async_trait]
    impl SnapshotSink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        async fn record(&self, group: &str, snapshot: CapacitySnapshot) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("store unavailable");
            }
            self.records
                .lock()
                .unwrap()
                .push((group.to_string(), snapshot));
            Ok(())
        }
    }

    fn office_hours() -> ScheduleConfig {
        ScheduleConfig::new(9, 18, false).unwrap()
    }

    fn reconciler(gateway: &Arc<MockGateway>, schedule: ScheduleConfig) -> Reconciler {
        Reconciler::new("asg", schedule, gateway.clone(), 2)
    }

    #[tokio::test]
    async fn weekday_open_keeps_capacity() {
        let gateway = MockGateway::with_capacity(2);
        let mut r = reconciler(&gateway, office_hours());

        let outcome = r.reconcile(TimeSample::new(Weekday::Wed, 12)).await.unwrap();

        assert_eq!(outcome, TickOutcome::Unchanged { capacity: 2 });
        assert!(gateway.set_calls().is_empty());
    }

    #[tokio::test]
    async fn weekday_close_scales_to_zero() {
        let gateway = MockGateway::with_capacity(2);
        let mut r = reconciler(&gateway, office_hours());

        let outcome = r.reconcile(TimeSample::new(Weekday::Wed, 19)).await.unwrap();

        assert_eq!(outcome, TickOutcome::Scaled { from: 2, to: 0 });
        assert_eq!(gateway.capacity(), 0);
    }

    #[tokio::test]
    async fn weekend_without_consultant_mode_stays_dormant() {
        let gateway = MockGateway::with_capacity(0);
        let mut r = reconciler(&gateway, office_hours());

        let outcome = r.reconcile(TimeSample::new(Weekday::Sat, 10)).await.unwrap();

        assert_eq!(outcome, TickOutcome::Unchanged { capacity: 0 });
        assert!(gateway.set_calls().is_empty());
    }

    #[tokio::test]
    async fn weekend_with_consultant_mode_restores_peak() {
        let gateway = MockGateway::with_capacity(0);
        let mut r = reconciler(&gateway, ScheduleConfig::new(9, 18, true).unwrap());

        let outcome = r.reconcile(TimeSample::new(Weekday::Sat, 10)).await.unwrap();

        assert_eq!(outcome, TickOutcome::Scaled { from: 0, to: 2 });
        assert_eq!(gateway.capacity(), 2);
    }

    #[tokio::test]
    async fn transient_error_defers_without_mutation() {
        let gateway = MockGateway::with_capacity(2);
        gateway.fail_set_with("ScalingActivityInProgress");
        let mut r = reconciler(&gateway, office_hours());
        let before = r.state();

        let sample = TimeSample::new(Weekday::Wed, 19);
        let outcome = r.reconcile(sample).await.unwrap();

        assert!(matches!(outcome, TickOutcome::Deferred { target: 0, .. }));
        assert_eq!(r.state(), before);
        assert_eq!(gateway.capacity(), 2);

        // Same inputs next tick: the same comparison is retried.
        gateway.clear_set_error();
        let outcome = r.reconcile(sample).await.unwrap();
        assert_eq!(outcome, TickOutcome::Scaled { from: 2, to: 0 });
        assert_eq!(gateway.set_calls(), vec![0, 0]);
    }

    #[tokio::test]
    async fn resource_contention_is_transient() {
        let gateway = MockGateway::with_capacity(2);
        gateway.fail_set_with("ResourceContention");
        let mut r = reconciler(&gateway, office_hours());

        let outcome = r.reconcile(TimeSample::new(Weekday::Mon, 3)).await.unwrap();
        assert!(matches!(outcome, TickOutcome::Deferred { .. }));
    }

    #[tokio::test]
    async fn other_set_errors_are_fatal() {
        let gateway = MockGateway::with_capacity(2);
        gateway.fail_set_with("AccessDenied");
        let mut r = reconciler(&gateway, office_hours());

        let err = r
            .reconcile(TimeSample::new(Weekday::Wed, 19))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::SetCapacity { target: 0, .. }
        ));
    }

    #[tokio::test]
    async fn read_failure_is_fatal() {
        let gateway = Arc::new(MockGateway {
            read_fails: true,
            ..Default::default()
        });
        let mut r = Reconciler::new("asg", office_hours(), gateway.clone(), 2);

        let err = r
            .reconcile(TimeSample::new(Weekday::Wed, 12))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::ReadCapacity { .. }));
        assert!(gateway.set_calls().is_empty());
    }

    #[tokio::test]
    async fn manual_upsize_is_remembered_and_restored() {
        let gateway = MockGateway::with_capacity(5);
        let records = Arc::new(Mutex::new(Vec::new()));
        let mut r = reconciler(&gateway, office_hours()).with_sink(Box::new(RecordingSink {
            records: records.clone(),
            fail: false,
        }));

        // Operator scaled to 5 during the day.
        let outcome = r.reconcile(TimeSample::new(Weekday::Tue, 14)).await.unwrap();
        assert_eq!(outcome, TickOutcome::Unchanged { capacity: 5 });
        assert_eq!(r.state().peak_capacity, 5);

        // Night: down to zero.
        r.reconcile(TimeSample::new(Weekday::Tue, 23)).await.unwrap();
        assert_eq!(gateway.capacity(), 0);

        // Morning: back to the remembered 5, not the initial 2.
        let outcome = r.reconcile(TimeSample::new(Weekday::Wed, 9)).await.unwrap();
        assert_eq!(outcome, TickOutcome::Scaled { from: 0, to: 5 });

        let records = records.lock().unwrap();
        assert_eq!(
            *records,
            vec![("asg".to_string(), CapacitySnapshot { asg_size: 5 })]
        );
    }

    #[tokio::test]
    async fn sink_failure_does_not_stop_the_tick() {
        let gateway = MockGateway::with_capacity(4);
        let mut r = reconciler(&gateway, office_hours()).with_sink(Box::new(RecordingSink {
            records: Arc::new(Mutex::new(Vec::new())),
            fail: true,
        }));

        let outcome = r.reconcile(TimeSample::new(Weekday::Thu, 20)).await.unwrap();

        assert_eq!(outcome, TickOutcome::Scaled { from: 4, to: 0 });
        assert_eq!(r.state().peak_capacity, 4);
    }

    #[tokio::test]
    async fn tick_samples_the_given_instant() {
        let gateway = MockGateway::with_capacity(2);
        let mut r = reconciler(&gateway, office_hours());

        // 2024-06-12 is a Wednesday.
        let evening = NaiveDate::from_ymd_opt(2024, 6, 12)
            .unwrap()
            .and_hms_opt(19, 5, 0)
            .unwrap()
            .and_utc();
        let outcome = r.tick(&evening).await.unwrap();
        assert_eq!(outcome, TickOutcome::Scaled { from: 2, to: 0 });

        let _ = r.tick(&Utc::now()).await.unwrap();
    }
}
