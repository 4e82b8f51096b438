//! Time-bucketed aggregation of operation outcomes.
//!
//! Workers hand every finished operation to [`Sampler::record`]. The sampler
//! attributes it to the [`SamplingInterval`] that covers its start time and
//! hands each interval to an [`IntervalSink`] once time moves past its end.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::lifecycle::Lifecycle;
use crate::operation::OperationKind;
use crate::service::ServiceError;

mod interval;
mod sink;
mod summary;
mod system;

pub use interval::{Counter, Sample, SamplingInterval};
pub use sink::{CsvSink, IntervalSink, MemorySink, NullSink};
pub use summary::{OperationStats, Summary};
pub use system::{NullMonitor, ProcMonitor, SystemMetrics, SystemMonitor};

use interval::duration_ms;

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

struct State {
    kinds: BTreeSet<OperationKind>,
    failure_types: Vec<&'static str>,
    current: Option<SamplingInterval>,
    last_metrics: SystemMetrics,
    started_at: Option<Instant>,
    sink: Box<dyn IntervalSink>,
    summary: Summary,
}

impl State {
    fn emit(&mut self, interval: &SamplingInterval) {
        if let Err(error) = self.sink.accept(interval) {
            warn!(
                error = &error as &dyn std::error::Error,
                start_ms = interval.start_ms(),
                "failed to write sampling interval"
            );
        }
    }
}

/// Aggregates samples from any number of threads.
pub struct Sampler {
    interval: Duration,
    monitor: Box<dyn SystemMonitor>,
    state: Mutex<State>,
}

impl Sampler {
    /// Creates a sampler with buckets of length `interval` that hands closed
    /// buckets to `sink`.
    ///
    /// The failure types of [`ServiceError`] are registered up front.
    pub fn new(interval: Duration, sink: Box<dyn IntervalSink>) -> Self {
        Self {
            interval,
            monitor: Box::new(NullMonitor),
            state: Mutex::new(State {
                kinds: BTreeSet::new(),
                failure_types: ServiceError::FAILURE_TYPES.to_vec(),
                current: None,
                last_metrics: SystemMetrics::default(),
                started_at: None,
                sink,
                summary: Summary::default(),
            }),
        }
    }

    /// Replaces the source of system metrics.
    pub fn with_monitor(mut self, monitor: impl SystemMonitor + 'static) -> Self {
        self.monitor = Box::new(monitor);
        self
    }

    /// Length of every bucket.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Declares an operation kind that will be recorded. Must precede [`start`](Lifecycle::start).
    pub fn register_operation(&self, kind: OperationKind) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.current.is_some() {
            return Err(Error::Lifecycle(
                "operations must be registered before the sampler starts".into(),
            ));
        }
        state.kinds.insert(kind);
        Ok(())
    }

    /// Declares an additional failure type that gets its own export column.
    pub fn register_failure_type(&self, failure_type: &'static str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.current.is_some() {
            return Err(Error::Lifecycle(
                "failure types must be registered before the sampler starts".into(),
            ));
        }
        if !state.failure_types.contains(&failure_type) {
            state.failure_types.push(failure_type);
        }
        Ok(())
    }

    /// Starts sampling with the first bucket beginning at `start_ms`.
    ///
    /// Does nothing if the sampler is already started.
    pub fn start_at(&self, start_ms: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.current.is_some() {
            return Ok(());
        }

        let failure_types = state.failure_types.clone();
        state.sink.begin(&failure_types)?;

        state.last_metrics = self.monitor.snapshot();
        state.started_at = Some(Instant::now());
        state.summary = Summary::default();
        state.current = Some(SamplingInterval::new(
            start_ms,
            self.interval,
            &state.kinds,
            &state.failure_types,
        ));

        debug!(start_ms, interval = ?self.interval, "sampler started");
        Ok(())
    }

    /// Records one operation outcome.
    ///
    /// Samples before the current bucket are attributed to it. Samples past
    /// its end close it, along with an empty bucket for every window in
    /// between. Samples are dropped with a warning while the sampler is stopped.
    pub fn record(&self, sample: Sample) {
        let mut state = self.state.lock().unwrap();
        let State {
            current: Some(current),
            ..
        } = &mut *state
        else {
            warn!(kind = %sample.kind, "sample recorded while sampler is stopped");
            return;
        };

        if sample.start_ms > current.end_ms() {
            self.roll_over(&mut state, sample.start_ms);
        }

        state.summary.add(&sample);
        if let Some(current) = &mut state.current {
            current.add(&sample);
        }
    }

    fn roll_over(&self, state: &mut State, start_ms: u64) {
        let Some(mut closed) = state.current.take() else {
            return;
        };

        let step = duration_ms(self.interval);
        let steps = (start_ms - closed.end_ms() - 1) / step + 1;
        let now = self.monitor.snapshot();
        let from = state.last_metrics;
        let metrics_at = |index: u64| from.interpolate(&now, index as f64 / steps as f64);

        closed.close(metrics_at(1));
        state.emit(&closed);

        for index in 1..steps {
            let mut empty = SamplingInterval::new(
                closed.start_ms() + index * step,
                self.interval,
                &state.kinds,
                &state.failure_types,
            );
            empty.close(metrics_at(index + 1));
            state.emit(&empty);
        }

        state.last_metrics = now;
        state.current = Some(SamplingInterval::new(
            closed.start_ms() + steps * step,
            self.interval,
            &state.kinds,
            &state.failure_types,
        ));
    }

    /// Adds a free-text comment to the current bucket.
    pub fn annotate(&self, comment: impl Into<String>) {
        let mut state = self.state.lock().unwrap();
        match &mut state.current {
            Some(current) => current.annotate(comment.into()),
            None => warn!("comment added while sampler is stopped"),
        }
    }

    /// Returns the statistics of the last run and resets them.
    pub fn take_summary(&self) -> Summary {
        std::mem::take(&mut self.state.lock().unwrap().summary)
    }

    /// Number of operations recorded since the sampler started.
    pub fn recorded(&self) -> u64 {
        self.state.lock().unwrap().summary.total()
    }
}

impl Lifecycle for Sampler {
    fn start(&self) -> Result<()> {
        self.start_at(now_ms())
    }

    /// Flushes the current, possibly partial, bucket.
    fn stop(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let Some(mut last) = state.current.take() else {
            return Ok(());
        };

        let metrics = self.monitor.snapshot();
        last.close(metrics);
        state.last_metrics = metrics;
        state.emit(&last);

        if let Some(started_at) = state.started_at.take() {
            state.summary.set_elapsed(started_at.elapsed());
        }

        debug!(recorded = state.summary.total(), "sampler stopped");
        state.sink.finish()
    }

    fn is_started(&self) -> bool {
        self.state.lock().unwrap().current.is_some()
    }
}

impl fmt::Debug for Sampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sampler")
            .field("interval", &self.interval)
            .field("monitor", &self.monitor)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    #[derive(Debug, Default)]
    struct RampMonitor {
        calls: AtomicU64,
    }

    impl SystemMonitor for RampMonitor {
        fn snapshot(&self) -> SystemMetrics {
            let call = self.calls.fetch_add(1, Ordering::Relaxed);
            SystemMetrics {
                load_average: call as f64 * 4.0,
                ..Default::default()
            }
        }
    }

    fn sample(start_ms: u64, kind: OperationKind, failure: Option<&'static str>) -> Sample {
        Sample {
            start_ms,
            elapsed: Duration::from_millis(1),
            kind,
            hit: false,
            failure,
        }
    }

    fn sampler() -> (Sampler, MemorySink) {
        let sink = MemorySink::new();
        let sampler = Sampler::new(Duration::from_millis(100), Box::new(sink.clone()));
        sampler.register_operation(OperationKind::Write).unwrap();
        (sampler, sink)
    }

    #[test]
    fn edge_samples_belong_to_the_ending_bucket() {
        let (sampler, sink) = sampler();
        sampler.start_at(1000).unwrap();

        sampler.record(sample(1000, OperationKind::Write, None));
        sampler.record(sample(1100, OperationKind::Write, None));
        sampler.record(sample(1101, OperationKind::Write, None));
        sampler.record(sample(1200, OperationKind::Write, None));
        sampler.stop().unwrap();

        let intervals = sink.intervals();
        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[0].start_ms(), 1000);
        assert_eq!(intervals[0].operation(OperationKind::Write).count, 2);
        assert_eq!(intervals[1].start_ms(), 1100);
        assert_eq!(intervals[1].operation(OperationKind::Write).count, 2);
    }

    #[test]
    fn rollover_synthesizes_empty_buckets() {
        let sink = MemorySink::new();
        let sampler = Sampler::new(Duration::from_millis(100), Box::new(sink.clone()))
            .with_monitor(RampMonitor::default());
        sampler.register_operation(OperationKind::Write).unwrap();
        // snapshot #0 -> load 0.0
        sampler.start_at(0).unwrap();

        sampler.record(sample(10, OperationKind::Write, None));
        sampler.record(sample(20, OperationKind::Write, Some("timeout")));
        // Lands in (300, 400]: closes [0, 100] and synthesizes two empty buckets.
        // snapshot #1 -> load 4.0
        sampler.record(sample(350, OperationKind::Write, None));
        sampler.record(sample(900, OperationKind::Write, None));
        sampler.stop().unwrap();

        let intervals = sink.intervals();
        let starts: Vec<_> = intervals.iter().map(|i| i.start_ms()).collect();
        assert_eq!(starts, [0, 100, 200, 300, 400, 500, 600, 700, 800]);

        let total: u64 = intervals.iter().map(|i| i.total()).sum();
        assert_eq!(total, 4);
        assert_eq!(intervals[0].total(), 2);
        assert_eq!(intervals[0].failure("timeout").count, 1);
        assert!(intervals[1].is_empty() && intervals[2].is_empty());
        assert_eq!(intervals[1].operation(OperationKind::Write).count, 0);
        assert_eq!(intervals[3].total(), 1);
        assert_eq!(intervals[8].total(), 1);

        let loads: Vec<_> = intervals[..3]
            .iter()
            .map(|i| i.system().load_average)
            .collect();
        assert_eq!(loads, [4.0 / 3.0, 8.0 / 3.0, 4.0]);
    }

    #[test]
    fn stop_flushes_partial_bucket() {
        let (sampler, sink) = sampler();
        sampler.start_at(0).unwrap();
        sampler.record(sample(5, OperationKind::Write, None));
        sampler.annotate("note");
        assert!(sink.intervals().is_empty());

        sampler.stop().unwrap();
        sampler.stop().unwrap();

        let intervals = sink.intervals();
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].comments(), ["note"]);
        assert!(!sampler.is_started());
    }

    #[test]
    fn registration_is_closed_after_start() {
        let (sampler, _) = sampler();
        sampler.start().unwrap();
        assert!(sampler.register_operation(OperationKind::Read).is_err());
        assert!(sampler.register_failure_type("custom").is_err());
    }

    #[test]
    fn summary_covers_every_sample() {
        let (sampler, _) = sampler();
        sampler.start_at(0).unwrap();
        for start in 0..50 {
            sampler.record(sample(start * 10, OperationKind::Write, None));
        }
        sampler.stop().unwrap();

        let summary = sampler.take_summary();
        assert_eq!(summary.successes(), 50);
        assert_eq!(summary.operations()[&OperationKind::Write].successes, 50);
    }

    #[test]
    fn concurrent_recording() {
        let (sampler, sink) = sampler();
        let sampler = Arc::new(sampler);
        sampler.start_at(0).unwrap();

        std::thread::scope(|scope| {
            for thread in 0..8u64 {
                let sampler = &sampler;
                scope.spawn(move || {
                    for i in 0..1000u64 {
                        sampler.record(sample(thread + i, OperationKind::Write, None));
                    }
                });
            }
        });
        sampler.stop().unwrap();

        let total: u64 = sink.intervals().iter().map(|i| i.total()).sum();
        assert_eq!(total, 8000);
    }
}
