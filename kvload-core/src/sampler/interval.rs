use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use super::system::SystemMetrics;
use crate::operation::OperationKind;

/// The outcome of one performed operation.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    /// Wall-clock start of the operation, in milliseconds since the Unix epoch.
    pub start_ms: u64,
    /// How long the operation took.
    pub elapsed: Duration,
    /// What kind of operation it was.
    pub kind: OperationKind,
    /// Whether it was a read that found a value.
    pub hit: bool,
    /// The failure type, or `None` if it succeeded.
    pub failure: Option<&'static str>,
}

impl Sample {
    /// A successful, non-hit sample of an operation that ran from `start` to `end`.
    pub fn new(start_ms: u64, start: Instant, end: Instant, kind: OperationKind) -> Self {
        Self {
            start_ms,
            elapsed: end.saturating_duration_since(start),
            kind,
            hit: false,
            failure: None,
        }
    }
}

/// Number and cumulated duration of operations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counter {
    /// Number of operations.
    pub count: u64,
    /// Number of reads among them that found a value.
    pub hits: u64,
    /// Sum of their durations, in nanoseconds.
    pub total_nanos: u64,
}

impl Counter {
    fn add(&mut self, elapsed: Duration, hit: bool) {
        self.count += 1;
        self.hits += hit as u64;
        self.total_nanos = self
            .total_nanos
            .saturating_add(u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX));
    }

    /// Average duration, or `None` if nothing was counted.
    pub fn average(&self) -> Option<Duration> {
        (self.count > 0).then(|| Duration::from_nanos(self.total_nanos / self.count))
    }
}

/// Aggregated samples of one fixed-length window.
///
/// The window covers start times in `(start_ms, end_ms]`; the very first
/// window of a run also includes its `start_ms`.
#[derive(Clone, Debug, PartialEq)]
pub struct SamplingInterval {
    start_ms: u64,
    duration: Duration,
    operations: BTreeMap<OperationKind, Counter>,
    failures: BTreeMap<&'static str, Counter>,
    comments: Vec<String>,
    system: SystemMetrics,
}

impl SamplingInterval {
    pub(crate) fn new(
        start_ms: u64,
        duration: Duration,
        kinds: &BTreeSet<OperationKind>,
        failure_types: &[&'static str],
    ) -> Self {
        Self {
            start_ms,
            duration,
            operations: kinds.iter().map(|&kind| (kind, Counter::default())).collect(),
            failures: failure_types
                .iter()
                .map(|&failure| (failure, Counter::default()))
                .collect(),
            comments: Vec::new(),
            system: SystemMetrics::default(),
        }
    }

    pub(crate) fn add(&mut self, sample: &Sample) {
        match sample.failure {
            None => self
                .operations
                .entry(sample.kind)
                .or_default()
                .add(sample.elapsed, sample.hit),
            Some(failure) => self
                .failures
                .entry(failure)
                .or_default()
                .add(sample.elapsed, false),
        }
    }

    pub(crate) fn annotate(&mut self, comment: String) {
        self.comments.push(comment);
    }

    pub(crate) fn close(&mut self, system: SystemMetrics) {
        self.system = system;
    }

    /// Start of the window, in milliseconds since the Unix epoch.
    pub fn start_ms(&self) -> u64 {
        self.start_ms
    }

    /// End of the window, in milliseconds since the Unix epoch.
    pub fn end_ms(&self) -> u64 {
        self.start_ms + duration_ms(self.duration)
    }

    /// Length of the window.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Successful operations of `kind`.
    pub fn operation(&self, kind: OperationKind) -> Counter {
        self.operations.get(&kind).copied().unwrap_or_default()
    }

    /// Successful operations by kind.
    pub fn operations(&self) -> impl Iterator<Item = (OperationKind, &Counter)> {
        self.operations.iter().map(|(&kind, counter)| (kind, counter))
    }

    /// Failed operations of the given failure type.
    pub fn failure(&self, failure_type: &str) -> Counter {
        self.failures.get(failure_type).copied().unwrap_or_default()
    }

    /// Failed operations by failure type.
    pub fn failures(&self) -> impl Iterator<Item = (&'static str, &Counter)> {
        self.failures.iter().map(|(&failure, counter)| (failure, counter))
    }

    /// Number of successful operations.
    pub fn successes(&self) -> u64 {
        self.operations.values().map(|c| c.count).sum()
    }

    /// Number of failed operations.
    pub fn failure_count(&self) -> u64 {
        self.failures.values().map(|c| c.count).sum()
    }

    /// Number of operations, successful or not.
    pub fn total(&self) -> u64 {
        self.successes() + self.failure_count()
    }

    /// Returns `true` if no operation landed in this window.
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Free-text comments added while the window was open.
    pub fn comments(&self) -> &[String] {
        &self.comments
    }

    /// Resource usage when the window closed.
    pub fn system(&self) -> &SystemMetrics {
        &self.system
    }

    /// `count` events per second of this window.
    pub fn per_second(&self, count: u64) -> f64 {
        count as f64 / self.duration.as_secs_f64()
    }
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(kind: OperationKind, millis: u64, failure: Option<&'static str>) -> Sample {
        let start = Instant::now();
        let end = start + Duration::from_millis(millis);
        Sample {
            failure,
            ..Sample::new(0, start, end, kind)
        }
    }

    #[test]
    fn counts_successes_and_failures_separately() {
        let kinds = BTreeSet::from([OperationKind::Read, OperationKind::Write]);
        let mut interval = SamplingInterval::new(1000, Duration::from_secs(1), &kinds, &["timeout"]);
        assert!(interval.is_empty());
        assert_eq!(interval.end_ms(), 2000);

        interval.add(&sample(OperationKind::Write, 2, None));
        interval.add(&sample(OperationKind::Write, 4, None));
        interval.add(&sample(OperationKind::Read, 1, Some("timeout")));

        let writes = interval.operation(OperationKind::Write);
        assert_eq!(writes.count, 2);
        assert_eq!(writes.average(), Some(Duration::from_millis(3)));
        assert_eq!(interval.operation(OperationKind::Read).count, 0);
        assert_eq!(interval.failure("timeout").count, 1);
        assert_eq!(interval.total(), 3);
        assert_eq!(interval.per_second(3), 3.0);
    }

    #[test]
    fn unregistered_failure_types_are_still_counted() {
        let mut interval = SamplingInterval::new(0, Duration::from_secs(1), &BTreeSet::new(), &[]);
        interval.add(&sample(OperationKind::Delete, 1, Some("custom")));
        assert_eq!(interval.failure("custom").count, 1);
    }
}
