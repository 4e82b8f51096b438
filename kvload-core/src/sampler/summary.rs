use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use sketches_ddsketch::DDSketch;

use super::interval::Sample;
use crate::operation::OperationKind;

/// Whole-run statistics of one operation kind.
#[derive(Default)]
pub struct OperationStats {
    /// Number of successful operations.
    pub successes: u64,
    /// Number of successful reads that found a value.
    pub hits: u64,
    /// Latency distribution of successful operations, in seconds.
    pub latency: DDSketch,
}

impl fmt::Debug for OperationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationStats")
            .field("successes", &self.successes)
            .field("hits", &self.hits)
            .field("latency_count", &self.latency.count())
            .finish()
    }
}

impl OperationStats {
    /// Returns the latency at quantile `q` (between 0 and 1).
    pub fn quantile(&self, q: f64) -> Option<Duration> {
        self.latency
            .quantile(q)
            .ok()
            .flatten()
            .map(Duration::from_secs_f64)
    }
}

/// Statistics over an entire run.
#[derive(Debug, Default)]
pub struct Summary {
    operations: BTreeMap<OperationKind, OperationStats>,
    failures: BTreeMap<&'static str, u64>,
    elapsed: Duration,
}

impl Summary {
    pub(crate) fn add(&mut self, sample: &Sample) {
        match sample.failure {
            None => {
                let stats = self.operations.entry(sample.kind).or_default();
                stats.successes += 1;
                stats.hits += sample.hit as u64;
                stats.latency.add(sample.elapsed.as_secs_f64());
            }
            Some(failure) => *self.failures.entry(failure).or_default() += 1,
        }
    }

    pub(crate) fn set_elapsed(&mut self, elapsed: Duration) {
        self.elapsed = elapsed;
    }

    /// Statistics per operation kind that succeeded at least once.
    pub fn operations(&self) -> &BTreeMap<OperationKind, OperationStats> {
        &self.operations
    }

    /// Number of failures per failure type.
    pub fn failures(&self) -> &BTreeMap<&'static str, u64> {
        &self.failures
    }

    /// Number of successful operations.
    pub fn successes(&self) -> u64 {
        self.operations.values().map(|s| s.successes).sum()
    }

    /// Number of failed operations.
    pub fn failure_count(&self) -> u64 {
        self.failures.values().sum()
    }

    /// Number of operations performed.
    pub fn total(&self) -> u64 {
        self.successes() + self.failure_count()
    }

    /// Time between sampler start and stop.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Successful operations per second over the whole run.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.successes() as f64 / secs
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregates_samples() {
        let mut summary = Summary::default();
        for millis in 1..=100 {
            summary.add(&Sample {
                start_ms: 0,
                elapsed: Duration::from_millis(millis),
                kind: OperationKind::Write,
                hit: false,
                failure: None,
            });
        }
        summary.add(&Sample {
            start_ms: 0,
            elapsed: Duration::ZERO,
            kind: OperationKind::Read,
            hit: false,
            failure: Some("timeout"),
        });
        summary.set_elapsed(Duration::from_secs(2));

        assert_eq!(summary.successes(), 100);
        assert_eq!(summary.failure_count(), 1);
        assert_eq!(summary.total(), 101);
        assert_eq!(summary.throughput(), 50.0);

        let writes = &summary.operations()[&OperationKind::Write];
        let median = writes.quantile(0.5).unwrap();
        assert!(median >= Duration::from_millis(48) && median <= Duration::from_millis(52));
        assert!(!summary.operations().contains_key(&OperationKind::Read));
    }
}
