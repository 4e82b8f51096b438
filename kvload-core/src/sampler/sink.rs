//! Destinations for closed sampling intervals.

use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, UNIX_EPOCH};

use super::interval::SamplingInterval;
use crate::error::Result;
use crate::operation::OperationKind;

/// Receives every interval once it closes.
pub trait IntervalSink: Send + fmt::Debug {
    /// Called once before the first interval with the registered failure types.
    fn begin(&mut self, _failure_types: &[&'static str]) -> Result<()> {
        Ok(())
    }

    /// Receives a closed interval.
    fn accept(&mut self, interval: &SamplingInterval) -> Result<()>;

    /// Called once after the last interval.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Discards all intervals.
#[derive(Debug, Default)]
pub struct NullSink;

impl IntervalSink for NullSink {
    fn accept(&mut self, _interval: &SamplingInterval) -> Result<()> {
        Ok(())
    }
}

/// Keeps closed intervals in memory. Clones share the same storage.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    intervals: Arc<Mutex<Vec<SamplingInterval>>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all intervals received so far.
    pub fn intervals(&self) -> Vec<SamplingInterval> {
        self.intervals.lock().unwrap().clone()
    }
}

impl IntervalSink for MemorySink {
    fn accept(&mut self, interval: &SamplingInterval) -> Result<()> {
        self.intervals.lock().unwrap().push(interval.clone());
        Ok(())
    }
}

/// Writes one CSV row per interval.
///
/// Columns are: timestamp, throughput, reads/s, hits/s, hit ratio, writes/s,
/// average read and write latency, one column per registered failure type,
/// then load average, CPU, memory and comments.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    failure_types: Vec<&'static str>,
}

impl CsvSink<File> {
    /// Creates (or truncates) the file at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: Write> CsvSink<W> {
    /// Writes CSV into `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(writer),
            failure_types: Vec::new(),
        }
    }

    /// Flushes and returns the underlying writer.
    pub fn into_inner(self) -> io::Result<W> {
        self.writer.into_inner().map_err(|e| e.into_error())
    }
}

impl<W: Write> fmt::Debug for CsvSink<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsvSink")
            .field("failure_types", &self.failure_types)
            .finish_non_exhaustive()
    }
}

impl<W: Write + Send> IntervalSink for CsvSink<W> {
    fn begin(&mut self, failure_types: &[&'static str]) -> Result<()> {
        self.failure_types = failure_types.to_vec();

        let mut header = vec![
            "Timestamp".to_owned(),
            "Throughput (ops/s)".to_owned(),
            "Reads/s".to_owned(),
            "Hits/s".to_owned(),
            "Hit ratio (%)".to_owned(),
            "Writes/s".to_owned(),
            "Avg read (ms)".to_owned(),
            "Avg write (ms)".to_owned(),
        ];
        header.extend(self.failure_types.iter().map(|f| format!("Failed: {f}")));
        header.extend(
            [
                "Load average",
                "System CPU (%)",
                "Process CPU (%)",
                "Used memory (MB)",
                "Committed memory (MB)",
                "Comment",
            ]
            .map(str::to_owned),
        );

        self.writer.write_record(&header)?;
        self.writer.flush()?;
        Ok(())
    }

    fn accept(&mut self, interval: &SamplingInterval) -> Result<()> {
        let reads = interval.operation(OperationKind::Read);
        let writes = interval.operation(OperationKind::Write);
        let hit_ratio = if reads.count == 0 {
            0.0
        } else {
            reads.hits as f64 / reads.count as f64 * 100.0
        };
        let average_ms = |average: Option<Duration>| {
            format!("{:.3}", average.map_or(0.0, |d| d.as_secs_f64() * 1000.0))
        };

        let timestamp = UNIX_EPOCH + Duration::from_millis(interval.start_ms());
        let mut record = vec![
            humantime::format_rfc3339_millis(timestamp).to_string(),
            format!("{:.2}", interval.per_second(interval.successes())),
            format!("{:.2}", interval.per_second(reads.count)),
            format!("{:.2}", interval.per_second(reads.hits)),
            format!("{hit_ratio:.2}"),
            format!("{:.2}", interval.per_second(writes.count)),
            average_ms(reads.average()),
            average_ms(writes.average()),
        ];
        record.extend(
            self.failure_types
                .iter()
                .map(|failure| interval.failure(failure).count.to_string()),
        );

        let system = interval.system();
        record.extend([
            format!("{:.2}", system.load_average),
            format!("{:.1}", system.system_cpu),
            format!("{:.1}", system.process_cpu),
            format!("{:.1}", system.used_memory_mb),
            format!("{:.1}", system.committed_memory_mb),
            interval.comments().join("; "),
        ]);

        self.writer.write_record(&record)?;
        self.writer.flush()?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::sampler::Sample;

    fn interval() -> SamplingInterval {
        let kinds = BTreeSet::from([OperationKind::Read, OperationKind::Write]);
        let mut interval = SamplingInterval::new(0, Duration::from_secs(1), &kinds, &["timeout"]);
        for (kind, hit, failure) in [
            (OperationKind::Write, false, None),
            (OperationKind::Read, true, None),
            (OperationKind::Read, false, None),
            (OperationKind::Read, false, Some("timeout")),
        ] {
            interval.add(&Sample {
                start_ms: 0,
                elapsed: Duration::from_millis(2),
                kind,
                hit,
                failure,
            });
        }
        interval.annotate("warm".into());
        interval
    }

    #[test]
    fn csv_layout() {
        let mut sink = CsvSink::new(Vec::new());
        sink.begin(&["timeout", "rejected"]).unwrap();
        sink.accept(&interval()).unwrap();
        sink.finish().unwrap();

        let output = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        let mut reader = csv::Reader::from_reader(output.as_bytes());

        let header = reader.headers().unwrap().clone();
        assert_eq!(header.len(), 8 + 2 + 6);
        assert_eq!(&header[8], "Failed: timeout");
        assert_eq!(&header[9], "Failed: rejected");

        let rows: Vec<_> = reader.records().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(&row[0], "1970-01-01T00:00:00.000Z");
        assert_eq!(&row[1], "3.00");
        assert_eq!(&row[2], "2.00");
        assert_eq!(&row[3], "1.00");
        assert_eq!(&row[4], "50.00");
        assert_eq!(&row[5], "1.00");
        assert_eq!(&row[6], "2.000");
        assert_eq!(&row[8], "1");
        assert_eq!(&row[9], "0");
        assert_eq!(&row[15], "warm");
    }

    #[test]
    fn memory_sink_shares_storage() {
        let sink = MemorySink::new();
        let mut writer = sink.clone();
        writer.accept(&interval()).unwrap();
        assert_eq!(sink.intervals().len(), 1);
    }
}
