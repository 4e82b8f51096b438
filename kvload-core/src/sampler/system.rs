//! Snapshots of host and process resource usage, attached to every sampling interval.

use std::fmt;
use std::fs;
use std::sync::Mutex;

use anyhow::{Context, Result, bail};
use tracing::debug;

/// Resource usage at one point in time.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SystemMetrics {
    /// One-minute system load average.
    pub load_average: f64,
    /// Share of total CPU time spent busy, in percent.
    pub system_cpu: f64,
    /// Share of total CPU time spent in this process, in percent.
    pub process_cpu: f64,
    /// Resident memory of this process, in MB.
    pub used_memory_mb: f64,
    /// Virtual memory reserved by this process, in MB.
    pub committed_memory_mb: f64,
}

impl SystemMetrics {
    /// Linearly interpolates between `self` (at `0.0`) and `to` (at `1.0`).
    pub fn interpolate(&self, to: &SystemMetrics, fraction: f64) -> SystemMetrics {
        let lerp = |a: f64, b: f64| a + (b - a) * fraction;
        SystemMetrics {
            load_average: lerp(self.load_average, to.load_average),
            system_cpu: lerp(self.system_cpu, to.system_cpu),
            process_cpu: lerp(self.process_cpu, to.process_cpu),
            used_memory_mb: lerp(self.used_memory_mb, to.used_memory_mb),
            committed_memory_mb: lerp(self.committed_memory_mb, to.committed_memory_mb),
        }
    }
}

/// A source of [`SystemMetrics`].
pub trait SystemMonitor: Send + Sync + fmt::Debug {
    /// Takes a snapshot. CPU figures cover the time since the previous snapshot.
    fn snapshot(&self) -> SystemMetrics;
}

/// A monitor that always reports zeros.
#[derive(Debug, Default)]
pub struct NullMonitor;

impl SystemMonitor for NullMonitor {
    fn snapshot(&self) -> SystemMetrics {
        SystemMetrics::default()
    }
}

/// CPU tick counters, machine-wide and for this process.
#[derive(Clone, Copy, Debug, Default)]
struct CpuTicks {
    total: u64,
    idle: u64,
    process: u64,
}

/// Reads metrics from Linux `/proc`. Reports zeros where `/proc` is unavailable.
#[derive(Debug, Default)]
pub struct ProcMonitor {
    last: Mutex<Option<CpuTicks>>,
}

impl ProcMonitor {
    /// Creates a monitor. The first snapshot reports CPU usage since boot.
    pub fn new() -> Self {
        Self::default()
    }

    fn load_average() -> Result<f64> {
        let content = fs::read_to_string("/proc/loadavg").context("failed to read /proc/loadavg")?;
        content
            .split_whitespace()
            .next()
            .context("empty /proc/loadavg")?
            .parse()
            .context("invalid load average")
    }

    fn cpu_ticks() -> Result<CpuTicks> {
        let stat = fs::read_to_string("/proc/stat").context("failed to read /proc/stat")?;
        let line = stat.lines().next().context("empty /proc/stat")?;
        if !line.starts_with("cpu ") {
            bail!("invalid /proc/stat format");
        }
        let fields: Vec<u64> = line
            .split_whitespace()
            .skip(1)
            .map(str::parse)
            .collect::<Result<_, _>>()
            .context("invalid /proc/stat counter")?;
        if fields.len() < 5 {
            bail!("insufficient fields in /proc/stat cpu line");
        }
        // user nice system idle iowait ...
        let idle = fields[3] + fields[4];
        let total = fields.iter().sum();

        let own = fs::read_to_string("/proc/self/stat").context("failed to read /proc/self/stat")?;
        // The command name may contain spaces; fields resume after its closing paren.
        let rest = own.rsplit_once(')').context("invalid /proc/self/stat")?.1;
        let own: Vec<&str> = rest.split_whitespace().collect();
        // utime and stime are fields 14 and 15, i.e. 11 and 12 after the state field.
        let utime: u64 = own.get(11).context("missing utime")?.parse()?;
        let stime: u64 = own.get(12).context("missing stime")?.parse()?;

        Ok(CpuTicks {
            total,
            idle,
            process: utime + stime,
        })
    }

    fn memory_mb() -> Result<(f64, f64)> {
        let status =
            fs::read_to_string("/proc/self/status").context("failed to read /proc/self/status")?;
        let field = |name: &str| -> Result<f64> {
            let line = status
                .lines()
                .find(|line| line.starts_with(name))
                .with_context(|| format!("missing {name} in /proc/self/status"))?;
            let kib: f64 = line
                .split_whitespace()
                .nth(1)
                .context("missing value")?
                .parse()?;
            Ok(kib / 1024.0)
        };
        Ok((field("VmRSS:")?, field("VmSize:")?))
    }

    fn try_snapshot(&self) -> Result<SystemMetrics> {
        let load_average = Self::load_average()?;
        let ticks = Self::cpu_ticks()?;
        let (used_memory_mb, committed_memory_mb) = Self::memory_mb()?;

        let previous = self.last.lock().unwrap().replace(ticks).unwrap_or_default();
        let total = ticks.total.saturating_sub(previous.total);
        let (system_cpu, process_cpu) = if total == 0 {
            (0.0, 0.0)
        } else {
            let idle = ticks.idle.saturating_sub(previous.idle);
            let process = ticks.process.saturating_sub(previous.process);
            let busy = total.saturating_sub(idle);
            (
                busy as f64 / total as f64 * 100.0,
                process as f64 / total as f64 * 100.0,
            )
        };

        Ok(SystemMetrics {
            load_average,
            system_cpu,
            process_cpu,
            used_memory_mb,
            committed_memory_mb,
        })
    }
}

impl SystemMonitor for ProcMonitor {
    fn snapshot(&self) -> SystemMetrics {
        self.try_snapshot().unwrap_or_else(|error| {
            debug!(error = %error, "system metrics unavailable");
            SystemMetrics::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_linearly() {
        let from = SystemMetrics::default();
        let to = SystemMetrics {
            load_average: 2.0,
            system_cpu: 50.0,
            process_cpu: 10.0,
            used_memory_mb: 100.0,
            committed_memory_mb: 200.0,
        };

        let half = from.interpolate(&to, 0.5);
        assert_eq!(half.load_average, 1.0);
        assert_eq!(half.system_cpu, 25.0);
        assert_eq!(half.committed_memory_mb, 100.0);
        assert_eq!(from.interpolate(&to, 1.0), to);
    }

    #[test]
    fn proc_monitor_never_fails() {
        let monitor = ProcMonitor::new();
        let first = monitor.snapshot();
        let second = monitor.snapshot();
        assert!(first.system_cpu >= 0.0 && second.system_cpu <= 100.0);
    }
}
