//! Typed configuration of a load run.
//!
//! [`LoadConfig`] bundles everything a [`LoadDriver`](crate::LoadDriver) needs.
//! All types deserialize with serde, so they can be embedded in any
//! configuration format. In YAML, a complete run looks like this:
//!
//! ```yaml
//! run:
//!   threads: 8
//!   duration: 30s
//!
//! sampler:
//!   interval: 1s
//!   output: samples.csv
//!
//! key_store:
//!   type: hierarchical
//!   path: /tmp/kvload-keys
//!   overwrite: true
//!
//! service:
//!   type: memory
//!   latency: 200us
//!
//! strategy:
//!   name: read-write
//!   options:
//!     reads-per-write: 3
//!     value-size: 4KiB
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::keystore::{HierarchicalKeyStore, KeyStore, MemoryKeyStore};
use crate::sampler::{CsvSink, IntervalSink, NullSink, ProcMonitor, Sampler};
use crate::service::{MemoryQueue, MemoryService, Service};
use crate::strategy::StrategyConfig;

/// Complete configuration of a load run.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Worker threads and run limits.
    pub run: RunConfig,
    /// Sampling interval and export.
    pub sampler: SamplerConfig,
    /// Where keys of successful writes are persisted.
    pub key_store: KeyStoreConfig,
    /// The target service.
    pub service: ServiceConfig,
    /// The load strategy and its options.
    pub strategy: StrategyConfig,
}

impl LoadConfig {
    /// Checks values that deserialize fine but cannot be run.
    pub fn validate(&self) -> Result<()> {
        if self.run.threads == 0 {
            return Err(Error::Config("`run.threads` must be at least 1".into()));
        }
        if self.sampler.interval.is_zero() {
            return Err(Error::Config("`sampler.interval` must not be zero".into()));
        }
        if let ServiceConfig::Memory { failure_rate, .. } = self.service {
            if !(0.0..=1.0).contains(&failure_rate) {
                return Err(Error::Config(
                    "`service.failure_rate` must be between 0 and 1".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Worker threads and limits of a run.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct RunConfig {
    /// Number of worker threads.
    ///
    /// Defaults to `4`.
    pub threads: usize,

    /// How long to run before the strategy is told to wind down.
    ///
    /// Without a duration, the run lasts until the strategy is exhausted or
    /// the run is stopped from the console.
    #[serde(with = "humantime_serde")]
    pub duration: Option<Duration>,

    /// Pause of each worker between two operations.
    #[serde(with = "humantime_serde")]
    pub sleep: Option<Duration>,

    /// Accept commands on standard input while running.
    pub interactive: bool,

    /// In interactive mode, keep the run open after the workers finish until
    /// `quit` is entered.
    pub wait_for_quit: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            duration: None,
            sleep: None,
            interactive: false,
            wait_for_quit: false,
        }
    }
}

/// Sampling of operation outcomes.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Length of one sampling interval.
    ///
    /// Defaults to `1s`.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// CSV file receiving one row per interval. Created or truncated on start.
    pub output: Option<PathBuf>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            output: None,
        }
    }
}

impl SamplerConfig {
    /// Builds a sampler reading system metrics from `/proc`.
    pub fn build(&self) -> Result<Sampler> {
        let sink: Box<dyn IntervalSink> = match &self.output {
            Some(path) => Box::new(CsvSink::create(path)?),
            None => Box::new(NullSink),
        };
        Ok(Sampler::new(self.interval, sink).with_monitor(ProcMonitor::new()))
    }
}

/// Key store configuration.
///
/// The `type` field selects the variant.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum KeyStoreConfig {
    /// Keys are not persisted.
    #[default]
    None,

    /// Keys are kept in memory for the duration of the process.
    Memory {
        /// Persist values along with keys.
        #[serde(default)]
        store_values: bool,
    },

    /// Keys are written to a two-level directory tree, one file per key.
    ///
    /// ```yaml
    /// key_store:
    ///   type: hierarchical
    ///   path: /tmp/kvload-keys
    /// ```
    Hierarchical {
        /// Root directory. Its parent must exist.
        path: PathBuf,
        /// Allow starting on an existing directory. Existing entries are kept.
        #[serde(default)]
        overwrite: bool,
        /// Persist values along with keys.
        #[serde(default)]
        store_values: bool,
    },
}

impl KeyStoreConfig {
    /// Builds the configured key store, or `None` if keys are not persisted.
    pub fn build(&self) -> Option<Arc<dyn KeyStore>> {
        match self {
            KeyStoreConfig::None => None,
            KeyStoreConfig::Memory { store_values } => {
                Some(Arc::new(MemoryKeyStore::new().with_values(*store_values)))
            }
            KeyStoreConfig::Hierarchical {
                path,
                overwrite,
                store_values,
            } => Some(Arc::new(
                HierarchicalKeyStore::new(path)
                    .with_overwrite(*overwrite)
                    .with_values(*store_values),
            )),
        }
    }
}

/// The built-in target services.
///
/// Other services are passed to [`LoadDriver::with_service`](crate::LoadDriver::with_service).
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServiceConfig {
    /// An in-process key/value map.
    Memory {
        /// Artificial latency added to every operation.
        #[serde(default, with = "humantime_serde")]
        latency: Option<Duration>,
        /// Share of operations that fail with a timeout, between 0 and 1.
        #[serde(default)]
        failure_rate: f64,
    },

    /// In-process message queues, one per destination.
    Queue {
        /// Artificial latency added to every operation.
        #[serde(default, with = "humantime_serde")]
        latency: Option<Duration>,
    },
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig::Memory {
            latency: None,
            failure_rate: 0.0,
        }
    }
}

impl ServiceConfig {
    /// Builds the configured service.
    pub fn build(&self) -> Arc<dyn Service> {
        match *self {
            ServiceConfig::Memory {
                latency,
                failure_rate,
            } => Arc::new(
                MemoryService::new()
                    .with_latency(latency.unwrap_or_default())
                    .with_failure_rate(failure_rate),
            ),
            ServiceConfig::Queue { latency } => {
                Arc::new(MemoryQueue::new().with_latency(latency.unwrap_or_default()))
            }
        }
    }
}
