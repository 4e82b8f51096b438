use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::LoadConfig;
use crate::error::Result;
use crate::keystore::KeyStore;
use crate::lifecycle::{Lifecycle, stop_logged};
use crate::runner::{Console, RunHandle, Runner};
use crate::sampler::{IntervalSink, ProcMonitor, Sampler, Summary};
use crate::service::Service;
use crate::strategy::{self, LoadStrategy};

type Observer = Box<dyn FnOnce(RunHandle, Arc<Sampler>) + Send>;

/// Assembles all components of a run from a [`LoadConfig`] and runs it.
///
/// Components start in the order key store, service, sampler, strategy and
/// stop in reverse. Stopping always runs, even if starting or running failed.
pub struct LoadDriver {
    config: LoadConfig,
    service: Option<Arc<dyn Service>>,
    sink: Option<Box<dyn IntervalSink>>,
    console: Option<Box<dyn Console>>,
    observer: Option<Observer>,
}

impl LoadDriver {
    /// Creates a driver for `config`.
    pub fn new(config: LoadConfig) -> Self {
        Self {
            config,
            service: None,
            sink: None,
            console: None,
            observer: None,
        }
    }

    /// Targets `service` instead of the configured built-in service.
    pub fn with_service(mut self, service: Arc<dyn Service>) -> Self {
        self.service = Some(service);
        self
    }

    /// Sends sampling intervals to `sink` instead of the configured output.
    pub fn with_sink(mut self, sink: Box<dyn IntervalSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Attaches a console, used when the run is interactive.
    pub fn with_console(mut self, console: Box<dyn Console>) -> Self {
        self.console = Some(console);
        self
    }

    /// Calls `observer` once all components are started, before the workers launch.
    pub fn with_observer(
        mut self,
        observer: impl FnOnce(RunHandle, Arc<Sampler>) + Send + 'static,
    ) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Runs the load test to completion and returns its statistics.
    pub fn run(self) -> Result<Summary> {
        let LoadDriver {
            config,
            service,
            sink,
            console,
            observer,
        } = self;
        config.validate()?;

        let key_store = config.key_store.build();
        let service = service.unwrap_or_else(|| config.service.build());
        let sampler = Arc::new(match sink {
            Some(sink) => {
                Sampler::new(config.sampler.interval, sink).with_monitor(ProcMonitor::new())
            }
            None => config.sampler.build()?,
        });

        let strategy = Arc::new(strategy::from_config(&config.strategy, key_store.as_ref())?);
        strategy.bind(service.as_ref())?;
        for &kind in strategy.operation_kinds() {
            sampler.register_operation(kind)?;
        }
        for &failure_type in service.failure_types() {
            sampler.register_failure_type(failure_type)?;
        }
        debug!(?strategy, ?service, ?key_store, "components assembled");

        let components = Components {
            key_store: key_store.clone(),
            service: service.clone(),
            sampler: sampler.clone(),
            strategy: strategy.clone(),
        };

        let result = components.start().and_then(|()| {
            let mut runner = Runner::new(config.run.clone(), service, strategy, sampler.clone());
            if let Some(key_store) = key_store {
                runner = runner.with_key_store(key_store);
            }
            if let Some(console) = console {
                runner = runner.with_console(console);
            }
            if let Some(observer) = observer {
                observer(runner.handle(), sampler.clone());
            }
            runner.run()
        });
        components.stop();
        result?;

        let summary = sampler.take_summary();
        info!(
            total = summary.total(),
            failures = summary.failure_count(),
            "load run complete"
        );
        Ok(summary)
    }
}

impl fmt::Debug for LoadDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadDriver")
            .field("config", &self.config)
            .field("service", &self.service)
            .field("sink", &self.sink)
            .field("console", &self.console)
            .finish_non_exhaustive()
    }
}

struct Components {
    key_store: Option<Arc<dyn KeyStore>>,
    service: Arc<dyn Service>,
    sampler: Arc<Sampler>,
    strategy: Arc<LoadStrategy>,
}

impl Components {
    fn start(&self) -> Result<()> {
        if let Some(key_store) = &self.key_store {
            key_store.start()?;
        }
        self.service.start()?;
        self.sampler.start()?;
        self.strategy.start()
    }

    fn stop(&self) {
        stop_logged("strategy", || self.strategy.stop());
        stop_logged("sampler", || self.sampler.stop());
        stop_logged("service", || self.service.stop());
        if let Some(key_store) = &self.key_store {
            stop_logged("key store", || key_store.stop());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::config::KeyStoreConfig;
    use crate::error::Error;
    use crate::sampler::MemorySink;

    fn config(strategy: serde_json::Value) -> LoadConfig {
        let mut config = LoadConfig::default();
        config.run.threads = 2;
        config.sampler.interval = Duration::from_millis(50);
        config.strategy = serde_json::from_value(strategy).unwrap();
        config
    }

    #[test]
    fn runs_against_builtin_service() {
        let sink = MemorySink::new();
        let mut config = config(json!({
            "name": "write-only",
            "options": { "max-operations": 20, "value-size": 16 },
        }));
        config.key_store = KeyStoreConfig::Memory { store_values: false };

        let summary = LoadDriver::new(config)
            .with_sink(Box::new(sink.clone()))
            .run()
            .unwrap();

        assert_eq!(summary.successes(), 20);
        assert_eq!(summary.failure_count(), 0);
        let recorded: u64 = sink.intervals().iter().map(|i| i.total()).sum();
        assert_eq!(recorded, 20);
    }

    #[test]
    fn rejects_mismatched_service() {
        let mut config = config(json!({ "name": "send" }));
        config.run.duration = Some(Duration::from_millis(10));

        let error = LoadDriver::new(config).run().unwrap_err();
        assert!(matches!(error, Error::IncompatibleService { .. }));
    }

    #[test]
    fn rejects_unknown_options() {
        let config = config(json!({ "name": "write-only", "options": { "bogus": 1 } }));
        let error = LoadDriver::new(config).run().unwrap_err();
        assert!(error.is_user_error());
    }

    #[test]
    fn observer_sees_the_run() {
        let config = config(json!({ "name": "write-only", "options": { "max-operations": 5 } }));
        let (tx, rx) = std::sync::mpsc::channel();

        LoadDriver::new(config)
            .with_sink(Box::new(MemorySink::new()))
            .with_observer(move |handle, sampler| {
                tx.send((handle.is_running(), sampler.is_started())).unwrap();
            })
            .run()
            .unwrap();

        assert_eq!(rx.recv().unwrap(), (true, true));
    }
}
