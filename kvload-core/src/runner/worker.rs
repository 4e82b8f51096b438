//! The operation loop of a single worker thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use super::RunControl;
use super::barrier::ArrivalBarrier;
use crate::error::Result;
use crate::keystore::{KeyStore, StoredValue};
use crate::lifecycle::stop_logged;
use crate::operation::{Operation, OperationKind};
use crate::sampler::{Sample, Sampler, now_ms};
use crate::service::{PANIC_FAILURE, Service};
use crate::strategy::LoadStrategy;

/// Drives operations from the strategy against the service, one at a time.
pub(crate) struct Worker {
    pub name: String,
    pub service: Arc<dyn Service>,
    pub strategy: Arc<LoadStrategy>,
    pub sampler: Arc<Sampler>,
    pub key_store: Option<Arc<dyn KeyStore>>,
    pub control: Arc<RunControl>,
    pub barrier: Arc<ArrivalBarrier>,
    pub sleep: Option<Duration>,
}

impl Worker {
    pub fn run(self) {
        let _exit = ExitGuard {
            barrier: &self.barrier,
            key_store: self.key_store.as_deref(),
        };

        match self.run_loop() {
            Ok(performed) => debug!(thread = %self.name, performed, "worker finished"),
            Err(error) => error!(
                thread = %self.name,
                error = &error as &dyn std::error::Error,
                "worker aborted"
            ),
        }
    }

    fn run_loop(&self) -> Result<u64> {
        let mut performed = 0;
        let mut last: Option<Operation> = None;
        let mut last_written_key: Option<String> = None;

        while self.control.is_running() {
            let next = self.strategy.next(
                last.as_ref(),
                last_written_key.as_deref(),
                self.control.is_duration_expired(),
            )?;
            let Some(mut operation) = next else {
                break;
            };

            self.execute(&mut operation, &mut last_written_key);
            performed += 1;
            last = Some(operation);

            if let Some(sleep) = self.sleep {
                thread::sleep(sleep);
            }
        }

        Ok(performed)
    }

    fn execute(&self, operation: &mut Operation, last_written_key: &mut Option<String>) {
        let mut sample = SampleGuard::new(&self.sampler, operation.kind());

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.service.perform(operation)));
        sample.end = Some(Instant::now());

        match result {
            Ok(Ok(())) => {
                operation.mark_successful();
                sample.failure = None;
                sample.hit = operation.is_hit();
            }
            Ok(Err(error)) => {
                debug!(
                    thread = %self.name,
                    key = operation.key(),
                    error = &error as &dyn std::error::Error,
                    "operation failed"
                );
                sample.failure = Some(error.failure_type());
            }
            Err(_) => {
                warn!(thread = %self.name, key = operation.key(), "operation panicked");
            }
        }

        if operation.is_successful()
            && operation.kind() == OperationKind::Write
            && self.persist(operation)
        {
            *last_written_key = Some(operation.key().to_owned());
        }
    }

    fn persist(&self, operation: &Operation) -> bool {
        let Some(key_store) = &self.key_store else {
            return true;
        };

        let value = if key_store.store_values() {
            StoredValue::from(operation.value().cloned())
        } else {
            StoredValue::NotStored
        };

        match key_store.store(operation.key(), &value) {
            Ok(()) => true,
            Err(error) => {
                warn!(
                    thread = %self.name,
                    key = operation.key(),
                    error = &error as &dyn std::error::Error,
                    "failed to persist key"
                );
                false
            }
        }
    }
}

/// Records exactly one sample when dropped, including during unwinding.
///
/// The failure starts out as [`PANIC_FAILURE`] and is cleared once the
/// operation has completed.
struct SampleGuard<'a> {
    sampler: &'a Sampler,
    start_ms: u64,
    start: Instant,
    end: Option<Instant>,
    kind: OperationKind,
    hit: bool,
    failure: Option<&'static str>,
}

impl<'a> SampleGuard<'a> {
    fn new(sampler: &'a Sampler, kind: OperationKind) -> Self {
        Self {
            sampler,
            start_ms: now_ms(),
            start: Instant::now(),
            end: None,
            kind,
            hit: false,
            failure: Some(PANIC_FAILURE),
        }
    }
}

impl Drop for SampleGuard<'_> {
    fn drop(&mut self) {
        let end = self.end.unwrap_or_else(Instant::now);
        self.sampler.record(Sample {
            hit: self.hit,
            failure: self.failure,
            ..Sample::new(self.start_ms, self.start, end, self.kind)
        });
    }
}

/// Arrives at the barrier and stops the key store when the worker exits.
struct ExitGuard<'a> {
    barrier: &'a ArrivalBarrier,
    key_store: Option<&'a dyn KeyStore>,
}

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        self.barrier.wait();
        if let Some(key_store) = self.key_store {
            stop_logged("key store", || key_store.stop());
        }
    }
}
