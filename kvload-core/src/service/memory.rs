use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use rand::Rng;

use super::{Service, ServiceError, ServiceType};
use crate::error::Result;
use crate::lifecycle::Lifecycle;
use crate::operation::{Operation, OperationKind};

/// An in-process key/value service backed by a `HashMap`.
///
/// Optionally adds a fixed latency to every operation and fails a random share
/// of them, which is enough to exercise the sampler's failure accounting.
#[derive(Debug, Default)]
pub struct MemoryService {
    entries: Mutex<HashMap<String, Bytes>>,
    latency: Duration,
    failure_rate: f64,
    started: AtomicBool,
}

impl MemoryService {
    /// Creates an empty service without latency or failures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every operation by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fails the given share of operations, between `0.0` and `1.0`.
    pub fn with_failure_rate(mut self, failure_rate: f64) -> Self {
        self.failure_rate = failure_rate.clamp(0.0, 1.0);
        self
    }

    /// Returns the number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if an entry exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().unwrap().contains_key(key)
    }
}

impl Lifecycle for MemoryService {
    fn start(&self) -> Result<()> {
        self.started.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.started.store(false, Ordering::Release);
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }
}

impl Service for MemoryService {
    fn service_type(&self) -> ServiceType {
        ServiceType::KeyValue
    }

    fn perform(&self, operation: &mut Operation) -> Result<(), ServiceError> {
        if !self.is_started() {
            return Err(ServiceError::Unavailable("service is not started".into()));
        }
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        if self.failure_rate > 0.0 && rand::rng().random_bool(self.failure_rate) {
            return Err(ServiceError::Rejected("injected failure".into()));
        }

        let mut entries = self.entries.lock().unwrap();
        match operation.kind() {
            OperationKind::Read => {
                let value = entries.get(operation.key()).cloned();
                operation.set_value(value);
            }
            OperationKind::Write => {
                let value = operation.value().cloned().unwrap_or_default();
                entries.insert(operation.key().to_owned(), value);
            }
            OperationKind::Delete => {
                entries.remove(operation.key());
            }
            OperationKind::Send => {
                return Err(ServiceError::Rejected(
                    "messaging operations are not supported".into(),
                ));
            }
        }

        Ok(())
    }
}
