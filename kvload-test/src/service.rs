//! A scriptable in-process [`Service`] that records everything it performs.
//!
//! ```
//! use std::sync::Arc;
//! use kvload_test::service::MockService;
//!
//! let service = Arc::new(MockService::new().failing_every(3));
//! // hand `service.clone()` to a runner, then inspect it:
//! assert!(service.operations().is_empty());
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use kvload_core::{Lifecycle, Operation, OperationKind, Result, Service, ServiceError, ServiceType};

/// A service that succeeds unless told otherwise, and keeps a log of every
/// operation it performed.
#[derive(Debug)]
pub struct MockService {
    service_type: ServiceType,
    latency: Duration,
    fail_every: Option<u64>,
    failure_types: Vec<&'static str>,
    panic_on: Option<String>,
    started: AtomicBool,
    calls: AtomicU64,
    values: Mutex<HashMap<String, Bytes>>,
    log: Mutex<Vec<Operation>>,
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockService {
    /// A key/value service that always succeeds.
    pub fn new() -> Self {
        Self {
            service_type: ServiceType::KeyValue,
            latency: Duration::ZERO,
            fail_every: None,
            failure_types: Vec::new(),
            panic_on: None,
            started: AtomicBool::new(false),
            calls: AtomicU64::new(0),
            values: Mutex::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Pretends to be a service of another type.
    pub fn with_type(mut self, service_type: ServiceType) -> Self {
        self.service_type = service_type;
        self
    }

    /// Sleeps this long in every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fails every `n`th call with [`ServiceError::Timeout`].
    pub fn failing_every(mut self, n: u64) -> Self {
        self.fail_every = Some(n.max(1));
        self
    }

    /// Reports the failures of [`failing_every`](Self::failing_every) as
    /// [`ServiceError::Custom`] with `failure_type` instead of timeouts.
    pub fn failing_as(mut self, failure_type: &'static str) -> Self {
        self.failure_types = vec![failure_type];
        self
    }

    /// Panics when asked to perform an operation on `key`.
    pub fn panicking_on(mut self, key: impl Into<String>) -> Self {
        self.panic_on = Some(key.into());
        self
    }

    /// Every operation performed so far, in completion order, including failed ones.
    pub fn operations(&self) -> Vec<Operation> {
        self.log.lock().unwrap().clone()
    }

    /// Number of calls to [`Service::perform`].
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Distinct keys of all operations of `kind`.
    pub fn keys(&self, kind: OperationKind) -> BTreeSet<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|op| op.kind() == kind)
            .map(|op| op.key().to_owned())
            .collect()
    }
}

impl Lifecycle for MockService {
    fn start(&self) -> Result<()> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.started.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

impl Service for MockService {
    fn service_type(&self) -> ServiceType {
        self.service_type
    }

    fn failure_types(&self) -> &[&'static str] {
        &self.failure_types
    }

    fn perform(&self, operation: &mut Operation) -> Result<(), ServiceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        if self.panic_on.as_deref() == Some(operation.key()) {
            panic!("mock service asked to panic on {}", operation.key());
        }

        let result = match self.fail_every {
            Some(n) if call % n == 0 => Err(match self.failure_types.first() {
                Some(&failure_type) => {
                    ServiceError::custom(failure_type, anyhow::anyhow!("call {call} failed"))
                }
                None => ServiceError::Timeout,
            }),
            _ => {
                let mut values = self.values.lock().unwrap();
                match operation.kind() {
                    OperationKind::Write | OperationKind::Send => {
                        if let Some(value) = operation.value() {
                            values.insert(operation.key().to_owned(), value.clone());
                        }
                    }
                    OperationKind::Read => {
                        let found = values.get(operation.key()).cloned();
                        operation.set_value(found);
                    }
                    OperationKind::Delete => {
                        values.remove(operation.key());
                    }
                }
                Ok(())
            }
        };

        self.log.lock().unwrap().push(operation.clone());
        result
    }
}
