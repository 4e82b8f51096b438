use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use bytes::Bytes;

use super::{Service, ServiceError, ServiceType};
use crate::error::Result;
use crate::lifecycle::Lifecycle;
use crate::operation::{Operation, OperationKind};

/// An in-process messaging service with one FIFO queue per destination.
///
/// Sends enqueue their payload; reads receive (dequeue) from the destination
/// named by the operation's key.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    queues: Mutex<HashMap<String, VecDeque<Bytes>>>,
    latency: Duration,
    started: AtomicBool,
}

impl MemoryQueue {
    /// Creates a queue service without latency.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every operation by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Returns the number of messages waiting at `destination`.
    pub fn depth(&self, destination: &str) -> usize {
        self.queues
            .lock()
            .unwrap()
            .get(destination)
            .map_or(0, VecDeque::len)
    }
}

impl Lifecycle for MemoryQueue {
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

impl Service for MemoryQueue {
    fn service_type(&self) -> ServiceType {
        ServiceType::Messaging
    }

    fn perform(&self, operation: &mut Operation) -> Result<(), ServiceError> {
        if !self.is_started() {
            return Err(ServiceError::Unavailable("queue is not started".into()));
        }
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }

        let mut queues = self.queues.lock().unwrap();
        match operation.kind() {
            OperationKind::Send => {
                let payload = operation.value().cloned().unwrap_or_default();
                queues
                    .entry(operation.key().to_owned())
                    .or_default()
                    .push_back(payload);
            }
            OperationKind::Read => {
                let message = queues
                    .get_mut(operation.key())
                    .and_then(VecDeque::pop_front);
                operation.set_value(message);
            }
            kind => {
                return Err(ServiceError::Rejected(format!(
                    "{kind} is not supported by a queue"
                )));
            }
        }

        Ok(())
    }
}
