//! The target of a load run.
//!
//! Protocol adapters implement [`Service`]; this module also ships two loopback
//! services that keep everything in process, so a run can be exercised end to
//! end without an external target.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lifecycle::Lifecycle;
use crate::operation::Operation;

mod memory;
mod queue;

pub use memory::MemoryService;
pub use queue::MemoryQueue;

/// The family of a [`Service`], used to pair it with a compatible strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceType {
    /// Caches and key/value stores.
    KeyValue,
    /// Message queues and topics.
    Messaging,
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceType::KeyValue => f.write_str("key-value"),
            ServiceType::Messaging => f.write_str("messaging"),
        }
    }
}

/// A failed operation.
///
/// These are recorded as data by the sampler, grouped by [`failure_type`](Self::failure_type).
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The operation did not complete in time.
    #[error("operation timed out")]
    Timeout,

    /// The target refused the operation.
    #[error("operation rejected: {0}")]
    Rejected(String),

    /// The target could not be reached or is not started.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The operation required an entry that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An adapter-specific failure with its own failure type.
    ///
    /// Declare the type in [`Service::failure_types`], or register it with
    /// [`Sampler::register_failure_type`](crate::Sampler::register_failure_type)
    /// before the run, so it gets its own column in the exported intervals.
    #[error("{failure_type}: {source}")]
    Custom {
        /// The label failures of this kind are grouped by.
        failure_type: &'static str,
        /// The underlying error.
        #[source]
        source: anyhow::Error,
    },

    /// Any other failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failure type recorded when performing an operation panicked.
pub const PANIC_FAILURE: &str = "panic";

impl ServiceError {
    /// The built-in failure types, including [`PANIC_FAILURE`]. Services add
    /// their own through [`Service::failure_types`].
    pub const FAILURE_TYPES: [&'static str; 6] = [
        "timeout",
        "rejected",
        "unavailable",
        "not-found",
        "other",
        PANIC_FAILURE,
    ];

    /// A stable label for this failure, used to break failures down by cause.
    pub fn failure_type(&self) -> &'static str {
        match self {
            ServiceError::Timeout => "timeout",
            ServiceError::Rejected(_) => "rejected",
            ServiceError::Unavailable(_) => "unavailable",
            ServiceError::NotFound(_) => "not-found",
            ServiceError::Custom { failure_type, .. } => *failure_type,
            ServiceError::Other(_) => "other",
        }
    }

    /// Wraps `source` in a failure recorded under `failure_type`.
    pub fn custom(failure_type: &'static str, source: impl Into<anyhow::Error>) -> Self {
        ServiceError::Custom {
            failure_type,
            source: source.into(),
        }
    }
}

/// A target that performs [`Operation`]s.
///
/// A single instance is shared by all worker threads. Implementations that need
/// per-thread connections are responsible for pooling them.
pub trait Service: Lifecycle + fmt::Debug {
    /// The family of this service.
    fn service_type(&self) -> ServiceType;

    /// Failure types of [`ServiceError::Custom`] this service may report.
    ///
    /// Each one gets its own column in the exported intervals.
    fn failure_types(&self) -> &[&'static str] {
        &[]
    }

    /// Performs one operation.
    ///
    /// Reads report what they found through [`Operation::set_value`]; a miss is
    /// not a failure.
    fn perform(&self, operation: &mut Operation) -> Result<(), ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_failures_keep_their_type() {
        let error = ServiceError::custom("throttled", anyhow::anyhow!("slow down"));
        assert_eq!(error.failure_type(), "throttled");
        assert_eq!(error.to_string(), "throttled: slow down");

        let error = ServiceError::from(anyhow::anyhow!("boom"));
        assert_eq!(error.failure_type(), "other");
    }
}
