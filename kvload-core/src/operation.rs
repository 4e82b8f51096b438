//! The unit of work produced by a [`LoadStrategy`](crate::LoadStrategy).

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// The kind of an [`Operation`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Reads the value stored under a key.
    Read,
    /// Writes a value under a key.
    Write,
    /// Deletes a key.
    Delete,
    /// Sends a message to a destination.
    Send,
}

impl OperationKind {
    /// Returns the lowercase name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Read => "read",
            OperationKind::Write => "write",
            OperationKind::Delete => "delete",
            OperationKind::Send => "send",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of load against a [`Service`](crate::Service).
///
/// Created by a strategy, mutated by the service while it is performed (a read
/// hit fills in the value) and by the runner once it succeeded, then recorded
/// and kept only as the "last operation" context of its worker thread.
#[derive(Clone, Debug)]
pub struct Operation {
    kind: OperationKind,
    key: String,
    value: Option<Bytes>,
    step: u32,
    origin: &'static str,
    successful: bool,
}

impl Operation {
    fn new(kind: OperationKind, key: String, value: Option<Bytes>) -> Self {
        Self {
            kind,
            key,
            value,
            step: 0,
            origin: "",
            successful: false,
        }
    }

    /// Creates a read of `key`.
    pub fn read(key: impl Into<String>) -> Self {
        Self::new(OperationKind::Read, key.into(), None)
    }

    /// Creates a write of `value` under `key`.
    pub fn write(key: impl Into<String>, value: Bytes) -> Self {
        Self::new(OperationKind::Write, key.into(), Some(value))
    }

    /// Creates a delete of `key`.
    pub fn delete(key: impl Into<String>) -> Self {
        Self::new(OperationKind::Delete, key.into(), None)
    }

    /// Creates a message send of `value` to `destination`.
    pub fn send(destination: impl Into<String>, value: Bytes) -> Self {
        Self::new(OperationKind::Send, destination.into(), Some(value))
    }

    /// Sets the position of this operation within its strategy's cycle.
    pub fn with_step(mut self, step: u32) -> Self {
        self.step = step;
        self
    }

    pub(crate) fn with_origin(mut self, origin: &'static str) -> Self {
        self.origin = origin;
        self
    }

    /// The kind of this operation.
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// The key (or destination, for sends) this operation targets.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The payload written or sent, or the value returned by a read hit.
    pub fn value(&self) -> Option<&Bytes> {
        self.value.as_ref()
    }

    /// Replaces the value, used by services to report what a read returned.
    pub fn set_value(&mut self, value: Option<Bytes>) {
        self.value = value;
    }

    /// Position of this operation within its strategy's cycle.
    pub fn step(&self) -> u32 {
        self.step
    }

    /// Name of the strategy that produced this operation.
    pub fn origin(&self) -> &'static str {
        self.origin
    }

    /// Returns `true` once the operation has been performed successfully.
    pub fn is_successful(&self) -> bool {
        self.successful
    }

    pub(crate) fn mark_successful(&mut self) {
        self.successful = true;
    }

    /// Returns `true` for successful reads that found a value.
    pub fn is_hit(&self) -> bool {
        self.kind == OperationKind::Read && self.successful && self.value.is_some()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.key)
    }
}
