//! Test utilities for kvload.
//!
//! See the modules for all available utilities.

pub mod service;
pub mod tracing;
