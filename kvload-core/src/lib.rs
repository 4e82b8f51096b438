//! Load generation for key/value and messaging services.
//!
//! A run is driven by a [`LoadStrategy`] that hands out [`Operation`]s to a
//! pool of worker threads. Each worker performs its operations against a
//! shared [`Service`], records the outcome with the [`Sampler`] and, for
//! successful writes, persists the key in an optional [`KeyStore`] so later
//! runs can replay it.
//!
//! [`LoadDriver`] assembles all of this from a [`LoadConfig`]:
//!
//! ```no_run
//! use kvload_core::{LoadConfig, LoadDriver};
//!
//! let mut config = LoadConfig::default();
//! config.run.threads = 8;
//!
//! let summary = LoadDriver::new(config).run()?;
//! println!("{} operations", summary.total());
//! # Ok::<_, kvload_core::Error>(())
//! ```
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod config;
mod driver;
mod error;
pub mod keys;
pub mod keystore;
mod lifecycle;
mod operation;
pub mod payload;
pub mod runner;
pub mod sampler;
pub mod service;
pub mod strategy;

pub use config::LoadConfig;
pub use driver::LoadDriver;
pub use error::{Error, Result};
pub use keystore::KeyStore;
pub use lifecycle::Lifecycle;
pub use operation::{Operation, OperationKind};
pub use runner::{RunHandle, Runner, RunnerState};
pub use sampler::{Sampler, Summary};
pub use service::{Service, ServiceError, ServiceType};
pub use strategy::LoadStrategy;
