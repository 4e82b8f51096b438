//! Generators of the operation stream a run sends to its service.
//!
//! A [`LoadStrategy`] wraps one of the registered [`Generator`]s with the
//! behavior every strategy shares: the operation budget, value generation, the
//! key provider and the service binding. One instance is shared by all worker
//! threads.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use bytes::Bytes;
use bytesize::ByteSize;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::keys::{self, KeyProvider, KeySource};
use crate::keystore::KeyStore;
use crate::lifecycle::Lifecycle;
use crate::operation::{Operation, OperationKind};
use crate::payload::Payload;
use crate::service::{Service, ServiceType};

mod basic;
pub mod options;
mod read_write;
mod send;
mod write_delete;

pub use options::Options;

use self::basic::{DeleteOnly, ReadOnly, WriteOnly};
use self::read_write::ReadWrite;
use self::send::SendOnly;
use self::write_delete::WriteDelete;

/// Names of all registered strategies.
pub const STRATEGIES: [&str; 6] = [
    WriteOnly::NAME,
    ReadOnly::NAME,
    DeleteOnly::NAME,
    ReadWrite::NAME,
    WriteDelete::NAME,
    SendOnly::NAME,
];

const DEFAULT_VALUE_SIZE: ByteSize = ByteSize::kib(1);
const DEFAULT_KEY_PREFIX: &str = "key-";

/// Selects and configures a strategy.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Registered name of the strategy, see [`STRATEGIES`].
    pub name: String,
    /// Raw options, consumed by [`LoadStrategy::init`].
    pub options: Options,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            name: WriteOnly::NAME.into(),
            options: Options::new(),
        }
    }
}

/// What a [`Generator`] sees when asked for the next operation.
pub struct GenerateContext<'a> {
    /// The previous operation of the calling thread.
    pub last: Option<&'a Operation>,
    /// The key the calling thread last wrote successfully.
    pub last_written_key: Option<&'a str>,
    /// Set once the run duration has expired.
    pub shutting_down: bool,
    strategy: &'a LoadStrategy,
}

impl fmt::Debug for GenerateContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerateContext")
            .field("last", &self.last)
            .field("last_written_key", &self.last_written_key)
            .field("shutting_down", &self.shutting_down)
            .field("strategy", &self.strategy.name())
            .finish()
    }
}

impl GenerateContext<'_> {
    /// Draws the next key from the strategy's key provider.
    pub fn next_key(&self) -> Result<Option<String>> {
        match &self.strategy.key_provider {
            Some(provider) => provider.next_key(),
            None => Err(Error::Lifecycle(format!(
                "strategy `{}` has no key provider",
                self.strategy.name()
            ))),
        }
    }

    /// Returns the value for the next write or send.
    pub fn value(&self) -> Bytes {
        self.strategy.compute_value()
    }

    /// The step following the last operation within a cycle of `len` steps.
    pub fn next_step(&self, len: u32) -> u32 {
        self.last.map_or(0, |last| (last.step() + 1) % len.max(1))
    }
}

/// The strategy-specific part of a [`LoadStrategy`].
pub trait Generator: fmt::Debug + Send + Sync {
    /// The family of services this generator produces operations for.
    fn service_type(&self) -> ServiceType {
        ServiceType::KeyValue
    }

    /// The operation kinds this generator can produce.
    fn operation_kinds(&self) -> &'static [OperationKind];

    /// Where keys come from unless configured otherwise, or `None` if keys are
    /// not needed.
    fn default_keys(&self) -> Option<KeySource> {
        Some(KeySource::Sequential)
    }

    /// Consumes the generator's own options, removing each one it reads.
    fn configure(&mut self, options: &mut Options) -> Result<()>;

    /// Produces the next operation, or `None` if there is nothing more to do
    /// for the calling thread.
    fn generate(&self, cx: &GenerateContext<'_>) -> Result<Option<Operation>>;
}

/// Creates the registered strategy called `name`, not yet initialized.
pub fn create(name: &str) -> Result<LoadStrategy> {
    let (name, generator): (&'static str, Box<dyn Generator>) = match name {
        WriteOnly::NAME => (WriteOnly::NAME, Box::new(WriteOnly)),
        ReadOnly::NAME => (ReadOnly::NAME, Box::new(ReadOnly)),
        DeleteOnly::NAME => (DeleteOnly::NAME, Box::new(DeleteOnly)),
        ReadWrite::NAME => (ReadWrite::NAME, Box::new(ReadWrite::default())),
        WriteDelete::NAME => (WriteDelete::NAME, Box::new(WriteDelete::default())),
        SendOnly::NAME => (SendOnly::NAME, Box::new(SendOnly::default())),
        other => return Err(Error::UnknownStrategy(other.to_owned())),
    };
    Ok(LoadStrategy::new(name, generator))
}

/// Creates and initializes the strategy selected by `config`.
pub fn from_config(
    config: &StrategyConfig,
    key_store: Option<&Arc<dyn KeyStore>>,
) -> Result<LoadStrategy> {
    let mut strategy = create(&config.name)?;
    strategy.init(config, key_store)?;
    Ok(strategy)
}

/// A thread-safe, optionally bounded stream of operations.
pub struct LoadStrategy {
    name: &'static str,
    generator: Box<dyn Generator>,
    remaining: Option<AtomicI64>,
    value_size: u64,
    reuse_value: bool,
    reused_value: OnceLock<Bytes>,
    key_provider: Option<Box<dyn KeyProvider>>,
    started: Mutex<bool>,
}

impl LoadStrategy {
    /// Wraps `generator` under the given registry name.
    pub fn new(name: &'static str, generator: Box<dyn Generator>) -> Self {
        Self {
            name,
            generator,
            remaining: None,
            value_size: DEFAULT_VALUE_SIZE.as_u64(),
            reuse_value: false,
            reused_value: OnceLock::new(),
            key_provider: None,
            started: Mutex::new(false),
        }
    }

    /// The registry name of this strategy.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The family of services this strategy targets.
    pub fn service_type(&self) -> ServiceType {
        self.generator.service_type()
    }

    /// The operation kinds this strategy can produce.
    pub fn operation_kinds(&self) -> &'static [OperationKind] {
        self.generator.operation_kinds()
    }

    /// Applies `config`.
    ///
    /// Consumes the options shared by all strategies, then hands the rest to
    /// the generator. Options that nobody consumed fail with
    /// [`Error::UnknownOptions`].
    pub fn init(
        &mut self,
        config: &StrategyConfig,
        key_store: Option<&Arc<dyn KeyStore>>,
    ) -> Result<()> {
        if config.name != self.name {
            return Err(Error::StrategyMismatch {
                configured: config.name.clone(),
                actual: self.name,
            });
        }

        let name = self.name;
        let mut options = config.options.clone();

        let max_operations: Option<u64> = options::take(&mut options, name, "max-operations")?;
        let value_size: Option<ByteSize> = options::take(&mut options, name, "value-size")?;
        let reuse_value: Option<bool> = options::take(&mut options, name, "reuse-value")?;
        let key_source: Option<KeySource> = options::take(&mut options, name, "keys")?;
        let key_prefix: Option<String> = options::take(&mut options, name, "key-prefix")?;

        self.generator.configure(&mut options)?;

        if !options.is_empty() {
            return Err(Error::UnknownOptions {
                strategy: name,
                options: options.keys().cloned().collect(),
            });
        }

        if let Some(max) = max_operations {
            let max = i64::try_from(max).map_err(|_| {
                Error::Config(format!("`max-operations` of strategy `{name}` is too large"))
            })?;
            self.remaining = Some(AtomicI64::new(max));
        }
        self.value_size = value_size.unwrap_or(DEFAULT_VALUE_SIZE).as_u64();
        self.reuse_value = reuse_value.unwrap_or(false);

        let prefix = key_prefix.as_deref().unwrap_or(DEFAULT_KEY_PREFIX);
        self.key_provider = key_source
            .or(self.generator.default_keys())
            .map(|source| keys::provider(source, prefix, key_store))
            .transpose()?;

        debug!(strategy = name, ?max_operations, "initialized strategy");
        Ok(())
    }

    /// Binds the strategy to `service`, checking that their types match.
    pub fn bind(&self, service: &dyn Service) -> Result<()> {
        let expected = self.service_type();
        let actual = service.service_type();
        if expected != actual {
            return Err(Error::IncompatibleService {
                strategy: self.name,
                expected,
                actual,
            });
        }

        Ok(())
    }

    /// Returns the next operation for the calling thread, or `None` once exhausted.
    ///
    /// If a maximum number of operations is configured, exactly that many
    /// operations are handed out in total across all threads. The shared counter
    /// may dip below zero under contention; only its pre-decrement value decides.
    pub fn next(
        &self,
        last: Option<&Operation>,
        last_written_key: Option<&str>,
        shutting_down: bool,
    ) -> Result<Option<Operation>> {
        if let Some(remaining) = &self.remaining {
            if remaining.fetch_sub(1, Ordering::AcqRel) <= 0 {
                return Ok(None);
            }
        }

        let cx = GenerateContext {
            last,
            last_written_key,
            shutting_down,
            strategy: self,
        };
        let operation = self.generator.generate(&cx)?;
        Ok(operation.map(|op| op.with_origin(self.name)))
    }

    /// Operations left in the budget, or `None` if unbounded. Never negative.
    pub fn remaining_operations(&self) -> Option<u64> {
        self.remaining
            .as_ref()
            .map(|remaining| remaining.load(Ordering::Acquire).max(0) as u64)
    }

    /// Returns the value shared by all operations, generating it on first use.
    pub fn reused_value(&self) -> Bytes {
        self.reused_value
            .get_or_init(|| Payload::random(self.value_size).into_bytes())
            .clone()
    }

    /// Returns the value for the next operation: the shared value if values are
    /// reused, otherwise a fresh random one.
    pub fn compute_value(&self) -> Bytes {
        if self.reuse_value {
            self.reused_value()
        } else {
            Payload::random(self.value_size).into_bytes()
        }
    }
}

impl Lifecycle for LoadStrategy {
    fn start(&self) -> Result<()> {
        let mut started = self.started.lock().unwrap();
        if !*started {
            if let Some(provider) = &self.key_provider {
                provider.start()?;
            }
            *started = true;
        }
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let mut started = self.started.lock().unwrap();
        if *started {
            *started = false;
            if let Some(provider) = &self.key_provider {
                provider.stop()?;
            }
        }
        Ok(())
    }

    fn is_started(&self) -> bool {
        *self.started.lock().unwrap()
    }
}

impl fmt::Debug for LoadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadStrategy")
            .field("name", &self.name)
            .field("generator", &self.generator)
            .field("remaining", &self.remaining_operations())
            .field("value_size", &self.value_size)
            .field("reuse_value", &self.reuse_value)
            .field("key_provider", &self.key_provider)
            .finish_non_exhaustive()
    }
}
