//! Configuration for the `kvload` binary.
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Environment variables (prefixed with `KVLOAD__`)
//! 2. YAML configuration file (specified via `-c` or `--config` flag)
//! 3. Defaults
//!
//! # Environment Variables
//!
//! Environment variables use `KVLOAD__` as a prefix and double underscores (`__`) to denote nested
//! configuration structures. For example:
//!
//! - `KVLOAD__RUN__THREADS=16` sets the number of worker threads
//! - `KVLOAD__KEY_STORE__TYPE=hierarchical` selects the on-disk key store
//! - `KVLOAD__KEY_STORE__PATH=/tmp/keys` sets its directory
//!
//! # YAML Configuration File
//!
//! The above configuration in YAML format would look like this:
//!
//! ```yaml
//! run:
//!   threads: 16
//!
//! key_store:
//!   type: hierarchical
//!   path: /tmp/keys
//! ```
//!
//! All other sections are described in [`kvload_core::config`].

use std::fmt;
use std::path::Path;

use anyhow::Result;
use figment::providers::{Env, Format, Serialized, Yaml};
use kvload_core::LoadConfig;
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "KVLOAD__";

/// Log output format.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Colored output if stderr is a terminal, otherwise simplified.
    #[default]
    Auto,
    /// Colored, multi-line output.
    Pretty,
    /// Compact plain text, one line per event.
    Simplified,
}

/// Logging configuration. Logs are always written to stderr.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// The `RUST_LOG` environment variable overrides this, either with a plain level or with a
    /// full filter directive.
    ///
    /// # Default
    ///
    /// `INFO`
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format.
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Top-level configuration of the binary.
#[derive(Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration.
    pub logging: Logging,

    /// Everything that describes the load run itself.
    #[serde(flatten)]
    pub load: LoadConfig,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("logging", &self.logging)
            .field("run", &self.load.run)
            .field("sampler", &self.load.sampler)
            .field("key_store", &self.load.key_store)
            .field("service", &self.load.service)
            .field("strategy", &self.load.strategy)
            .finish()
    }
}

impl Config {
    /// Loads configuration from defaults, an optional YAML file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        config.load.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use kvload_core::config::{KeyStoreConfig, ServiceConfig};

    use super::*;

    #[test]
    fn defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load(None).unwrap();

            assert_eq!(config.logging.level, LevelFilter::INFO);
            assert_eq!(config.load.run.threads, 4);
            assert_eq!(config.load.strategy.name, "write-only");
            assert!(matches!(config.load.key_store, KeyStoreConfig::None));

            Ok(())
        });
    }

    #[test]
    fn configurable_via_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("KVLOAD__LOGGING__LEVEL", "debug");
            jail.set_env("KVLOAD__RUN__THREADS", "16");
            jail.set_env("KVLOAD__RUN__DURATION", "2m");
            jail.set_env("KVLOAD__KEY_STORE__TYPE", "hierarchical");
            jail.set_env("KVLOAD__KEY_STORE__PATH", "/tmp/keys");
            jail.set_env("KVLOAD__STRATEGY__NAME", "read-write");

            let config = Config::load(None).unwrap();

            assert_eq!(config.logging.level, LevelFilter::DEBUG);
            assert_eq!(config.load.run.threads, 16);
            assert_eq!(config.load.run.duration, Some(Duration::from_secs(120)));
            let KeyStoreConfig::Hierarchical { path, overwrite, .. } = &config.load.key_store
            else {
                panic!("expected hierarchical key store");
            };
            assert_eq!(path, Path::new("/tmp/keys"));
            assert!(!overwrite);
            assert_eq!(config.load.strategy.name, "read-write");

            Ok(())
        });
    }

    #[test]
    fn configurable_via_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            logging:
                format: simplified
            run:
                threads: 2
                sleep: 10ms
            sampler:
                interval: 250ms
                output: samples.csv
            service:
                type: queue
                latency: 1ms
            strategy:
                name: send
                options:
                    destination: orders
                    value-size: 4KiB
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|_jail| {
            let config = Config::load(Some(tempfile.path())).unwrap();

            assert_eq!(config.logging.format, LogFormat::Simplified);
            assert_eq!(config.load.run.threads, 2);
            assert_eq!(config.load.run.sleep, Some(Duration::from_millis(10)));
            assert_eq!(config.load.sampler.interval, Duration::from_millis(250));
            assert_eq!(
                config.load.sampler.output.as_deref(),
                Some(Path::new("samples.csv"))
            );
            assert!(matches!(
                config.load.service,
                ServiceConfig::Queue { latency: Some(latency) } if latency == Duration::from_millis(1)
            ));
            assert_eq!(config.load.strategy.options["destination"], "orders");
            assert_eq!(config.load.strategy.options["value-size"], "4KiB");

            Ok(())
        });
    }

    #[test]
    fn env_overrides_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile.write_all(b"run:\n  threads: 2\n").unwrap();

        figment::Jail::expect_with(|jail| {
            jail.set_env("KVLOAD__RUN__THREADS", "8");

            let config = Config::load(Some(tempfile.path())).unwrap();
            assert_eq!(config.load.run.threads, 8);

            Ok(())
        });
    }

    #[test]
    fn rejects_invalid_values() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("KVLOAD__RUN__THREADS", "0");

            let error = Config::load(None).unwrap_err();
            let error = error.downcast_ref::<kvload_core::Error>().unwrap();
            assert!(error.is_user_error());

            Ok(())
        });
    }
}
