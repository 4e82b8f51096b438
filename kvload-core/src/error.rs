use std::path::PathBuf;

use thiserror::Error;

use crate::service::ServiceType;

/// Errors that can occur while configuring or driving a load run.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or missing configuration supplied by the user.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The configured strategy name is not part of the registry.
    #[error("unknown strategy `{0}`")]
    UnknownStrategy(String),

    /// Options were left over after the strategy consumed everything it recognizes.
    #[error("unknown options for strategy `{strategy}`: {}", .options.join(", "))]
    UnknownOptions {
        /// Name of the strategy being initialized.
        strategy: &'static str,
        /// Every option that was not consumed, in sorted order.
        options: Vec<String>,
    },

    /// A key that cannot be persisted, such as one containing a newline.
    #[error("invalid key {0:?}: keys must not contain a newline")]
    InvalidKey(String),

    /// A strategy was initialized with a configuration meant for another strategy.
    #[error("strategy `{actual}` cannot be initialized from the configuration of `{configured}`")]
    StrategyMismatch {
        /// The name found in the configuration.
        configured: String,
        /// The name of the strategy instance.
        actual: &'static str,
    },

    /// A strategy was bound to a service of the wrong type.
    #[error("strategy `{strategy}` requires a {expected} service, but got a {actual} service")]
    IncompatibleService {
        /// Name of the strategy being bound.
        strategy: &'static str,
        /// The service type the strategy generates operations for.
        expected: ServiceType,
        /// The service type it was bound to.
        actual: ServiceType,
    },

    /// A component was used in the wrong lifecycle state.
    #[error("lifecycle violation: {0}")]
    Lifecycle(String),

    /// A persisted entry could not be parsed or failed an integrity check.
    #[error("corrupt key store entry at {}: {reason}", .path.display())]
    Corrupt {
        /// Location of the offending entry.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// An I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// An error writing sampler output.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    /// Returns `true` for errors caused by user input, which should be reported
    /// without a backtrace.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::UnknownStrategy(_)
                | Error::UnknownOptions { .. }
                | Error::InvalidKey(_)
                | Error::IncompatibleService { .. }
        )
    }
}

/// Result type for all fallible operations in this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_options_lists_every_key() {
        let err = Error::UnknownOptions {
            strategy: "write-only",
            options: vec!["bar".into(), "foo".into()],
        };

        assert_eq!(
            err.to_string(),
            "unknown options for strategy `write-only`: bar, foo"
        );
        assert!(err.is_user_error());
    }

    #[test]
    fn lifecycle_is_not_a_user_error() {
        let err = Error::Lifecycle("service is not started".into());
        assert!(!err.is_user_error());
    }
}
