//! The `kvload` command line tool.
//!
//! Runs a load test described by a YAML file and environment variables, see [`config`], and
//! prints a summary of the results. Run `kvload --help` for usage.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

use std::process::ExitCode;

mod cli;
mod config;
mod observability;
mod report;

/// Exit status for errors caused by the user's input.
const USAGE_ERROR: u8 = 2;

fn main() -> ExitCode {
    let Err(error) = cli::execute() else {
        return ExitCode::SUCCESS;
    };

    let user_error = error
        .downcast_ref::<kvload_core::Error>()
        .is_some_and(kvload_core::Error::is_user_error)
        || error.downcast_ref::<figment::Error>().is_some();

    if user_error {
        eprintln!("error: {error}");
        ExitCode::from(USAGE_ERROR)
    } else {
        eprintln!("error: {error:?}");
        ExitCode::FAILURE
    }
}
