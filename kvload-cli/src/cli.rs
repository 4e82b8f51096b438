use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use argh::FromArgs;
use indicatif::{ProgressBar, ProgressStyle};
use kvload_core::keystore::HierarchicalKeyStore;
use kvload_core::runner::LineConsole;
use kvload_core::{KeyStore, Lifecycle, LoadDriver};

use crate::config::Config;
use crate::{observability, report};

/// Load generator for key/value and messaging services.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    #[argh(subcommand)]
    pub command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Run(RunCommand),
    Keys(KeysCommand),
    Version(VersionCommand),
}

/// run the configured load test
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "run")]
struct RunCommand {
    /// accept console commands on stdin while running
    #[argh(switch, short = 'i')]
    interactive: bool,
}

/// list the keys persisted in a hierarchical key store
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "keys")]
struct KeysCommand {
    /// root directory of the key store
    #[argh(positional)]
    path: PathBuf,
}

/// print the kvload version
#[derive(Default, Debug, FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCommand {}

/// Parse arguments and execute the CLI command.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    // Special switch to just print the version and exit.
    if let Command::Version(_) = args.command {
        println!("kvload {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let mut config = Config::load(args.config.as_deref())?;
    observability::init_tracing(&config.logging);
    tracing::debug!(?config);

    match args.command {
        Command::Run(RunCommand { interactive }) => {
            config.load.run.interactive |= interactive;
            run(config)
        }
        Command::Keys(KeysCommand { path }) => list_keys(path),
        Command::Version(_) => unreachable!(),
    }
}

fn run(config: Config) -> Result<()> {
    let strategy = config.load.strategy.name.clone();
    let interactive = config.load.run.interactive;

    let mut driver = LoadDriver::new(config.load);
    let bar = (!interactive).then(ProgressBar::new_spinner);

    if interactive {
        driver = driver.with_console(Box::new(LineConsole::stdin()));
    } else if let Some(bar) = &bar {
        bar.set_style(ProgressStyle::with_template("{spinner} {msg} {elapsed}")?);
        bar.set_message(format!("Running {strategy}:"));
        bar.enable_steady_tick(Duration::from_millis(100));

        let bar = bar.clone();
        let strategy = strategy.clone();
        driver = driver.with_observer(move |_handle, sampler| {
            let spawned = thread::Builder::new()
                .name("kvload-progress".into())
                .spawn(move || {
                    while sampler.is_started() {
                        bar.set_message(format!(
                            "Running {strategy}: {} ops",
                            sampler.recorded()
                        ));
                        thread::sleep(Duration::from_millis(100));
                    }
                });
            if let Err(error) = spawned {
                tracing::warn!(error = &error as &dyn std::error::Error, "no progress updates");
            }
        });
    }

    let result = driver.run();
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    let summary = result?;
    report::print_summary(&strategy, &summary);
    Ok(())
}

fn list_keys(path: PathBuf) -> Result<()> {
    let store = HierarchicalKeyStore::new(path);
    let keys = store
        .keys()
        .with_context(|| format!("failed to read keys from {}", store.root().display()))?;

    for key in &keys {
        println!("{key}");
    }
    tracing::info!(count = keys.len(), "listed keys");
    Ok(())
}
