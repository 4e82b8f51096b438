//! Interactive control of a running load test.

use std::fmt;
use std::io::{self, BufRead, BufReader, Stdin};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use tracing::{info, warn};

use super::RunHandle;
use crate::error::Result;
use crate::sampler::Sampler;

/// Lets an operator steer a run while it is in progress.
pub trait Console: Send + fmt::Debug {
    /// Starts accepting commands for the run behind `handle`.
    fn open(&mut self, handle: RunHandle, sampler: Arc<Sampler>) -> Result<()>;

    /// Stops accepting commands.
    fn close(&mut self);
}

/// A command understood by [`LineConsole`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Stop the workers and release a pending quit wait.
    Quit,
    /// Attach a comment to the current sampling interval.
    Comment(String),
    /// Log progress.
    Status,
}

impl Command {
    /// Parses one input line. Returns `None` for blank or unknown input.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        match word {
            "q" | "quit" => Some(Command::Quit),
            "s" | "status" => Some(Command::Status),
            "c" | "comment" if !rest.trim().is_empty() => {
                Some(Command::Comment(rest.trim().to_owned()))
            }
            _ => None,
        }
    }

    fn apply(self, handle: &RunHandle, sampler: &Sampler) {
        match self {
            Command::Quit => {
                info!("quit requested from console");
                handle.quit();
            }
            Command::Comment(text) => sampler.annotate(text),
            Command::Status => info!(
                state = ?handle.state(),
                recorded = sampler.recorded(),
                duration_expired = handle.is_duration_expired(),
                "run status"
            ),
        }
    }
}

/// Reads one [`Command`] per line on a background thread.
pub struct LineConsole<R> {
    input: Option<R>,
    closed: Arc<AtomicBool>,
}

impl LineConsole<BufReader<Stdin>> {
    /// A console reading commands from standard input.
    pub fn stdin() -> Self {
        Self::new(BufReader::new(io::stdin()))
    }
}

impl<R: BufRead + Send + 'static> LineConsole<R> {
    /// A console reading commands from `input`.
    pub fn new(input: R) -> Self {
        Self {
            input: Some(input),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl<R> fmt::Debug for LineConsole<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineConsole")
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<R: BufRead + Send + 'static> Console for LineConsole<R> {
    fn open(&mut self, handle: RunHandle, sampler: Arc<Sampler>) -> Result<()> {
        let Some(input) = self.input.take() else {
            return Ok(());
        };
        let closed = self.closed.clone();

        // The reader may block on input indefinitely, so the thread is detached.
        thread::Builder::new()
            .name("kvload-console".into())
            .spawn(move || {
                for line in input.lines() {
                    if closed.load(Ordering::Acquire) {
                        break;
                    }
                    let line = match line {
                        Ok(line) => line,
                        Err(error) => {
                            warn!(error = &error as &dyn std::error::Error, "console input failed");
                            break;
                        }
                    };
                    match Command::parse(&line) {
                        Some(command) => command.apply(&handle, &sampler),
                        None if line.trim().is_empty() => (),
                        None => warn!(input = line.trim(), "unknown console command"),
                    }
                }
            })?;

        info!("console open: `q` quits, `c <text>` comments, `s` shows status");
        Ok(())
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::Release);
    }
}
