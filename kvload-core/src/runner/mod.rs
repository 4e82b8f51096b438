//! Coordination of the worker threads of a run.
//!
//! A [`Runner`] spawns one thread per configured worker. Each thread pulls
//! operations from the shared [`LoadStrategy`] until it is exhausted or the run
//! is stopped, then arrives at a barrier shared with the controlling thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use std::{fmt, io};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, info};

use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::keystore::KeyStore;
use crate::lifecycle::{Lifecycle, stop_logged};
use crate::sampler::Sampler;
use crate::service::Service;
use crate::strategy::LoadStrategy;

mod barrier;
mod console;
mod worker;

pub use console::{Command, Console, LineConsole};

use barrier::ArrivalBarrier;
use worker::Worker;

/// Progress of a [`Runner`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunnerState {
    /// [`Runner::run`] has not been called yet.
    NotStarted,
    /// Workers are performing operations.
    Running,
    /// All workers are done; waiting for an explicit quit from the console.
    Draining,
    /// The run is over and all components are stopped.
    Stopped,
}

/// Flags and signals shared by the controlling thread, the workers, the
/// duration timer and the console.
#[derive(Debug)]
pub(crate) struct RunControl {
    running: AtomicBool,
    duration_expired: AtomicBool,
    state: Mutex<RunnerState>,
    quit_tx: Sender<()>,
    quit_rx: Receiver<()>,
}

impl RunControl {
    fn new() -> Self {
        let (quit_tx, quit_rx) = crossbeam_channel::bounded(1);
        Self {
            running: AtomicBool::new(true),
            duration_expired: AtomicBool::new(false),
            state: Mutex::new(RunnerState::NotStarted),
            quit_tx,
            quit_rx,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn is_duration_expired(&self) -> bool {
        self.duration_expired.load(Ordering::Acquire)
    }

    fn set_state(&self, state: RunnerState) {
        *self.state.lock().unwrap() = state;
        debug!(?state, "runner state changed");
    }
}

/// A cloneable handle to observe and stop a run from other threads.
#[derive(Clone, Debug)]
pub struct RunHandle(Arc<RunControl>);

impl RunHandle {
    /// Asks all workers to finish after their current operation.
    pub fn stop(&self) {
        self.0.running.store(false, Ordering::Release);
    }

    /// Stops the workers and releases a pending wait for explicit quit.
    pub fn quit(&self) {
        self.stop();
        // A full channel means quit was already requested.
        let _ = self.0.quit_tx.try_send(());
    }

    /// Current state of the run.
    pub fn state(&self) -> RunnerState {
        *self.0.state.lock().unwrap()
    }

    /// Returns `false` once [`stop`](Self::stop) was requested.
    pub fn is_running(&self) -> bool {
        self.0.is_running()
    }

    /// Returns `true` once the configured run duration has elapsed.
    pub fn is_duration_expired(&self) -> bool {
        self.0.is_duration_expired()
    }
}

/// Raises the duration-expired flag after a delay, unless dropped first.
struct DurationTimer {
    cancel: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl DurationTimer {
    fn spawn(duration: Duration, control: Arc<RunControl>) -> io::Result<Self> {
        let (cancel, cancelled) = crossbeam_channel::bounded::<()>(0);
        let thread = thread::Builder::new()
            .name("kvload-timer".into())
            .spawn(move || {
                crossbeam_channel::select! {
                    recv(cancelled) -> _ => (),
                    recv(crossbeam_channel::after(duration)) -> _ => {
                        info!(?duration, "run duration expired");
                        control.duration_expired.store(true, Ordering::Release);
                    }
                }
            })?;

        Ok(Self {
            cancel: Some(cancel),
            thread: Some(thread),
        })
    }
}

impl Drop for DurationTimer {
    fn drop(&mut self) {
        // Disconnecting the channel wakes the timer thread.
        drop(self.cancel.take());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Runs a load test on a pool of worker threads.
pub struct Runner {
    config: RunConfig,
    service: Arc<dyn Service>,
    strategy: Arc<LoadStrategy>,
    sampler: Arc<Sampler>,
    key_store: Option<Arc<dyn KeyStore>>,
    console: Option<Box<dyn Console>>,
    control: Arc<RunControl>,
}

impl Runner {
    /// Creates a runner for already configured components.
    pub fn new(
        config: RunConfig,
        service: Arc<dyn Service>,
        strategy: Arc<LoadStrategy>,
        sampler: Arc<Sampler>,
    ) -> Self {
        Self {
            config,
            service,
            strategy,
            sampler,
            key_store: None,
            console: None,
            control: Arc::new(RunControl::new()),
        }
    }

    /// Persists the keys of successful writes in `key_store`.
    pub fn with_key_store(mut self, key_store: Arc<dyn KeyStore>) -> Self {
        self.key_store = Some(key_store);
        self
    }

    /// Attaches a console, opened if the run is interactive.
    pub fn with_console(mut self, console: Box<dyn Console>) -> Self {
        self.console = Some(console);
        self
    }

    /// Returns a handle to observe and stop the run.
    pub fn handle(&self) -> RunHandle {
        RunHandle(self.control.clone())
    }

    /// Runs until all workers are done, then stops every component.
    ///
    /// The service and the sampler must already be started; the strategy is
    /// bound and started if needed. Once those two preconditions hold, the
    /// service, the strategy, the sampler and the key store are stopped on
    /// every path, including a failed bind.
    pub fn run(mut self) -> Result<()> {
        if !self.service.is_started() {
            return Err(Error::Lifecycle("service must be started before running".into()));
        }
        if !self.sampler.is_started() {
            return Err(Error::Lifecycle("sampler must be started before running".into()));
        }

        let prepared = self
            .strategy
            .bind(self.service.as_ref())
            .and_then(|()| self.strategy.start());
        let result = prepared.and_then(|()| self.drive());
        self.cleanup();
        result
    }

    fn drive(&mut self) -> Result<()> {
        let threads = self.config.threads.max(1);
        self.control.set_state(RunnerState::Running);
        info!(
            threads,
            strategy = self.strategy.name(),
            duration = ?self.config.duration,
            "starting run"
        );

        let _timer = self
            .config
            .duration
            .map(|duration| DurationTimer::spawn(duration, self.control.clone()))
            .transpose()?;

        let barrier = Arc::new(ArrivalBarrier::new(threads + 1));
        let mut workers = Vec::with_capacity(threads);
        let mut spawn_error = None;

        for index in 0..threads {
            let name = format!("kvload-worker-{index}");
            let worker = Worker {
                name: name.clone(),
                service: self.service.clone(),
                strategy: self.strategy.clone(),
                sampler: self.sampler.clone(),
                key_store: self.key_store.clone(),
                control: self.control.clone(),
                barrier: barrier.clone(),
                sleep: self.config.sleep,
            };

            match thread::Builder::new().name(name).spawn(move || worker.run()) {
                Ok(handle) => workers.push(handle),
                Err(error) => {
                    error!(
                        error = &error as &dyn std::error::Error,
                        "failed to spawn worker thread"
                    );
                    self.handle().stop();
                    barrier.forfeit(threads - index);
                    spawn_error = Some(error);
                    break;
                }
            }
        }

        let mut console = self.console.take().filter(|_| self.config.interactive);
        if let Some(opened) = &mut console {
            if let Err(error) = opened.open(self.handle(), self.sampler.clone()) {
                error!(
                    error = &error as &dyn std::error::Error,
                    "failed to open console, continuing headless"
                );
                console = None;
            }
        }

        barrier.wait();
        debug!("all workers arrived");

        if let Some(mut console) = console {
            if self.config.wait_for_quit && spawn_error.is_none() {
                self.control.set_state(RunnerState::Draining);
                info!("workers finished, waiting for quit");
                // The sender lives in `self.control`, so this only returns on quit.
                let _ = self.control.quit_rx.recv();
            }
            console.close();
        }

        for worker in workers {
            if worker.join().is_err() {
                error!("worker thread panicked");
            }
        }

        match spawn_error {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }

    fn cleanup(&self) {
        stop_logged("service", || self.service.stop());
        stop_logged("strategy", || self.strategy.stop());
        stop_logged("sampler", || self.sampler.stop());
        if let Some(key_store) = &self.key_store {
            stop_logged("key store", || key_store.stop());
        }

        self.control.set_state(RunnerState::Stopped);
        info!(recorded = self.sampler.recorded(), "run finished");
    }
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("config", &self.config)
            .field("strategy", &self.strategy)
            .field("service", &self.service)
            .field("key_store", &self.key_store)
            .finish_non_exhaustive()
    }
}
