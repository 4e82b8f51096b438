//! Start/stop contract shared by every component that takes part in a run.

use tracing::warn;

use crate::error::Result;

/// A component with an explicit start/stop lifecycle.
///
/// Both transitions are idempotent: starting a started component and stopping a
/// stopped one are no-ops. State is tracked per instance.
pub trait Lifecycle: Send + Sync {
    /// Starts the component.
    fn start(&self) -> Result<()>;

    /// Stops the component.
    fn stop(&self) -> Result<()>;

    /// Returns `true` while the component is started.
    fn is_started(&self) -> bool;
}

/// Runs a stop action and logs a warning on failure instead of propagating it.
///
/// Used on shutdown paths, where one failing component must not keep the others
/// from stopping.
pub(crate) fn stop_logged(component: &str, stop: impl FnOnce() -> Result<()>) {
    if let Err(error) = stop() {
        warn!(
            component,
            error = &error as &dyn std::error::Error,
            "failed to stop component"
        );
    }
}
