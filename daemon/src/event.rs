use crate::config::Config;

/// Reported by a monitoring session whenever it acts on the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// A tracked game was detected and the renderer was terminated.
    RendererStopped { game: String },
    /// No tracked game is running and the renderer was launched.
    RendererStarted,
    /// The renderer could not be launched; retried on the next tick.
    LaunchFailed(String),
    /// Some renderer processes survived termination.
    TerminateFailed(String),
}

pub enum DaemonEvent {
    /// A monitoring session changed the renderer or failed to.
    Monitor(MonitorEvent),
    /// The config file changed on disk and was successfully re-parsed.
    ConfigReloaded(Config),
    /// Ctrl+C received; the daemon should stop monitoring and exit.
    Shutdown,
}
