use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::event::MonitorEvent;
use crate::lifecycle::RendererState;

/// Current operational state of the daemon.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "lowercase")]
pub enum DaemonState {
    /// No monitoring session is active.
    Idle,
    /// A monitoring session is polling the tracked games.
    Monitoring,
}

/// Runtime status written by the daemon next to its config file.
/// External UIs read this file (read-only) to display daemon state.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DaemonStatus {
    /// Daemon binary version (set from Cargo.toml at compile time).
    pub version: String,
    /// Current operational state.
    pub state: DaemonState,
    /// Last known renderer state; absent while idle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renderer: Option<RendererState>,
    /// Display name of the game that last caused the renderer to stop.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_game: Option<String>,
    /// RFC 3339 timestamp of the last renderer transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition: Option<String>,
    /// Human-readable error message if the daemon encountered a non-fatal error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonStatus {
    /// Constructs the initial idle status on daemon startup.
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: DaemonState::Idle,
            renderer: None,
            active_game: None,
            last_transition: None,
            error: None,
        }
    }

    /// A session has started; the renderer has not been evaluated yet.
    pub fn begin_monitoring(&mut self) {
        self.state = DaemonState::Monitoring;
        self.renderer = Some(RendererState::Stopped);
        self.active_game = None;
        self.error = None;
    }

    pub fn end_monitoring(&mut self) {
        self.state = DaemonState::Idle;
        self.renderer = None;
        self.active_game = None;
    }

    /// Records a renderer transition made at `timestamp`.
    pub fn record_transition(
        &mut self,
        renderer: RendererState,
        active_game: Option<String>,
        timestamp: String,
    ) {
        self.renderer = Some(renderer);
        self.active_game = active_game;
        self.last_transition = Some(timestamp);
        self.error = None;
    }

    /// Folds a monitor event observed at `timestamp` into the status.
    pub fn apply(&mut self, event: MonitorEvent, timestamp: String) {
        match event {
            MonitorEvent::RendererStopped { game } => {
                self.record_transition(RendererState::Stopped, Some(game), timestamp)
            }
            MonitorEvent::RendererStarted => {
                self.record_transition(RendererState::Running, None, timestamp)
            }
            MonitorEvent::LaunchFailed(msg) => {
                self.error = Some(format!("Renderer launch failed: {msg}"));
            }
            MonitorEvent::TerminateFailed(msg) => {
                self.error = Some(format!("Renderer did not fully stop: {msg}"));
            }
        }
    }
}

/// Serializes `status` to TOML and writes it to `path`.
/// Creates the parent directory if it does not exist.
/// Logs errors rather than panicking; a status write failure should
/// never crash the daemon.
pub fn write_status(path: &Path, status: &DaemonStatus) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            log::error!("Failed to create directory {}: {e}", parent.display());
            return;
        }
    }
    match toml::to_string_pretty(status) {
        Ok(content) => {
            if let Err(e) = std::fs::write(path, content) {
                log::error!("Failed to write status file: {e}");
            }
        }
        Err(e) => log::error!("Failed to serialize status: {e}"),
    }
}
