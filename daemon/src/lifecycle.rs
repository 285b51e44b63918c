/// Renderer lifecycle: the Running/Stopped belief and the two transitions
/// that change it.
///
/// The state is the controller's belief about the renderer, not ground truth:
/// it is updated from what the controller asked the OS to do.
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::{LaunchError, TerminateError};
use crate::monitor::Timing;
use crate::process::{normalize_name, ProcessControl};
use crate::registry::derive_process_name;

/// Process names the renderer is known to run under. The binary differs by
/// build architecture, so termination always targets all of them.
pub const RENDERER_PROCESS_NAMES: [&str; 3] = ["wallpaper64", "wallpaper_w64", "wallpaper32"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RendererState {
    Stopped,
    Running,
}

/// Every process name the renderer may be running under, including the name
/// of the configured executable when it is not one of the known variants.
pub fn renderer_name_variants(renderer_path: &str) -> Vec<String> {
    let mut names: Vec<String> = RENDERER_PROCESS_NAMES.iter().map(|n| n.to_string()).collect();
    if let Some(own) = derive_process_name(renderer_path) {
        let key = normalize_name(&own);
        if !names.iter().any(|n| normalize_name(n) == key) {
            names.push(own);
        }
    }
    names
}

/// Sleeps for `delay` unless cancellation is signalled first.
/// Returns `true` when cancelled. A dropped sender counts as cancellation.
pub async fn sleep_or_cancel(delay: Duration, cancel: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = async {
            let _ = cancel.wait_for(|cancelled| *cancelled).await;
        } => true,
    }
}

/// Owns the renderer state for one monitoring session.
pub struct WallpaperController {
    control: Arc<dyn ProcessControl>,
    renderer_path: PathBuf,
    variants: Vec<String>,
    stop_grace: Duration,
    start_grace: Duration,
    state_tx: watch::Sender<RendererState>,
    cancel: watch::Receiver<bool>,
}

impl WallpaperController {
    /// Creates a controller in the `Stopped` state. Grace delays end early
    /// once `cancel` turns `true`.
    pub fn new(
        control: Arc<dyn ProcessControl>,
        renderer_path: &str,
        timing: &Timing,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        let (state_tx, _) = watch::channel(RendererState::Stopped);
        Self {
            control,
            renderer_path: PathBuf::from(renderer_path),
            variants: renderer_name_variants(renderer_path),
            stop_grace: timing.stop_grace,
            start_grace: timing.start_grace,
            state_tx,
            cancel,
        }
    }

    pub fn state(&self) -> RendererState {
        *self.state_tx.borrow()
    }

    /// Read-only view of the state for session handles.
    pub fn subscribe(&self) -> watch::Receiver<RendererState> {
        self.state_tx.subscribe()
    }

    pub fn variants(&self) -> &[String] {
        &self.variants
    }

    /// `Stopped -> Running`: launches the renderer and holds for the start
    /// grace delay. No-op when already `Running`. On launch failure the
    /// state stays `Stopped`.
    pub async fn start(&mut self) -> Result<(), LaunchError> {
        if self.state() == RendererState::Running {
            return Ok(());
        }
        self.control.launch(&self.renderer_path)?;
        self.hold(self.start_grace).await;
        self.state_tx.send_replace(RendererState::Running);
        Ok(())
    }

    /// `Running -> Stopped`: terminates every renderer variant and holds for
    /// the stop grace delay. No-op when already `Stopped`.
    ///
    /// The state becomes `Stopped` even when some processes survive; the
    /// error still reports them.
    pub async fn stop(&mut self) -> Result<usize, TerminateError> {
        if self.state() == RendererState::Stopped {
            return Ok(0);
        }
        let result = self.control.terminate_all(&self.variants);
        self.hold(self.stop_grace).await;
        self.state_tx.send_replace(RendererState::Stopped);
        result
    }

    /// Terminates every renderer variant without a state change. Used when a
    /// renderer may have been started outside this controller.
    pub async fn ensure_stopped(&mut self) -> Result<usize, TerminateError> {
        let result = self.control.terminate_all(&self.variants);
        if !matches!(result, Ok(0)) {
            self.hold(self.stop_grace).await;
        }
        result
    }

    async fn hold(&mut self, delay: Duration) {
        if sleep_or_cancel(delay, &mut self.cancel).await {
            log::debug!("Grace delay interrupted by cancellation");
        }
    }
}
