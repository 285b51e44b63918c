/// Polls the tracked games and keeps the renderer off while any of them runs.
///
/// Each call to [`Monitor::start_monitoring`] spawns one session task. A
/// session evaluates the process table every [`TICK_INTERVAL`], drives its
/// [`WallpaperController`] on edges only, and exits when its
/// [`SessionHandle`] is stopped. At most one session is active per
/// [`Monitor`]; starting a new one stops the previous one first.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::event::{DaemonEvent, MonitorEvent};
use crate::lifecycle::{sleep_or_cancel, RendererState, WallpaperController};
use crate::process::{ProcessControl, ProcessQuery};
use crate::registry::TrackedGameRegistry;

pub const TICK_INTERVAL: Duration = Duration::from_secs(5);
/// Held after terminating the renderer so the OS can release its resources.
pub const STOP_GRACE: Duration = Duration::from_secs(2);
/// Held after launching the renderer so it can finish initialising.
pub const START_GRACE: Duration = Duration::from_secs(5);

/// Pacing of a monitoring session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub tick_interval: Duration,
    pub stop_grace: Duration,
    pub start_grace: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            tick_interval: TICK_INTERVAL,
            stop_grace: STOP_GRACE,
            start_grace: START_GRACE,
        }
    }
}

/// Validated input for one monitoring session. Not mutated while the
/// session runs; changes require a new session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    pub renderer_path: String,
    pub tracked_games: TrackedGameRegistry,
}

/// What a tick did to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// A game appeared while the renderer was running.
    Stop,
    /// No game is running and the renderer was not.
    Start,
    /// A game was already running on the first evaluation.
    Sweep,
}

/// The body of a session task.
struct SessionLoop {
    games: TrackedGameRegistry,
    query: Arc<dyn ProcessQuery>,
    controller: WallpaperController,
    timing: Timing,
    cancel: watch::Receiver<bool>,
    events: Option<mpsc::Sender<DaemonEvent>>,
    evaluated: bool,
}

impl SessionLoop {
    fn new(
        config: MonitorConfig,
        query: Arc<dyn ProcessQuery>,
        control: Arc<dyn ProcessControl>,
        timing: Timing,
        cancel: watch::Receiver<bool>,
        events: Option<mpsc::Sender<DaemonEvent>>,
    ) -> Self {
        let controller =
            WallpaperController::new(control, &config.renderer_path, &timing, cancel.clone());
        Self {
            games: config.tracked_games,
            query,
            controller,
            timing,
            cancel,
            events,
            evaluated: false,
        }
    }

    async fn run(mut self) {
        let names: Vec<&str> = self.games.games().iter().map(|g| g.display_name.as_str()).collect();
        log::info!(
            "Monitoring {} game(s): {}; renderer names: {}",
            self.games.len(),
            names.join(", "),
            self.controller.variants().join(", ")
        );

        loop {
            if *self.cancel.borrow() {
                break;
            }
            if let Some(action) = self.tick().await {
                log::debug!("Tick action: {action:?}");
            }
            if sleep_or_cancel(self.timing.tick_interval, &mut self.cancel).await {
                break;
            }
        }

        log::info!("Monitoring stopped");
    }

    /// Evaluates the process table once and applies at most one transition.
    async fn tick(&mut self) -> Option<Action> {
        let first = !self.evaluated;
        self.evaluated = true;

        let active = self.games.first_active(&*self.query).cloned();
        match (active, self.controller.state()) {
            (Some(game), RendererState::Running) => {
                log::info!("Game started: {} -- stopping renderer", game.display_name);
                let result = self.controller.stop().await;
                self.report_stop(game.display_name, result);
                Some(Action::Stop)
            }
            (Some(game), RendererState::Stopped) if first => {
                log::info!(
                    "{} is already running -- making sure the renderer is stopped",
                    game.display_name
                );
                match self.controller.ensure_stopped().await {
                    Ok(0) => log::debug!("No renderer instance was running"),
                    result => self.report_stop(game.display_name, result),
                }
                Some(Action::Sweep)
            }
            (None, RendererState::Stopped) => {
                log::info!("No games running -- starting renderer");
                match self.controller.start().await {
                    Ok(()) => self.emit(MonitorEvent::RendererStarted),
                    Err(e) => {
                        log::error!("Failed to start renderer: {e}");
                        self.emit(MonitorEvent::LaunchFailed(e.to_string()));
                    }
                }
                Some(Action::Start)
            }
            _ => None,
        }
    }

    fn report_stop<E: std::fmt::Display>(&self, game: String, result: Result<usize, E>) {
        self.emit(MonitorEvent::RendererStopped { game });
        if let Err(e) = result {
            log::warn!("Renderer did not fully stop: {e}");
            self.emit(MonitorEvent::TerminateFailed(e.to_string()));
        }
    }

    fn emit(&self, event: MonitorEvent) {
        let Some(tx) = &self.events else { return };
        // Never wait on the daemon loop: it may itself be waiting for this
        // session to stop.
        if let Err(e) = tx.try_send(DaemonEvent::Monitor(event)) {
            log::debug!("Dropped monitor event: {e}");
        }
    }
}

struct SessionInner {
    id: u64,
    cancel_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<RendererState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Caller-held handle to a running monitoring session.
///
/// Clones refer to the same session. Dropping every clone cancels it.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<SessionInner>,
}

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The session's current belief about the renderer.
    pub fn renderer_state(&self) -> RendererState {
        *self.inner.state_rx.borrow()
    }

    pub fn is_active(&self) -> bool {
        match self.inner.task.lock() {
            Ok(task) => task.as_ref().is_some_and(|t| !t.is_finished()),
            Err(_) => false,
        }
    }

    /// Cancels the session and waits for its task to exit.
    ///
    /// Returns `true` if this call performed the shutdown; later calls on
    /// the same session are no-ops returning `false`.
    pub async fn stop(&self) -> bool {
        let task = match self.inner.task.lock() {
            Ok(mut task) => task.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(task) = task else {
            return false;
        };

        self.inner.cancel_tx.send_replace(true);
        if let Err(e) = task.await {
            log::error!("Monitoring session #{} ended abnormally: {e}", self.inner.id);
        }
        true
    }
}

/// Host-facing entry point. Owns the process interfaces and guarantees that
/// at most one session acts on the renderer at a time.
pub struct Monitor {
    query: Arc<dyn ProcessQuery>,
    control: Arc<dyn ProcessControl>,
    timing: Timing,
    events: Option<mpsc::Sender<DaemonEvent>>,
    active: tokio::sync::Mutex<Option<SessionHandle>>,
    next_id: AtomicU64,
}

impl Monitor {
    pub fn new(query: Arc<dyn ProcessQuery>, control: Arc<dyn ProcessControl>) -> Self {
        Self {
            query,
            control,
            timing: Timing::default(),
            events: None,
            active: tokio::sync::Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    #[cfg(test)]
    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    /// Sessions report renderer transitions and failures to `tx`.
    pub fn with_events(mut self, tx: mpsc::Sender<DaemonEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Starts a new session, stopping and awaiting any previous one first.
    pub async fn start_monitoring(&self, config: MonitorConfig) -> SessionHandle {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            log::info!("Replacing monitoring session #{}", previous.id());
            previous.stop().await;
        }

        let handle = self.spawn_session(config);
        *active = Some(handle.clone());
        handle
    }

    /// Stops `handle`. Returns `false` if it was already stopped.
    pub async fn stop_monitoring(&self, handle: &SessionHandle) -> bool {
        let mut active = self.active.lock().await;
        if active.as_ref().is_some_and(|a| a.id() == handle.id()) {
            *active = None;
        }
        handle.stop().await
    }

    /// The session most recently started and not yet stopped through this monitor.
    #[cfg(test)]
    pub async fn active_session(&self) -> Option<SessionHandle> {
        self.active.lock().await.clone()
    }

    fn spawn_session(&self, config: MonitorConfig) -> SessionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let session = SessionLoop::new(
            config,
            Arc::clone(&self.query),
            Arc::clone(&self.control),
            self.timing,
            cancel_rx,
            self.events.clone(),
        );
        let state_rx = session.controller.subscribe();

        log::info!("Starting monitoring session #{id}");
        let task = tokio::spawn(session.run());

        SessionHandle {
            inner: Arc::new(SessionInner {
                id,
                cancel_tx,
                state_rx,
                task: Mutex::new(Some(task)),
            }),
        }
    }
}
