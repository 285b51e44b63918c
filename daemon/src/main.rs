mod config;
mod error;
mod event;
mod lifecycle;
mod monitor;
mod paths;
mod process;
mod registry;
mod status;

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::event::DaemonEvent;
use crate::monitor::{Monitor, MonitorConfig, SessionHandle};
use crate::process::SystemProcesses;
use crate::status::DaemonStatus;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // ── App data directory ────────────────────────────────────────────────────
    let app_dir = match paths::app_data_dir() {
        Ok(dir) => dir,
        Err(e) => {
            log::error!("{e:#}");
            std::process::exit(1);
        }
    };
    if let Err(e) = std::fs::create_dir_all(&app_dir) {
        log::error!("Failed to create app data directory {}: {e}", app_dir.display());
        std::process::exit(1);
    }

    // ── Configuration ─────────────────────────────────────────────────────────
    let config_path = paths::config_file_path(&app_dir);
    let initial_config = config::load_or_default(&config_path).unwrap_or_else(|e| {
        log::warn!("Config error (using defaults): {e:#}");
        Config::default()
    });

    // ── Initial status ────────────────────────────────────────────────────────
    let status_path = paths::status_file_path(&app_dir);
    let mut current_status = DaemonStatus::new();
    status::write_status(&status_path, &current_status);

    let (event_tx, mut event_rx) = mpsc::channel::<DaemonEvent>(32);

    // ── Monitor ───────────────────────────────────────────────────────────────
    let processes = Arc::new(SystemProcesses::new());
    let monitor = Monitor::new(processes.clone(), processes).with_events(event_tx.clone());

    // ── Background tasks ──────────────────────────────────────────────────────
    tokio::spawn(config::watch_config(config_path, event_tx.clone()));

    // Graceful shutdown on Ctrl+C.
    {
        let tx = event_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(DaemonEvent::Shutdown).await;
            }
        });
    }

    log::info!("wallswitch-daemon v{} started", env!("CARGO_PKG_VERSION"));

    let mut session = apply_config(&monitor, &initial_config, None, &mut current_status).await;
    status::write_status(&status_path, &current_status);

    // ── Event loop ────────────────────────────────────────────────────────────
    while let Some(evt) = event_rx.recv().await {
        match evt {
            DaemonEvent::ConfigReloaded(new_config) => {
                log::info!("Config reloaded");
                session =
                    apply_config(&monitor, &new_config, session.take(), &mut current_status).await;
                status::write_status(&status_path, &current_status);
            }

            DaemonEvent::Monitor(event) => {
                current_status.apply(event, chrono::Local::now().to_rfc3339());
                status::write_status(&status_path, &current_status);
            }

            DaemonEvent::Shutdown => {
                log::info!("Shutting down");
                if let Some(active) = session.take() {
                    monitor.stop_monitoring(&active.handle).await;
                    log::info!("Renderer left {:?}", active.handle.renderer_state());
                }
                current_status.end_monitoring();
                current_status.error = None;
                status::write_status(&status_path, &current_status);
                break;
            }
        }
    }
}

/// The running session and the config it was started from.
struct ActiveSession {
    handle: SessionHandle,
    config: MonitorConfig,
}

/// Starts, replaces or stops the monitoring session so that it matches `config`.
/// A config that cannot be monitored leaves the daemon idle. A live session
/// whose config is unchanged is kept as is.
async fn apply_config(
    monitor: &Monitor,
    config: &Config,
    current: Option<ActiveSession>,
    status: &mut DaemonStatus,
) -> Option<ActiveSession> {
    if !config.auto_monitor {
        if let Some(active) = current {
            log::info!("Monitoring disabled in config");
            monitor.stop_monitoring(&active.handle).await;
        }
        status.end_monitoring();
        return None;
    }

    match config.monitor_config() {
        Ok(monitor_config) => {
            if let Some(active) = current {
                if active.config == monitor_config && active.handle.is_active() {
                    log::debug!("Config unchanged, keeping session #{}", active.handle.id());
                    return Some(active);
                }
            }
            // Replaces the previous session if there is one.
            let handle = monitor.start_monitoring(monitor_config.clone()).await;
            status.begin_monitoring();
            Some(ActiveSession {
                handle,
                config: monitor_config,
            })
        }
        Err(e) => {
            log::warn!("Not monitoring: {e}");
            if let Some(active) = current {
                monitor.stop_monitoring(&active.handle).await;
            }
            status.end_monitoring();
            status.error = Some(e.to_string());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::process::testing::FakeProcesses;
    use crate::status::DaemonState;
    use std::time::Duration;
    use tokio::time::sleep;

    fn config(games: &[&str]) -> Config {
        Config {
            renderer_path: r"C:\w\wallpaper64.exe".to_string(),
            auto_monitor: true,
            tracked_games: games
                .iter()
                .map(|path| GameConfig {
                    executable_path: path.to_string(),
                    display_name: None,
                })
                .collect(),
        }
    }

    fn monitor(procs: &Arc<FakeProcesses>) -> Monitor {
        Monitor::new(procs.clone(), procs.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn identical_reload_keeps_the_session() {
        let procs = FakeProcesses::new();
        let monitor = monitor(&procs);
        let mut status = DaemonStatus::new();
        let cfg = config(&[r"C:\g\foo.exe"]);

        let first = apply_config(&monitor, &cfg, None, &mut status).await.unwrap();
        let first_id = first.handle.id();
        sleep(Duration::from_secs(20)).await;
        assert_eq!(procs.launches().len(), 1);

        // Editors often produce several write events for one save.
        let kept = apply_config(&monitor, &cfg, Some(first), &mut status).await;
        let kept = apply_config(&monitor, &cfg, kept, &mut status).await.unwrap();
        sleep(Duration::from_secs(20)).await;

        assert_eq!(kept.handle.id(), first_id);
        assert!(kept.handle.is_active());
        assert_eq!(procs.launches().len(), 1);
        assert_eq!(status.state, DaemonState::Monitoring);

        monitor.stop_monitoring(&kept.handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn changed_reload_replaces_the_session() {
        let procs = FakeProcesses::new();
        let monitor = monitor(&procs);
        let mut status = DaemonStatus::new();

        let first = apply_config(&monitor, &config(&[r"C:\g\foo.exe"]), None, &mut status)
            .await
            .unwrap();
        let old = first.handle.clone();
        let changed = config(&[r"C:\g\foo.exe", r"C:\g\bar.exe"]);
        let second = apply_config(&monitor, &changed, Some(first), &mut status)
            .await
            .unwrap();

        assert_ne!(second.handle.id(), old.id());
        assert!(!old.is_active());
        assert!(second.handle.is_active());
        assert_eq!(second.config.tracked_games.len(), 2);

        monitor.stop_monitoring(&second.handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn disabling_auto_monitor_stops_the_session() {
        let procs = FakeProcesses::new();
        let monitor = monitor(&procs);
        let mut status = DaemonStatus::new();
        let mut cfg = config(&[r"C:\g\foo.exe"]);

        let active = apply_config(&monitor, &cfg, None, &mut status).await.unwrap();
        let handle = active.handle.clone();
        cfg.auto_monitor = false;
        assert!(apply_config(&monitor, &cfg, Some(active), &mut status)
            .await
            .is_none());

        assert!(!handle.is_active());
        assert_eq!(status.state, DaemonState::Idle);
        assert!(status.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_config_stops_the_session_and_reports_why() {
        let procs = FakeProcesses::new();
        let monitor = monitor(&procs);
        let mut status = DaemonStatus::new();

        let active = apply_config(&monitor, &config(&[r"C:\g\foo.exe"]), None, &mut status)
            .await
            .unwrap();
        let handle = active.handle.clone();
        assert!(apply_config(&monitor, &config(&[]), Some(active), &mut status)
            .await
            .is_none());

        assert!(!handle.is_active());
        assert_eq!(status.state, DaemonState::Idle);
        assert_eq!(status.error.as_deref(), Some("No tracked games configured"));

        // Fixing the file starts monitoring again.
        let restarted = apply_config(&monitor, &config(&[r"C:\g\foo.exe"]), None, &mut status)
            .await
            .unwrap();
        assert!(restarted.handle.is_active());
        assert!(status.error.is_none());

        monitor.stop_monitoring(&restarted.handle).await;
    }
}
