use anyhow::{Context, Result};
use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use crate::error::ConfigError;
use crate::event::DaemonEvent;
use crate::monitor::MonitorConfig;
use crate::registry::{TrackedGame, TrackedGameRegistry};

/// Root configuration structure. Deserialized from the app data
/// directory's config.toml.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Full path to the wallpaper renderer executable.
    #[serde(default)]
    pub renderer_path: String,
    /// Start monitoring as soon as the daemon launches.
    #[serde(default = "default_auto_monitor")]
    pub auto_monitor: bool,
    #[serde(default)]
    pub tracked_games: Vec<GameConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            renderer_path: String::new(),
            auto_monitor: default_auto_monitor(),
            tracked_games: Vec::new(),
        }
    }
}

/// Configuration entry for a single tracked game.
#[derive(Debug, Deserialize, Clone)]
pub struct GameConfig {
    /// Full path to the game executable. The process name is derived from it.
    pub executable_path: String,
    /// Shown in logs and the status file. Defaults to the executable file name.
    #[serde(default)]
    pub display_name: Option<String>,
}

impl Config {
    /// Validates the configuration into the input of a monitoring session.
    ///
    /// Entries whose process name cannot be derived are skipped; duplicates
    /// are dropped.
    pub fn monitor_config(&self) -> Result<MonitorConfig, ConfigError> {
        let renderer_path = self.renderer_path.trim();
        if renderer_path.is_empty() {
            return Err(ConfigError::EmptyRendererPath);
        }

        let tracked_games: TrackedGameRegistry = self
            .tracked_games
            .iter()
            .filter_map(|g| {
                let game = TrackedGame::new(&g.executable_path, g.display_name.as_deref());
                if game.is_none() {
                    log::warn!("Skipping tracked game with unusable path: {:?}", g.executable_path);
                }
                game
            })
            .collect();
        if tracked_games.is_empty() {
            return Err(ConfigError::NoTrackedGames);
        }

        Ok(MonitorConfig {
            renderer_path: renderer_path.to_string(),
            tracked_games,
        })
    }
}

/// Loads the config file at `path`, returning `Config::default()` if the file does not exist.
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Spawns a file watcher on the parent directory of `path`.  Whenever the config
/// file is created or modified, reloads it and sends a `ConfigReloaded` event.
pub async fn watch_config(path: PathBuf, tx: mpsc::Sender<DaemonEvent>) {
    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Event>(16);

    let mut watcher = match RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = watch_tx.blocking_send(event);
            }
        },
        NotifyConfig::default(),
    ) {
        Ok(w) => w,
        Err(e) => {
            log::error!("Failed to create config file watcher: {e}");
            return;
        }
    };

    // Watch the parent directory rather than the file directly so we catch
    // editor-style atomic saves (write-new + rename).
    let watch_dir = match path.parent() {
        Some(d) => d.to_path_buf(),
        None => {
            log::error!("Config path has no parent directory");
            return;
        }
    };

    if let Err(e) = watcher.watch(&watch_dir, RecursiveMode::NonRecursive) {
        log::error!("Failed to watch config directory: {e}");
        return;
    }

    while let Some(event) = watch_rx.recv().await {
        if !is_config_write(&event, &path) {
            continue;
        }
        match load_or_default(&path) {
            Ok(config) => {
                if tx.send(DaemonEvent::ConfigReloaded(config)).await.is_err() {
                    break;
                }
            }
            Err(e) => log::warn!("Failed to reload config: {e:#}"),
        }
    }
}

fn is_config_write(event: &notify::Event, path: &Path) -> bool {
    let affects_config = event.paths.iter().any(|p| p == path);
    let is_write = matches!(
        event.kind,
        notify::EventKind::Create(_) | notify::EventKind::Modify(_)
    );
    affects_config && is_write
}

fn default_auto_monitor() -> bool {
    true
}
