/// Ordered collection of games whose activity suppresses the renderer.
use std::collections::HashSet;

use crate::process::ProcessQuery;

/// A single monitored game. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedGame {
    /// Full path to the game executable as configured.
    pub executable_path: String,
    /// Human-readable name used in logs and the status file.
    pub display_name: String,
    /// Process-table lookup key, derived from `executable_path`.
    pub process_name: String,
}

impl TrackedGame {
    /// Builds a tracked game from its configured path and optional display name.
    ///
    /// Returns `None` when no process name can be derived from the path.
    pub fn new(executable_path: &str, display_name: Option<&str>) -> Option<Self> {
        let process_name = derive_process_name(executable_path)?;
        let display_name = display_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| file_name(executable_path).to_string());
        Some(Self {
            executable_path: executable_path.to_string(),
            display_name,
            process_name,
        })
    }
}

/// Final path segment. Both separators are honoured so Windows paths split
/// correctly on any host.
fn file_name(path: &str) -> &str {
    path.rsplit(['\\', '/']).next().unwrap_or("")
}

/// Derives the process-table name from an executable path: the final path
/// segment with a trailing `.exe` (any case) removed.
pub fn derive_process_name(executable_path: &str) -> Option<String> {
    let name = file_name(executable_path.trim());
    let split = name.len().saturating_sub(4);
    let stem = if name.is_char_boundary(split) && name[split..].eq_ignore_ascii_case(".exe") {
        &name[..split]
    } else {
        name
    };
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}

/// Tracked games in configuration order, de-duplicated by executable path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackedGameRegistry {
    games: Vec<TrackedGame>,
}

impl TrackedGameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `game` unless a game with the same executable path is already
    /// tracked. Returns whether it was added.
    pub fn add(&mut self, game: TrackedGame) -> bool {
        if self
            .games
            .iter()
            .any(|g| g.executable_path == game.executable_path)
        {
            return false;
        }
        self.games.push(game);
        true
    }

    pub fn games(&self) -> &[TrackedGame] {
        &self.games
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    /// Returns the first game in registry order whose process is running.
    ///
    /// A failed query counts as "not running" for that game.
    pub fn first_active(&self, query: &dyn ProcessQuery) -> Option<&TrackedGame> {
        // Several entries may share a process name; query each name once.
        let mut checked = HashSet::new();
        self.games.iter().find(|game| {
            if !checked.insert(game.process_name.to_lowercase()) {
                return false;
            }
            match query.is_running(&game.process_name) {
                Ok(running) => running,
                Err(e) => {
                    log::warn!("Could not check '{}': {e}", game.display_name);
                    false
                }
            }
        })
    }
}

impl FromIterator<TrackedGame> for TrackedGameRegistry {
    fn from_iter<I: IntoIterator<Item = TrackedGame>>(iter: I) -> Self {
        let mut registry = Self::new();
        for game in iter {
            let path = game.executable_path.clone();
            if !registry.add(game) {
                log::warn!("Ignoring duplicate tracked game: {path}");
            }
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::FakeProcesses;

    fn game(path: &str) -> TrackedGame {
        TrackedGame::new(path, None).unwrap()
    }

    // ── derive_process_name ───────────────────────────────────────────────────

    #[test]
    fn derives_name_from_windows_path() {
        assert_eq!(derive_process_name(r"C:\g\foo.exe").as_deref(), Some("foo"));
    }

    #[test]
    fn derives_name_from_unix_path() {
        assert_eq!(derive_process_name("/opt/games/foo").as_deref(), Some("foo"));
    }

    #[test]
    fn strips_uppercase_extension() {
        assert_eq!(
            derive_process_name(r"D:\Steam\RocketLeague.EXE").as_deref(),
            Some("RocketLeague")
        );
    }

    #[test]
    fn keeps_inner_dots() {
        assert_eq!(
            derive_process_name(r"C:\g\game.v2.exe").as_deref(),
            Some("game.v2")
        );
    }

    #[test]
    fn rejects_empty_and_bare_extension() {
        assert!(derive_process_name("").is_none());
        assert!(derive_process_name(r"C:\g\").is_none());
        assert!(derive_process_name(r"C:\g\.exe").is_none());
    }

    // ── TrackedGame ───────────────────────────────────────────────────────────

    #[test]
    fn display_name_defaults_to_file_name() {
        let g = game(r"C:\g\foo.exe");
        assert_eq!(g.display_name, "foo.exe");
        assert_eq!(g.process_name, "foo");
    }

    #[test]
    fn display_name_override_is_used() {
        let g = TrackedGame::new(r"C:\g\foo.exe", Some("Foo Racing")).unwrap();
        assert_eq!(g.display_name, "Foo Racing");
    }

    #[test]
    fn blank_display_name_falls_back() {
        let g = TrackedGame::new(r"C:\g\foo.exe", Some("   ")).unwrap();
        assert_eq!(g.display_name, "foo.exe");
    }

    // ── TrackedGameRegistry ───────────────────────────────────────────────────

    #[test]
    fn registry_preserves_order_and_drops_duplicates() {
        let registry: TrackedGameRegistry = vec![
            game(r"C:\g\b.exe"),
            game(r"C:\g\a.exe"),
            game(r"C:\g\b.exe"),
        ]
        .into_iter()
        .collect();
        let names: Vec<_> = registry.games().iter().map(|g| g.process_name.as_str()).collect();
        assert_eq!(names, ["b", "a"]);
    }

    #[test]
    fn first_active_returns_first_running_in_order() {
        let registry: TrackedGameRegistry =
            vec![game(r"C:\g\a.exe"), game(r"C:\g\b.exe"), game(r"C:\g\c.exe")]
                .into_iter()
                .collect();
        let procs = FakeProcesses::new();
        procs.set_running("b.exe", true);
        procs.set_running("c.exe", true);
        let active = registry.first_active(&*procs).unwrap();
        assert_eq!(active.process_name, "b");
        // Stops at the first match.
        assert_eq!(procs.queries(), ["a", "b"]);
    }

    #[test]
    fn first_active_none_when_nothing_runs() {
        let registry: TrackedGameRegistry = vec![game(r"C:\g\a.exe")].into_iter().collect();
        let procs = FakeProcesses::new();
        assert!(registry.first_active(&*procs).is_none());
    }

    #[test]
    fn failed_query_counts_as_not_running() {
        let registry: TrackedGameRegistry =
            vec![game(r"C:\g\a.exe"), game(r"C:\g\b.exe")].into_iter().collect();
        let procs = FakeProcesses::new();
        procs.set_running("a", true);
        procs.fail_query("a");
        assert!(registry.first_active(&*procs).is_none());

        procs.set_running("b", true);
        assert_eq!(registry.first_active(&*procs).unwrap().process_name, "b");
    }

    #[test]
    fn lookup_ignores_case() {
        let registry: TrackedGameRegistry =
            vec![game(r"D:\Steam\RocketLeague.exe")].into_iter().collect();
        let procs = FakeProcesses::new();
        procs.set_running("ROCKETLEAGUE.EXE", true);
        assert!(registry.first_active(&*procs).is_some());
    }

    #[test]
    fn shared_process_name_is_queried_once() {
        let registry: TrackedGameRegistry =
            vec![game(r"C:\x\game.exe"), game(r"D:\y\game.exe")].into_iter().collect();
        assert_eq!(registry.len(), 2);
        let procs = FakeProcesses::new();
        assert!(registry.first_active(&*procs).is_none());
        assert_eq!(procs.queries().len(), 1);
    }
}
