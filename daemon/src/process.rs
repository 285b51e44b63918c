/// Process-table queries and process control against the OS.
///
/// The monitor only talks to the OS through [`ProcessQuery`] and
/// [`ProcessControl`]; [`SystemProcesses`] is the `sysinfo`-backed
/// implementation used by the daemon.
use std::collections::HashSet;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, MutexGuard};

use sysinfo::{ProcessesToUpdate, System};

use crate::error::{LaunchError, QueryError, TerminateError};

/// Answers whether a process with a given name is currently running.
pub trait ProcessQuery: Send + Sync {
    /// Re-reads the process table on every call.
    fn is_running(&self, process_name: &str) -> Result<bool, QueryError>;
}

/// Starts executables and terminates processes by name.
pub trait ProcessControl: Send + Sync {
    /// Starts the executable at `path` without waiting for it to initialise.
    fn launch(&self, path: &Path) -> Result<(), LaunchError>;

    /// Terminates every running process whose name matches any of `names`.
    /// Returns the number of processes terminated; no match is `Ok(0)`.
    fn terminate_all(&self, names: &[String]) -> Result<usize, TerminateError>;
}

/// Normalises a process name for comparison: lowercase, trailing `.exe` removed.
///
/// Windows reports `Foo.exe` in the process table while lookups use `foo`.
pub fn normalize_name(name: &str) -> String {
    let lower = name.to_lowercase();
    match lower.strip_suffix(".exe") {
        Some(stem) => stem.to_string(),
        None => lower,
    }
}

/// Waits for `child` on a detached thread so it does not linger as a zombie
/// once it exits or is killed.
#[cfg(unix)]
fn reap(mut child: Child) {
    let pid = child.id();
    let spawned = std::thread::Builder::new()
        .name(format!("reap-{pid}"))
        .spawn(move || match child.wait() {
            Ok(status) => log::debug!("Process {pid} exited: {status}"),
            Err(e) => log::warn!("Failed to wait for process {pid}: {e}"),
        });
    if let Err(e) = spawned {
        log::warn!("Could not start reaper for process {pid}: {e}");
    }
}

/// Windows releases exited processes once their handles close.
#[cfg(not(unix))]
fn reap(_child: Child) {}

/// OS process table access via `sysinfo`.
pub struct SystemProcesses {
    sys: Mutex<System>,
}

impl SystemProcesses {
    pub fn new() -> Self {
        Self {
            sys: Mutex::new(System::new()),
        }
    }

    /// Locks the process table and refreshes it from the OS.
    fn refreshed(&self) -> Result<MutexGuard<'_, System>, QueryError> {
        let mut sys = self.sys.lock().map_err(|_| QueryError::Unavailable {
            message: "process table lock poisoned".to_string(),
        })?;
        sys.refresh_processes(ProcessesToUpdate::All, true);
        Ok(sys)
    }
}

impl Default for SystemProcesses {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessQuery for SystemProcesses {
    fn is_running(&self, process_name: &str) -> Result<bool, QueryError> {
        let target = normalize_name(process_name);
        let sys = self.refreshed()?;
        Ok(sys
            .processes()
            .values()
            .any(|p| normalize_name(&p.name().to_string_lossy()) == target))
    }
}

impl ProcessControl for SystemProcesses {
    fn launch(&self, path: &Path) -> Result<(), LaunchError> {
        if !path.is_file() {
            return Err(LaunchError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let mut cmd = Command::new(path);
        // Renderers expect to find their assets next to the binary.
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());

        let child = cmd.spawn().map_err(|source| LaunchError::Spawn {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Spawned {} (pid {})", path.display(), child.id());
        reap(child);
        Ok(())
    }

    fn terminate_all(&self, names: &[String]) -> Result<usize, TerminateError> {
        let targets: HashSet<String> = names.iter().map(|n| normalize_name(n)).collect();
        let sys = self.refreshed()?;

        let mut terminated = 0;
        let mut failed = Vec::new();
        for process in sys.processes().values() {
            let name = process.name().to_string_lossy();
            if !targets.contains(&normalize_name(&name)) {
                continue;
            }
            if process.kill() {
                log::debug!("Terminated {name} (pid {})", process.pid());
                terminated += 1;
            } else {
                failed.push(format!("{name} (pid {})", process.pid()));
            }
        }

        if failed.is_empty() {
            Ok(terminated)
        } else {
            Err(TerminateError::Partial { terminated, failed })
        }
    }
}
