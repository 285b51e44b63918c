use std::path::PathBuf;
use thiserror::Error;

/// Failure to start the renderer executable.
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Executable not found: {path:?}")]
    NotFound { path: PathBuf },

    #[error("Failed to start {path:?}: {source}")]
    Spawn {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Failure to terminate one or more matching processes.
///
/// Termination is best-effort: `terminated` processes did exit even though
/// the ones listed in `failed` survived.
#[derive(Error, Debug)]
pub enum TerminateError {
    #[error("Terminated {terminated} process(es) but could not stop: {}", .failed.join(", "))]
    Partial {
        terminated: usize,
        failed: Vec<String>,
    },

    #[error("Could not enumerate processes: {0}")]
    Query(#[from] QueryError),
}

/// Failure to read the OS process table.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Process table unavailable: {message}")]
    Unavailable { message: String },
}

/// Host-side configuration that cannot start a monitoring session.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No renderer executable configured")]
    EmptyRendererPath,

    #[error("No tracked games configured")]
    NoTrackedGames,
}
