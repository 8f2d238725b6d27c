use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for launcher operations.
pub type LauncherResult<T> = Result<T, LauncherError>;

/// Errors that can occur while resolving, assembling or launching a simulation run.
#[derive(Debug, Error)]
pub enum LauncherError {
    #[error("no simulations to run in {}", .folder.display())]
    NoSimulationsFound { folder: PathBuf },
    #[error(
        "more than 1 simulation to run, need to specify one ({} found in {}: {})",
        .candidates.len(),
        .folder.display(),
        .candidates.join(", ")
    )]
    AmbiguousSimulations {
        folder: PathBuf,
        candidates: Vec<String>,
    },
    #[error("failed to resolve path {}: {source}", .path.display())]
    PathResolution {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to resolve test classpath: {0}")]
    DependencyResolution(String),
    #[error("failed to launch engine: {0}")]
    Launch(String),
    #[error("simulation assertions failed")]
    AssertionsFailed,
    #[error("engine failed with status {status}{}", describe_cause(.cause))]
    SimulationFailed { status: i32, cause: Option<String> },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

fn describe_cause(cause: &Option<String>) -> String {
    cause
        .as_deref()
        .map(|cause| format!(": {cause}"))
        .unwrap_or_default()
}

impl LauncherError {
    pub(crate) fn path(path: impl Into<PathBuf>, source: io::Error) -> Self {
        LauncherError::PathResolution {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn launch(err: impl Into<String>) -> Self {
        LauncherError::Launch(err.into())
    }

    pub(crate) fn dependency(err: impl Into<String>) -> Self {
        LauncherError::DependencyResolution(err.into())
    }

    /// True when the error reports assertion failures rather than an infrastructure fault.
    pub fn is_assertion_failure(&self) -> bool {
        matches!(self, LauncherError::AssertionsFailed)
    }
}
