//! Runner module - isolation backends
//!
//! This module provides a unified interface for running a submitted script:
//! - `ContainerRunner`: ephemeral, network-less container (preferred)
//! - `ProcessRunner`: plain child process with a scrubbed environment (fallback)
//!
//! The runner module does NOT:
//! - Validate source code
//! - Create or delete the scratch artifact
//! - Decide between backends or interpret exit codes

pub mod capture;
pub mod container;
pub mod process;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::process::ExitStatus;
use std::time::Duration;

/// Which isolation strategy produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Container,
    Process,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackendKind::Container => "container",
            BackendKind::Process => "process",
        };
        write!(f, "{}", s)
    }
}

/// Credential forwarded to a single execution. Never printed.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Parameters for one run
#[derive(Debug, Clone, Copy)]
pub struct RunSpec<'a> {
    /// Script to execute (inside the scratch directory)
    pub artifact: &'a Path,
    /// Wall-clock limit, counted from launch
    pub timeout: Duration,
    /// Exposed to the script as a single environment variable
    pub secret: Option<&'a Secret>,
}

/// How the program terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    /// Exited normally with given exit code
    Code(i32),
    /// Killed by signal
    Signal(i32),
}

impl ExitState {
    pub fn is_success(&self) -> bool {
        matches!(self, ExitState::Code(0))
    }
}

impl From<ExitStatus> for ExitState {
    fn from(status: ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;

        match (status.code(), status.signal()) {
            (Some(code), _) => ExitState::Code(code),
            (None, Some(sig)) => ExitState::Signal(sig),
            (None, None) => ExitState::Code(-1),
        }
    }
}

/// Raw result of a run (no interpretation)
#[derive(Debug)]
pub enum RunOutput {
    /// Program terminated on its own before the deadline
    Completed {
        exit: ExitState,
        stdout: String,
        stderr: String,
    },
    /// Deadline passed; the program was killed and its output discarded
    TimedOut,
}

/// Backend infrastructure failure (the submitted program never ran to completion
/// for reasons unrelated to the program itself)
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("{backend} backend failed to launch: {message}")]
    Launch {
        backend: BackendKind,
        message: String,
    },
    #[error("{backend} backend I/O error: {source}")]
    Io {
        backend: BackendKind,
        #[source]
        source: std::io::Error,
    },
}

impl RunnerError {
    pub fn backend(&self) -> BackendKind {
        match self {
            RunnerError::Launch { backend, .. } | RunnerError::Io { backend, .. } => *backend,
        }
    }
}

/// Runner trait for executing a script in some isolation
#[async_trait]
pub trait Runner: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Whether the backend can take work right now
    async fn is_available(&self) -> bool;

    /// Run the artifact, enforcing the deadline in `spec`
    async fn run(&self, spec: &RunSpec<'_>) -> Result<RunOutput, RunnerError>;
}

// Re-exports
pub use container::ContainerRunner;
pub use process::ProcessRunner;
