//! Request and result model

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::runner::{BackendKind, Secret};

pub const NO_OUTPUT_MARKER: &str = "Code executed successfully (no output)";
pub const EXECUTION_FAILED: &str = "Execution failed";
pub const INFRASTRUCTURE_FAILURE: &str = "Execution backend unavailable, please retry later";

/// One execution request. Immutable once built.
#[derive(Clone)]
pub struct ExecutionRequest {
    pub source: String,
    pub timeout_secs: u64,
    pub secret: Option<Secret>,
}

impl ExecutionRequest {
    pub fn new(source: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            source: source.into(),
            timeout_secs,
            secret: None,
        }
    }

    pub fn with_secret(mut self, secret: Secret) -> Self {
        self.secret = Some(secret);
        self
    }
}

impl fmt::Debug for ExecutionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionRequest")
            .field("source_len", &self.source.len())
            .field("timeout_secs", &self.timeout_secs)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Terminal state of one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    RuntimeFailure,
    Timeout,
    Rejected,
    InfrastructureError,
}

#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub status: OutcomeStatus,
    /// Program output (Success only)
    pub stdout: Option<String>,
    /// Caller-facing message for every other status
    pub stderr: Option<String>,
    /// From dispatch to terminal state; None when rejected
    pub elapsed: Option<Duration>,
    /// Backend that produced the terminal state
    pub backend: Option<BackendKind>,
}

impl ExecutionOutcome {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Rejected,
            stdout: None,
            stderr: Some(reason.into()),
            elapsed: None,
            backend: None,
        }
    }

    pub fn success(stdout: String, elapsed: Duration, backend: BackendKind) -> Self {
        let stdout = if stdout.is_empty() {
            NO_OUTPUT_MARKER.to_string()
        } else {
            stdout
        };
        Self {
            status: OutcomeStatus::Success,
            stdout: Some(stdout),
            stderr: None,
            elapsed: Some(elapsed),
            backend: Some(backend),
        }
    }

    pub fn runtime_failure(
        stderr: String,
        signal: Option<i32>,
        elapsed: Duration,
        backend: BackendKind,
    ) -> Self {
        let message = match (stderr.trim().is_empty(), signal) {
            (false, _) => stderr,
            (true, Some(sig)) => format!("{} (terminated by signal {})", EXECUTION_FAILED, sig),
            (true, None) => EXECUTION_FAILED.to_string(),
        };
        Self::failed(OutcomeStatus::RuntimeFailure, message, elapsed, Some(backend))
    }

    pub fn timeout(timeout_secs: u64, elapsed: Duration, backend: BackendKind) -> Self {
        Self::failed(
            OutcomeStatus::Timeout,
            format!("Execution timed out (exceeded {} seconds)", timeout_secs),
            elapsed,
            Some(backend),
        )
    }

    pub fn infrastructure_error(elapsed: Duration, backend: Option<BackendKind>) -> Self {
        Self::failed(
            OutcomeStatus::InfrastructureError,
            INFRASTRUCTURE_FAILURE.to_string(),
            elapsed,
            backend,
        )
    }

    fn failed(
        status: OutcomeStatus,
        message: String,
        elapsed: Duration,
        backend: Option<BackendKind>,
    ) -> Self {
        Self {
            status,
            stdout: None,
            stderr: Some(message),
            elapsed: Some(elapsed),
            backend,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// Wire form of an outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
}

impl From<ExecutionOutcome> for ExecutionResponse {
    fn from(outcome: ExecutionOutcome) -> Self {
        let success = outcome.is_success();
        Self {
            success,
            output: if success { outcome.stdout } else { None },
            error: if success { None } else { outcome.stderr },
            execution_time: outcome
                .elapsed
                .map(|d| (d.as_secs_f64() * 1000.0).round() / 1000.0),
        }
    }
}
