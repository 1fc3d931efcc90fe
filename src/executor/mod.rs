//! Executor module - coordinates one execution end to end
//!
//! validate -> write scratch script -> pick backend -> run -> classify -> clean up
//!
//! `execute` never fails in the type system: every problem becomes an
//! [`OutcomeStatus`]. The executor holds no mutable state and is shared across
//! tasks behind an `Arc`.

pub mod outcome;
pub mod scratch;

use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::{BackendPolicy, SandboxConfig};
use crate::runner::{
    BackendKind, ContainerRunner, ExitState, ProcessRunner, RunOutput, RunSpec, Runner,
    RunnerError,
};
use crate::validator;
use scratch::Scratch;

pub use outcome::{ExecutionOutcome, ExecutionRequest, ExecutionResponse, OutcomeStatus};

pub struct Executor {
    config: SandboxConfig,
    container: Arc<dyn Runner>,
    process: Arc<dyn Runner>,
}

impl Executor {
    pub fn new(config: SandboxConfig) -> Self {
        let container = Arc::new(ContainerRunner::new(&config));
        let process = Arc::new(ProcessRunner::new(&config));
        Self::with_runners(config, container, process)
    }

    pub fn with_runners(
        config: SandboxConfig,
        container: Arc<dyn Runner>,
        process: Arc<dyn Runner>,
    ) -> Self {
        Self {
            config,
            container,
            process,
        }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Whether a request arriving now would run in a container
    pub async fn container_available(&self) -> bool {
        match self.config.backend {
            BackendPolicy::Process => false,
            BackendPolicy::Auto | BackendPolicy::Container => {
                self.container.is_available().await
            }
        }
    }

    /// Run one request to its terminal state
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionOutcome {
        let verdict = validator::validate(&request.source);
        if let Some(reason) = verdict.reason() {
            warn!(
                verdict = %verdict,
                fingerprint = %fingerprint(&request.source),
                "Rejected submission"
            );
            return ExecutionOutcome::rejected(reason);
        }

        let started = Instant::now();
        let timeout_secs = self.config.clamp_timeout(request.timeout_secs);
        info!(
            "Executing submission ({} bytes, timeout {}s)",
            request.source.len(),
            timeout_secs
        );

        let scratch = match Scratch::create(&request.source).await {
            Ok(scratch) => scratch,
            Err(e) => {
                error!("Failed to create scratch directory: {}", e);
                return ExecutionOutcome::infrastructure_error(started.elapsed(), None);
            }
        };

        let spec = RunSpec {
            artifact: scratch.script(),
            timeout: Duration::from_secs(timeout_secs),
            secret: request.secret.as_ref(),
        };
        let (backend, result) = self.dispatch(&spec).await;
        let elapsed = started.elapsed();
        scratch.cleanup();

        let outcome = match result {
            Ok(RunOutput::Completed {
                exit,
                stdout,
                stderr,
            }) => {
                if exit.is_success() {
                    ExecutionOutcome::success(stdout, elapsed, backend)
                } else {
                    let signal = match exit {
                        ExitState::Signal(sig) => Some(sig),
                        ExitState::Code(_) => None,
                    };
                    ExecutionOutcome::runtime_failure(stderr, signal, elapsed, backend)
                }
            }
            Ok(RunOutput::TimedOut) => ExecutionOutcome::timeout(timeout_secs, elapsed, backend),
            Err(e) => {
                error!(backend = %e.backend(), error = %e, "Execution backend failed");
                ExecutionOutcome::infrastructure_error(elapsed, Some(backend))
            }
        };

        info!(
            status = ?outcome.status,
            backend = %backend,
            elapsed_ms = elapsed.as_millis() as u64,
            "Execution finished"
        );
        outcome
    }

    /// Choose a backend per the configured policy and run, falling back from
    /// container to process under `auto`
    async fn dispatch(
        &self,
        spec: &RunSpec<'_>,
    ) -> (BackendKind, Result<RunOutput, RunnerError>) {
        match self.config.backend {
            BackendPolicy::Process => self.run_on(&self.process, spec).await,
            BackendPolicy::Container => self.run_on(&self.container, spec).await,
            BackendPolicy::Auto => {
                if !self.container.is_available().await {
                    warn!(
                        from = %self.container.kind(),
                        to = %self.process.kind(),
                        reason = "container runtime unavailable",
                        "Falling back to process backend"
                    );
                    return self.run_on(&self.process, spec).await;
                }

                match self.run_on(&self.container, spec).await {
                    (_, Err(e)) => {
                        warn!(
                            from = %self.container.kind(),
                            to = %self.process.kind(),
                            reason = %e,
                            "Falling back to process backend"
                        );
                        self.run_on(&self.process, spec).await
                    }
                    done => done,
                }
            }
        }
    }

    async fn run_on(
        &self,
        runner: &Arc<dyn Runner>,
        spec: &RunSpec<'_>,
    ) -> (BackendKind, Result<RunOutput, RunnerError>) {
        let kind = runner.kind();
        match kind {
            BackendKind::Process => info!("Running on process backend (weak isolation)"),
            BackendKind::Container => debug!("Running on container backend"),
        }
        (kind, runner.run(spec).await)
    }
}

/// Short SHA-256 fingerprint for correlating rejected submissions in logs
fn fingerprint(source: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(source.as_bytes()));
    digest[..16].to_string()
}
