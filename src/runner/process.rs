//! Process runner implementation
//!
//! Runs the script as a direct child process. Isolation is weak: the child
//! shares the host filesystem and kernel and is only constrained by a scrubbed
//! environment and rlimits. Use it only when no container runtime is reachable.

use async_trait::async_trait;
use nix::sys::resource::{setrlimit, Resource};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::{setpgid, Pid};
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use super::capture::Pipes;
use super::{BackendKind, ExitState, RunOutput, RunSpec, Runner, RunnerError};
use crate::config::{ProcessConfig, SandboxConfig};

const SAFE_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Resource limits applied in the child between fork and exec
#[derive(Debug, Clone, Copy)]
struct ChildLimits {
    cpu_secs: u64,
    address_space_bytes: u64,
    file_size_bytes: u64,
}

impl ChildLimits {
    /// Must stay async-signal-safe: runs in the forked child
    fn apply(&self) -> io::Result<()> {
        // own process group, so the whole tree can be signalled at once
        setpgid(Pid::from_raw(0), Pid::from_raw(0))?;
        setrlimit(Resource::RLIMIT_CPU, self.cpu_secs as _, self.cpu_secs as _)?;
        setrlimit(
            Resource::RLIMIT_AS,
            self.address_space_bytes as _,
            self.address_space_bytes as _,
        )?;
        setrlimit(
            Resource::RLIMIT_FSIZE,
            self.file_size_bytes as _,
            self.file_size_bytes as _,
        )?;
        Ok(())
    }
}

/// Runner that executes the script as a plain child process
pub struct ProcessRunner {
    config: ProcessConfig,
    secret_env: String,
    max_output_bytes: usize,
    kill_grace: Duration,
}

impl ProcessRunner {
    pub fn new(config: &SandboxConfig) -> Self {
        Self {
            config: config.process.clone(),
            secret_env: config.secret_env.clone(),
            max_output_bytes: config.max_output_bytes,
            kill_grace: config.kill_grace(),
        }
    }

    fn command(&self, spec: &RunSpec<'_>) -> Command {
        let work_dir = spec.artifact.parent().unwrap_or(Path::new("/tmp"));

        let mut cmd = Command::new(&self.config.interpreter);
        cmd.args(&self.config.interpreter_args)
            .arg(spec.artifact)
            .current_dir(work_dir)
            .env_clear()
            .env("PATH", SAFE_PATH)
            .env("HOME", work_dir)
            .env("LANG", "C.UTF-8")
            .env("PYTHONUNBUFFERED", "1")
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .env("PYTHONIOENCODING", "utf-8")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(secret) = spec.secret {
            cmd.env(&self.secret_env, secret.expose());
        }

        let limits = ChildLimits {
            cpu_secs: spec.timeout.as_secs() + 1,
            address_space_bytes: self.config.memory_mb * 1024 * 1024,
            file_size_bytes: self.config.max_file_size_mb * 1024 * 1024,
        };
        // SAFETY: the closure only calls setpgid/setrlimit, which are
        // async-signal-safe, and touches no shared state.
        unsafe {
            cmd.pre_exec(move || limits.apply());
        }

        cmd
    }

    /// SIGTERM the process group, escalate to SIGKILL after the grace period,
    /// then reap the child
    async fn terminate(&self, child: &mut Child, pgid: Option<Pid>) {
        if let Some(pgid) = pgid {
            signal_group(pgid, Signal::SIGTERM);
        }

        if tokio::time::timeout(self.kill_grace, child.wait()).await.is_err() {
            debug!("Child ignored SIGTERM, sending SIGKILL");
            if let Some(pgid) = pgid {
                signal_group(pgid, Signal::SIGKILL);
            }
            let _ = child.start_kill();
        }

        // stragglers that outlived the group leader
        if let Some(pgid) = pgid {
            signal_group(pgid, Signal::SIGKILL);
        }
        if let Err(e) = child.wait().await {
            warn!("Failed to reap child process: {}", e);
        }
    }
}

fn signal_group(pgid: Pid, signal: Signal) {
    match killpg(pgid, signal) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => warn!("Failed to send {} to process group {}: {}", signal, pgid, e),
    }
}

#[async_trait]
impl Runner for ProcessRunner {
    fn kind(&self) -> BackendKind {
        BackendKind::Process
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn run(&self, spec: &RunSpec<'_>) -> Result<RunOutput, RunnerError> {
        let io_error = |source: io::Error| RunnerError::Io {
            backend: BackendKind::Process,
            source,
        };

        debug!(
            "Running {:?} with {} (timeout {:?})",
            spec.artifact, self.config.interpreter, spec.timeout
        );

        let mut child = self
            .command(spec)
            .spawn()
            .map_err(|e| RunnerError::Launch {
                backend: BackendKind::Process,
                message: format!("could not start `{}`: {}", self.config.interpreter, e),
            })?;
        let pgid = child.id().map(|id| Pid::from_raw(id as i32));

        let pipes = match Pipes::capture(&mut child, self.max_output_bytes) {
            Ok(pipes) => pipes,
            Err(e) => {
                self.terminate(&mut child, pgid).await;
                return Err(io_error(e));
            }
        };

        match tokio::time::timeout(spec.timeout, child.wait()).await {
            Ok(Ok(status)) => {
                // descendants left behind by the script die with the request
                if let Some(pgid) = pgid {
                    signal_group(pgid, Signal::SIGKILL);
                }
                let (stdout, stderr) = pipes.finish(self.kill_grace).await.map_err(io_error)?;
                Ok(RunOutput::Completed {
                    exit: ExitState::from(status),
                    stdout,
                    stderr,
                })
            }
            Ok(Err(e)) => {
                self.terminate(&mut child, pgid).await;
                pipes.abort();
                Err(io_error(e))
            }
            Err(_) => {
                warn!(
                    "Process exceeded {:?} timeout, terminating (pid {:?})",
                    spec.timeout, pgid
                );
                self.terminate(&mut child, pgid).await;
                pipes.abort();
                Ok(RunOutput::TimedOut)
            }
        }
    }
}
