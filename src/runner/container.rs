//! Container runner implementation
//!
//! Drives the container runtime CLI (`docker` by default). Every run gets a
//! fresh, uniquely named container with no network, a read-only root, dropped
//! capabilities, a non-root user and hard memory/CPU/pid caps. The script is
//! bind-mounted read-only; nothing else from the host is visible.

use async_trait::async_trait;
use std::io;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::capture::Pipes;
use super::{BackendKind, ExitState, RunOutput, RunSpec, Runner, RunnerError};
use crate::config::{ContainerConfig, SandboxConfig};

/// Exit code the runtime CLI uses for its own failures
const RUNTIME_FAILURE_EXIT: i32 = 125;
const NOT_EXECUTABLE_EXIT: i32 = 126;
const NOT_FOUND_EXIT: i32 = 127;

const MOUNT_TARGET: &str = "/sandbox/main.py";
const NOBODY: &str = "65534:65534";

/// Upper bound for a startup image pull
const PULL_TIMEOUT: Duration = Duration::from_secs(600);

/// Runner that executes the script in an ephemeral container
pub struct ContainerRunner {
    config: ContainerConfig,
    secret_env: String,
    max_output_bytes: usize,
    kill_grace: Duration,
}

impl ContainerRunner {
    pub fn new(config: &SandboxConfig) -> Self {
        Self {
            config: config.container.clone(),
            secret_env: config.secret_env.clone(),
            max_output_bytes: config.max_output_bytes,
            kill_grace: config.kill_grace(),
        }
    }

    fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.config.check_timeout_ms)
    }

    /// Arguments for `<runtime> run`. The secret is referenced by name only;
    /// its value travels through the CLI's own environment.
    fn run_args(&self, name: &str, spec: &RunSpec<'_>) -> Vec<String> {
        let memory = format!("{}m", self.config.memory_mb);

        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--pull=never".to_string(),
            format!("--name={}", name),
            "--network=none".to_string(),
            format!("--memory={}", memory),
            format!("--memory-swap={}", memory),
            format!("--cpus={}", self.config.cpus),
            format!("--pids-limit={}", self.config.pids_limit),
            "--read-only".to_string(),
            "--cap-drop=ALL".to_string(),
            "--security-opt=no-new-privileges".to_string(),
            format!("--tmpfs=/tmp:rw,noexec,nosuid,size={}m", self.config.tmpfs_mb),
            format!("--user={}", NOBODY),
            "--workdir=/tmp".to_string(),
            format!(
                "--mount=type=bind,source={},target={},readonly",
                spec.artifact.display(),
                MOUNT_TARGET
            ),
            "--env=PYTHONUNBUFFERED=1".to_string(),
            "--env=PYTHONDONTWRITEBYTECODE=1".to_string(),
        ];

        if spec.secret.is_some() {
            args.push(format!("--env={}", self.secret_env));
        }

        args.extend([
            self.config.image.clone(),
            self.config.interpreter.clone(),
            "-u".to_string(),
            MOUNT_TARGET.to_string(),
        ]);
        args
    }

    /// Run a short runtime CLI command, bounded by the check timeout
    async fn runtime_cmd(&self, args: &[&str]) -> io::Result<Output> {
        let output = Command::new(&self.config.runtime)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        tokio::time::timeout(self.check_timeout(), output)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "runtime command timed out"))?
    }

    /// Make sure the image is present locally, pulling it if it is not.
    /// Runs never pull, so a missing image would otherwise fail every request.
    pub async fn ensure_image(&self) -> io::Result<()> {
        let image = self.config.image.as_str();
        let inspect = self
            .runtime_cmd(&["image", "inspect", "--format", "{{.Id}}", image])
            .await?;
        if inspect.status.success() {
            debug!("Image {} is present", image);
            return Ok(());
        }

        info!("Pulling image {}", image);
        let pull = Command::new(&self.config.runtime)
            .args(["pull", image])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();
        let pull = tokio::time::timeout(PULL_TIMEOUT, pull)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "image pull timed out"))??;

        if !pull.status.success() {
            return Err(io::Error::other(format!(
                "pull of {} failed: {}",
                image,
                String::from_utf8_lossy(&pull.stderr).trim()
            )));
        }
        info!("Pulled image {}", image);
        Ok(())
    }

    /// Stop the container, kill the CLI client, and force-remove whatever is left
    async fn teardown(&self, client: &mut Child, name: &str) {
        let grace_secs = self.kill_grace.as_secs().max(1).to_string();
        match self.runtime_cmd(&["stop", "--time", &grace_secs, name]).await {
            Ok(out) if out.status.success() => debug!("Stopped container {}", name),
            Ok(out) => debug!(
                "Stop of {} reported: {}",
                name,
                String::from_utf8_lossy(&out.stderr).trim()
            ),
            Err(e) => warn!("Failed to stop container {}: {}", name, e),
        }

        let _ = client.start_kill();
        if let Err(e) = client.wait().await {
            warn!("Failed to reap runtime client: {}", e);
        }

        // The daemon may still create the container after the client died
        if let Err(e) = self.runtime_cmd(&["rm", "-f", name]).await {
            warn!("Failed to remove container {}: {}", name, e);
        }
    }
}

/// Whether a completed run was actually a failure of the runtime itself.
/// 126 and 127 are also what the runtime reports when the command inside the
/// image cannot be executed or found, so those need its `docker:` prefix.
fn is_runtime_failure(exit: ExitState, stderr: &str) -> bool {
    let stderr = stderr.trim_start();
    match exit {
        ExitState::Code(RUNTIME_FAILURE_EXIT) => {
            stderr.starts_with("docker:")
                || stderr.starts_with("Unable to find image")
                || stderr.contains("Error response from daemon")
        }
        ExitState::Code(NOT_EXECUTABLE_EXIT | NOT_FOUND_EXIT) => stderr.starts_with("docker:"),
        _ => false,
    }
}

#[async_trait]
impl Runner for ContainerRunner {
    fn kind(&self) -> BackendKind {
        BackendKind::Container
    }

    async fn is_available(&self) -> bool {
        match self
            .runtime_cmd(&["version", "--format", "{{.Server.Version}}"])
            .await
        {
            Ok(out) if out.status.success() => {
                debug!(
                    "Container runtime reachable (server {})",
                    String::from_utf8_lossy(&out.stdout).trim()
                );
                true
            }
            Ok(out) => {
                debug!(
                    "Container runtime unavailable: {}",
                    String::from_utf8_lossy(&out.stderr).trim()
                );
                false
            }
            Err(e) => {
                debug!("Container runtime unavailable: {}", e);
                false
            }
        }
    }

    async fn run(&self, spec: &RunSpec<'_>) -> Result<RunOutput, RunnerError> {
        let io_error = |source: io::Error| RunnerError::Io {
            backend: BackendKind::Container,
            source,
        };

        let name = format!("sandbox-{}", Uuid::new_v4().simple());
        let args = self.run_args(&name, spec);
        debug!("Running {} with args: {:?}", self.config.runtime, args);

        let mut cmd = Command::new(&self.config.runtime);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(secret) = spec.secret {
            cmd.env(&self.secret_env, secret.expose());
        }

        let mut client = cmd.spawn().map_err(|e| RunnerError::Launch {
            backend: BackendKind::Container,
            message: format!("could not start `{}`: {}", self.config.runtime, e),
        })?;

        let pipes = match Pipes::capture(&mut client, self.max_output_bytes) {
            Ok(pipes) => pipes,
            Err(e) => {
                self.teardown(&mut client, &name).await;
                return Err(io_error(e));
            }
        };

        match tokio::time::timeout(spec.timeout, client.wait()).await {
            Ok(Ok(status)) => {
                let exit = ExitState::from(status);
                let (stdout, stderr) = pipes.finish(self.kill_grace).await.map_err(io_error)?;
                if is_runtime_failure(exit, &stderr) {
                    return Err(RunnerError::Launch {
                        backend: BackendKind::Container,
                        message: stderr.trim().to_string(),
                    });
                }
                Ok(RunOutput::Completed {
                    exit,
                    stdout,
                    stderr,
                })
            }
            Ok(Err(e)) => {
                self.teardown(&mut client, &name).await;
                pipes.abort();
                Err(io_error(e))
            }
            Err(_) => {
                warn!(
                    "Container {} exceeded {:?} timeout, stopping",
                    name, spec.timeout
                );
                self.teardown(&mut client, &name).await;
                pipes.abort();
                Ok(RunOutput::TimedOut)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::Secret;
    use std::path::Path;

    fn runner() -> ContainerRunner {
        ContainerRunner::new(&SandboxConfig::default())
    }

    #[test]
    fn test_run_args_lock_down_container() {
        let spec = RunSpec {
            artifact: Path::new("/tmp/sandbox-abc/main.py"),
            timeout: Duration::from_secs(10),
            secret: None,
        };
        let args = runner().run_args("sandbox-1", &spec);

        for flag in [
            "--rm",
            "--pull=never",
            "--name=sandbox-1",
            "--network=none",
            "--memory=256m",
            "--memory-swap=256m",
            "--cpus=0.5",
            "--pids-limit=50",
            "--read-only",
            "--cap-drop=ALL",
            "--security-opt=no-new-privileges",
            "--user=65534:65534",
            "--mount=type=bind,source=/tmp/sandbox-abc/main.py,target=/sandbox/main.py,readonly",
        ] {
            assert!(args.iter().any(|a| a == flag), "missing {}", flag);
        }
        assert_eq!(
            &args[args.len() - 4..],
            &["python:3.11-slim", "python", "-u", "/sandbox/main.py"]
        );
        assert!(!args.iter().any(|a| a.contains("OPENAI_API_KEY")));
    }

    #[test]
    fn test_secret_passed_by_name_only() {
        let secret = Secret::new("sk-very-secret");
        let spec = RunSpec {
            artifact: Path::new("/tmp/main.py"),
            timeout: Duration::from_secs(1),
            secret: Some(&secret),
        };
        let args = runner().run_args("sandbox-2", &spec);

        assert!(args.iter().any(|a| a == "--env=OPENAI_API_KEY"));
        assert!(!args.iter().any(|a| a.contains("sk-very-secret")));
    }

    #[test]
    fn test_runtime_failure_detection() {
        assert!(is_runtime_failure(
            ExitState::Code(125),
            "docker: Error response from daemon: pull access denied.\n"
        ));
        assert!(is_runtime_failure(
            ExitState::Code(125),
            "Error response from daemon: Conflict."
        ));
        // a user program exiting 125 is not a runtime failure
        assert!(!is_runtime_failure(ExitState::Code(125), "Traceback ...\n"));
        assert!(!is_runtime_failure(ExitState::Code(1), "docker: whatever"));
    }

    #[test]
    fn test_missing_interpreter_in_image_is_runtime_failure() {
        assert!(is_runtime_failure(
            ExitState::Code(127),
            "docker: Error response from daemon: failed to create task for container: \
             exec: \"python\": executable file not found in $PATH: unknown.\n"
        ));
        assert!(is_runtime_failure(
            ExitState::Code(126),
            "docker: Error response from daemon: permission denied: unknown.\n"
        ));
        // the script itself exiting 127 or 126
        assert!(!is_runtime_failure(
            ExitState::Code(127),
            "sh: 1: missing-tool: not found\n"
        ));
        assert!(!is_runtime_failure(ExitState::Code(126), ""));
    }

    #[tokio::test]
    async fn test_ensure_image_without_runtime_fails() {
        let mut config = SandboxConfig::default();
        config.container.runtime = "definitely-not-a-runtime".to_string();
        let runner = ContainerRunner::new(&config);

        assert!(runner.ensure_image().await.is_err());
    }

    #[tokio::test]
    async fn test_missing_runtime_is_unavailable() {
        let mut config = SandboxConfig::default();
        config.container.runtime = "definitely-not-a-runtime".to_string();
        let runner = ContainerRunner::new(&config);

        assert!(!runner.is_available().await);

        let spec = RunSpec {
            artifact: Path::new("/tmp/main.py"),
            timeout: Duration::from_secs(1),
            secret: None,
        };
        let err = runner.run(&spec).await.unwrap_err();
        assert!(matches!(
            err,
            RunnerError::Launch {
                backend: BackendKind::Container,
                ..
            }
        ));
    }
}
