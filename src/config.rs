//! Service configuration
//!
//! Loaded once at startup and handed to the executor by value. Sources, in
//! order of precedence (last wins):
//! 1. Built-in defaults
//! 2. TOML file named by `SANDBOX_CONFIG`
//! 3. `SANDBOX_*` environment variables

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Hard upper bound for any per-request timeout
pub const TIMEOUT_CEILING_SECS: u64 = 30;

/// Which isolation backend the executor may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendPolicy {
    /// Prefer the container runtime, fall back to a plain process
    #[default]
    Auto,
    /// Container only, never fall back
    Container,
    /// Plain process only, never check the container runtime
    Process,
}

impl FromStr for BackendPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "container" | "docker" => Ok(Self::Container),
            "process" => Ok(Self::Process),
            other => anyhow::bail!("Unknown backend policy: {}", other),
        }
    }
}

/// Top-level sandbox configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub backend: BackendPolicy,
    /// Timeout applied when the caller does not send one (seconds)
    pub default_timeout_secs: u64,
    /// Upper bound for caller-supplied timeouts (seconds)
    pub max_timeout_secs: u64,
    /// Per-stream capture cap in bytes
    pub max_output_bytes: usize,
    /// Time between the graceful and the forceful kill (milliseconds)
    pub kill_grace_ms: u64,
    /// Environment variable name the injected secret is exposed under
    pub secret_env: String,
    pub process: ProcessConfig,
    pub container: ContainerConfig,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            backend: BackendPolicy::Auto,
            default_timeout_secs: 10,
            max_timeout_secs: 30,
            max_output_bytes: 1024 * 1024,
            kill_grace_ms: 500,
            secret_env: "OPENAI_API_KEY".to_string(),
            process: ProcessConfig::default(),
            container: ContainerConfig::default(),
        }
    }
}

/// Settings for the plain-process backend
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Interpreter binary (resolved through PATH)
    pub interpreter: String,
    /// Arguments placed before the script path
    pub interpreter_args: Vec<String>,
    /// RLIMIT_AS for the child in MB
    pub memory_mb: u64,
    /// RLIMIT_FSIZE for the child in MB
    pub max_file_size_mb: u64,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            interpreter_args: vec!["-u".to_string()],
            memory_mb: 1024,
            max_file_size_mb: 16,
        }
    }
}

/// Settings for the container backend
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Container runtime CLI (docker-compatible)
    pub runtime: String,
    pub image: String,
    /// Interpreter inside the image
    pub interpreter: String,
    /// Hard memory ceiling in MB (swap disabled)
    pub memory_mb: u64,
    /// Fractional CPU share
    pub cpus: f64,
    pub pids_limit: u32,
    /// Size of the writable /tmp inside the container in MB
    pub tmpfs_mb: u64,
    /// Bound on the per-request runtime availability check (milliseconds)
    pub check_timeout_ms: u64,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            runtime: "docker".to_string(),
            image: "python:3.11-slim".to_string(),
            interpreter: "python".to_string(),
            memory_mb: 256,
            cpus: 0.5,
            pids_limit: 50,
            tmpfs_mb: 16,
            check_timeout_ms: 2000,
        }
    }
}

impl SandboxConfig {
    /// Load configuration from `SANDBOX_CONFIG` (if set) and the environment
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("SANDBOX_CONFIG") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Invalid config file {:?}", path))
    }

    /// Apply `SANDBOX_*` overrides using `lookup` to resolve variable names
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SANDBOX_BACKEND") {
            self.backend = parse_var("SANDBOX_BACKEND", &v)?;
        }
        if let Some(v) = lookup("SANDBOX_DEFAULT_TIMEOUT") {
            self.default_timeout_secs = parse_var("SANDBOX_DEFAULT_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("SANDBOX_MAX_OUTPUT_BYTES") {
            self.max_output_bytes = parse_var("SANDBOX_MAX_OUTPUT_BYTES", &v)?;
        }
        if let Some(v) = lookup("SANDBOX_SECRET_ENV") {
            self.secret_env = v;
        }
        if let Some(v) = lookup("SANDBOX_PYTHON") {
            self.process.interpreter = v;
        }
        if let Some(v) = lookup("SANDBOX_DOCKER_BIN") {
            self.container.runtime = v;
        }
        if let Some(v) = lookup("SANDBOX_IMAGE") {
            self.container.image = v;
        }
        if let Some(v) = lookup("SANDBOX_MEMORY_MB") {
            self.container.memory_mb = parse_var("SANDBOX_MEMORY_MB", &v)?;
        }
        if let Some(v) = lookup("SANDBOX_CPUS") {
            self.container.cpus = parse_var("SANDBOX_CPUS", &v)?;
        }
        if let Some(v) = lookup("SANDBOX_PIDS_LIMIT") {
            self.container.pids_limit = parse_var("SANDBOX_PIDS_LIMIT", &v)?;
        }
        Ok(())
    }

    /// Reject configurations the backends cannot honor
    pub fn validate(&self) -> Result<()> {
        if !(1..=TIMEOUT_CEILING_SECS).contains(&self.max_timeout_secs) {
            anyhow::bail!(
                "max_timeout_secs must be within 1..={}, got {}",
                TIMEOUT_CEILING_SECS,
                self.max_timeout_secs
            );
        }
        if !(1..=self.max_timeout_secs).contains(&self.default_timeout_secs) {
            anyhow::bail!(
                "default_timeout_secs must be within 1..={}, got {}",
                self.max_timeout_secs,
                self.default_timeout_secs
            );
        }
        if self.max_output_bytes == 0 {
            anyhow::bail!("max_output_bytes must be positive");
        }
        if !is_env_name(&self.secret_env) {
            anyhow::bail!("secret_env is not a valid variable name: {:?}", self.secret_env);
        }
        if self.process.interpreter.trim().is_empty() {
            anyhow::bail!("process.interpreter must not be empty");
        }
        if self.container.runtime.trim().is_empty() || self.container.image.trim().is_empty() {
            anyhow::bail!("container.runtime and container.image must not be empty");
        }
        if self.container.cpus.is_nan() || self.container.cpus <= 0.0 {
            anyhow::bail!("container.cpus must be positive, got {}", self.container.cpus);
        }
        if self.container.memory_mb < 16 {
            anyhow::bail!(
                "container.memory_mb must be at least 16, got {}",
                self.container.memory_mb
            );
        }
        if self.container.pids_limit == 0 {
            anyhow::bail!("container.pids_limit must be at least 1");
        }
        Ok(())
    }

    /// Clamp a requested timeout into `1..=max_timeout_secs`
    pub fn clamp_timeout(&self, secs: u64) -> u64 {
        secs.clamp(1, self.max_timeout_secs)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("Invalid value for {}: {:?} ({})", key, value, e))
}

fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
