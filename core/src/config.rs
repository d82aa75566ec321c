//! Configuration loading and validation for the helper supervisor
//!
//! Every field has a default, so an absent config file means "supervise
//! `npx -y @upstash/context7-mcp` on port 8809". A TOML file may override any
//! subset of fields; keys are camelCase. Validation errors name the offending
//! field.

use crate::{CoreError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Port used when the caller does not supply one
pub const DEFAULT_PORT: u16 = 8809;

/// Placeholder in `args` replaced by the port at launch time
pub const PORT_PLACEHOLDER: &str = "{port}";

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "CONTEXT7_SUPERVISOR_CONFIG";

/// Which liveness/termination implementation to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// Signal probing on Unix, process-table queries elsewhere
    #[default]
    Auto,
    /// `kill(pid, 0)` and SIGTERM/SIGKILL
    Signal,
    /// Process-table query and external kill tools
    Table,
}

/// Supervisor configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SupervisorConfig {
    /// Port used when none is given on the command line
    pub default_port: u16,
    /// Helper program
    pub command: String,
    /// Helper arguments; `{port}` is replaced with the port
    pub args: Vec<String>,
    /// Substring identifying the helper in a process command line
    pub marker: String,
    /// Upper bound on the initialization wait after spawning
    pub startup_wait_ms: u64,
    /// Interval between liveness/readiness checks during the wait
    pub poll_interval_ms: u64,
    /// How long a graceful termination may take before forcing
    pub graceful_timeout_ms: u64,
    /// Directory holding record files; the temp dir when unset
    pub record_dir: Option<PathBuf>,
    /// Liveness probe selection
    pub probe: ProbeKind,
    /// Host used for the readiness connect probe
    pub readiness_host: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            default_port: DEFAULT_PORT,
            command: "npx".to_string(),
            args: vec![
                "-y".to_string(),
                "@upstash/context7-mcp".to_string(),
                "--transport".to_string(),
                "http".to_string(),
                "--port".to_string(),
                PORT_PLACEHOLDER.to_string(),
            ],
            marker: "context7-mcp".to_string(),
            startup_wait_ms: 2_000,
            poll_interval_ms: 100,
            graceful_timeout_ms: 1_000,
            record_dir: None,
            probe: ProbeKind::Auto,
            readiness_host: "127.0.0.1".to_string(),
        }
    }
}

impl SupervisorConfig {
    /// Validate field values and cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.default_port == 0 {
            return Err(CoreError::ValidationError(
                "defaultPort: must be 1..=65535".to_string(),
            ));
        }
        if self.command.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "command: cannot be empty".to_string(),
            ));
        }
        if !self.args.iter().any(|a| a.contains(PORT_PLACEHOLDER)) {
            return Err(CoreError::ValidationError(format!(
                "args: must pass the port to the helper via {PORT_PLACEHOLDER}"
            )));
        }
        if self.marker.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "marker: cannot be empty".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(CoreError::ValidationError(
                "pollIntervalMs: must be > 0".to_string(),
            ));
        }
        if self.startup_wait_ms < self.poll_interval_ms {
            return Err(CoreError::ValidationError(
                "startupWaitMs: must be >= pollIntervalMs".to_string(),
            ));
        }
        if self.readiness_host.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "readinessHost: cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Helper arguments with the port substituted
    pub fn args_for(&self, port: u16) -> Vec<String> {
        let port = port.to_string();
        self.args
            .iter()
            .map(|a| a.replace(PORT_PLACEHOLDER, &port))
            .collect()
    }

    /// Initialization window
    pub fn startup_wait(&self) -> Duration {
        Duration::from_millis(self.startup_wait_ms)
    }

    /// Interval between checks during the initialization window
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Grace period between SIGTERM and SIGKILL
    pub fn graceful_timeout(&self) -> Duration {
        Duration::from_millis(self.graceful_timeout_ms)
    }
}

/// Return the config path to use when none is given explicitly.
///
/// Order:
/// - `CONTEXT7_SUPERVISOR_CONFIG` env var if provided
/// - `$HOME/.context7/supervisor.toml` if HOME exists
pub fn default_config_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var(CONFIG_ENV_VAR) {
        if !p.trim().is_empty() {
            return Some(PathBuf::from(p));
        }
    }
    dirs_next::home_dir().map(|home| home.join(".context7").join("supervisor.toml"))
}

/// Load configuration from a TOML file path
pub fn load_config_from_toml_path(path: impl AsRef<Path>) -> Result<SupervisorConfig> {
    let data = fs::read_to_string(&path).map_err(|e| {
        CoreError::ConfigurationError(format!("Failed to read config {:?}: {}", path.as_ref(), e))
    })?;
    load_config_from_toml_str(&data)
}

/// Load configuration from a TOML string
pub fn load_config_from_toml_str(input: &str) -> Result<SupervisorConfig> {
    let cfg: SupervisorConfig = toml::from_str(input)
        .map_err(|e| CoreError::ConfigurationError(format!("TOML parse error: {}", e)))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Resolve the effective configuration.
///
/// An explicit path must exist. The implicit default path is only read when
/// the file is present; otherwise built-in defaults apply.
pub fn resolve_config(explicit: Option<&Path>) -> Result<SupervisorConfig> {
    if let Some(path) = explicit {
        debug!("Loading config from {}", path.display());
        return load_config_from_toml_path(path);
    }
    match default_config_path() {
        Some(path) if path.is_file() => {
            debug!("Loading config from {}", path.display());
            load_config_from_toml_path(&path)
        }
        _ => {
            debug!("No config file found, using defaults");
            Ok(SupervisorConfig::default())
        }
    }
}
