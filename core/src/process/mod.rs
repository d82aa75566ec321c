//! Process control for the supervised helper
//!
//! This module defines the capability the supervisor needs from the host
//! platform: spawn a detached helper, probe liveness by pid, terminate by pid,
//! and search the process table for a helper invocation.
//!
//! ## Platform Support
//!
//! - **Unix**: [`SignalControl`] probes with `kill(pid, 0)` and terminates the
//!   helper's process group with SIGTERM/SIGKILL
//! - **Any platform**: [`TableControl`] queries the process table (`ps` or
//!   `tasklist`) and terminates with the platform's kill tool
//!
//! One implementation is chosen by [`platform_control`] when the supervisor
//! is built and used for every call after that.

#[cfg(unix)]
pub mod unix;

pub mod mock;
pub mod table;

#[cfg(unix)]
pub use unix::SignalControl;

pub use mock::MockProcessControl;
pub use table::TableControl;

use crate::config::ProbeKind;
use crate::{CoreError, Result};
use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::{Child, Command};
use tracing::{debug, error};

/// Fully resolved helper invocation
#[derive(Clone, PartialEq, Eq)]
pub struct HelperCommand {
    /// Program to execute (PATH lookup applies)
    pub program: String,
    /// Arguments, port already substituted
    pub args: Vec<String>,
    /// Extra environment for the helper
    pub env: Vec<(String, String)>,
}

impl fmt::Debug for HelperCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // env values may carry credentials
        let env_keys: Vec<&str> = self.env.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("HelperCommand")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env", &env_keys)
            .finish()
    }
}

impl HelperCommand {
    /// Create a command without extra environment
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: Vec::new(),
        }
    }

    /// Add an environment variable for the helper
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Command line as it would appear in a process listing
    pub fn display_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Handle on a helper this process spawned
///
/// The handle is only needed during the initialization window: checking it
/// reaps a helper that exited early so the pid probe cannot mistake a zombie
/// for a live process.
pub trait SpawnedProcess: Send {
    /// Process identifier captured at spawn time
    fn pid(&self) -> u32;

    /// Whether the process has already exited (non-blocking)
    fn has_exited(&mut self) -> Result<bool>;
}

/// Capability interface over host process management
#[async_trait]
pub trait ProcessControl: Send + Sync {
    /// Launch the helper detached from the caller's lifecycle
    async fn spawn(&self, command: &HelperCommand) -> Result<Box<dyn SpawnedProcess>>;

    /// Whether `pid` refers to a running process. Probe failures mean "no".
    async fn is_alive(&self, pid: u32) -> bool;

    /// Ask `pid` to exit (`forceful = false`) or kill it outright
    async fn terminate(&self, pid: u32, forceful: bool) -> Result<()>;

    /// Pids whose command line matches `pattern`, excluding this process
    async fn find_matching(&self, pattern: &MatchPattern) -> Result<Vec<u32>>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Pick the control implementation for this host.
pub fn platform_control(kind: ProbeKind) -> Arc<dyn ProcessControl> {
    match kind {
        ProbeKind::Table => Arc::new(TableControl::new()),
        ProbeKind::Auto | ProbeKind::Signal => signal_or_table(kind),
    }
}

#[cfg(unix)]
fn signal_or_table(_kind: ProbeKind) -> Arc<dyn ProcessControl> {
    Arc::new(SignalControl::new())
}

#[cfg(not(unix))]
fn signal_or_table(kind: ProbeKind) -> Arc<dyn ProcessControl> {
    if kind == ProbeKind::Signal {
        tracing::warn!("Signal probing is not available on this platform, using process table");
    }
    Arc::new(TableControl::new())
}

/// Recognizes the helper's invocation for one port in a command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchPattern {
    /// Substring identifying the helper
    pub marker: String,
    /// Port the helper was asked to listen on
    pub port: u16,
}

impl MatchPattern {
    /// Create a pattern
    pub fn new(marker: impl Into<String>, port: u16) -> Self {
        Self {
            marker: marker.into(),
            port,
        }
    }

    /// True when `command_line` contains the marker and passes this port
    /// as `--port <n>` or `--port=<n>`.
    pub fn matches(&self, command_line: &str) -> bool {
        if !command_line.contains(&self.marker) {
            return false;
        }
        let port = self.port.to_string();
        let tokens: Vec<&str> = command_line.split_whitespace().collect();
        tokens.iter().enumerate().any(|(i, tok)| {
            (*tok == "--port" && tokens.get(i + 1) == Some(&port.as_str()))
                || tok.strip_prefix("--port=") == Some(port.as_str())
        })
    }
}

/// One row of a process listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    /// Process identifier
    pub pid: u32,
    /// Full command line
    pub command_line: String,
}

/// Parse `ps -eo pid=,args=` output.
pub fn parse_ps_listing(output: &str) -> Vec<ProcessEntry> {
    output
        .lines()
        .filter_map(|line| {
            let line = line.trim_start();
            let (pid, rest) = line.split_once(char::is_whitespace)?;
            Some(ProcessEntry {
                pid: pid.parse().ok()?,
                command_line: rest.trim().to_string(),
            })
        })
        .collect()
}

/// Parse `wmic process get CommandLine,ProcessId /format:csv` output.
///
/// Rows are `Node,CommandLine,ProcessId`; the command line may itself hold
/// commas, so the pid is taken from the last field.
pub fn parse_csv_listing(output: &str) -> Vec<ProcessEntry> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let (head, pid) = line.rsplit_once(',')?;
            let (_node, command_line) = head.split_once(',')?;
            Some(ProcessEntry {
                pid: pid.trim().parse().ok()?,
                command_line: command_line.to_string(),
            })
        })
        .collect()
}

/// Filter a listing down to helper pids, never including this process.
pub fn matching_pids(entries: &[ProcessEntry], pattern: &MatchPattern) -> Vec<u32> {
    let own_pid = std::process::id();
    entries
        .iter()
        .filter(|e| e.pid != own_pid && pattern.matches(&e.command_line))
        .map(|e| e.pid)
        .collect()
}

/// Run a query tool and return its stdout.
pub(crate) async fn run_query(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await
        .map_err(|e| CoreError::ProcessQuery(format!("Failed to run '{}': {}", program, e)))?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// List every process with its command line.
pub(crate) async fn list_processes() -> Result<Vec<ProcessEntry>> {
    if cfg!(windows) {
        let out = run_query(
            "wmic",
            &["process", "get", "CommandLine,ProcessId", "/format:csv"],
        )
        .await?;
        Ok(parse_csv_listing(&out))
    } else {
        let out = run_query("ps", &["-eo", "pid=,args="]).await?;
        Ok(parse_ps_listing(&out))
    }
}

/// A helper spawned by this process
#[derive(Debug)]
pub struct DetachedChild {
    pid: u32,
    child: Child,
}

impl SpawnedProcess for DetachedChild {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn has_exited(&mut self) -> Result<bool> {
        self.child.try_wait().map(|s| s.is_some()).map_err(|e| {
            CoreError::ProcessQuery(format!("Failed to try_wait for process {}: {}", self.pid, e))
        })
    }
}

/// Spawn `command` with stdio detached and without tying its lifetime to ours.
///
/// On Unix the child becomes the leader of a new session and process group,
/// so signalling the group reaches anything the helper forks (npx starts node
/// as a grandchild).
pub fn spawn_detached(command: &HelperCommand) -> Result<DetachedChild> {
    debug!("Spawning helper: {:?}", command);

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(false);

    #[cfg(unix)]
    unix::detach(&mut cmd);

    #[cfg(windows)]
    {
        const DETACHED_PROCESS: u32 = 0x0000_0008;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
    }

    let child = cmd.spawn().map_err(|e| {
        error!("Failed to spawn helper '{}': {}", command.program, e);
        CoreError::ProcessSpawn(format!("Failed to spawn '{}': {}", command.program, e))
    })?;

    let pid = child
        .id()
        .ok_or_else(|| CoreError::ProcessSpawn("Spawned helper did not have a PID".to_string()))?;
    debug!("Spawned helper with pid {}", pid);

    Ok(DetachedChild { pid, child })
}
