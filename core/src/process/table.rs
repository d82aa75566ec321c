//! Process-table based control for hosts without signal probing
//!
//! Liveness is a process-table query filtered by pid: success when a matching
//! row comes back. Termination goes through the platform's kill tool. The
//! same implementation runs on Unix (via `ps`/`kill`) which keeps it testable
//! everywhere.

use super::{
    list_processes, matching_pids, run_query, spawn_detached, HelperCommand, MatchPattern,
    ProcessControl, SpawnedProcess,
};
use crate::{CoreError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error};

/// Process control backed by process-table queries
#[derive(Copy, Clone, Debug, Default)]
pub struct TableControl;

impl TableControl {
    /// Create a new table-based control
    pub fn new() -> Self {
        Self
    }
}

/// Whether `ps -p <pid> -o pid=,stat=` output shows a live `pid`.
pub fn ps_row_is_live(output: &str, pid: u32) -> bool {
    output.lines().any(|line| {
        let mut cols = line.split_whitespace();
        let row_pid = cols.next().and_then(|p| p.parse::<u32>().ok());
        let state = cols.next().unwrap_or("");
        row_pid == Some(pid) && !state.starts_with('Z')
    })
}

/// Whether `tasklist /FI "PID eq <pid>" /NH /FO CSV` output has a row for `pid`.
///
/// Rows look like `"node.exe","5150","Console","1","52,104 K"`.
pub fn tasklist_row_is_live(output: &str, pid: u32) -> bool {
    let wanted = format!("\"{pid}\"");
    output
        .lines()
        .any(|line| line.split(',').nth(1).map(str::trim) == Some(wanted.as_str()))
}

/// Whether `ps -o pgid=` output names `pid` as its own group.
pub fn pgid_row_leads_group(output: &str, pid: u32) -> bool {
    output.trim().parse::<u32>().ok() == Some(pid)
}

/// Kill tool invocation. `group` targets the process group led by `pid`,
/// which `taskkill /T` covers on its own.
fn kill_invocation(pid: u32, forceful: bool, group: bool) -> (&'static str, Vec<String>) {
    let pid = pid.to_string();
    if cfg!(windows) {
        let mut args = vec!["/PID".to_string(), pid, "/T".to_string()];
        if forceful {
            args.push("/F".to_string());
        }
        ("taskkill", args)
    } else {
        let signal = if forceful { "-KILL" } else { "-TERM" };
        let target = if group { format!("-{pid}") } else { pid };
        ("kill", vec![signal.to_string(), "--".to_string(), target])
    }
}

async fn leads_group(pid: u32) -> bool {
    if cfg!(windows) {
        return false;
    }
    let pid_arg = pid.to_string();
    match run_query("ps", &["-o", "pgid=", "-p", &pid_arg]).await {
        Ok(out) => pgid_row_leads_group(&out, pid),
        Err(e) => {
            debug!("Process group lookup for {} failed: {}", pid, e);
            false
        }
    }
}

#[async_trait]
impl ProcessControl for TableControl {
    async fn spawn(&self, command: &HelperCommand) -> Result<Box<dyn SpawnedProcess>> {
        Ok(Box::new(spawn_detached(command)?))
    }

    async fn is_alive(&self, pid: u32) -> bool {
        if pid == 0 {
            return false;
        }
        let filter = format!("PID eq {pid}");
        let pid_arg = pid.to_string();
        let query = if cfg!(windows) {
            run_query("tasklist", &["/FI", &filter, "/NH", "/FO", "CSV"]).await
        } else {
            run_query("ps", &["-p", &pid_arg, "-o", "pid=,stat="]).await
        };
        match query {
            Ok(out) if cfg!(windows) => tasklist_row_is_live(&out, pid),
            Ok(out) => ps_row_is_live(&out, pid),
            Err(e) => {
                debug!("Process table probe of {} failed: {}", pid, e);
                false
            }
        }
    }

    async fn terminate(&self, pid: u32, forceful: bool) -> Result<()> {
        let group = leads_group(pid).await;
        let (program, args) = kill_invocation(pid, forceful, group);
        debug!("Terminating {} via {} {:?}", pid, program, args);

        let status = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| {
                error!("Failed to run {}: {}", program, e);
                CoreError::ProcessSignal(format!("Failed to run '{}': {}", program, e))
            })?;

        // the tool also fails when the process is already gone
        if !status.success() && self.is_alive(pid).await {
            return Err(CoreError::ProcessSignal(format!(
                "{} {:?} exited with {}",
                program, args, status
            )));
        }
        Ok(())
    }

    async fn find_matching(&self, pattern: &MatchPattern) -> Result<Vec<u32>> {
        Ok(matching_pids(&list_processes().await?, pattern))
    }

    fn name(&self) -> &'static str {
        "table"
    }
}
