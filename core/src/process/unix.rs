//! Unix process control using signals and process groups
//!
//! ## Safety
//!
//! - Spawned helpers are placed in their own session via `setsid()` so the
//!   whole tree (npx and the node process it starts) can be signalled at once
//! - Liveness is probed with signal 0, which performs the permission and
//!   existence checks without delivering anything
//! - SIGTERM is used for graceful termination, SIGKILL for forceful termination
//! - `ESRCH` is treated as "already gone" everywhere
//!
//! ## Process Groups
//!
//! A helper we spawned is a session leader, so its pid is also its process
//! group id. A pid found by searching the process table may not be a group
//! leader; those are signalled individually.

// Allow unsafe code for this module since detaching requires libc::setsid() calls
#![allow(unsafe_code)]

use super::{
    list_processes, matching_pids, spawn_detached, HelperCommand, MatchPattern, ProcessControl,
    SpawnedProcess,
};
use crate::{CoreError, Result};
use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::{getpgid, Pid};
#[allow(unused_imports)]
use std::os::unix::process::CommandExt;
use tokio::process::Command;
use tracing::{debug, error};

/// Make `command` start a new session in the child before `exec`.
pub(crate) fn detach(command: &mut Command) {
    // Safety: setsid() is async-signal-safe and appropriate for use in pre_exec
    #[deny(unsafe_op_in_unsafe_fn)]
    unsafe {
        command.pre_exec(|| {
            let result = libc::setsid();
            if result == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

fn to_pid(pid: u32) -> Result<Pid> {
    i32::try_from(pid)
        .ok()
        .filter(|raw| *raw > 0)
        .map(Pid::from_raw)
        .ok_or_else(|| CoreError::ValidationError(format!("Invalid pid {}", pid)))
}

/// Probe `pid` with signal 0.
///
/// `EPERM` means the process exists but belongs to someone else, which still
/// counts as live. On Linux a zombie is reported as not live.
pub fn probe_signal(pid: u32) -> bool {
    let Ok(target) = to_pid(pid) else {
        return false;
    };
    let exists = match kill(target, None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(Errno::ESRCH) => false,
        Err(e) => {
            debug!("Signal probe of {} failed: {}", pid, e);
            false
        }
    };
    exists && !is_zombie(pid)
}

/// Whether `pid` is a zombie according to `/proc/<pid>/stat`
#[cfg(target_os = "linux")]
pub fn is_zombie(pid: u32) -> bool {
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| {
            // comm may contain spaces and parens; the state follows the last ')'
            let after_comm = stat.rsplit_once(')')?.1;
            after_comm.split_whitespace().next().map(|s| s == "Z")
        })
        .unwrap_or(false)
}

/// Whether `pid` is a zombie; not detectable without procfs
#[cfg(not(target_os = "linux"))]
pub fn is_zombie(_pid: u32) -> bool {
    false
}

/// Send `signal` to the group led by `pid`, or to `pid` alone if it does not
/// lead a group.
///
/// ## Error Handling
///
/// - `ESRCH` (No such process) is treated as success since the target has
///   already exited
/// - Other errors are propagated as `ProcessSignal` errors
pub fn signal_pid(pid: u32, signal: Signal) -> Result<()> {
    let target = to_pid(pid)?;
    let leads_group = matches!(getpgid(Some(target)), Ok(pgid) if pgid == target);

    debug!(
        "Sending {} to {} {}",
        signal,
        if leads_group { "process group" } else { "process" },
        pid
    );

    let result = if leads_group {
        killpg(target, signal)
    } else {
        kill(target, signal)
    };

    match result {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => {
            debug!("Process {} already exited", pid);
            Ok(())
        }
        Err(e) => {
            error!("Failed to send {} to {}: {}", signal, pid, e);
            Err(CoreError::ProcessSignal(format!(
                "Failed to send {} to {}: {}",
                signal, pid, e
            )))
        }
    }
}

/// Signal-based process control for Unix hosts
#[derive(Copy, Clone, Debug, Default)]
pub struct SignalControl;

impl SignalControl {
    /// Create a new signal-based control
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessControl for SignalControl {
    async fn spawn(&self, command: &HelperCommand) -> Result<Box<dyn SpawnedProcess>> {
        Ok(Box::new(spawn_detached(command)?))
    }

    async fn is_alive(&self, pid: u32) -> bool {
        probe_signal(pid)
    }

    async fn terminate(&self, pid: u32, forceful: bool) -> Result<()> {
        let signal = if forceful {
            Signal::SIGKILL
        } else {
            Signal::SIGTERM
        };
        signal_pid(pid, signal)
    }

    async fn find_matching(&self, pattern: &MatchPattern) -> Result<Vec<u32>> {
        Ok(matching_pids(&list_processes().await?, pattern))
    }

    fn name(&self) -> &'static str {
        "signal"
    }
}
