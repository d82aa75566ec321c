//! Helper supervisor: start, stop and inspect the helper for one port
//!
//! Per port the helper moves through `ABSENT → STARTING → RUNNING →
//! (STOPPING) → ABSENT`. The record file is the only state kept between
//! invocations. It is advisory: two concurrent `start` calls for the same
//! port can both see no live record and launch two helpers.
//!
//! Nothing here retries. `start` observes one launch through a bounded
//! initialization window and either reports it running or cleans up and
//! fails; `stop` makes one graceful attempt and one forced attempt.

use crate::config::SupervisorConfig;
use crate::credentials::{ApiKey, API_KEY_VAR};
use crate::process::{platform_control, HelperCommand, MatchPattern, ProcessControl, SpawnedProcess};
use crate::readiness::TcpProbe;
use crate::record::{RecordState, RecordStore, SupervisedProcess};
use crate::{CoreError, Result};
use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

#[cfg(test)]
mod supervisor_tests;

/// How a started helper proved itself during the initialization window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// It accepted a TCP connection on its port
    Listening,
    /// It was still running when the window closed
    Alive,
}

/// Result of [`Supervisor::start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A live helper was already recorded for the port; nothing was spawned
    AlreadyRunning { pid: u32 },
    /// A new helper was spawned and survived initialization
    Started { pid: u32, readiness: Readiness },
}

/// Result of [`Supervisor::stop`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// The recorded helper was terminated
    Stopped { pid: u32, forced: bool },
    /// The record pointed at nothing live (or held no usable pid)
    StaleRecord { pid: Option<u32> },
    /// No record; helpers found by command line were terminated
    StoppedByPattern { pids: Vec<u32> },
    /// No record and no matching helper
    NotRunning,
}

/// Result of [`Supervisor::status`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperStatus {
    /// The recorded helper is live
    Running { pid: u32 },
    /// The record was stale and has been discarded
    StaleRecord { pid: Option<u32> },
    /// No record for the port
    NotRunning,
}

/// Supervises the documentation helper across ports
#[derive(Clone)]
pub struct Supervisor {
    config: SupervisorConfig,
    records: RecordStore,
    control: Arc<dyn ProcessControl>,
    api_key: Option<ApiKey>,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("config", &self.config)
            .field("records", &self.records)
            .field("control", &self.control.name())
            .field("api_key", &self.api_key)
            .finish()
    }
}

impl Supervisor {
    /// Create a supervisor from explicit parts
    pub fn new(
        config: SupervisorConfig,
        records: RecordStore,
        control: Arc<dyn ProcessControl>,
    ) -> Self {
        Self {
            config,
            records,
            control,
            api_key: None,
        }
    }

    /// Create a supervisor for this host.
    ///
    /// The process-control implementation is selected here, once.
    pub fn from_config(config: SupervisorConfig) -> Self {
        let records = config
            .record_dir
            .clone()
            .map(RecordStore::new)
            .unwrap_or_else(RecordStore::from_env);
        let control = platform_control(config.probe);
        debug!("Using {} process control", control.name());
        Self::new(config, records, control)
    }

    /// Hand `key` to every helper this supervisor spawns
    pub fn with_api_key(mut self, key: Option<ApiKey>) -> Self {
        self.api_key = key;
        self
    }

    /// Effective configuration
    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Record store in use
    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    /// Helper invocation for `port`
    pub fn helper_command(&self, port: u16) -> HelperCommand {
        let command = HelperCommand::new(self.config.command.clone(), self.config.args_for(port));
        match &self.api_key {
            Some(key) => command.with_env(API_KEY_VAR, key.expose()),
            None => command,
        }
    }

    /// Start the helper on `port` unless a live one is already recorded.
    ///
    /// ## Errors
    ///
    /// - `StartFailed` when the helper exits during the initialization
    ///   window; its record is removed first
    /// - `ProcessSpawn` when the helper cannot be launched; no record is
    ///   written
    pub async fn start(&self, port: u16) -> Result<StartOutcome> {
        validate_port(port)?;

        match self.records.load(port)? {
            RecordState::Present(record) if self.control.is_alive(record.pid).await => {
                info!("Helper already running on port {} (pid {})", port, record.pid);
                return Ok(StartOutcome::AlreadyRunning { pid: record.pid });
            }
            RecordState::Present(record) => {
                info!("Discarding stale record for port {} (pid {})", port, record.pid);
                self.records.remove(port)?;
            }
            RecordState::Corrupt(_) => {
                info!("Discarding unreadable record for port {}", port);
                self.records.remove(port)?;
            }
            RecordState::Missing => {}
        }

        let command = self.helper_command(port);
        info!("Starting helper on port {}: {}", port, command.display_line());
        let mut child = self.control.spawn(&command).await?;
        let pid = child.pid();

        if let Err(e) = self.records.save(SupervisedProcess { port, pid }) {
            warn!("Could not record pid {}, stopping it: {}", pid, e);
            let _ = self.control.terminate(pid, true).await;
            return Err(e);
        }

        match self.await_initialization(port, child.as_mut()).await {
            Some(readiness) => {
                info!("Helper running on port {} (pid {}, {:?})", port, pid, readiness);
                Ok(StartOutcome::Started { pid, readiness })
            }
            None => {
                warn!("Helper on port {} (pid {}) exited during startup", port, pid);
                self.records.remove(port)?;
                Err(CoreError::StartFailed { port, pid })
            }
        }
    }

    /// Poll the new helper until it listens, exits, or the window closes.
    async fn await_initialization(
        &self,
        port: u16,
        child: &mut dyn SpawnedProcess,
    ) -> Option<Readiness> {
        let poll = self.config.poll_interval();
        let deadline = Instant::now() + self.config.startup_wait();
        let probe = TcpProbe::new(self.config.readiness_host.clone(), port, poll);

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            sleep(poll.min(remaining)).await;

            if !self.spawned_is_alive(child).await {
                return None;
            }
            if probe.accepts().await {
                return Some(Readiness::Listening);
            }
            if Instant::now() >= deadline {
                return Some(Readiness::Alive);
            }
        }
    }

    async fn spawned_is_alive(&self, child: &mut dyn SpawnedProcess) -> bool {
        match child.has_exited() {
            Ok(true) => false,
            Ok(false) => self.control.is_alive(child.pid()).await,
            Err(e) => {
                debug!("{}; falling back to pid probe", e);
                self.control.is_alive(child.pid()).await
            }
        }
    }

    /// Stop the helper on `port`. Stopping nothing is not an error.
    ///
    /// The record is removed whenever one existed, even if termination
    /// failed.
    pub async fn stop(&self, port: u16) -> Result<StopOutcome> {
        validate_port(port)?;

        match self.records.load(port)? {
            RecordState::Present(record) => {
                let outcome = if self.control.is_alive(record.pid).await {
                    self.terminate_gracefully(record.pid)
                        .await
                        .map(|forced| StopOutcome::Stopped {
                            pid: record.pid,
                            forced,
                        })
                } else {
                    info!("Helper on port {} not running (stale record, pid {})", port, record.pid);
                    Ok(StopOutcome::StaleRecord {
                        pid: Some(record.pid),
                    })
                };
                self.records.remove(port)?;
                outcome
            }
            RecordState::Corrupt(_) => {
                self.records.remove(port)?;
                Ok(StopOutcome::StaleRecord { pid: None })
            }
            RecordState::Missing => self.stop_by_pattern(port).await,
        }
    }

    async fn stop_by_pattern(&self, port: u16) -> Result<StopOutcome> {
        let pattern = MatchPattern::new(self.config.marker.clone(), port);
        let pids = match self.control.find_matching(&pattern).await {
            Ok(pids) => pids,
            Err(e) => {
                warn!("Process search failed, assuming nothing is running: {}", e);
                Vec::new()
            }
        };

        if pids.is_empty() {
            debug!("No helper process found for port {}", port);
            return Ok(StopOutcome::NotRunning);
        }

        for pid in &pids {
            info!("Stopping unrecorded helper {} for port {}", pid, port);
            if let Err(e) = self.terminate_gracefully(*pid).await {
                warn!("Failed to stop {}: {}", pid, e);
            }
        }
        Ok(StopOutcome::StoppedByPattern { pids })
    }

    /// Graceful request, brief wait, then force. Returns whether force was
    /// needed.
    async fn terminate_gracefully(&self, pid: u32) -> Result<bool> {
        self.control.terminate(pid, false).await?;

        let poll = self.config.poll_interval();
        let deadline = Instant::now() + self.config.graceful_timeout();
        while Instant::now() < deadline {
            sleep(poll).await;
            if !self.control.is_alive(pid).await {
                debug!("Process {} exited gracefully", pid);
                return Ok(false);
            }
        }

        if !self.control.is_alive(pid).await {
            return Ok(false);
        }
        warn!(
            "Process {} did not exit within {:?}, forcing termination",
            pid,
            self.config.graceful_timeout()
        );
        self.control.terminate(pid, true).await?;
        Ok(true)
    }

    /// Report whether a live helper is recorded for `port`.
    ///
    /// A stale or unreadable record is discarded.
    pub async fn status(&self, port: u16) -> Result<HelperStatus> {
        validate_port(port)?;

        match self.records.load(port)? {
            RecordState::Present(record) if self.control.is_alive(record.pid).await => {
                Ok(HelperStatus::Running { pid: record.pid })
            }
            RecordState::Present(record) => {
                self.records.remove(port)?;
                Ok(HelperStatus::StaleRecord {
                    pid: Some(record.pid),
                })
            }
            RecordState::Corrupt(_) => {
                self.records.remove(port)?;
                Ok(HelperStatus::StaleRecord { pid: None })
            }
            RecordState::Missing => Ok(HelperStatus::NotRunning),
        }
    }
}

fn validate_port(port: u16) -> Result<()> {
    if port == 0 {
        return Err(CoreError::ValidationError(
            "port must be 1..=65535".to_string(),
        ));
    }
    Ok(())
}
