//! In-memory process control for tests
//!
//! Simulates a process table: spawned helpers and externally inserted
//! processes live in a shared map, liveness follows per-process instructions,
//! and every termination request is recorded for later assertions.

use super::{HelperCommand, MatchPattern, ProcessControl, SpawnedProcess};
use crate::{CoreError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

/// Behaviour of the next spawned mock helper
#[derive(Debug, Clone, Copy)]
pub struct MockInstruction {
    /// Exit on its own after this long (None means run until terminated)
    pub lifetime: Option<Duration>,
    /// Whether SIGTERM-equivalent requests end the process
    pub responds_to_term: bool,
    /// Fail the spawn itself, as if the program did not exist
    pub fail_spawn: bool,
}

impl Default for MockInstruction {
    fn default() -> Self {
        Self {
            lifetime: None,
            responds_to_term: true,
            fail_spawn: false,
        }
    }
}

impl MockInstruction {
    /// A helper that exits almost immediately
    pub fn crashes() -> Self {
        Self {
            lifetime: Some(Duration::from_millis(1)),
            ..Self::default()
        }
    }

    /// A helper that ignores graceful termination
    pub fn stubborn() -> Self {
        Self {
            responds_to_term: false,
            ..Self::default()
        }
    }

    /// A spawn that fails outright
    pub fn unspawnable() -> Self {
        Self {
            fail_spawn: true,
            ..Self::default()
        }
    }
}

#[derive(Debug)]
struct MockProcess {
    command_line: String,
    started_at: Instant,
    instruction: MockInstruction,
    terminated: bool,
}

impl MockProcess {
    fn is_alive(&self) -> bool {
        if self.terminated {
            return false;
        }
        match self.instruction.lifetime {
            Some(lifetime) => self.started_at.elapsed() < lifetime,
            None => true,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    next_pid: u32,
    processes: HashMap<u32, MockProcess>,
    instructions: Vec<MockInstruction>,
    spawned: Vec<HelperCommand>,
    terminations: Vec<(u32, bool)>,
}

/// Mock process control for testing
#[derive(Debug, Clone, Default)]
pub struct MockProcessControl {
    state: Arc<Mutex<MockState>>,
}

impl MockProcessControl {
    /// Create a mock with an empty process table
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // a panicking test must not poison assertions in other threads
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add instructions for the next spawned process
    pub fn add_instruction(&self, instruction: MockInstruction) {
        self.lock().instructions.push(instruction);
    }

    /// Put a process the supervisor did not spawn into the table
    pub fn insert_process(&self, pid: u32, command_line: impl Into<String>) {
        self.lock().processes.insert(
            pid,
            MockProcess {
                command_line: command_line.into(),
                started_at: Instant::now(),
                instruction: MockInstruction::default(),
                terminated: false,
            },
        );
    }

    /// Insert a process that ignores graceful termination
    pub fn insert_stubborn_process(&self, pid: u32, command_line: impl Into<String>) {
        self.lock().processes.insert(
            pid,
            MockProcess {
                command_line: command_line.into(),
                started_at: Instant::now(),
                instruction: MockInstruction::stubborn(),
                terminated: false,
            },
        );
    }

    /// Commands passed to `spawn`, in order
    pub fn spawned(&self) -> Vec<HelperCommand> {
        self.lock().spawned.clone()
    }

    /// `(pid, forceful)` for every termination request, in order
    pub fn terminations(&self) -> Vec<(u32, bool)> {
        self.lock().terminations.clone()
    }

    /// Whether the simulated process is alive right now
    pub fn alive(&self, pid: u32) -> bool {
        self.lock()
            .processes
            .get(&pid)
            .map(MockProcess::is_alive)
            .unwrap_or(false)
    }
}

struct MockSpawned {
    pid: u32,
    state: Arc<Mutex<MockState>>,
}

impl SpawnedProcess for MockSpawned {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn has_exited(&mut self) -> Result<bool> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(!state
            .processes
            .get(&self.pid)
            .map(MockProcess::is_alive)
            .unwrap_or(false))
    }
}

#[async_trait]
impl ProcessControl for MockProcessControl {
    async fn spawn(&self, command: &HelperCommand) -> Result<Box<dyn SpawnedProcess>> {
        let mut state = self.lock();
        let instruction = if state.instructions.is_empty() {
            MockInstruction::default()
        } else {
            state.instructions.remove(0)
        };
        state.spawned.push(command.clone());

        if instruction.fail_spawn {
            return Err(CoreError::ProcessSpawn(format!(
                "Failed to spawn '{}': mock spawn failure",
                command.program
            )));
        }

        state.next_pid = state.next_pid.max(10_000) + 1;
        let pid = state.next_pid;
        debug!("Spawning mock process {} for {:?}", pid, command);
        state.processes.insert(
            pid,
            MockProcess {
                command_line: command.display_line(),
                started_at: Instant::now(),
                instruction,
                terminated: false,
            },
        );

        Ok(Box::new(MockSpawned {
            pid,
            state: Arc::clone(&self.state),
        }))
    }

    async fn is_alive(&self, pid: u32) -> bool {
        self.alive(pid)
    }

    async fn terminate(&self, pid: u32, forceful: bool) -> Result<()> {
        let mut state = self.lock();
        state.terminations.push((pid, forceful));
        if let Some(process) = state.processes.get_mut(&pid) {
            if forceful || process.instruction.responds_to_term {
                debug!("Mock process {} terminated (forceful: {})", pid, forceful);
                process.terminated = true;
            }
        }
        Ok(())
    }

    async fn find_matching(&self, pattern: &MatchPattern) -> Result<Vec<u32>> {
        let state = self.lock();
        let mut pids: Vec<u32> = state
            .processes
            .iter()
            .filter(|(_, p)| p.is_alive() && pattern.matches(&p.command_line))
            .map(|(pid, _)| *pid)
            .collect();
        pids.sort_unstable();
        Ok(pids)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
