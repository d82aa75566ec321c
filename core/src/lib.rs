//! Core functionality for the ctx7 helper supervisor
//!
//! This crate owns the lifecycle of the local documentation helper: its
//! configuration, the per-port record files, the platform process control,
//! and the MCP client used to query a running helper. The CLI is a thin
//! layer over [`Supervisor`] and [`DocsClient`].

pub mod config;
pub mod credentials;
pub mod docs_client;
pub mod error;
pub mod process;
pub mod query;
pub mod readiness;
pub mod record;
pub mod supervisor;

#[cfg(test)]
mod error_tests;

pub use config::{resolve_config, ProbeKind, SupervisorConfig, DEFAULT_PORT};
pub use credentials::{load_api_key, ApiKey, ApiKeySource};
pub use docs_client::DocsClient;
pub use error::{CoreError, Result};
pub use process::{HelperCommand, ProcessControl};
pub use query::{ContentType, DocsQuery, LibraryRef};
pub use record::{RecordState, RecordStore, SupervisedProcess};
pub use supervisor::{HelperStatus, Readiness, StartOutcome, StopOutcome, Supervisor};

/// Core utilities and helper functions
pub mod utils {
    use tracing::debug;

    /// Initialize tracing for the application.
    ///
    /// `RUST_LOG` wins over `level` when set. Output goes to stderr so that
    /// command output on stdout stays clean.
    pub fn init_tracing(level: &str) -> crate::Result<()> {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init()
            .map_err(|e| crate::CoreError::InitializationError(e.to_string()))?;

        debug!("Tracing initialized with level: {}", level);
        Ok(())
    }
}
