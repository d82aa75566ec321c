//! Error type shared by the supervisor, record store and query client
//!
//! Every variant carries a stable code so the CLI can report failures
//! consistently.

use thiserror::Error;

/// Core-specific error types
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Initialization error: {0}")]
    InitializationError(String),

    #[error("Failed to spawn helper: {0}")]
    ProcessSpawn(String),

    #[error("Failed to signal process: {0}")]
    ProcessSignal(String),

    #[error("Process query failed: {0}")]
    ProcessQuery(String),

    #[error("Helper on port {port} (pid {pid}) exited before becoming ready")]
    StartFailed { port: u16, pid: u32 },

    #[error("Record error: {0}")]
    RecordError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl CoreError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::ConfigurationError(_) => "CORE001",
            CoreError::ValidationError(_) => "CORE002",
            CoreError::InitializationError(_) => "CORE003",
            CoreError::ProcessSpawn(_) => "CORE010",
            CoreError::ProcessSignal(_) => "CORE011",
            CoreError::ProcessQuery(_) => "CORE012",
            CoreError::StartFailed { .. } => "CORE013",
            CoreError::RecordError(_) => "CORE020",
            CoreError::QueryError(_) => "CORE030",
            CoreError::RateLimited(_) => "CORE031",
            CoreError::AuthFailed(_) => "CORE032",
            CoreError::SerializationError(_) => "CORE006",
        }
    }

    /// Whether an API key could change the outcome of this error
    pub fn is_credential_related(&self) -> bool {
        matches!(self, CoreError::RateLimited(_) | CoreError::AuthFailed(_))
    }
}

/// Core-specific result type
pub type Result<T> = std::result::Result<T, CoreError>;
