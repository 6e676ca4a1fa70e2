//! Error types for Agent Ops.

use std::time::Duration;

use uuid::Uuid;

use crate::jobs::model::JobType;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Generation error: {0}")]
    Generator(#[from] GeneratorError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// LLM provider errors.
///
/// Messages are sanitized: they are persisted as job `error_text` and
/// returned to API callers, so they never echo credentials.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("{provider} is not configured: {reason}")]
    NotConfigured { provider: String, reason: String },

    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Provider {provider} rate limited. Please try again later.")]
    RateLimited { provider: String },

    #[error("Authentication failed for provider {provider}. Check the API key.")]
    AuthFailed { provider: String },

    #[error("Empty response from {provider}")]
    EmptyResponse { provider: String },
}

/// Job lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job {id} not found")]
    NotFound { id: Uuid },

    #[error("Output for job {job_id} not found")]
    OutputNotFound { job_id: Uuid },

    #[error("Job {id} already in state {state}, cannot transition to {target}")]
    InvalidTransition {
        id: Uuid,
        state: String,
        target: String,
    },

    #[error("Unknown job type: {0}")]
    UnknownType(String),

    #[error("Job {id} execution panicked: {reason}")]
    Panicked { id: Uuid, reason: String },
}

/// Content generation errors.
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("Failed to generate {kind}: {source}")]
    Failed {
        kind: &'static str,
        #[source]
        source: LlmError,
    },

    #[error("Generator for {0} returned empty content")]
    EmptyOutput(JobType),
}

/// Sandbox file loading errors.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("Invalid file key: path traversal not allowed")]
    InvalidKey,

    #[error("Path escapes sandbox: {0}")]
    Escape(String),

    #[error("Path is not a file: {0}")]
    NotAFile(String),

    #[error("File too large: {size} bytes (max: {max})")]
    TooLarge { size: u64, max: u64 },

    #[error("File is not valid UTF-8 text")]
    NotUtf8,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Business metrics API errors.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("SLUSH_SNAPSHOT_BASE_URL and SLUSH_SNAPSHOT_TOKEN must be set")]
    NotConfigured,

    #[error("Invalid Slush API token")]
    Unauthorized,

    #[error("Slush snapshot endpoint not found")]
    EndpointNotFound,

    #[error("Slush API error: {status} - {body}")]
    Status { status: u16, body: String },

    #[error("Timeout connecting to Slush API")]
    Timeout,

    #[error("Network error connecting to Slush API: {0}")]
    Network(String),

    #[error("Malformed Slush API response: {0}")]
    Decode(String),
}

impl Error {
    /// Message of the underlying error without the category prefix.
    pub fn detail(&self) -> String {
        match self {
            Error::Database(e) => e.to_string(),
            Error::Llm(e) => e.to_string(),
            Error::Job(e) => e.to_string(),
            Error::Generator(e) => e.to_string(),
        }
    }
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
