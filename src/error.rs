//! Error types for the job control service.

use std::time::Duration;

use uuid::Uuid;

use crate::jobs::state::{Action, JobStatus};

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Job-related errors.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The submission was rejected before any job was created.
    #[error("{0}")]
    Validation(String),

    #[error("Job {id} not found")]
    NotFound { id: Uuid },

    #[error("Job {id} is {status}, cannot {action}")]
    InvalidTransition {
        id: Uuid,
        status: JobStatus,
        action: Action,
    },

    #[error("Maximum number of jobs ({max}) exceeded")]
    MaxJobsExceeded { max: usize },

    #[error("Job {id} did not acknowledge {action} within {waited:?}")]
    Unresponsive {
        id: Uuid,
        action: Action,
        waited: Duration,
    },

    #[error("Failed to fetch the details")]
    Details(#[source] serde_json::Error),
}

impl JobError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
