//! Error handling for background jobs
//!
//! Jobs never propagate errors out of their loop: each tick's failure is
//! logged with a severity and the loop continues on the next tick.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobError {
    /// Database query failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored JSON could not be read back
    #[error("stored data is malformed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A row the job relied on disappeared between reads
    #[error("not found: {0}")]
    NotFound(String),

    /// Internal job error (catch-all for unexpected errors)
    #[error("internal job error: {0}")]
    Internal(String),
}

impl JobError {
    /// Whether the next tick is likely to succeed without intervention
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::NotFound(_))
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Serialization(_) | Self::Internal(_) => ErrorSeverity::Error,
            Self::Database(_) => ErrorSeverity::Warning,
            Self::NotFound(_) => ErrorSeverity::Info,
        }
    }

    /// Log the error with appropriate severity
    pub fn log(&self, job: &'static str) {
        match self.severity() {
            ErrorSeverity::Error => {
                tracing::error!(error = %self, job, retryable = self.is_retryable(), "Job error");
            }
            ErrorSeverity::Warning => {
                tracing::warn!(error = %self, job, retryable = self.is_retryable(), "Job warning");
            }
            ErrorSeverity::Info => {
                tracing::info!(error = %self, job, retryable = self.is_retryable(), "Job info");
            }
        }
    }
}

/// Error severity levels for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Error,
    Warning,
    Info,
}

pub type JobResult<T> = Result<T, JobError>;
