//! Shared error types for the application
//!
//! This module defines all error types used across the application,
//! one enum per layer, following the same layering as the modules.

use thiserror::Error;

/// Domain errors - errors that occur in the domain layer
#[derive(Debug, Clone, Error)]
pub enum DomainError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Duplicate entity: {0}")]
    Duplicate(String),
}

/// Repository errors - errors that occur during data access
#[derive(Debug, Clone, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Duplicate entity: {0}")]
    Duplicate(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    RepositoryError::Duplicate(db_err.message().to_string())
                } else if db_err.is_check_violation() {
                    RepositoryError::ConstraintViolation(db_err.message().to_string())
                } else {
                    RepositoryError::Database(db_err.message().to_string())
                }
            }
            sqlx::Error::PoolTimedOut => {
                RepositoryError::Connection("Connection pool timeout".to_string())
            }
            sqlx::Error::PoolClosed => {
                RepositoryError::Connection("Connection pool closed".to_string())
            }
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

/// Job engine errors
///
/// Covers the full life cycle of a job run: submission, batch claiming,
/// worker execution, cancellation, and timeouts.
#[derive(Debug, Clone, Error)]
pub enum JobError {
    #[error("Unknown job type: {0}")]
    UnknownJobType(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Cannot cancel completed job: {0}")]
    CannotCancelTerminal(String),

    #[error("Job cancelled: {0}")]
    Cancelled(String),

    #[error("Batch already claimed: {0}")]
    BatchAlreadyClaimed(String),

    #[error("Batch not found: {0}")]
    BatchNotFound(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Job timed out after {0} seconds")]
    Timeout(u64),

    #[error("Job failed: {0}")]
    Fatal(String),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<serde_json::Error> for JobError {
    fn from(err: serde_json::Error) -> Self {
        JobError::Fatal(format!("Serialization error: {}", err))
    }
}

/// Image analysis errors (hashing, burst detection, duplicate grouping)
#[derive(Debug, Clone, Error)]
pub enum AnalysisError {
    #[error("Hash length mismatch: {0} vs {1}")]
    HashLengthMismatch(usize, usize),

    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    #[error("Image decode error: {0}")]
    ImageDecode(String),

    #[error("Empty input: {0}")]
    EmptyInput(String),
}

/// Tagging backend errors
#[derive(Debug, Error)]
pub enum TaggingError {
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl From<reqwest::Error> for TaggingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TaggingError::HttpError("Request timeout".to_string())
        } else if err.is_connect() {
            TaggingError::BackendUnavailable("Connection failed".to_string())
        } else {
            TaggingError::HttpError(err.to_string())
        }
    }
}

/// Application errors - errors that occur in the application layer
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Tagging error: {0}")]
    Tagging(#[from] TaggingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
