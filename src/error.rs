//! Error types for the survey wizard.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Wizard error: {0}")]
    Wizard(#[from] WizardError),

    #[error("Submission error: {0}")]
    Submission(#[from] SubmissionError),
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

/// Errors raised by the step catalog and the wizard session.
///
/// Per-step validation failures are not errors; they come back as
/// `Rejection`s inside the commit/select outcomes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WizardError {
    #[error("Step position {position} outside catalog bounds 1..={total}")]
    OutOfRange { position: usize, total: usize },

    #[error("Duplicate step id in catalog: {0}")]
    DuplicateStep(String),

    #[error("Step {step_id} does not take a choice")]
    NotAChoiceStep { step_id: String },

    #[error("Step {step_id} does not take text input")]
    NotATextStep { step_id: String },

    #[error("Step {step_id} cannot be proceeded without an answer")]
    NotProceedable { step_id: String },

    #[error("Wizard session has shut down")]
    SessionClosed,
}

/// Transport-level submission failures (network, timeout, malformed reply).
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("Submission timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}
