//! Error types for the EWS client.

use thiserror::Error;

/// One variant per failure class, each with its own documented exit code so
/// callers can tell an unbooked room from a booked one.
#[derive(Error, Debug)]
pub enum EwsError {
    #[error("invalid date-time {input:?}: {reason}")]
    InvalidDate { input: String, reason: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("authentication rejected by {server}: {message}")]
    Authentication { server: String, message: String },

    #[error("connection to {server} failed: {message}")]
    Transient { server: String, message: String },

    #[error("saving calendar item failed: {0}")]
    Persistence(String),

    #[error("malformed EWS response: {0}")]
    Response(String),
}

impl EwsError {
    /// Process exit code for this failure. 2 matches clap's usage-error
    /// convention; success is 0.
    pub fn exit_code(&self) -> u8 {
        match self {
            EwsError::InvalidDate { .. } | EwsError::Configuration(_) => 2,
            EwsError::Authentication { .. } => 3,
            EwsError::Transient { .. } => 4,
            EwsError::Persistence(_) | EwsError::Response(_) => 5,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, EwsError>;
