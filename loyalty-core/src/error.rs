//! Error types for the loyalty core

use thiserror::Error;

/// Result type for loyalty operations
pub type Result<T> = std::result::Result<T, Error>;

/// Loyalty core errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed or missing input; nothing was mutated
    #[error("Validation error: {0}")]
    Validation(String),

    /// Deposit amount or random component outside the accepted range
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Referenced user does not exist
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// Unique constraint violation (duplicate email, bonus already awarded)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Proof target does not hash to any leaf of the submitted set
    #[error("Proof target not found: {0}")]
    ProofTargetNotFound(String),

    /// Voting power lookup failed; registration is aborted
    #[error("Voting power unavailable: {0}")]
    VotingPowerUnavailable(String),

    /// Non-critical external dependency failure (cache, mail)
    #[error("External dependency error: {0}")]
    External(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),
}

impl Error {
    /// Stable machine-readable kind, used in API error bodies and metrics labels
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::InvalidAmount(_) => "invalid_amount",
            Error::UserNotFound(_) => "not_found",
            Error::Conflict(_) => "conflict",
            Error::ProofTargetNotFound(_) => "proof_target_not_found",
            Error::VotingPowerUnavailable(_) => "voting_power_unavailable",
            Error::External(_) => "external_dependency_error",
            Error::Concurrency(_) => "concurrency_error",
            Error::Config(_) => "config_error",
            Error::Io(_) => "io_error",
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(format!("Failed to parse config: {}", err))
    }
}
