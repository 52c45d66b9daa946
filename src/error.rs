//! Error types for the integrator and its I/O collaborators.
//!
//! Library functions return `NbodyResult<T>`; the binary wraps these in
//! `anyhow` with extra context.

use crate::evolve::Phase;
use thiserror::Error;

/// Unified error type.
#[derive(Debug, Error)]
pub enum NbodyError {
    /// A snapshot token could not be parsed.
    #[error("Malformed snapshot at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// The input ended before every announced body was read.
    #[error("Truncated snapshot: expected {expected} bodies, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error("Input contains no snapshot")]
    EmptyInput,

    /// The integrator was driven out of order.
    #[error("Cannot step an integrator in phase {0:?}")]
    InvalidPhase(Phase),

    /// Run configuration is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias for `Result<T, NbodyError>`.
pub type NbodyResult<T> = Result<T, NbodyError>;
