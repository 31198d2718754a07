//! Error types for Sluice.

use thiserror::Error;

/// Main error type for Sluice operations.
#[derive(Error, Debug)]
pub enum SluiceError {
    /// A single request asked for more than the bucket can ever hold.
    ///
    /// This is a caller configuration error and is never retried.
    #[error("Capacity overflow: requested {requested} exceeds the maximum rate of {max_rate}")]
    CapacityOverflow { requested: f64, max_rate: f64 },

    /// The requested amount is not a positive, finite number.
    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),

    /// The limiter was constructed with a non-positive rate or period.
    #[error("Invalid limit: max_rate={max_rate}, time_period={time_period}s")]
    InvalidLimit { max_rate: f64, time_period: f64 },

    /// A suspended caller was cancelled before it was admitted.
    #[error("Acquisition cancelled")]
    Cancelled,

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote side answered with a status the fetcher does not accept.
    #[error("Unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    /// A background task panicked or was aborted.
    #[error("Task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for SluiceError {
    fn from(err: config::ConfigError) -> Self {
        SluiceError::Config(err.to_string())
    }
}

/// Result type alias for Sluice operations.
pub type Result<T> = std::result::Result<T, SluiceError>;
