//! Error types for the speech relay

use thiserror::Error;

use crate::relay::Operation;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the speech relay
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Encoder input violates container invariants
    #[error("invalid audio format: {0}")]
    InvalidAudioFormat(String),

    /// Audio decoding error
    #[error("audio error: {0}")]
    Audio(String),

    /// Unrecognized operation; never reaches the network
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Upstream answered with a non-success status
    #[error("{operation} upstream error {status}: {message}")]
    Upstream {
        operation: Operation,
        status: u16,
        message: String,
    },

    /// Transport failure or timeout, no status available
    #[error("no response from {operation} upstream: {reason}")]
    NoResponse { operation: Operation, reason: String },

    /// Failure before the request could be sent
    #[error("failed to set up {operation} request: {reason}")]
    RequestSetup { operation: Operation, reason: String },

    /// Synthesis reply had no resolvable audio payload
    #[error("unexpected {0} upstream response format")]
    UnexpectedUpstreamFormat(Operation),

    /// Circuit breaker is rejecting calls for this operation
    #[error("{0} circuit open")]
    CircuitOpen(Operation),

    /// Script sandbox error
    #[error("sandbox error: {0}")]
    Sandbox(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
