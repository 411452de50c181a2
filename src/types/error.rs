//! Error types for the attendance feed

use thiserror::Error;

/// Result type for fallible feed operations
pub type FeedResult<T> = Result<T, FeedError>;

/// Errors surfaced by [`crate::FeedService`] and configuration loading
#[derive(Error, Debug)]
pub enum FeedError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("no tokio runtime available to drive {0}")]
    NoRuntime(&'static str),

    #[error("invalid configuration value for {key}: {message}")]
    Config { key: String, message: String },
}

/// Failures opening a transport connection
///
/// Failures after the connection is open are reported as
/// [`crate::transport::TransportNotice::Disconnected`] and retried by the
/// transport itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// Reasons an inbound payload could not become an event
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngressError {
    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("missing or empty field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' has unrecognized value '{value}'")]
    UnrecognizedValue { field: &'static str, value: String },

    #[error("field '{0}' has the wrong type")]
    WrongType(&'static str),
}

/// A single observer failing to take a snapshot
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObserverError {
    #[error("observer channel is full, snapshot dropped")]
    Lagged,

    #[error("observer channel is closed")]
    Closed,

    #[error("observer panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Failed(String),
}
