//! Error types for seqfetch
//!
//! This module provides the error handling for the library, including:
//! - Producer-side failures ([`FetchError`]) kept separate from chain failures
//! - Classification of cancellation fallout versus root-cause failures
//! - Machine-readable error codes used as structured logging fields

use thiserror::Error;

/// Result type alias for seqfetch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for seqfetch
///
/// Errors raised inside a single chain position (`Fetch`, `SinkWrite`, `Cancelled`,
/// `ChainBroken`) carry no position of their own; the orchestrator wraps them in
/// [`Error::Task`] together with the task index and identifier.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "handoff_wait_ms")
        key: Option<String>,
    },

    /// The producer failed to fetch its data
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Writing, flushing or finalizing the sink failed; sink integrity is unknown
    #[error("sink write error: {0}")]
    SinkWrite(#[source] std::io::Error),

    /// The shared cancellation token fired while waiting for or writing to the sink
    #[error("cancelled")]
    Cancelled,

    /// The predecessor position went away without ever forwarding the sink
    #[error("chain broken: predecessor dropped without forwarding the sink")]
    ChainBroken,

    /// Reading task identifiers from the input failed
    #[error("input error: {0}")]
    Input(#[source] std::io::Error),

    /// A chain position failed
    #[error("task {index} ({url}) failed: {source}")]
    Task {
        /// Launch position of the failing task
        index: usize,
        /// Identifier (URL) of the failing task
        url: String,
        /// Underlying failure
        #[source]
        source: Box<Error>,
    },

    /// A task's future panicked before it could report
    #[error("task panicked: {0}")]
    TaskPanicked(String),

    /// I/O error (config files, output files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Producer-side failures. Fatal to the task that raised them only.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The task identifier is not a valid URL
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The server answered with a non-2xx status
    #[error("expected 2xx status code, got {status}")]
    Status {
        /// The status the server returned
        status: reqwest::StatusCode,
    },

    /// Connection, timeout or body transfer failure
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl Error {
    /// Returns true for errors that are the expected consequence of another failure
    /// (or of an external cancellation) rather than a root cause.
    pub fn is_cancellation(&self) -> bool {
        match self {
            Error::Cancelled | Error::ChainBroken => true,
            Error::Task { source, .. } => source.is_cancellation(),
            _ => false,
        }
    }

    /// Launch position of the failing task, if this error was raised by one
    pub fn task_index(&self) -> Option<usize> {
        match self {
            Error::Task { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Fetch(e) => match e {
                FetchError::InvalidUrl(_) => "invalid_url",
                FetchError::Status { .. } => "bad_status",
                FetchError::Transport(_) => "transport_error",
            },
            Error::SinkWrite(_) => "sink_write",
            Error::Cancelled => "cancelled",
            Error::ChainBroken => "chain_broken",
            Error::Input(_) => "input_error",
            Error::Task { source, .. } => source.error_code(),
            Error::TaskPanicked(_) => "task_panicked",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
        }
    }
}
