//! Error types

use thiserror::Error;

/// Result type for this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for building and executing a multipart request
#[derive(Debug, Error)]
pub enum Error {
    /// A required argument was empty or malformed
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A file-backed field points at a file that could not be opened
    #[error("File not found: {path}")]
    FileNotFound {
        /// Path that was passed in
        path: std::path::PathBuf,
        /// Underlying open error
        #[source]
        source: std::io::Error,
    },

    /// The target URL could not be parsed or has no host
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A connection to the target could not be opened
    #[error("Couldn't open connection: {message}")]
    Connection {
        /// Error message
        message: String,
    },

    /// The request body could not be sent
    #[error("Couldn't send data: {0}")]
    Send(#[source] std::io::Error),

    /// The server response could not be read
    #[error("Couldn't read server response: {0}")]
    Receive(#[source] std::io::Error),

    /// The server answered with a non-success status
    #[error("Server responded with status {0}")]
    Status(http::StatusCode),

    /// Request timed out
    #[error("Request timed out")]
    Timeout,

    /// Request was cancelled
    #[error("Request was cancelled")]
    Cancelled,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map a transport-level I/O error raised while reading the response.
    ///
    /// Backends tunnel their own connect and timeout failures through
    /// `std::io::Error`, so the kind decides which variant the caller sees.
    pub(crate) fn from_receive_io(error: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match error.kind() {
            ErrorKind::TimedOut => Error::Timeout,
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::AddrNotAvailable => Error::Connection {
                message: error.to_string(),
            },
            ErrorKind::Interrupted if is_cancelled(&error) => Error::Cancelled,
            _ => {
                let status = error
                    .get_ref()
                    .and_then(|e| e.downcast_ref::<StatusError>())
                    .map(|status| status.0);
                match status {
                    Some(status) => Error::Status(status),
                    None => Error::Receive(error),
                }
            }
        }
    }

    /// True for errors raised by the transport rather than by validation
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Error::Connection { .. }
                | Error::Send(_)
                | Error::Receive(_)
                | Error::Status(_)
                | Error::Timeout
        )
    }
}

/// Carries a non-success status through `std::io::Error` out of a backend.
#[derive(Debug, Error)]
#[error("Server responded with status {0}")]
pub(crate) struct StatusError(pub(crate) http::StatusCode);

/// Marker for an I/O operation stopped by a [`crate::CancelHandle`].
#[derive(Debug, Error)]
#[error("Request was cancelled")]
pub(crate) struct CancelledError;

pub(crate) fn cancelled_io() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Interrupted, CancelledError)
}

pub(crate) fn is_cancelled(error: &std::io::Error) -> bool {
    error
        .get_ref()
        .is_some_and(|e| e.downcast_ref::<CancelledError>().is_some())
}
