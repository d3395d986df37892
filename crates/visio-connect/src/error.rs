//! Error types for visio-connect

use std::path::PathBuf;

use thiserror::Error;

use crate::bridge::BridgeError;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to callers of the resolver, session and watcher.
///
/// Per-entry bind failures during enumeration and per-shape write skips are
/// not errors; they are reported through [`crate::resolver::SkippedEntry`] and
/// [`crate::watcher::ShapeOutcome`].
#[derive(Debug, Error)]
pub enum Error {
    /// Document index outside the current enumeration
    #[error("Invalid document index {index} ({count} documents open)")]
    InvalidIndex { index: usize, count: usize },

    /// Requested file does not exist on disk
    #[error("File does not exist: {}", .0.display())]
    FileNotFound(PathBuf),

    /// `Documents.Open` rejected the path and no open document matched by name
    #[error("Error opening file '{path}': {reason}")]
    OpenFailure { path: String, reason: String },

    /// Transport-level failure talking to the COM bridge
    #[error("Visio COM bridge error: {0}")]
    Bridge(BridgeError),

    /// An automation call was rejected by the application
    #[error("Automation call failed: {0}")]
    Automation(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The selection watcher could not be scheduled
    #[error("Selection watcher error: {0}")]
    Watcher(String),
}

impl From<BridgeError> for Error {
    /// Errors the bridge reports back are the application's refusals, not
    /// transport failures.
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Remote(message) => Error::Automation(message),
            other => Error::Bridge(other),
        }
    }
}

impl Error {
    /// Create an automation error with a message
    pub fn automation<S: Into<String>>(msg: S) -> Self {
        Error::Automation(msg.into())
    }
}
