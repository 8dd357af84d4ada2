//! Bridge error types.

use mibridge_config::ConfigError;
use mibridge_dap::DapError;
use thiserror::Error;

/// Failures of a backend call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The debugger answered the command with an error record.
    #[error("debugger rejected '{command}': {message}")]
    Rejected {
        /// The operation that was rejected.
        command: String,
        /// The debugger's error text.
        message: String,
    },

    /// The debugger process is gone.
    #[error("debugger connection closed")]
    Closed,

    /// The debugger did not answer in time.
    #[error("debugger did not answer '{command}' in time")]
    Timeout {
        /// The operation that timed out.
        command: String,
    },
}

impl BackendError {
    /// Shorthand for a [`BackendError::Rejected`].
    pub fn rejected(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            command: command.into(),
            message: message.into(),
        }
    }
}

/// Errors surfaced by bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A backend call failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A protocol-level failure.
    #[error(transparent)]
    Dap(#[from] DapError),

    /// The session has ended; only disconnect is accepted.
    #[error("the debug session has ended")]
    SessionEnded,

    /// The request arguments are unusable.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The launch or attach configuration cannot be carried out.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Bridge settings failed to load.
    #[error(transparent)]
    Settings(#[from] ConfigError),
}
