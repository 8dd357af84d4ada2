//! DAP error types.

use thiserror::Error;

/// Errors from reading, writing or interpreting DAP messages.
#[derive(Debug, Error)]
pub enum DapError {
    /// The underlying stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport-level framing error.
    #[error("transport error: {0}")]
    Transport(String),

    /// The peer sent a message that is not valid DAP JSON.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A request carried arguments that do not match its command.
    #[error("invalid arguments for '{command}': {message}")]
    InvalidArguments {
        /// The request command.
        command: String,
        /// What went wrong while decoding the arguments.
        message: String,
    },

    /// The request command is not handled by the bridge.
    #[error("unsupported command: {0}")]
    UnsupportedCommand(String),
}
