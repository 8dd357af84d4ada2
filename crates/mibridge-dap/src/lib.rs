//! mibridge-dap — Debug Adapter Protocol surface of the bridge.
//!
//! This crate holds the adapter-side DAP message types, the capability set
//! the bridge advertises, and Content-Length message framing. It knows
//! nothing about the debugger backend.

pub mod capabilities;
pub mod error;
pub mod protocol;
pub mod transport;

// Re-export key types for convenience.
pub use capabilities::bridge_capabilities;
pub use error::DapError;
pub use protocol::*;
