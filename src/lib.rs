//! mibridge — a debug adapter bridging DAP frontends to GDB/MI backends.
//!
//! The crate is the adapter layer only. The debugger itself is reached
//! through an [`MiBackend`] implementation, and DAP framing and message
//! types live in `mibridge-dap`.
//!
//! ```ignore
//! let options = AdapterOptions { config_file: None, project_dir: std::env::current_dir().ok() };
//! run_stdio(backend, backend_events, options).await?;
//! ```

pub mod backend;
pub mod breakpoints;
pub mod bridge;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod handles;
pub mod launch;
pub mod logging;
pub mod progress;
pub mod run_state;
pub mod server;
pub mod session;
pub mod signal;
pub mod stdio;
pub mod variables;

#[cfg(test)]
mod mock;

pub use backend::{BackendEvent, MiBackend, MiStopReason};
pub use bridge::Bridge;
pub use error::{BackendError, BridgeError};
pub use events::BridgeEvent;
pub use launch::{LaunchOutcome, LaunchPlan};
pub use logging::init_logging;
pub use server::serve;
pub use session::SessionContext;
pub use stdio::{run_adapter, run_stdio, AdapterOptions};
