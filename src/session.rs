//! The per-session state aggregate.

use crate::breakpoints::BreakpointStore;
use crate::handles::HandleAllocator;
use crate::run_state::RunStateTracker;
use crate::variables::WatchTable;

/// Everything the bridge remembers about one debug session.
///
/// Components receive this by reference; there is no other shared
/// mutable state apart from the progress cancel set.
#[derive(Debug, Default)]
pub struct SessionContext {
    /// Running/stopped/ended and the evaluation context.
    pub run_state: RunStateTracker,
    /// Live variable references.
    pub handles: HandleAllocator,
    /// Breakpoints registered per source file.
    pub breakpoints: BreakpointStore,
    /// Backend watches owned by the bridge.
    pub watches: WatchTable,
    terminated_sent: bool,
}

impl SessionContext {
    /// A fresh session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the right to send the `terminated` event.
    ///
    /// Returns `true` exactly once per session.
    pub fn claim_termination(&mut self) -> bool {
        if self.terminated_sent {
            false
        } else {
            self.terminated_sent = true;
            true
        }
    }

    /// Whether `terminated` has been sent.
    pub fn termination_sent(&self) -> bool {
        self.terminated_sent
    }
}
