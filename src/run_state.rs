//! Target execution state.

use mibridge_dap::StopReason;

use crate::backend::MiStopReason;
use crate::error::BridgeError;
use crate::handles::HandleAllocator;

/// Frame ids handed to the frontend pack a thread and a frame level.
pub const FRAME_ID_STRIDE: i64 = 10_000;

/// Frontend frame id for `level` of `thread_id`.
pub fn encode_frame_id(thread_id: i64, level: i64) -> i64 {
    thread_id * FRAME_ID_STRIDE + level
}

/// `(thread_id, level)` packed into a frame id.
pub fn decode_frame_id(frame_id: i64) -> (i64, i64) {
    (frame_id / FRAME_ID_STRIDE, frame_id % FRAME_ID_STRIDE)
}

/// Coarse execution state of the debuggee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    /// The target is executing.
    Running,
    /// The target is halted, or has not been started yet.
    Stopped,
    /// The debuggee is gone. Terminal.
    Ended,
}

/// What a stop notification turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// The target halted; the frontend gets a `stopped` event.
    Stopped {
        /// Frontend stop reason.
        reason: StopReason,
        /// Thread that stopped.
        thread_id: Option<i64>,
        /// Extra detail for the frontend, e.g. the signal name.
        description: Option<String>,
    },
    /// The debuggee exited; the frontend gets `exited`/`terminated`.
    Ended {
        /// Exit code, when known.
        exit_code: Option<i64>,
    },
}

/// Single source of truth for running/stopped and the current
/// thread and frame.
#[derive(Debug)]
pub struct RunStateTracker {
    state: ExecState,
    current_thread_id: Option<i64>,
    current_frame_level: i64,
}

impl RunStateTracker {
    /// A tracker for a session whose inferior has not started.
    pub fn new() -> Self {
        Self {
            state: ExecState::Stopped,
            current_thread_id: None,
            current_frame_level: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> ExecState {
        self.state
    }

    /// Whether the target is executing.
    pub fn is_running(&self) -> bool {
        self.state == ExecState::Running
    }

    /// Whether the session has ended.
    pub fn is_ended(&self) -> bool {
        self.state == ExecState::Ended
    }

    /// Thread that evaluations default to.
    pub fn current_thread_id(&self) -> Option<i64> {
        self.current_thread_id
    }

    /// Frame level that evaluations default to.
    pub fn current_frame_level(&self) -> i64 {
        self.current_frame_level
    }

    /// Record that the target resumed. Ignored once ended.
    pub fn set_running(&mut self) {
        if self.state != ExecState::Ended {
            self.state = ExecState::Running;
        }
    }

    /// Record a stop and classify it.
    ///
    /// Every stop invalidates the references in `handles`. Returns `None`
    /// when the session has already ended, so an ended session never
    /// produces a second notification.
    pub fn set_stopped(
        &mut self,
        reason: &MiStopReason,
        thread_id: Option<i64>,
        handles: &mut HandleAllocator,
    ) -> Option<StopOutcome> {
        handles.reset_all();
        if self.state == ExecState::Ended {
            return None;
        }

        if reason.is_exit() {
            self.state = ExecState::Ended;
            return Some(StopOutcome::Ended {
                exit_code: reason.exit_code(),
            });
        }

        self.state = ExecState::Stopped;
        if thread_id.is_some() {
            self.current_thread_id = thread_id;
        }
        self.current_frame_level = 0;

        let (reason, description) = classify(reason);
        Some(StopOutcome::Stopped {
            reason,
            thread_id: thread_id.or(self.current_thread_id),
            description,
        })
    }

    /// Make `(thread_id, level)` the evaluation context.
    pub fn select_frame(&mut self, thread_id: i64, level: i64) {
        self.current_thread_id = Some(thread_id);
        self.current_frame_level = level;
    }

    /// Mark the session ended. Returns whether this call ended it.
    pub fn set_ended(&mut self) -> bool {
        let was_ended = self.state == ExecState::Ended;
        self.state = ExecState::Ended;
        !was_ended
    }

    /// Reject work once the session has ended.
    pub fn ensure_active(&self) -> Result<(), BridgeError> {
        if self.is_ended() {
            Err(BridgeError::SessionEnded)
        } else {
            Ok(())
        }
    }
}

impl Default for RunStateTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn classify(reason: &MiStopReason) -> (StopReason, Option<String>) {
    match reason {
        MiStopReason::BreakpointHit => (StopReason::Breakpoint, None),
        MiStopReason::WatchpointTrigger
        | MiStopReason::ReadWatchpointTrigger
        | MiStopReason::AccessWatchpointTrigger => (StopReason::DataBreakpoint, None),
        MiStopReason::EndSteppingRange
        | MiStopReason::FunctionFinished
        | MiStopReason::LocationReached => (StopReason::Step, None),
        MiStopReason::SignalReceived { signal } => match signal.as_deref() {
            Some("SIGINT") | Some("SIGTRAP") | None => (StopReason::Pause, signal.clone()),
            Some(other) => (StopReason::Exception, Some(other.to_string())),
        },
        MiStopReason::Other(raw) => (StopReason::Pause, Some(raw.clone())),
        // Exit reasons never reach here.
        MiStopReason::ExitedSignalled
        | MiStopReason::Exited { .. }
        | MiStopReason::ExitedNormally => (StopReason::Pause, None),
    }
}
