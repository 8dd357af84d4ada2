//! The debugger backend collaborator.
//!
//! The bridge never speaks MI text itself. It drives an [`MiBackend`], an
//! object that owns the debugger process, turns calls into MI commands and
//! parses the result records, and it receives the backend's asynchronous
//! records as [`BackendEvent`]s over a channel.

use async_trait::async_trait;

use crate::error::BackendError;

/// Result alias for backend calls.
pub type BackendResult<T> = Result<T, BackendError>;

/// How much detail the backend includes in variable and watch listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailLevel {
    /// Names only.
    None,
    /// Names, values and types.
    All,
    /// Values only for simple types.
    Simple,
}

/// Remote connection flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteMode {
    /// `target remote`: the stub owns one already-loaded process.
    Remote,
    /// `target extended-remote`: the stub can run and upload programs.
    ExtendedRemote,
}

impl RemoteMode {
    /// Parse the launch-configuration spelling of a mode.
    pub fn parse(mode: &str) -> Option<Self> {
        match mode {
            "remote" => Some(Self::Remote),
            "extended-remote" => Some(Self::ExtendedRemote),
            _ => None,
        }
    }

    /// The launch-configuration spelling of this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::ExtendedRemote => "extended-remote",
        }
    }
}

/// Options for a new breakpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BreakpointOptions {
    /// Keep the breakpoint even if the location cannot be resolved yet.
    pub is_pending: bool,
    /// Condition expression.
    pub condition: Option<String>,
}

/// A breakpoint as registered by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointInfo {
    /// Backend breakpoint number.
    pub id: i64,
    /// Set while the location is unresolved; holds the original location.
    pub pending: Option<String>,
    /// Resolved source file.
    pub fullname: Option<String>,
    /// Resolved line.
    pub line: Option<i64>,
}

/// A debuggee thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiThread {
    /// Global thread number.
    pub id: i64,
    /// Target description, e.g. `Thread 0x7ffff7d8a740 (LWP 4242)`.
    pub target_id: String,
    /// Thread name, when the target reports one.
    pub name: Option<String>,
}

/// Thread listing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ThreadInfo {
    /// The backend's selected thread.
    pub current: Option<MiThread>,
    /// Every known thread.
    pub all: Vec<MiThread>,
}

/// Inclusive frame window for a stack listing. `None` bounds are open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameRange {
    /// First frame level.
    pub low_frame: Option<i64>,
    /// Last frame level.
    pub high_frame: Option<i64>,
}

/// One stack frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MiFrame {
    /// Frame level, 0 being innermost.
    pub level: i64,
    /// Function name.
    pub function: Option<String>,
    /// Program counter.
    pub address: Option<String>,
    /// Source file as recorded in debug info.
    pub filename: Option<String>,
    /// Absolute source path.
    pub fullname: Option<String>,
    /// Source line.
    pub line: Option<i64>,
}

/// The (thread, frame) a query or watch is evaluated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameContext {
    /// Frame level.
    pub frame_level: i64,
    /// Thread; `None` means the backend's selected thread.
    pub thread_id: Option<i64>,
}

/// A variable from a flat frame listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiVariable {
    /// Variable name.
    pub name: String,
    /// Value, present at `All`/`Simple` detail.
    pub value: Option<String>,
    /// Type name, present at `All`/`Simple` detail.
    pub type_name: Option<String>,
}

/// Arguments and locals of one frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrameVariables {
    /// Function arguments.
    pub args: Vec<MiVariable>,
    /// Local variables.
    pub locals: Vec<MiVariable>,
}

/// A backend tracked expression (MI variable object), or one of its
/// children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watch {
    /// Backend object name, e.g. `var3` or `var3.field`.
    pub id: String,
    /// The expression, or the member name for children.
    pub expression: String,
    /// Current value.
    pub value: String,
    /// Type name.
    pub type_name: String,
    /// Number of children; 0 means not expandable.
    pub child_count: u32,
}

/// One entry of a watch refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchChange {
    /// Object that changed.
    pub id: String,
    /// New value, when it changed.
    pub value: Option<String>,
    /// Whether the object is still in scope.
    pub in_scope: bool,
    /// New type, when it changed.
    pub new_type: Option<String>,
    /// New child count, when it changed.
    pub new_child_count: Option<u32>,
}

/// Why the target stopped, as reported in the backend's stop record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiStopReason {
    /// A breakpoint was hit.
    BreakpointHit,
    /// A write watchpoint triggered.
    WatchpointTrigger,
    /// A read watchpoint triggered.
    ReadWatchpointTrigger,
    /// An access watchpoint triggered.
    AccessWatchpointTrigger,
    /// `finish` completed.
    FunctionFinished,
    /// `until`/`advance` reached its location.
    LocationReached,
    /// A step completed.
    EndSteppingRange,
    /// The inferior received a signal.
    SignalReceived {
        /// Signal name, e.g. `SIGINT`.
        signal: Option<String>,
    },
    /// The inferior was killed by a signal.
    ExitedSignalled,
    /// The inferior exited with a non-zero code.
    Exited {
        /// Exit code, when reported.
        exit_code: Option<i64>,
    },
    /// The inferior exited with code 0.
    ExitedNormally,
    /// Any reason the bridge does not classify.
    Other(String),
}

impl MiStopReason {
    /// Whether this reason ends the debuggee process.
    pub fn is_exit(&self) -> bool {
        matches!(
            self,
            Self::ExitedSignalled | Self::Exited { .. } | Self::ExitedNormally
        )
    }

    /// Exit code carried by an exit reason.
    pub fn exit_code(&self) -> Option<i64> {
        match self {
            Self::ExitedNormally => Some(0),
            Self::Exited { exit_code } => *exit_code,
            _ => None,
        }
    }
}

/// Asynchronous records delivered by the backend, in arrival order.
///
/// Each stop is delivered as exactly one of `TargetStopped`,
/// `BreakpointHit` or `SignalReceived`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// The debugger is up and accepting commands. Sent once.
    SessionStarted,
    /// Text the debugger printed on its console stream.
    ConsoleOutput(String),
    /// The target resumed.
    TargetRunning,
    /// The target stopped for a reason without a more specific event.
    TargetStopped {
        /// Stop reason.
        reason: MiStopReason,
        /// Thread that stopped.
        thread_id: Option<i64>,
    },
    /// The target stopped at a breakpoint.
    BreakpointHit {
        /// Stop reason.
        reason: MiStopReason,
        /// Thread that hit the breakpoint.
        thread_id: Option<i64>,
    },
    /// The target stopped on a signal.
    SignalReceived {
        /// Stop reason.
        reason: MiStopReason,
        /// Thread that received the signal, when reported.
        thread_id: Option<i64>,
    },
}

/// Operations the bridge needs from a debugger session.
///
/// Every call is a round-trip to the debugger process and may fail.
#[async_trait]
pub trait MiBackend: Send + Sync {
    /// Start the debugger, optionally overriding its executable path.
    async fn start(&self, debugger_path: Option<&str>, args: &[String]) -> BackendResult<()>;
    /// Change the debugger's working directory.
    async fn environment_cd(&self, dir: &str) -> BackendResult<()>;
    /// Load the program to debug.
    async fn set_executable_file(&self, path: &str) -> BackendResult<()>;
    /// Connect to a remote stub.
    async fn connect_to_remote_target(&self, address: &str, mode: RemoteMode) -> BackendResult<()>;
    /// Resume inferior threads left stopped by a connect.
    async fn resume_inferior(&self) -> BackendResult<()>;
    /// Run the loaded program.
    async fn start_inferior(&self) -> BackendResult<()>;
    /// Attach to a running process.
    async fn target_attach(&self, pid: i64) -> BackendResult<()>;
    /// Copy a local file to the remote target.
    async fn target_file_put(&self, from: &str, to: &str) -> BackendResult<()>;
    /// Run a raw debugger command and return its console output.
    async fn exec_native_command(&self, command: &str) -> BackendResult<String>;
    /// Run a CLI command through the console interpreter.
    async fn interpreter_exec(&self, command: &str) -> BackendResult<()>;
    /// Interrupt the target.
    async fn pause(&self) -> BackendResult<()>;
    /// Insert a breakpoint at `location` (`file:line`).
    async fn add_breakpoint(
        &self,
        location: &str,
        options: BreakpointOptions,
    ) -> BackendResult<BreakpointInfo>;
    /// Delete breakpoints by number.
    async fn remove_breakpoints(&self, ids: &[i64]) -> BackendResult<()>;
    /// List threads.
    async fn get_threads(&self) -> BackendResult<ThreadInfo>;
    /// List frames of the selected thread.
    async fn get_stack_frames(&self, range: FrameRange) -> BackendResult<Vec<MiFrame>>;
    /// List arguments and locals of a frame.
    async fn get_stack_frame_variables(
        &self,
        detail: DetailLevel,
        context: FrameContext,
    ) -> BackendResult<FrameVariables>;
    /// Create a tracked expression; `None` context evaluates globally.
    async fn add_watch(&self, expression: &str, context: Option<FrameContext>)
        -> BackendResult<Watch>;
    /// Re-evaluate a tracked expression.
    async fn update_watch(&self, id: &str, detail: DetailLevel) -> BackendResult<Vec<WatchChange>>;
    /// List the children of a tracked expression.
    async fn get_watch_children(&self, id: &str, detail: DetailLevel) -> BackendResult<Vec<Watch>>;
    /// Delete a tracked expression and its children.
    async fn remove_watch(&self, id: &str) -> BackendResult<()>;
    /// Resume every inferior, optionally in reverse.
    async fn resume_all_inferiors(&self, reverse: bool) -> BackendResult<()>;
    /// Step over one source line.
    async fn step_over_line(&self, thread_id: i64) -> BackendResult<()>;
    /// Step into one source line.
    async fn step_into_line(&self, thread_id: i64) -> BackendResult<()>;
    /// Run until the current function returns.
    async fn step_out(&self, thread_id: i64) -> BackendResult<()>;
    /// Shut the debugger down; `force` kills instead of detaching cleanly.
    async fn end(&self, force: bool) -> BackendResult<()>;
}
