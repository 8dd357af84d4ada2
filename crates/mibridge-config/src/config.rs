use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Log verbosity level.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Most verbose.
    Trace,
    /// Debug messages.
    Debug,
    /// Informational messages (default).
    #[default]
    Info,
    /// Warnings only.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// The `tracing` filter directive for this level.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Bounded waits used while a launch or attach pipeline starts up.
///
/// A wait that runs out is not an error: the pipeline proceeds and later
/// backend calls fail loudly if the session really is not ready.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeConfig {
    /// How long to wait for the client's `configurationDone`.
    #[serde(default = "default_handshake_ms")]
    pub configuration_done_timeout_ms: u64,
    /// How long to wait for the backend's session-started signal.
    #[serde(default = "default_handshake_ms")]
    pub session_started_timeout_ms: u64,
}

fn default_handshake_ms() -> u64 {
    1000
}

impl HandshakeConfig {
    /// `configuration_done_timeout_ms` as a [`Duration`].
    pub fn configuration_done_timeout(&self) -> Duration {
        Duration::from_millis(self.configuration_done_timeout_ms)
    }

    /// `session_started_timeout_ms` as a [`Duration`].
    pub fn session_started_timeout(&self) -> Duration {
        Duration::from_millis(self.session_started_timeout_ms)
    }
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            configuration_done_timeout_ms: default_handshake_ms(),
            session_started_timeout_ms: default_handshake_ms(),
        }
    }
}

/// Pacing of progress sequences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Number of update ticks in one sequence (1–1000).
    #[serde(default = "default_ticks")]
    pub ticks: u32,
    /// Delay between ticks in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_ticks() -> u32 {
    10
}

fn default_interval_ms() -> u64 {
    500
}

impl ProgressConfig {
    /// `interval_ms` as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            ticks: default_ticks(),
            interval_ms: default_interval_ms(),
        }
    }
}

/// Breakpoint reporting policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakpointConfig {
    /// Report a breakpoint as verified only once the backend resolved its
    /// location. When false every acknowledged breakpoint is verified.
    #[serde(default = "default_true")]
    pub verify_resolved: bool,
}

fn default_true() -> bool {
    true
}

impl Default for BreakpointConfig {
    fn default() -> Self {
        Self {
            verify_resolved: true,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log verbosity level.
    #[serde(default)]
    pub level: LogLevel,
    /// Optional path to a log file.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            file: None,
        }
    }
}

/// Top-level bridge configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    /// Launch/attach handshake waits.
    #[serde(default)]
    pub handshake: HandshakeConfig,
    /// Progress sequence pacing.
    #[serde(default)]
    pub progress: ProgressConfig,
    /// Breakpoint policy.
    #[serde(default)]
    pub breakpoints: BreakpointConfig,
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}
