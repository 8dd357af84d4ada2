//! mibridge-config — layered TOML configuration for the bridge.

pub mod config;
pub mod error;
pub mod load;
pub mod merge;
pub mod validate;

pub use config::{BreakpointConfig, Config, HandshakeConfig, LogConfig, LogLevel, ProgressConfig};
pub use error::ConfigError;
pub use load::{load_config, load_from_str};
