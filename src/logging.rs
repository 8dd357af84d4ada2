//! Log file handling and subscriber setup.
//!
//! Standard output usually carries the DAP stream, so logs always go to a
//! file.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use mibridge_config::LogConfig;
use tracing_subscriber::EnvFilter;

/// Maximum size of a single log file before rotation (10 MB).
pub const DEFAULT_MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Maximum number of rotated log files to retain.
pub const DEFAULT_MAX_LOG_FILES: u32 = 5;

/// Return the platform-specific default log file path.
///
/// * macOS: `$HOME/Library/Logs/mibridge/mibridge.log`
/// * Linux: `$XDG_STATE_HOME/mibridge/mibridge.log`, else
///   `$HOME/.local/state/mibridge/mibridge.log`
/// * Windows: `%LOCALAPPDATA%/mibridge/logs/mibridge.log`
/// * Fallback: the system temp directory
pub fn default_log_file_path() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join("Library/Logs/mibridge/mibridge.log");
        }
    }
    #[cfg(target_os = "linux")]
    {
        if let Some(state) = std::env::var_os("XDG_STATE_HOME") {
            return PathBuf::from(state).join("mibridge/mibridge.log");
        }
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(".local/state/mibridge/mibridge.log");
        }
    }
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("LOCALAPPDATA") {
            return PathBuf::from(appdata).join("mibridge\\logs\\mibridge.log");
        }
    }
    std::env::temp_dir().join("mibridge").join("mibridge.log")
}

/// Ensure the parent directory of a log file exists.
pub fn ensure_log_dir(log_path: &Path) -> io::Result<()> {
    match log_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Rotate `log_path` once it reaches `max_size` bytes.
///
/// ```text
///   mibridge.log   → mibridge.log.1
///   mibridge.log.1 → mibridge.log.2
///   …
///   mibridge.log.<max_files> is deleted
/// ```
pub fn rotate_log_files(log_path: &Path, max_size: u64, max_files: u32) -> io::Result<()> {
    let size = match fs::metadata(log_path) {
        Ok(metadata) => metadata.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if size < max_size || max_files == 0 {
        return Ok(());
    }

    let oldest = rotated_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for i in (1..max_files).rev() {
        let from = rotated_path(log_path, i);
        if from.exists() {
            fs::rename(&from, rotated_path(log_path, i + 1))?;
        }
    }
    fs::rename(log_path, rotated_path(log_path, 1))
}

/// Build the event filter: `RUST_LOG` wins over the configured level.
pub fn build_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.as_filter()))
}

/// Install the global `tracing` subscriber writing to the configured log
/// file, or the default path when none is set.
///
/// Returns the path being written to.
pub fn init_logging(config: &LogConfig) -> io::Result<PathBuf> {
    let path = config.file.clone().unwrap_or_else(default_log_file_path);
    ensure_log_dir(&path)?;
    rotate_log_files(&path, DEFAULT_MAX_LOG_SIZE, DEFAULT_MAX_LOG_FILES)?;
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    tracing_subscriber::fmt()
        .with_env_filter(build_filter(config))
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e.to_string()))?;
    tracing::info!("logging to {}", path.display());
    Ok(path)
}

fn rotated_path(base: &Path, index: u32) -> PathBuf {
    let name = base.file_name().unwrap_or_default().to_string_lossy();
    let parent = base.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!("{name}.{index}"))
}
