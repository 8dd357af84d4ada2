use crate::config::Config;
use crate::error::ConfigError;

const MAX_WAIT_MS: u64 = 60_000;
const MAX_TICKS: u32 = 1000;

/// Validate a [`Config`], returning every violation found.
pub fn validate(config: &Config) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    check_wait(
        &mut errors,
        "handshake.configuration_done_timeout_ms",
        config.handshake.configuration_done_timeout_ms,
    );
    check_wait(
        &mut errors,
        "handshake.session_started_timeout_ms",
        config.handshake.session_started_timeout_ms,
    );
    check_wait(&mut errors, "progress.interval_ms", config.progress.interval_ms);

    if config.progress.ticks == 0 || config.progress.ticks > MAX_TICKS {
        errors.push(ConfigError::Validation {
            field: "progress.ticks".to_string(),
            message: format!("must be 1\u{2013}{MAX_TICKS}, got {}", config.progress.ticks),
        });
    }

    if let Some(file) = &config.log.file {
        if file.as_os_str().is_empty() {
            errors.push(ConfigError::Validation {
                field: "log.file".to_string(),
                message: "must not be empty".to_string(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_wait(errors: &mut Vec<ConfigError>, field: &str, value: u64) {
    if value == 0 || value > MAX_WAIT_MS {
        errors.push(ConfigError::Validation {
            field: field.to_string(),
            message: format!("must be 1\u{2013}{MAX_WAIT_MS}, got {value}"),
        });
    }
}
