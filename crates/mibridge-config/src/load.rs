use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::ConfigError;
use crate::merge::merge_configs;
use crate::validate::validate;

/// Directory searched for per-project overrides.
const PROJECT_DIR_NAME: &str = ".mibridge";

/// Load and merge configuration.
///
/// 1. Starts from [`Config::default()`].
/// 2. Merges the explicit config file `global`, if given. A given path that
///    does not exist is an error.
/// 3. Merges the first `.mibridge/config.toml` found walking upward from
///    `project_dir`, if given.
/// 4. Validates the merged result.
///
/// # Errors
///
/// Returns [`ConfigError`] on I/O failure, parse failure, or
/// validation failure.
pub fn load_config(global: Option<&Path>, project_dir: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = Config::default();

    if let Some(path) = global {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        config = merge_configs(&config, &content)?;
        tracing::debug!("merged config from {}", path.display());
    }

    if let Some(proj) = project_dir {
        if let Some(project_path) = find_project_config(proj) {
            let content = std::fs::read_to_string(&project_path)?;
            config = merge_configs(&config, &content)?;
            tracing::debug!("merged project config from {}", project_path.display());
        }
    }

    first_violation(&config)?;
    Ok(config)
}

/// Parse a TOML string directly into a validated [`Config`].
///
/// # Errors
///
/// Returns [`ConfigError`] on parse or validation failure.
pub fn load_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    first_violation(&config)?;
    Ok(config)
}

fn first_violation(config: &Config) -> Result<(), ConfigError> {
    validate(config).map_err(|errors| {
        errors
            .into_iter()
            .next()
            .unwrap_or_else(|| ConfigError::Validation {
                field: "unknown".to_string(),
                message: "validation failed".to_string(),
            })
    })
}

/// Walk from `start` upward looking for `.mibridge/config.toml`.
fn find_project_config(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(PROJECT_DIR_NAME).join("config.toml");
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}
