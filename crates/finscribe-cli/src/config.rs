//! Configuration loading for the CLI.

use crate::error::{CliError, Result};
use finscribe_extractor::PipelineConfig;
use std::path::Path;

/// Environment variable that overrides `api_key` from the configuration file
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Load the pipeline configuration, applying the environment's API key.
pub fn load(path: &Path) -> Result<PipelineConfig> {
    if !path.exists() {
        return Err(CliError::Config(format!(
            "{} not found. Pass --config or create it from finscribe.example.toml",
            path.display()
        )));
    }
    let config = PipelineConfig::from_file(path)?;
    Ok(with_env_api_key(config, std::env::var(API_KEY_ENV).ok()))
}

/// Replace the configured key with a non-blank value from the environment
pub fn with_env_api_key(mut config: PipelineConfig, env_key: Option<String>) -> PipelineConfig {
    if let Some(key) = env_key.filter(|k| !k.trim().is_empty()) {
        config.api_key = key;
    }
    config
}
