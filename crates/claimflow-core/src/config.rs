//! Pipeline configuration loader.
//!
//! Reads `claimflow.toml` from a directory and deserializes it into
//! [`PipelineConfig`]. The lenient loader falls back to defaults when the
//! file is missing or malformed; [`read_pipeline_config`] surfaces the error.

use std::path::{Path, PathBuf};

use thiserror::Error;

use claimflow_types::config::PipelineConfig;

/// File name looked up inside the config directory.
pub const CONFIG_FILE: &str = "claimflow.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Parse and normalize a configuration document.
pub fn parse_pipeline_config(content: &str) -> Result<PipelineConfig, toml::de::Error> {
    toml::from_str::<PipelineConfig>(content).map(PipelineConfig::normalized)
}

/// Read `{dir}/claimflow.toml`, failing on any IO or parse error.
pub async fn read_pipeline_config(dir: &Path) -> Result<PipelineConfig, ConfigError> {
    let path = dir.join(CONFIG_FILE);
    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
    parse_pipeline_config(&content).map_err(|source| ConfigError::Parse { path, source })
}

/// Load configuration from `{dir}/claimflow.toml`.
///
/// - If the file does not exist, returns [`PipelineConfig::default()`].
/// - If the file exists but cannot be read or parsed, logs a warning and
///   returns the default.
/// - Otherwise returns the parsed config with floors applied.
pub async fn load_pipeline_config(dir: &Path) -> PipelineConfig {
    match read_pipeline_config(dir).await {
        Ok(config) => config,
        Err(ConfigError::Io { path, source }) if source.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No {CONFIG_FILE} found at {}, using defaults", path.display());
            PipelineConfig::default()
        }
        Err(err) => {
            tracing::warn!("{err}, using defaults");
            PipelineConfig::default()
        }
    }
}
