use serde::Deserialize;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read { path: String, source: io::Error },
    #[error("Failed to parse {path}: {source}")]
    Parse { path: String, source: toml::de::Error },
    #[error("Invalid value in {path}: {message}")]
    Invalid { path: String, message: String },
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ReaderConfig {
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    pub worker_threads: usize,
    pub drag_threshold_px: f32,
    pub failure_backoff_ms: u64,
    /// Unset: a confirmed "no example" is kept for the whole session.
    pub negative_ttl_secs: Option<u64>,
    pub prefetch_rule_details: bool,
    pub debug_log_capacity: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8000/api/".to_string(),
            request_timeout_ms: 10_000,
            worker_threads: 4,
            drag_threshold_px: 5.0,
            failure_backoff_ms: 500,
            negative_ttl_secs: None,
            prefetch_rule_details: true,
            debug_log_capacity: 200,
        }
    }
}

impl ReaderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn failure_backoff(&self) -> Duration {
        Duration::from_millis(self.failure_backoff_ms)
    }

    pub fn negative_ttl(&self) -> Option<Duration> {
        self.negative_ttl_secs.map(Duration::from_secs)
    }
}

pub fn load_config_from_file(file_path: &Path) -> Result<ReaderConfig, ConfigError> {
    let path = file_path.display().to_string();
    let contents = fs::read_to_string(file_path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    let config = toml::from_str::<ReaderConfig>(&contents).map_err(|source| ConfigError::Parse {
        path: path.clone(),
        source,
    })?;
    if config.worker_threads == 0 {
        return Err(ConfigError::Invalid {
            path,
            message: "worker_threads must be at least 1".to_string(),
        });
    }
    if !config.drag_threshold_px.is_finite() || config.drag_threshold_px < 0.0 {
        return Err(ConfigError::Invalid {
            path,
            message: format!("drag_threshold_px must be a non-negative number, got {}", config.drag_threshold_px),
        });
    }
    Ok(config)
}

/// Missing file means defaults; a file that exists but is broken is still an error.
pub fn load_or_default(file_path: &Path) -> Result<ReaderConfig, ConfigError> {
    match load_config_from_file(file_path) {
        Err(ConfigError::Read { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
            warn!("{} not found, using default reader config", file_path.display());
            Ok(ReaderConfig::default())
        }
        other => other,
    }
}
