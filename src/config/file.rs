//! TOML configuration file loading
//!
//! Supports `~/.config/speech-relay/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;
use crate::relay::SttTransport;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct RelayConfigFile {
    /// Upstream speech service
    #[serde(default)]
    pub upstream: UpstreamFileConfig,

    /// Outbound concurrency and circuit breaking
    #[serde(default)]
    pub dispatch: DispatchFileConfig,

    /// HTTP server
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Script sandbox
    #[serde(default)]
    pub sandbox: SandboxFileConfig,
}

/// Upstream service configuration
#[derive(Debug, Default, Deserialize)]
pub struct UpstreamFileConfig {
    /// Base URL; `/stt` and `/tts` are appended
    pub url: Option<String>,

    pub app_id: Option<String>,
    pub app_key: Option<String>,

    /// Per-call timeout in seconds
    pub timeout_secs: Option<u64>,

    /// How transcription audio is sent ("raw" or "multipart")
    pub stt_transport: Option<SttTransport>,
}

/// Dispatcher configuration
#[derive(Debug, Default, Deserialize)]
pub struct DispatchFileConfig {
    pub max_concurrent_requests: Option<usize>,
    pub breaker_failure_threshold: Option<u32>,
    pub breaker_open_secs: Option<u64>,
}

/// Server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// API server port
    pub port: Option<u16>,

    /// Bearer token required on `/api/service`
    pub api_key: Option<String>,

    /// Global request budget per minute
    pub rate_limit_per_minute: Option<u32>,
}

/// Sandbox configuration
#[derive(Debug, Default, Deserialize)]
pub struct SandboxFileConfig {
    /// Python interpreter executable
    pub interpreter: Option<String>,

    /// Per-script timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Load the TOML config file from the standard path
///
/// Returns `RelayConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> RelayConfigFile {
    let Some(path) = config_file_path() else {
        return RelayConfigFile::default();
    };

    if !path.exists() {
        return RelayConfigFile::default();
    }

    match load_from_path(&path) {
        Ok(config) => {
            tracing::info!(path = %path.display(), "loaded config file");
            config
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            RelayConfigFile::default()
        }
    }
}

/// Load a config file from an explicit path
///
/// # Errors
///
/// Returns error if the file cannot be read or is not valid TOML
pub fn load_from_path(path: &Path) -> Result<RelayConfigFile> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Return the config file path: `~/.config/speech-relay/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("speech-relay").join("config.toml"))
}
