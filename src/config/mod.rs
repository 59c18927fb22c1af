//! Configuration management for the speech relay
//!
//! Precedence for every setting: environment > TOML file > default.

pub mod file;

use std::time::Duration;

use crate::relay::{Credentials, DEFAULT_TIMEOUT, DispatchConfig, UpstreamConfig};
use crate::sandbox::SandboxConfig;
use crate::{Error, Result};

pub use file::RelayConfigFile;

/// Default API server port
pub const DEFAULT_PORT: u16 = 3000;

/// Speech relay configuration
#[derive(Debug)]
pub struct Config {
    /// Upstream speech service
    pub upstream: UpstreamConfig,

    /// Outbound backpressure
    pub dispatch: DispatchConfig,

    /// HTTP API server configuration
    pub api_server: ApiServerConfig,

    /// Script sandbox
    pub sandbox: SandboxConfig,
}

/// HTTP API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Bearer token required on the relay route (from `SPEECH_RELAY_API_KEY`)
    pub api_key: Option<String>,

    /// Global requests per minute; unset means unlimited
    pub rate_limit_per_minute: Option<u32>,
}

impl Config {
    /// Load configuration from the standard config file and the process
    /// environment
    ///
    /// # Errors
    ///
    /// Returns error if the upstream URL or credentials are missing, or a
    /// setting cannot be parsed
    pub fn load() -> Result<Self> {
        Self::resolve(file::load_config_file(), &process_env)
    }

    /// Merge a config file with environment lookups
    ///
    /// # Errors
    ///
    /// Returns error if the upstream URL or credentials are missing, or a
    /// setting cannot be parsed
    pub fn resolve(fc: RelayConfigFile, env: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let RelayConfigFile {
            upstream,
            dispatch,
            server,
            sandbox,
        } = fc;

        Ok(Self {
            upstream: resolve_upstream(upstream, env)?,
            dispatch: resolve_dispatch(&dispatch, env)?,
            api_server: resolve_server(server, env)?,
            sandbox: resolve_sandbox(sandbox, env),
        })
    }

    /// Load only the sandbox settings
    ///
    /// Script execution does not need upstream credentials.
    #[must_use]
    pub fn load_sandbox() -> SandboxConfig {
        resolve_sandbox(file::load_config_file().sandbox, &process_env)
    }
}

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_env<T>(env: &dyn Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    env(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| Error::Config(format!("invalid {key}={raw:?}: {e}")))
        })
        .transpose()
}

fn resolve_upstream(
    fc: file::UpstreamFileConfig,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<UpstreamConfig> {
    let url = env("SPEECH_RELAY_UPSTREAM_URL")
        .or_else(|| env("TTS_URL"))
        .or(fc.url)
        .ok_or_else(|| {
            Error::Config("upstream URL not set (SPEECH_RELAY_UPSTREAM_URL or TTS_URL)".to_string())
        })?;

    let app_id = env("APP_ID")
        .or(fc.app_id)
        .ok_or_else(|| Error::Config("APP_ID not set".to_string()))?;
    let app_key = env("APP_KEY")
        .or(fc.app_key)
        .ok_or_else(|| Error::Config("APP_KEY not set".to_string()))?;

    let timeout = parse_env::<u64>(env, "SPEECH_RELAY_TIMEOUT_SECS")?
        .or(fc.timeout_secs)
        .map_or(DEFAULT_TIMEOUT, Duration::from_secs);

    let stt_transport = parse_env(env, "SPEECH_RELAY_STT_TRANSPORT")?
        .or(fc.stt_transport)
        .unwrap_or_default();

    Ok(UpstreamConfig {
        url,
        credentials: Credentials::new(app_id, app_key),
        timeout,
        stt_transport,
    })
}

fn resolve_dispatch(
    fc: &file::DispatchFileConfig,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<DispatchConfig> {
    let defaults = DispatchConfig::default();

    Ok(DispatchConfig {
        max_concurrent_requests: parse_env(env, "SPEECH_RELAY_MAX_CONCURRENT")?
            .or(fc.max_concurrent_requests)
            .unwrap_or(defaults.max_concurrent_requests),
        breaker_failure_threshold: fc
            .breaker_failure_threshold
            .unwrap_or(defaults.breaker_failure_threshold),
        breaker_open_duration: fc
            .breaker_open_secs
            .map_or(defaults.breaker_open_duration, Duration::from_secs),
    })
}

fn resolve_server(
    fc: file::ServerFileConfig,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<ApiServerConfig> {
    let port = match parse_env::<u16>(env, "SPEECH_RELAY_PORT")? {
        Some(port) => Some(port),
        None => parse_env(env, "PORT")?,
    };

    Ok(ApiServerConfig {
        port: port.or(fc.port).unwrap_or(DEFAULT_PORT),
        api_key: env("SPEECH_RELAY_API_KEY").or(fc.api_key),
        rate_limit_per_minute: parse_env(env, "SPEECH_RELAY_RATE_LIMIT")?
            .or(fc.rate_limit_per_minute)
            .filter(|limit| *limit > 0),
    })
}

fn resolve_sandbox(fc: file::SandboxFileConfig, env: &dyn Fn(&str) -> Option<String>) -> SandboxConfig {
    let mut config = env("SPEECH_RELAY_INTERPRETER")
        .or(fc.interpreter)
        .map_or_else(SandboxConfig::default, SandboxConfig::python);

    if let Some(secs) = fc.timeout_secs {
        config.timeout = Duration::from_secs(secs);
    }

    config
}
