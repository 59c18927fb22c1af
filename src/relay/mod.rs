//! STT/TTS upstream relay
//!
//! Routes a validated request to one of the two upstream operations, attaches
//! the process-wide service credentials, and converts whatever comes back
//! (including failures) into a [`ProxyResponse`].
//!
//! ```text
//! caller ──▶ Dispatcher ──▶ RelayClient ──▶ {upstream}/stt | {upstream}/tts
//!              │  semaphore      │ credentials, 30s timeout
//!              │  breakers       ▼
//!              ◀──────── ProxyResponse (normalized / error shape)
//! ```

mod breaker;
mod client;
mod dispatch;
mod normalize;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::StatusCode;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

pub use breaker::{CircuitBreaker, CircuitState};
pub use client::RelayClient;
pub use dispatch::Dispatcher;
pub use normalize::{SynthesizedAudio, UpstreamReply, normalize};

use crate::{Error, Result};

/// Header carrying the application ID credential
pub const APP_ID_HEADER: &str = "x-app-id";

/// Header carrying the application key credential
pub const APP_KEY_HEADER: &str = "x-app-key";

/// Hard upper bound on an upstream call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Upstream operation selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Speech-to-text
    Transcribe,
    /// Text-to-speech
    Synthesize,
}

impl Operation {
    /// Path segment on the upstream service, also the inbound `endpoint` token
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Transcribe => "stt",
            Self::Synthesize => "tts",
        }
    }

    /// Uppercase label used in caller-facing messages
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Transcribe => "STT",
            Self::Synthesize => "TTS",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "stt" => Ok(Self::Transcribe),
            "tts" => Ok(Self::Synthesize),
            other => Err(Error::BadRequest(format!("unknown endpoint: {other:?}"))),
        }
    }
}

/// How transcription audio is sent upstream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SttTransport {
    /// Raw WAV bytes with `Content-Type: audio/wav`
    #[default]
    Raw,
    /// `multipart/form-data` with the WAV in a `file` field
    Multipart,
}

impl FromStr for SttTransport {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "raw" | "bytes" => Ok(Self::Raw),
            "multipart" | "form" => Ok(Self::Multipart),
            other => Err(Error::Config(format!("unknown STT transport: {other}"))),
        }
    }
}

/// Service credentials attached to every upstream call
#[derive(Debug)]
pub struct Credentials {
    pub app_id: SecretString,
    pub app_key: SecretString,
}

impl Credentials {
    #[must_use]
    pub fn new(app_id: impl Into<String>, app_key: impl Into<String>) -> Self {
        Self {
            app_id: SecretString::from(app_id.into()),
            app_key: SecretString::from(app_key.into()),
        }
    }
}

/// Upstream connection settings
#[derive(Debug)]
pub struct UpstreamConfig {
    /// Base URL; `/stt` and `/tts` are appended
    pub url: String,

    /// Credentials sent as `X-App-ID` / `X-App-Key`
    pub credentials: Credentials,

    /// Per-call timeout
    pub timeout: Duration,

    /// Transcription transport strategy
    pub stt_transport: SttTransport,
}

impl UpstreamConfig {
    /// Create upstream settings with the default timeout and raw STT transport
    #[must_use]
    pub fn new(url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            url: url.into(),
            credentials,
            timeout: DEFAULT_TIMEOUT,
            stt_transport: SttTransport::default(),
        }
    }
}

/// Backpressure settings for the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Maximum in-flight upstream calls
    pub max_concurrent_requests: usize,

    /// Consecutive no-response failures before a breaker opens (0 disables)
    pub breaker_failure_threshold: u32,

    /// How long an open breaker rejects calls before allowing a trial
    pub breaker_open_duration: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 16,
            breaker_failure_threshold: 5,
            breaker_open_duration: Duration::from_secs(30),
        }
    }
}

/// Error body returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

/// Body of a relay response
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProxyBody {
    /// Upstream transcription JSON, passed through
    Transcription(serde_json::Value),
    /// Canonical `{ "audio": "<base64>" }`
    Synthesis(SynthesizedAudio),
    /// `{ "message": "..." }`
    Error(ErrorBody),
}

/// Status and body returned to the caller for every relay call
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub body: ProxyBody,
}

impl ProxyResponse {
    #[must_use]
    pub const fn transcription(status: StatusCode, body: serde_json::Value) -> Self {
        Self {
            status,
            body: ProxyBody::Transcription(body),
        }
    }

    #[must_use]
    pub const fn synthesis(status: StatusCode, audio: SynthesizedAudio) -> Self {
        Self {
            status,
            body: ProxyBody::Synthesis(audio),
        }
    }

    /// Build an error response with the given status and message
    #[must_use]
    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ProxyBody::Error(ErrorBody {
                message: message.into(),
            }),
        }
    }

    /// Map a relay failure onto the stable status/message contract
    #[must_use]
    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::BadRequest(_) => Self::error(StatusCode::BAD_REQUEST, "Invalid endpoint"),
            Error::Upstream {
                status, message, ..
            } => Self::error(
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
                message.clone(),
            ),
            Error::NoResponse { operation, .. } => Self::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("No response received from {} service", operation.label()),
            ),
            Error::RequestSetup { operation, .. } => Self::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error setting up request to {} service", operation.label()),
            ),
            Error::UnexpectedUpstreamFormat(operation) => Self::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Unexpected response format from {} service", operation.label()),
            ),
            Error::CircuitOpen(operation) => Self::error(
                StatusCode::SERVICE_UNAVAILABLE,
                format!("{} service temporarily unavailable", operation.label()),
            ),
            _ => Self::error(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
        }
    }

    /// Whether the status is 2xx
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}
