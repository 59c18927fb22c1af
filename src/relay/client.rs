//! HTTP client for the upstream speech service

use axum::body::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{RequestBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use super::{
    APP_ID_HEADER, APP_KEY_HEADER, Credentials, Operation, ProxyResponse, SttTransport,
    UpstreamConfig, UpstreamReply, normalize,
};
use crate::audio::MEDIA_TYPE;
use crate::{Error, Result};

/// Text payload accepted for synthesis
#[derive(Debug, Serialize, Deserialize)]
struct SynthesisRequest {
    text: String,
}

/// Forwards requests to the upstream STT/TTS service
///
/// Holds no per-call state; safe to share across concurrent requests.
pub struct RelayClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Credentials,
    stt_transport: SttTransport,
}

impl RelayClient {
    /// Create a relay client
    ///
    /// # Errors
    ///
    /// Returns error if the upstream URL is empty or the HTTP client cannot
    /// be built
    pub fn new(config: UpstreamConfig) -> Result<Self> {
        let base_url = config.url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::Config("upstream URL required".to_string()));
        }

        let http = reqwest::Client::builder().timeout(config.timeout).build()?;

        tracing::debug!(
            upstream = %base_url,
            timeout = ?config.timeout,
            stt_transport = ?config.stt_transport,
            "relay client initialized"
        );

        Ok(Self {
            http,
            base_url,
            credentials: config.credentials,
            stt_transport: config.stt_transport,
        })
    }

    /// Upstream URL for an operation
    #[must_use]
    pub fn endpoint_url(&self, operation: Operation) -> String {
        format!("{}/{}", self.base_url, operation.path())
    }

    /// Forward one request upstream and normalize the reply
    ///
    /// # Arguments
    ///
    /// * `operation` - Which upstream operation to call
    /// * `body` - WAV bytes for transcription, JSON `{ "text": ... }` for synthesis
    ///
    /// # Errors
    ///
    /// Returns `RequestSetup`, `NoResponse`, `Upstream` or
    /// `UnexpectedUpstreamFormat` depending on where the call failed
    pub async fn forward(&self, operation: Operation, body: Bytes) -> Result<ProxyResponse> {
        let url = self.endpoint_url(operation);
        tracing::info!(%operation, bytes = body.len(), "relaying request upstream");

        let request = self
            .http
            .post(&url)
            .header(APP_ID_HEADER, self.credentials.app_id.expose_secret())
            .header(APP_KEY_HEADER, self.credentials.app_key.expose_secret());

        let request = match operation {
            Operation::Transcribe => self.transcription_request(request, body)?,
            Operation::Synthesize => {
                let payload: SynthesisRequest =
                    serde_json::from_slice(&body).map_err(|e| Error::RequestSetup {
                        operation,
                        reason: format!("invalid synthesis payload: {e}"),
                    })?;
                request.json(&payload)
            }
        };

        let response = request.send().await.map_err(|e| classify(operation, &e))?;
        let status = response.status();
        tracing::debug!(%operation, status = %status, "received upstream response");

        let reply = response.bytes().await.map_err(|e| classify(operation, &e))?;

        if !status.is_success() {
            let error = upstream_error(operation, status, &reply);
            tracing::error!(%operation, status = %status, error = %error, "upstream error");
            return Err(error);
        }

        match operation {
            Operation::Transcribe => Ok(ProxyResponse::transcription(
                status,
                transcription_body(&reply),
            )),
            Operation::Synthesize => {
                let audio = normalize(UpstreamReply::from_body(reply))?;
                tracing::info!(%operation, audio_chars = audio.audio.len(), "synthesis complete");
                Ok(ProxyResponse::synthesis(status, audio))
            }
        }
    }

    /// Attach transcription audio according to the configured transport
    fn transcription_request(&self, request: RequestBuilder, audio: Bytes) -> Result<RequestBuilder> {
        match self.stt_transport {
            SttTransport::Raw => Ok(request.header(CONTENT_TYPE, MEDIA_TYPE).body(audio)),
            SttTransport::Multipart => {
                let part = reqwest::multipart::Part::bytes(audio.to_vec())
                    .file_name("audio.wav")
                    .mime_str(MEDIA_TYPE)
                    .map_err(|e| Error::RequestSetup {
                        operation: Operation::Transcribe,
                        reason: e.to_string(),
                    })?;
                Ok(request.multipart(reqwest::multipart::Form::new().part("file", part)))
            }
        }
    }
}

/// Split transport failures into setup errors and missing responses
fn classify(operation: Operation, err: &reqwest::Error) -> Error {
    if err.is_builder() {
        tracing::error!(%operation, error = %err, "failed to build upstream request");
        return Error::RequestSetup {
            operation,
            reason: err.to_string(),
        };
    }

    let reason = if err.is_timeout() {
        "timed out".to_string()
    } else {
        err.to_string()
    };
    tracing::error!(%operation, reason = %reason, "no response from upstream");
    Error::NoResponse { operation, reason }
}

/// Build an upstream error, preferring the service's own message
fn upstream_error(operation: Operation, status: StatusCode, body: &[u8]) -> Error {
    let message = serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["message", "detail"]
                .iter()
                .find_map(|key| value.get(key).and_then(serde_json::Value::as_str))
                .map(str::to_string)
        })
        .unwrap_or_else(|| format!("Error from {} service", operation.label()));

    Error::Upstream {
        operation,
        status: status.as_u16(),
        message,
    }
}

/// Transcription replies are JSON; anything else is passed on as a JSON string
fn transcription_body(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body)
        .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(body).into_owned()))
}
