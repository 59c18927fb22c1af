//! Synthesis reply normalization
//!
//! The TTS upstream does not wrap audio consistently: it may send raw audio
//! bytes, a base64 string, `{ "audio": "..." }`, or a JSON string that
//! itself contains `{ "audio": "..." }`. Everything collapses into
//! [`SynthesizedAudio`].

use axum::body::Bytes;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Operation;
use crate::{Error, Result};

/// Canonical synthesis payload: `{ "audio": "<base64>" }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesizedAudio {
    pub audio: String,
}

/// Raw synthesis reply, classified by shape
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamReply {
    /// Raw audio bytes
    Buffer(Bytes),
    /// Text that should already be base64 audio (possibly JSON-wrapped)
    Text(String),
    /// Parsed JSON value expected to carry an `audio` field
    Structured(Value),
}

impl UpstreamReply {
    /// Classify a synthesis response body without looking at headers
    ///
    /// JSON strings become `Text`, other JSON becomes `Structured`, bare
    /// base64 text (whitespace ignored) becomes `Text`, and anything else is
    /// a `Buffer`. Without headers, bytes that happen to be valid JSON or
    /// base64 cannot be told apart from those encodings.
    #[must_use]
    pub fn from_body(body: Bytes) -> Self {
        if let Ok(value) = serde_json::from_slice::<Value>(&body) {
            return match value {
                Value::String(text) => Self::Text(text),
                other => Self::Structured(other),
            };
        }

        // MIME-style base64 wraps lines
        let compact: Vec<u8> = body
            .iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();

        match std::str::from_utf8(&compact) {
            Ok(text) if is_base64_text(text) => Self::Text(text.to_string()),
            _ => Self::Buffer(body),
        }
    }
}

impl From<SynthesizedAudio> for UpstreamReply {
    fn from(audio: SynthesizedAudio) -> Self {
        Self::Structured(serde_json::json!({ "audio": audio.audio }))
    }
}

/// Resolve a synthesis reply into canonical form
///
/// First match wins: buffers are base64-encoded, text is taken as-is,
/// structured values yield their `audio` field. The result is then parsed
/// as JSON once more so double-encoded `{ "audio": ... }` unwraps; text that
/// is not JSON is used unchanged.
///
/// # Errors
///
/// Returns `UnexpectedUpstreamFormat` if a structured reply has no string
/// `audio` field
pub fn normalize(reply: UpstreamReply) -> Result<SynthesizedAudio> {
    let text = match reply {
        UpstreamReply::Buffer(bytes) => STANDARD.encode(&bytes),
        UpstreamReply::Text(text) => text,
        UpstreamReply::Structured(value) => audio_field(&value)
            .map(str::to_string)
            .ok_or(Error::UnexpectedUpstreamFormat(Operation::Synthesize))?,
    };

    let audio = match serde_json::from_str::<Value>(&text) {
        Ok(nested) => audio_field(&nested).map_or(text, str::to_string),
        Err(_) => text,
    };

    Ok(SynthesizedAudio { audio })
}

fn audio_field(value: &Value) -> Option<&str> {
    value.get("audio").and_then(Value::as_str)
}

fn is_base64_text(text: &str) -> bool {
    !text.is_empty()
        && text
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='))
        && STANDARD.decode(text).is_ok()
}
