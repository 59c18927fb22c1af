//! Speech Relay - WAV encoding and STT/TTS relay for browser speech clients
//!
//! This library provides:
//! - A canonical 16-bit PCM WAV encoder (and a decoder for arbitrary WAV input)
//! - An authenticated relay to an upstream speech-to-text / text-to-speech service
//! - Normalization of the upstream's varying synthesis reply shapes
//! - A process-wide script sandbox for small text transforms
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Browser client                    │
//! │   record ─▶ audio::AudioContainer ─▶ POST stt        │
//! └────────────────────┬────────────────────────────────┘
//!                      │  /api/service?endpoint=stt|tts
//! ┌────────────────────▼────────────────────────────────┐
//! │                   speech-relay                       │
//! │   api  │  Dispatcher (permits, breakers)  │  normalize│
//! └────────────────────┬────────────────────────────────┘
//!                      │  X-App-ID / X-App-Key
//! ┌────────────────────▼────────────────────────────────┐
//! │              Upstream speech service                 │
//! │        /stt  ─▶ { text }    /tts ─▶ audio            │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod audio;
pub mod config;
pub mod error;
pub mod relay;
pub mod sandbox;

pub use api::{ApiServer, ApiServerBuilder};
pub use audio::{AudioContainer, DecodedAudio};
pub use config::Config;
pub use error::{Error, Result};
pub use relay::{
    Credentials, DispatchConfig, Dispatcher, Operation, ProxyBody, ProxyResponse, RelayClient,
    SttTransport, SynthesizedAudio, UpstreamConfig,
};
pub use sandbox::{SandboxConfig, ScriptSandbox};
