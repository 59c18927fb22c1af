//! Shared test utilities

#![allow(dead_code)]

use std::f32::consts::TAU;
use std::time::Duration;

use speech_relay::{
    Credentials, DecodedAudio, DispatchConfig, Dispatcher, SttTransport, UpstreamConfig,
};
use wiremock::MockServer;

pub const TEST_APP_ID: &str = "test-app-id";
pub const TEST_APP_KEY: &str = "test-app-key";

/// Upstream settings pointing at `url` with test credentials
#[must_use]
pub fn upstream_config(url: &str) -> UpstreamConfig {
    UpstreamConfig::new(url, Credentials::new(TEST_APP_ID, TEST_APP_KEY))
}

/// Dispatcher against a mock upstream with default backpressure
#[must_use]
pub fn test_dispatcher(server: &MockServer) -> Dispatcher {
    dispatcher_with(upstream_config(&server.uri()), DispatchConfig::default())
}

/// Dispatcher using multipart transcription uploads
#[must_use]
pub fn multipart_dispatcher(server: &MockServer) -> Dispatcher {
    let mut upstream = upstream_config(&server.uri());
    upstream.stt_transport = SttTransport::Multipart;
    dispatcher_with(upstream, DispatchConfig::default())
}

/// Dispatcher with a shortened upstream timeout
#[must_use]
pub fn dispatcher_with_timeout(url: &str, timeout: Duration) -> Dispatcher {
    let mut upstream = upstream_config(url);
    upstream.timeout = timeout;
    dispatcher_with(upstream, DispatchConfig::default())
}

#[must_use]
pub fn dispatcher_with(upstream: UpstreamConfig, dispatch: DispatchConfig) -> Dispatcher {
    Dispatcher::from_config(upstream, dispatch).expect("failed to build dispatcher")
}

/// Sine tone at `freq` Hz, half amplitude, on every channel
#[must_use]
pub fn sine(sample_rate: u32, frames: usize, channels: usize, freq: f32) -> DecodedAudio {
    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..frames)
        .map(|i| 0.5 * (TAU * freq * i as f32 / sample_rate as f32).sin())
        .collect();
    DecodedAudio::new(sample_rate, vec![samples; channels])
}
