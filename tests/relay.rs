//! Relay integration tests against a mock upstream

use std::time::{Duration, Instant};

use axum::body::Bytes;
use reqwest::StatusCode;
use serde_json::json;
use speech_relay::relay::{CircuitState, ErrorBody};
use speech_relay::{DispatchConfig, Operation, ProxyBody, ProxyResponse, SynthesizedAudio};
use wiremock::matchers::{body_bytes, body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::{
    TEST_APP_ID, TEST_APP_KEY, dispatcher_with, dispatcher_with_timeout, multipart_dispatcher,
    test_dispatcher, upstream_config,
};

fn error_message(response: &ProxyResponse) -> &str {
    match &response.body {
        ProxyBody::Error(ErrorBody { message }) => message,
        other => panic!("expected error body, got {other:?}"),
    }
}

fn audio(response: &ProxyResponse) -> &str {
    match &response.body {
        ProxyBody::Synthesis(SynthesizedAudio { audio }) => audio,
        other => panic!("expected synthesis body, got {other:?}"),
    }
}

fn tts_body(text: &str) -> Bytes {
    Bytes::from(serde_json::to_vec(&json!({ "text": text })).unwrap())
}

#[tokio::test]
async fn test_invalid_endpoint_makes_no_upstream_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dispatcher = test_dispatcher(&server);
    let response = dispatcher.relay(Some("translate"), Bytes::new()).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(error_message(&response), "Invalid endpoint");
}

#[tokio::test]
async fn test_empty_transcription_passes_through() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/stt"))
        .and(header("x-app-id", TEST_APP_ID))
        .and(header("x-app-key", TEST_APP_KEY))
        .and(header("content-type", "audio/wav"))
        .and(body_bytes(Vec::<u8>::new()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "text": "" })))
        .expect(1)
        .mount(&server)
        .await;

    let dispatcher = test_dispatcher(&server);
    let response = dispatcher.relay(Some("stt"), Bytes::new()).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, ProxyBody::Transcription(json!({ "text": "" })));
}

#[tokio::test]
async fn test_transcription_status_is_preserved() {
    let server = MockServer::start().await;
    Mock::given(path("/stt"))
        .respond_with(
            ResponseTemplate::new(202).set_body_json(json!({ "text": "hi", "lang": "en" })),
        )
        .mount(&server)
        .await;

    let response = test_dispatcher(&server)
        .relay(Some("stt"), Bytes::from_static(b"RIFF"))
        .await;

    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(
        response.body,
        ProxyBody::Transcription(json!({ "text": "hi", "lang": "en" }))
    );
}

#[tokio::test]
async fn test_multipart_transcription_upload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/stt"))
        .and(header("x-app-id", TEST_APP_ID))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "text": "hello" })))
        .expect(1)
        .mount(&server)
        .await;

    let response = multipart_dispatcher(&server)
        .relay(Some("stt"), Bytes::from_static(b"RIFFfake"))
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let requests = server.received_requests().await.unwrap();
    let request = &requests[0];
    let content_type = request.headers.get("content-type").unwrap().to_str().unwrap();
    assert!(content_type.starts_with("multipart/form-data"));

    let body = String::from_utf8_lossy(&request.body);
    assert!(body.contains(r#"name="file""#));
    assert!(body.contains("RIFFfake"));
}

#[tokio::test]
async fn test_synthesis_buffer_is_base64_encoded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tts"))
        .and(header("x-app-id", TEST_APP_ID))
        .and(header("x-app-key", TEST_APP_KEY))
        .and(body_json(json!({ "text": "hello" })))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1_u8, 2, 3]))
        .expect(1)
        .mount(&server)
        .await;

    let response = test_dispatcher(&server)
        .relay(Some("tts"), tts_body("hello"))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(audio(&response), "AQID");
}

#[tokio::test]
async fn test_synthesis_reply_shapes_agree() {
    let replies = [
        ResponseTemplate::new(200).set_body_bytes(vec![1_u8, 2, 3]),
        ResponseTemplate::new(200).set_body_string("AQID"),
        ResponseTemplate::new(200).set_body_json(json!({ "audio": "AQID" })),
        ResponseTemplate::new(200).set_body_json(json!(r#"{"audio":"AQID"}"#)),
    ];

    for reply in replies {
        let server = MockServer::start().await;
        Mock::given(path("/tts")).respond_with(reply).mount(&server).await;

        let response = test_dispatcher(&server)
            .relay(Some("tts"), tts_body("hello"))
            .await;
        assert_eq!(audio(&response), "AQID");
    }
}

#[tokio::test]
async fn test_synthesis_without_audio_field() {
    let server = MockServer::start().await;
    Mock::given(path("/tts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "queued" })))
        .mount(&server)
        .await;

    let response = test_dispatcher(&server)
        .relay(Some("tts"), tts_body("hello"))
        .await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        error_message(&response),
        "Unexpected response format from TTS service"
    );
}

#[tokio::test]
async fn test_upstream_error_status_and_message() {
    let server = MockServer::start().await;
    Mock::given(path("/tts"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "detail": "Invalid API Key" })))
        .mount(&server)
        .await;
    Mock::given(path("/stt"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let dispatcher = test_dispatcher(&server);

    let response = dispatcher.relay(Some("tts"), tts_body("hello")).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_message(&response), "Invalid API Key");

    let response = dispatcher.relay(Some("stt"), Bytes::new()).await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error_message(&response), "Error from STT service");

    // Upstream answered, so the breaker stays closed
    assert_eq!(dispatcher.breaker(Operation::Transcribe).consecutive_failures(), 0);
}

#[tokio::test]
async fn test_timeout_is_no_response() {
    let server = MockServer::start().await;
    Mock::given(path("/tts"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "audio": "AQID" }))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let dispatcher = dispatcher_with_timeout(&server.uri(), Duration::from_millis(200));
    let started = Instant::now();
    let response = dispatcher.relay(Some("tts"), tts_body("hello")).await;

    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_message(&response), "No response received from TTS service");
    assert_eq!(dispatcher.breaker(Operation::Synthesize).consecutive_failures(), 1);
}

#[tokio::test]
async fn test_breaker_opens_after_repeated_no_response() {
    // Nothing listens on port 1
    let dispatcher = dispatcher_with(
        upstream_config("http://127.0.0.1:1"),
        DispatchConfig {
            breaker_failure_threshold: 2,
            breaker_open_duration: Duration::from_secs(60),
            ..DispatchConfig::default()
        },
    );

    for _ in 0..2 {
        let response = dispatcher.relay(Some("stt"), Bytes::new()).await;
        assert_eq!(error_message(&response), "No response received from STT service");
    }
    assert_eq!(dispatcher.breaker(Operation::Transcribe).state(), CircuitState::Open);

    let response = dispatcher.relay(Some("stt"), Bytes::new()).await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error_message(&response), "STT service temporarily unavailable");

    // Breakers are per operation
    assert_eq!(dispatcher.breaker(Operation::Synthesize).state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let server = MockServer::start().await;
    Mock::given(path("/stt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "text": "ok" }))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(4)
        .mount(&server)
        .await;

    let dispatcher = dispatcher_with(
        upstream_config(&server.uri()),
        DispatchConfig {
            max_concurrent_requests: 2,
            ..DispatchConfig::default()
        },
    );

    let started = Instant::now();
    let responses = tokio::join!(
        dispatcher.relay(Some("stt"), Bytes::new()),
        dispatcher.relay(Some("stt"), Bytes::new()),
        dispatcher.relay(Some("stt"), Bytes::new()),
        dispatcher.relay(Some("stt"), Bytes::new()),
    );

    // Two waves of two
    assert!(started.elapsed() >= Duration::from_millis(550));
    for response in [responses.0, responses.1, responses.2, responses.3] {
        assert!(response.is_success());
    }
    assert_eq!(dispatcher.available_permits(), 2);
}
