//! End-to-end tests against a running service with real models.
//!
//! These need a service at `API_URL` (default `http://127.0.0.1:8000`) and a
//! reference clip at `LIVE_REFERENCE_WAV`, and are gated behind the
//! `live-server` feature so they never run in CI.
//!
//! ```bash
//! LIVE_REFERENCE_WAV=ref.wav cargo test --features live-server --test live_server
//! ```

#![cfg(feature = "live-server")]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use chatterbox_serve::client::{ClientError, TtsCall, TtsClient};

fn base_url() -> String {
    std::env::var("API_URL").unwrap_or_else(|_| "http://127.0.0.1:8000".to_owned())
}

/// Returns a client when the service is reachable; otherwise the invoking
/// test returns early (skips).
macro_rules! require_service {
    () => {{
        let client = TtsClient::new(base_url());
        match client.health().await {
            Ok(health) => (client, health),
            Err(e) => {
                eprintln!("service not reachable ({e}), skipping test");
                return;
            }
        }
    }};
}

fn reference_clip() -> Option<Vec<u8>> {
    let path = std::env::var("LIVE_REFERENCE_WAV").ok()?;
    std::fs::read(path).ok()
}

#[tokio::test]
async fn live_health() {
    let (_client, health) = require_service!();
    assert_eq!(health.status, "healthy");
}

#[tokio::test]
async fn live_turbo_synthesis() {
    let (client, health) = require_service!();
    if !health.models_loaded.turbo {
        eprintln!("turbo model not loaded, skipping test");
        return;
    }
    let Some(audio) = reference_clip() else {
        eprintln!("LIVE_REFERENCE_WAV not set, skipping test");
        return;
    };

    let wav = client
        .synthesize(&TtsCall {
            text: "Hello from the live test suite.".to_owned(),
            model_type: "turbo".to_owned(),
            language: "en".to_owned(),
            audio,
            filename: "ref.wav".to_owned(),
        })
        .await
        .unwrap();

    assert!(wav.len() > 44, "WAV payload too small ({} bytes)", wav.len());
    assert_eq!(&wav[..4], b"RIFF", "response does not start with RIFF header");
}

#[tokio::test]
async fn live_multilingual_chinese() {
    let (client, health) = require_service!();
    if !health.models_loaded.multilingual {
        eprintln!("multilingual model not loaded, skipping test");
        return;
    }
    let Some(audio) = reference_clip() else {
        eprintln!("LIVE_REFERENCE_WAV not set, skipping test");
        return;
    };

    let wav = client
        .synthesize(&TtsCall {
            text: "你好，世界".to_owned(),
            model_type: "multilingual".to_owned(),
            language: "zh".to_owned(),
            audio,
            filename: "ref.wav".to_owned(),
        })
        .await
        .unwrap();
    assert_eq!(&wav[..4], b"RIFF");
}

#[tokio::test]
async fn live_rejects_empty_text() {
    let (client, _health) = require_service!();

    let result = client
        .synthesize(&TtsCall {
            text: "   ".to_owned(),
            model_type: "turbo".to_owned(),
            language: "en".to_owned(),
            audio: b"RIFF".to_vec(),
            filename: "ref.wav".to_owned(),
        })
        .await;
    match result {
        Err(ClientError::Status { status, .. }) => assert_eq!(status, 400),
        other => panic!("expected 400, got {other:?}"),
    }
}
