//! Minimal HTTP client for a running service (smoke tests and tooling).

use crate::server::{ErrorBody, HealthInfo};
use bytes::Bytes;
use reqwest::multipart::{Form, Part};

/// Errors returned by [`TtsClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport failure (connection refused, timeout, bad body).
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with an error status.
    #[error("service returned {status}: {detail}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// `detail` from the error body, or the raw body.
        detail: String,
    },
}

/// One synthesis call.
#[derive(Debug, Clone)]
pub struct TtsCall {
    /// Text to speak.
    pub text: String,
    /// `turbo` or `multilingual`.
    pub model_type: String,
    /// Language code.
    pub language: String,
    /// Reference clip bytes.
    pub audio: Vec<u8>,
    /// File name sent with the clip.
    pub filename: String,
}

/// Client for the synthesis API.
#[derive(Debug, Clone)]
pub struct TtsClient {
    base_url: String,
    http: reqwest::Client,
}

impl TtsClient {
    /// Client for the service at `base_url` (e.g. `http://localhost:8000`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            http: reqwest::Client::new(),
        }
    }

    /// `GET /health`.
    ///
    /// # Errors
    ///
    /// Transport errors or a non-success status.
    pub async fn health(&self) -> Result<HealthInfo, ClientError> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        let response = check(response).await?;
        Ok(response.json().await?)
    }

    /// `POST /api/v1/tts`, returning the WAV bytes.
    ///
    /// # Errors
    ///
    /// Transport errors or a non-success status carrying the service's detail.
    pub async fn synthesize(&self, call: &TtsCall) -> Result<Bytes, ClientError> {
        let audio = Part::bytes(call.audio.clone())
            .file_name(call.filename.clone())
            .mime_str("audio/wav")?;
        let form = Form::new()
            .text("text", call.text.clone())
            .text("model_type", call.model_type.clone())
            .text("language", call.language.clone())
            .text("temperature", "0.8")
            .text("top_p", "0.95")
            .text("top_k", "1000")
            .text("repetition_penalty", "1.2")
            .part("audio_file", audio);

        let response = self
            .http
            .post(format!("{}/api/v1/tts", self.base_url))
            .multipart(form)
            .send()
            .await?;
        let response = check(response).await?;
        Ok(response.bytes().await?)
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.detail)
        .unwrap_or(text);
    Err(ClientError::Status {
        status: status.as_u16(),
        detail,
    })
}
