//! Multipart request parsing for the synthesis endpoints.
//!
//! Omitted fields take their defaults. A field that is present but does not
//! parse is a client error.

use super::error::ApiError;
use crate::validate::{
    DEFAULT_LANGUAGE, DEFAULT_MODEL_TYPE, DEFAULT_REPETITION_PENALTY, DEFAULT_TEMPERATURE,
    DEFAULT_TOP_K, DEFAULT_TOP_P, SamplingParams, SynthesisRequest,
};
use axum::extract::Multipart;
use bytes::Bytes;
use serde::Deserialize;
use std::str::FromStr;

/// Multipart part holding the reference clip.
pub const AUDIO_FIELD: &str = "audio_file";

/// Multipart part holding the JSON parameter object.
pub const REQUEST_FIELD: &str = "request";

/// Parameter object accepted by `/api/v1/tts/json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TtsJsonRequest {
    /// Text to speak.
    #[serde(default)]
    pub text: String,
    /// Language code.
    pub language: Option<String>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Nucleus threshold.
    pub top_p: Option<f32>,
    /// Top-k cutoff.
    pub top_k: Option<i64>,
    /// Repetition penalty.
    pub repetition_penalty: Option<f32>,
    /// Model type.
    pub model_type: Option<String>,
}

impl TtsJsonRequest {
    /// Fill in defaults for every missing field.
    pub fn into_request(self, audio: Bytes) -> SynthesisRequest {
        SynthesisRequest {
            text: self.text,
            model_type: self
                .model_type
                .unwrap_or_else(|| DEFAULT_MODEL_TYPE.to_owned()),
            language: self
                .language
                .filter(|l| !l.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_owned()),
            audio,
            params: SamplingParams {
                temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
                top_p: self.top_p.unwrap_or(DEFAULT_TOP_P),
                top_k: self.top_k.unwrap_or(DEFAULT_TOP_K),
                repetition_penalty: self
                    .repetition_penalty
                    .unwrap_or(DEFAULT_REPETITION_PENALTY),
            },
        }
    }
}

/// Read the form-field variant (`POST /api/v1/tts`).
///
/// # Errors
///
/// 400 for malformed multipart bodies or unparseable numeric fields.
pub async fn read_form(mut multipart: Multipart) -> Result<SynthesisRequest, ApiError> {
    let mut request = SynthesisRequest::new(String::new(), Bytes::new());

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_owned();
        if name == AUDIO_FIELD {
            request.audio = field.bytes().await?;
            continue;
        }
        let value = field.text().await?;
        match name.as_str() {
            "text" => request.text = value,
            "language" => {
                if !value.trim().is_empty() {
                    request.language = value;
                }
            }
            "model_type" => request.model_type = value,
            "temperature" => request.params.temperature = parse_number(&name, &value)?,
            "top_p" => request.params.top_p = parse_number(&name, &value)?,
            "top_k" => request.params.top_k = parse_number(&name, &value)?,
            "repetition_penalty" => {
                request.params.repetition_penalty = parse_number(&name, &value)?;
            }
            other => tracing::debug!(field = other, "ignoring unknown form field"),
        }
    }

    Ok(request)
}

/// Read the JSON variant (`POST /api/v1/tts/json`).
///
/// # Errors
///
/// 400 when the `request` part is missing or is not a valid parameter object.
pub async fn read_json_form(mut multipart: Multipart) -> Result<SynthesisRequest, ApiError> {
    let mut params: Option<TtsJsonRequest> = None;
    let mut audio = Bytes::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_owned();
        match name.as_str() {
            AUDIO_FIELD => audio = field.bytes().await?,
            REQUEST_FIELD => {
                let raw = field.bytes().await?;
                let parsed = serde_json::from_slice(&raw).map_err(|e| {
                    ApiError::bad_request(format!("invalid request JSON: {e}"))
                })?;
                params = Some(parsed);
            }
            other => tracing::debug!(field = other, "ignoring unknown form field"),
        }
    }

    let params = params.ok_or_else(|| {
        ApiError::bad_request(format!("missing '{REQUEST_FIELD}' part with JSON parameters"))
    })?;
    Ok(params.into_request(audio))
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T, ApiError> {
    value
        .trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("{name} must be a number, got {value:?}")))
}
