//! Synthesis request type and its validation rules.

use crate::error::{Result, ServiceError};
use crate::model::{GenerationRequest, ModelHandle, ModelRegistry, ModelType, VariantParams};
use bytes::Bytes;
use std::path::PathBuf;

/// Longest accepted text, in characters.
pub const MAX_TEXT_CHARS: usize = 1000;

/// Default language code.
pub const DEFAULT_LANGUAGE: &str = "en";
/// Default model type.
pub const DEFAULT_MODEL_TYPE: &str = "turbo";
/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.8;
/// Default nucleus threshold.
pub const DEFAULT_TOP_P: f32 = 0.95;
/// Default top-k cutoff.
pub const DEFAULT_TOP_K: i64 = 1000;
/// Default repetition penalty.
pub const DEFAULT_REPETITION_PENALTY: f32 = 1.2;

const TEMPERATURE_RANGE: (f32, f32) = (0.05, 2.0);
const TOP_P_RANGE: (f32, f32) = (0.0, 1.0);
const TOP_K_RANGE: (i64, i64) = (0, 1000);
const REPETITION_PENALTY_RANGE: (f32, f32) = (1.0, 2.0);

/// Sampling parameters shared by the HTTP endpoints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    /// Sampling temperature.
    pub temperature: f32,
    /// Nucleus sampling threshold.
    pub top_p: f32,
    /// Top-k cutoff (turbo only).
    pub top_k: i64,
    /// Repetition penalty.
    pub repetition_penalty: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            top_k: DEFAULT_TOP_K,
            repetition_penalty: DEFAULT_REPETITION_PENALTY,
        }
    }
}

/// A parsed but unvalidated synthesis request.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    /// Text to speak.
    pub text: String,
    /// Requested model type, as sent by the client.
    pub model_type: String,
    /// Language code (multilingual only).
    pub language: String,
    /// Reference clip bytes.
    pub audio: Bytes,
    /// Sampling parameters.
    pub params: SamplingParams,
}

impl SynthesisRequest {
    /// A request with every optional field at its default.
    pub fn new(text: impl Into<String>, audio: Bytes) -> Self {
        Self {
            text: text.into(),
            model_type: DEFAULT_MODEL_TYPE.to_owned(),
            language: DEFAULT_LANGUAGE.to_owned(),
            audio,
            params: SamplingParams::default(),
        }
    }

    /// Build the model call for `model_type` once the clip is staged at `prompt`.
    pub fn generation_request(&self, model_type: ModelType, prompt: PathBuf) -> GenerationRequest {
        let variant = match model_type {
            ModelType::Turbo => VariantParams::Turbo {
                top_k: u32::try_from(self.params.top_k).unwrap_or(0),
            },
            ModelType::Multilingual => VariantParams::Multilingual {
                language_id: self.language.clone(),
            },
        };
        GenerationRequest {
            text: self.text.clone(),
            audio_prompt_path: prompt,
            temperature: self.params.temperature,
            top_p: self.params.top_p,
            repetition_penalty: self.params.repetition_penalty,
            variant,
        }
    }
}

/// Check `request` against the registry and return the handle to use.
///
/// Rules apply in order and stop at the first violation: empty text, text
/// length, model type, model loaded, empty audio, parameter ranges.
///
/// # Errors
///
/// [`ServiceError::InvalidInput`] for client mistakes,
/// [`ServiceError::ServiceUnavailable`] when the model is not loaded.
pub fn validate(request: &SynthesisRequest, registry: &ModelRegistry) -> Result<ModelHandle> {
    if request.text.trim().is_empty() {
        return Err(ServiceError::invalid("text must not be empty"));
    }

    let chars = request.text.chars().count();
    if chars > MAX_TEXT_CHARS {
        return Err(ServiceError::invalid(format!(
            "text too long: {chars} characters (maximum {MAX_TEXT_CHARS})"
        )));
    }

    let model_type: ModelType = request.model_type.parse().map_err(|_| {
        ServiceError::invalid(format!(
            "model_type must be 'turbo' or 'multilingual', got {:?}",
            request.model_type
        ))
    })?;

    let handle = registry.get(model_type).ok_or_else(|| {
        ServiceError::ServiceUnavailable(format!("{model_type} model not loaded"))
    })?;

    if request.audio.is_empty() {
        return Err(ServiceError::invalid("audio_file must not be empty"));
    }

    check_params(&request.params)?;

    Ok(handle)
}

fn check_params(params: &SamplingParams) -> Result<()> {
    check_float("temperature", params.temperature, TEMPERATURE_RANGE)?;
    check_float("top_p", params.top_p, TOP_P_RANGE)?;
    let (lo, hi) = TOP_K_RANGE;
    if !(lo..=hi).contains(&params.top_k) {
        return Err(ServiceError::invalid(format!(
            "top_k must be between {lo} and {hi}, got {}",
            params.top_k
        )));
    }
    check_float(
        "repetition_penalty",
        params.repetition_penalty,
        REPETITION_PENALTY_RANGE,
    )
}

fn check_float(name: &str, value: f32, (lo, hi): (f32, f32)) -> Result<()> {
    if value.is_finite() && (lo..=hi).contains(&value) {
        Ok(())
    } else {
        Err(ServiceError::invalid(format!(
            "{name} must be between {lo} and {hi}, got {value}"
        )))
    }
}
