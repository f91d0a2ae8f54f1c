//! JSON-RPC 2.0 messages exchanged with the model worker.
//!
//! One request per line on the worker's stdin, one message per line on its
//! stdout. The worker may emit any number of `log` notifications before the
//! response to a request.
//!
//! ```json
//! {"jsonrpc":"2.0","method":"model.load","params":{"model_type":"turbo","local_dir":"./models/chatterbox-turbo","device":"cpu"},"id":2}
//! {"jsonrpc":"2.0","method":"log","params":{"level":"info","message":"loading t3"}}
//! {"jsonrpc":"2.0","result":{"sample_rate":24000},"id":2}
//! ```

use super::error::EngineError;
use crate::device::Device;
use crate::model::{GenerationRequest, ModelType, VariantParams};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

const JSONRPC_VERSION: &str = "2.0";

/// Probe the runtime: versions and accelerator availability.
pub const METHOD_HANDSHAKE: &str = "worker.handshake";

/// Construct a model inside the worker.
pub const METHOD_LOAD: &str = "model.load";

/// Run one generation.
pub const METHOD_GENERATE: &str = "model.generate";

/// Notification carrying a worker log line.
pub const NOTIFY_LOG: &str = "log";

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    /// Correlation id.
    pub id: u64,
}

impl JsonRpcRequest {
    /// Creates a new request.
    pub fn new(method: &str, params: Option<serde_json::Value>, id: u64) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            method: method.to_owned(),
            params,
            id,
        }
    }

    /// Serializes to a newline-terminated JSON line.
    pub fn to_line(&self) -> Result<String, EngineError> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i32,
    /// Human-readable message.
    pub message: String,
}

/// A message read from the worker.
#[derive(Debug, Clone)]
pub enum WorkerMessage {
    /// Successful response.
    Response {
        /// Correlation id.
        id: u64,
        /// Result payload.
        result: serde_json::Value,
    },
    /// Error response.
    Error {
        /// Correlation id.
        id: u64,
        /// Error object.
        error: JsonRpcError,
    },
    /// Notification (no id).
    Notification {
        /// Method name.
        method: String,
        /// Parameters.
        params: Option<serde_json::Value>,
    },
}

impl WorkerMessage {
    /// Parses one line of worker output.
    pub fn parse(line: &str) -> Result<Self, EngineError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(EngineError::protocol("empty message line"));
        }

        let mut value: serde_json::Value = serde_json::from_str(trimmed)?;

        let version = value.get("jsonrpc").and_then(|v| v.as_str());
        if version != Some(JSONRPC_VERSION) {
            return Err(EngineError::protocol(format!(
                "expected jsonrpc version \"{JSONRPC_VERSION}\", got {version:?}"
            )));
        }

        let id = value.get("id").and_then(serde_json::Value::as_u64);
        let has_result = value.get("result").is_some();
        let has_error = value.get("error").is_some();
        match (id, has_result, has_error) {
            (Some(id), true, _) => Ok(Self::Response {
                id,
                result: value
                    .get_mut("result")
                    .map(serde_json::Value::take)
                    .unwrap_or_default(),
            }),
            (Some(id), false, true) => Ok(Self::Error {
                id,
                error: serde_json::from_value(
                    value
                        .get_mut("error")
                        .map(serde_json::Value::take)
                        .unwrap_or_default(),
                )?,
            }),
            (None, _, _) => {
                let method = value
                    .get("method")
                    .and_then(|m| m.as_str())
                    .ok_or_else(|| EngineError::protocol("notification without method"))?
                    .to_owned();
                Ok(Self::Notification {
                    method,
                    params: value.get("params").cloned(),
                })
            }
            (Some(_), false, false) => Err(EngineError::protocol(
                "message has id but neither result nor error field",
            )),
        }
    }
}

/// Result of `worker.handshake`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandshakeResult {
    /// Installed torch version.
    pub torch_version: String,
    /// Whether CUDA is usable.
    pub cuda_available: bool,
    /// Whether Apple MPS is usable.
    pub mps_available: bool,
}

impl HandshakeResult {
    /// Whether `device` can be used on this host.
    pub fn supports(&self, device: Device) -> bool {
        match device {
            Device::Cpu => true,
            Device::Cuda => self.cuda_available,
            Device::Mps => self.mps_available,
        }
    }
}

/// Parameters of `model.load`. Exactly one of `local_dir` / `repo_id` is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoadParams {
    /// Variant to construct.
    pub model_type: ModelType,
    /// Flat artifact directory (offline).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_dir: Option<String>,
    /// Upstream repository id (online).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_id: Option<String>,
    /// Device name.
    pub device: Device,
}

/// Result of `model.load`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoadResult {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
}

/// Parameters of `model.generate`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerateParams {
    /// Text to speak.
    pub text: String,
    /// Reference clip path.
    pub audio_prompt_path: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Nucleus sampling threshold.
    pub top_p: f32,
    /// Repetition penalty.
    pub repetition_penalty: f32,
    /// Turbo only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    /// Multilingual only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_id: Option<String>,
}

impl From<&GenerationRequest> for GenerateParams {
    fn from(request: &GenerationRequest) -> Self {
        let (top_k, language_id) = match &request.variant {
            VariantParams::Turbo { top_k } => (Some(*top_k), None),
            VariantParams::Multilingual { language_id } => (None, Some(language_id.clone())),
        };
        Self {
            text: request.text.clone(),
            audio_prompt_path: request.audio_prompt_path.to_string_lossy().into_owned(),
            temperature: request.temperature,
            top_p: request.top_p,
            repetition_penalty: request.repetition_penalty,
            top_k,
            language_id,
        }
    }
}

/// Result of `model.generate`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerateResult {
    /// Little-endian `f32` samples, base64-encoded.
    pub samples_b64: String,
    /// Sample rate of the samples.
    pub sample_rate: u32,
}

impl GenerateResult {
    /// Decodes the sample payload.
    pub fn decode_samples(&self) -> Result<Vec<f32>, EngineError> {
        let bytes = BASE64
            .decode(self.samples_b64.as_bytes())
            .map_err(|e| EngineError::protocol(format!("invalid sample payload: {e}")))?;
        if bytes.len() % 4 != 0 {
            return Err(EngineError::protocol(format!(
                "sample payload of {} bytes is not a whole number of f32 values",
                bytes.len()
            )));
        }
        Ok(bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }
}

/// Parameters of a `log` notification.
#[derive(Debug, Clone, Deserialize)]
pub struct LogParams {
    /// `debug`, `info`, `warning` or `error`.
    #[serde(default)]
    pub level: String,
    /// Log line.
    pub message: String,
}
