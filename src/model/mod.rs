//! Model types, the black-box model interface, and loaded model handles.
//!
//! The speech model itself is opaque: this crate only knows how to construct
//! one ([`ModelLoader`]), ask for its sample rate, and call
//! [`SpeechModel::generate`] once per request.

pub mod registry;

use crate::device::Device;
use crate::engine::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

pub use registry::{LoadedFlags, ModelRegistry, ModelSlot};

/// Repository id of the turbo model.
pub const TURBO_REPO_ID: &str = "ResembleAI/chatterbox-turbo";

/// Repository id of the multilingual model.
pub const MULTILINGUAL_REPO_ID: &str = "ResembleAI/chatterbox";

/// Model variant, which also selects the generation call shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    /// Fast English model; takes `top_k`.
    Turbo,
    /// Multilingual model; takes a language id.
    Multilingual,
}

impl ModelType {
    /// Every model type, in load order.
    pub const ALL: [ModelType; 2] = [ModelType::Turbo, ModelType::Multilingual];

    /// Wire name used in requests and health output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Turbo => "turbo",
            Self::Multilingual => "multilingual",
        }
    }

    /// Directory name below `MODELS_DIR` for offline deployments.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Turbo => "chatterbox-turbo",
            Self::Multilingual => "chatterbox",
        }
    }

    /// Default upstream repository id.
    pub fn default_repo_id(self) -> &'static str {
        match self {
            Self::Turbo => TURBO_REPO_ID,
            Self::Multilingual => MULTILINGUAL_REPO_ID,
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = String;

    /// Exact match only: `"Turbo"` or `" turbo"` are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "turbo" => Ok(Self::Turbo),
            "multilingual" => Ok(Self::Multilingual),
            other => Err(format!("unknown model type {other:?}")),
        }
    }
}

/// Where a model is constructed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// Flat directory of artifact files (offline mode).
    Local(PathBuf),
    /// Upstream repository id (online mode).
    Remote(String),
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(repo_id) => f.write_str(repo_id),
        }
    }
}

/// Everything a loader needs to construct one model.
#[derive(Debug, Clone)]
pub struct LoadSpec {
    /// Which variant to build.
    pub model_type: ModelType,
    /// Local directory or repository id.
    pub source: ModelSource,
    /// Resolved device.
    pub device: Device,
    /// Segmentation resource directory, resolved before any construction.
    pub segmenter_home: Option<PathBuf>,
}

/// Variant-specific generation parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum VariantParams {
    /// Turbo additionally samples with `top_k`.
    Turbo {
        /// Top-k sampling cutoff.
        top_k: u32,
    },
    /// Multilingual additionally needs the target language.
    Multilingual {
        /// Language code such as `"en"` or `"zh"`.
        language_id: String,
    },
}

/// A single call into [`SpeechModel::generate`].
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Text to speak.
    pub text: String,
    /// Staged reference clip for voice cloning.
    pub audio_prompt_path: PathBuf,
    /// Sampling temperature.
    pub temperature: f32,
    /// Nucleus sampling threshold.
    pub top_p: f32,
    /// Repetition penalty.
    pub repetition_penalty: f32,
    /// Variant-specific parameters.
    pub variant: VariantParams,
}

/// A loaded, ready-to-invoke speech model.
///
/// Implementations must be safe to call from several threads; any
/// serialization of concurrent calls is the implementation's own business.
pub trait SpeechModel: Send + Sync {
    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Synthesize mono `f32` samples. Blocking and compute-bound.
    ///
    /// # Errors
    ///
    /// Returns the model's own failure; callers never retry.
    fn generate(&self, request: &GenerationRequest) -> Result<Vec<f32>, EngineError>;

    /// Whether the model can still serve requests. Runtimes that live outside
    /// the process report `false` once they are gone.
    fn is_alive(&self) -> bool {
        true
    }
}

/// Constructs [`SpeechModel`]s.
pub trait ModelLoader: Send + Sync {
    /// Resolve the device to use, falling back to CPU when an accelerator is missing.
    ///
    /// # Errors
    ///
    /// Returns an error when the runtime cannot be queried at all.
    fn resolve_device(&self, requested: Device) -> Result<Device, EngineError> {
        Ok(requested)
    }

    /// Build a model. Blocking; may take minutes.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be constructed.
    fn load(&self, spec: &LoadSpec) -> Result<Arc<dyn SpeechModel>, EngineError>;
}

/// Shared reference to a loaded model plus its fixed attributes.
#[derive(Clone)]
pub struct ModelHandle {
    model_type: ModelType,
    device: Device,
    sample_rate: u32,
    model: Arc<dyn SpeechModel>,
}

impl ModelHandle {
    /// Wrap a freshly constructed model.
    pub fn new(model_type: ModelType, device: Device, model: Arc<dyn SpeechModel>) -> Self {
        Self {
            model_type,
            device,
            sample_rate: model.sample_rate(),
            model,
        }
    }

    /// Variant this handle serves.
    pub fn model_type(&self) -> ModelType {
        self.model_type
    }

    /// Device the model was placed on.
    pub fn device(&self) -> Device {
        self.device
    }

    /// Output sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Whether the underlying model can still serve.
    pub fn is_alive(&self) -> bool {
        self.model.is_alive()
    }

    /// Run one generation.
    ///
    /// # Errors
    ///
    /// Propagates the model's failure unchanged.
    pub fn generate(&self, request: &GenerationRequest) -> Result<Vec<f32>, EngineError> {
        self.model.generate(request)
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("model_type", &self.model_type)
            .field("device", &self.device)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

/// Local directory for `model_type` under `models_dir`.
pub fn local_model_dir(models_dir: &Path, model_type: ModelType) -> PathBuf {
    models_dir.join(model_type.dir_name())
}
