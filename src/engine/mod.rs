//! Production model runtime: each loaded model lives in its own Python worker.

pub mod error;
pub mod protocol;
pub mod worker;

pub use error::EngineError;

use crate::device::Device;
use crate::model::{GenerationRequest, LoadSpec, ModelLoader, ModelSource, SpeechModel};
use protocol::{
    GenerateParams, GenerateResult, HandshakeResult, LoadParams, LoadResult, METHOD_GENERATE,
    METHOD_HANDSHAKE, METHOD_LOAD,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use worker::{WorkerCommand, WorkerProcess};

/// Loads Chatterbox models into Python workers.
#[derive(Debug, Clone)]
pub struct ChatterboxLoader {
    python: String,
}

impl ChatterboxLoader {
    /// Loader using the given interpreter.
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
        }
    }

    fn command(&self, segmenter_home: Option<PathBuf>) -> WorkerCommand {
        WorkerCommand {
            python: self.python.clone(),
            segmenter_home,
        }
    }
}

fn handshake(worker: &mut WorkerProcess) -> Result<HandshakeResult, EngineError> {
    let value = worker.call(METHOD_HANDSHAKE, None)?;
    Ok(serde_json::from_value(value)?)
}

impl ModelLoader for ChatterboxLoader {
    fn resolve_device(&self, requested: Device) -> Result<Device, EngineError> {
        if !requested.is_accelerator() {
            return Ok(requested);
        }
        let mut checker = WorkerProcess::spawn(&self.command(None), "device-check")?;
        let info = handshake(&mut checker)?;
        tracing::info!(
            torch = %info.torch_version,
            cuda = info.cuda_available,
            mps = info.mps_available,
            "queried model runtime"
        );
        Ok(requested.or_cpu(info.supports(requested)))
    }

    fn load(&self, spec: &LoadSpec) -> Result<Arc<dyn SpeechModel>, EngineError> {
        let label = spec.model_type.as_str();
        let mut worker = WorkerProcess::spawn(&self.command(spec.segmenter_home.clone()), label)?;
        handshake(&mut worker)?;

        let (local_dir, repo_id) = match &spec.source {
            ModelSource::Local(dir) => (Some(dir.to_string_lossy().into_owned()), None),
            ModelSource::Remote(repo) => (None, Some(repo.clone())),
        };
        let params = LoadParams {
            model_type: spec.model_type,
            local_dir,
            repo_id,
            device: spec.device,
        };
        let params = serde_json::to_value(&params)?;
        let reply = worker.call(METHOD_LOAD, Some(params))?;
        let loaded: LoadResult = serde_json::from_value(reply)?;

        Ok(Arc::new(ChatterboxModel::new(loaded.sample_rate, worker)))
    }
}

/// A model resident in a worker process.
///
/// Calls are serialized per model; the worker holds one model and answers one
/// request at a time. Once the worker process is gone the model reports
/// itself dead and is never called again.
#[derive(Debug)]
pub struct ChatterboxModel {
    sample_rate: u32,
    worker: Mutex<WorkerProcess>,
    alive: AtomicBool,
}

impl ChatterboxModel {
    fn new(sample_rate: u32, worker: WorkerProcess) -> Self {
        Self {
            sample_rate,
            worker: Mutex::new(worker),
            alive: AtomicBool::new(true),
        }
    }
}

impl SpeechModel for ChatterboxModel {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn generate(&self, request: &GenerationRequest) -> Result<Vec<f32>, EngineError> {
        let params = serde_json::to_value(GenerateParams::from(request))?;
        let reply = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .call(METHOD_GENERATE, Some(params));
        let value = match reply {
            Err(e @ EngineError::ProcessExited { .. }) => {
                tracing::error!(error = %e, "model worker is gone");
                self.alive.store(false, Ordering::Release);
                return Err(e);
            }
            other => other?,
        };
        let result: GenerateResult = serde_json::from_value(value)?;
        if result.sample_rate != self.sample_rate {
            tracing::warn!(
                expected = self.sample_rate,
                got = result.sample_rate,
                "worker returned unexpected sample rate"
            );
        }
        result.decode_samples()
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}
