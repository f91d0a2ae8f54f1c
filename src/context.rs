//! Shared state handed to every request handler.

use crate::device::Device;
use crate::model::ModelRegistry;
use crate::synthesis::Synthesizer;
use std::sync::Arc;

/// Service name reported by `GET /`.
pub const SERVICE_NAME: &str = "Chatterbox TTS API";

/// Service version reported by `GET /`.
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything a request needs: loaded models, device, and the synthesizer.
#[derive(Debug, Clone)]
pub struct ServiceContext {
    registry: Arc<ModelRegistry>,
    device: Device,
    synthesizer: Synthesizer,
}

impl ServiceContext {
    /// Bundle the shared state.
    pub fn new(registry: Arc<ModelRegistry>, device: Device, synthesizer: Synthesizer) -> Self {
        Self {
            registry,
            device,
            synthesizer,
        }
    }

    /// Model registry.
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Resolved device.
    pub fn device(&self) -> Device {
        self.device
    }

    /// Synthesis dispatcher.
    pub fn synthesizer(&self) -> &Synthesizer {
        &self.synthesizer
    }
}
