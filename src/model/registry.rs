//! Process-wide table of loaded models, keyed by model type.
//!
//! ```text
//! Pending → Loading → Ready
//!              ↓
//!         Unavailable
//! ```

use super::{ModelHandle, ModelType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

/// Lifecycle state of one registry slot.
#[derive(Debug, Clone)]
pub enum ModelSlot {
    /// Startup has not reached this model yet.
    Pending,
    /// Construction is in progress.
    Loading,
    /// Loaded and serving requests.
    Ready(ModelHandle),
    /// Skipped (e.g. missing local directory). Carries the reason.
    Unavailable(String),
}

impl ModelSlot {
    /// Short state label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Loading => "loading",
            Self::Ready(_) => "ready",
            Self::Unavailable(_) => "unavailable",
        }
    }
}

/// Per-model-type "loaded" flags reported by `/` and `/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadedFlags {
    /// Turbo model ready.
    pub turbo: bool,
    /// Multilingual model ready.
    pub multilingual: bool,
}

/// Registry of model slots.
///
/// Written only during startup; every request reads it.
#[derive(Debug)]
pub struct ModelRegistry {
    slots: RwLock<BTreeMap<ModelType, ModelSlot>>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry {
    /// Create a registry with every slot `Pending`.
    pub fn new() -> Self {
        let slots = ModelType::ALL
            .into_iter()
            .map(|ty| (ty, ModelSlot::Pending))
            .collect();
        Self {
            slots: RwLock::new(slots),
        }
    }

    /// Mark `model_type` as being constructed.
    pub fn mark_loading(&self, model_type: ModelType) {
        self.set(model_type, ModelSlot::Loading);
    }

    /// Mark `model_type` as skipped.
    pub fn mark_unavailable(&self, model_type: ModelType, reason: impl Into<String>) {
        self.set(model_type, ModelSlot::Unavailable(reason.into()));
    }

    /// Install a loaded handle in its model type's slot.
    pub fn install(&self, handle: ModelHandle) {
        self.set(handle.model_type(), ModelSlot::Ready(handle));
    }

    /// Current state of a slot.
    ///
    /// A ready handle whose model can no longer serve is retired to
    /// `Unavailable` here, so readers never see a dead model as loaded.
    pub fn slot(&self, model_type: ModelType) -> ModelSlot {
        let slot = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&model_type)
            .cloned()
            .unwrap_or(ModelSlot::Pending);
        match slot {
            ModelSlot::Ready(handle) if !handle.is_alive() => {
                tracing::warn!(
                    model_type = %model_type,
                    "model runtime is gone, marking unavailable"
                );
                let retired = ModelSlot::Unavailable(format!("{model_type} model runtime exited"));
                self.set(model_type, retired.clone());
                retired
            }
            slot => slot,
        }
    }

    /// The handle for `model_type`, if it is ready.
    pub fn get(&self, model_type: ModelType) -> Option<ModelHandle> {
        match self.slot(model_type) {
            ModelSlot::Ready(handle) => Some(handle),
            _ => None,
        }
    }

    /// Returns `true` if `model_type` is ready.
    pub fn is_loaded(&self, model_type: ModelType) -> bool {
        matches!(self.slot(model_type), ModelSlot::Ready(_))
    }

    /// Loaded flags for every model type.
    pub fn loaded_flags(&self) -> LoadedFlags {
        LoadedFlags {
            turbo: self.is_loaded(ModelType::Turbo),
            multilingual: self.is_loaded(ModelType::Multilingual),
        }
    }

    fn set(&self, model_type: ModelType, slot: ModelSlot) {
        tracing::debug!(model_type = %model_type, state = slot.label(), "model slot transition");
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(model_type, slot);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::device::Device;
    use crate::engine::EngineError;
    use crate::model::{GenerationRequest, SpeechModel};
    use std::sync::Arc;

    struct Fixed(u32);

    impl SpeechModel for Fixed {
        fn sample_rate(&self) -> u32 {
            self.0
        }

        fn generate(&self, _request: &GenerationRequest) -> Result<Vec<f32>, EngineError> {
            Ok(Vec::new())
        }
    }

    struct Crashed;

    impl SpeechModel for Crashed {
        fn sample_rate(&self) -> u32 {
            24_000
        }

        fn generate(&self, _request: &GenerationRequest) -> Result<Vec<f32>, EngineError> {
            Err(EngineError::ProcessExited { exit_code: Some(1) })
        }

        fn is_alive(&self) -> bool {
            false
        }
    }

    fn handle(ty: ModelType, sr: u32) -> ModelHandle {
        ModelHandle::new(ty, Device::Cpu, Arc::new(Fixed(sr)))
    }

    #[test]
    fn new_registry_has_nothing_loaded() {
        let registry = ModelRegistry::new();
        assert_eq!(
            registry.loaded_flags(),
            LoadedFlags {
                turbo: false,
                multilingual: false
            }
        );
        assert!(matches!(registry.slot(ModelType::Turbo), ModelSlot::Pending));
        assert!(registry.get(ModelType::Multilingual).is_none());
    }

    #[test]
    fn loading_is_not_loaded() {
        let registry = ModelRegistry::new();
        registry.mark_loading(ModelType::Turbo);
        assert!(!registry.is_loaded(ModelType::Turbo));
        assert_eq!(registry.slot(ModelType::Turbo).label(), "loading");
    }

    #[test]
    fn install_makes_handle_available() {
        let registry = ModelRegistry::new();
        registry.install(handle(ModelType::Multilingual, 24_000));
        assert!(registry.is_loaded(ModelType::Multilingual));
        assert!(!registry.is_loaded(ModelType::Turbo));
        assert_eq!(
            registry.get(ModelType::Multilingual).unwrap().sample_rate(),
            24_000
        );
    }

    #[test]
    fn unavailable_keeps_reason() {
        let registry = ModelRegistry::new();
        registry.mark_unavailable(ModelType::Turbo, "directory missing");
        match registry.slot(ModelType::Turbo) {
            ModelSlot::Unavailable(reason) => assert_eq!(reason, "directory missing"),
            other => panic!("unexpected slot {}", other.label()),
        }
        assert!(registry.get(ModelType::Turbo).is_none());
    }

    #[test]
    fn flags_serialize_by_model_name() {
        let registry = ModelRegistry::new();
        registry.install(handle(ModelType::Turbo, 24_000));
        let json = serde_json::to_value(registry.loaded_flags()).unwrap();
        assert_eq!(json["turbo"], true);
        assert_eq!(json["multilingual"], false);
    }

    #[test]
    fn dead_model_is_retired() {
        let registry = ModelRegistry::new();
        registry.install(ModelHandle::new(ModelType::Turbo, Device::Cpu, Arc::new(Crashed)));

        assert!(registry.get(ModelType::Turbo).is_none());
        assert!(!registry.loaded_flags().turbo);
        match registry.slot(ModelType::Turbo) {
            ModelSlot::Unavailable(reason) => assert!(reason.contains("exited")),
            other => panic!("unexpected slot {}", other.label()),
        }
    }
}
