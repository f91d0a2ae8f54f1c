//! Startup: resolve the device and segmenter resources, then load every model.
//!
//! Loading is blocking and may take minutes per model, so each construction
//! runs on the blocking pool. The registry records progress per model type.

use crate::config::ModelsConfig;
use crate::device::Device;
use crate::error::{Result, ServiceError};
use crate::model::{
    LoadSpec, ModelHandle, ModelLoader, ModelRegistry, ModelSource, ModelType, local_model_dir,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Directory name of the segmentation resources below `models_dir`.
pub const SEGMENTER_DIR: &str = "pkuseg";

/// Ask the loader which device to use, falling back to CPU on any problem.
pub async fn resolve_device(loader: Arc<dyn ModelLoader>, requested: Device) -> Device {
    let detected = tokio::task::spawn_blocking(move || loader.resolve_device(requested)).await;
    let resolved = match detected {
        Ok(Ok(device)) => device,
        Ok(Err(e)) => {
            warn!(requested = %requested, error = %e, "device check failed, using cpu");
            Device::Cpu
        }
        Err(e) => {
            warn!(requested = %requested, error = %e, "device check panicked, using cpu");
            Device::Cpu
        }
    };
    if resolved != requested {
        warn!(
            requested = %requested,
            resolved = %resolved,
            "requested device unavailable, falling back"
        );
    }
    resolved
}

/// Locate the segmentation resources.
///
/// `pkuseg_home` wins; otherwise `models_dir/pkuseg` is used when it exists.
/// Only derived in offline mode.
pub fn resolve_segmenter_home(models: &ModelsConfig) -> Option<PathBuf> {
    if let Some(home) = &models.pkuseg_home {
        info!(path = %home.display(), "using configured PKUSEG_HOME");
        return Some(home.clone());
    }
    if !models.use_local_models {
        return None;
    }
    let dir = models.models_dir.join(SEGMENTER_DIR);
    if dir.is_dir() {
        let dir = std::path::absolute(&dir).unwrap_or(dir);
        info!(path = %dir.display(), "derived PKUSEG_HOME from models directory");
        Some(dir)
    } else {
        warn!(
            path = %dir.display(),
            "segmenter resources not found; Chinese word segmentation may be degraded \
             (run chatterbox-package to stage them)"
        );
        None
    }
}

fn source_for(models: &ModelsConfig, model_type: ModelType) -> Option<ModelSource> {
    if models.use_local_models {
        let dir = local_model_dir(&models.models_dir, model_type);
        return dir.is_dir().then_some(ModelSource::Local(dir));
    }
    let repo_id = match model_type {
        ModelType::Turbo => &models.turbo_repo_id,
        ModelType::Multilingual => &models.multilingual_repo_id,
    };
    Some(ModelSource::Remote(repo_id.clone()))
}

/// Load every model type into `registry`.
///
/// A missing local directory leaves that model unavailable; a failed
/// construction aborts startup.
///
/// # Errors
///
/// Returns [`ServiceError::Model`] for the first model that fails to load.
pub async fn load_models(
    models: &ModelsConfig,
    loader: Arc<dyn ModelLoader>,
    registry: &ModelRegistry,
    device: Device,
) -> Result<()> {
    let segmenter_home = resolve_segmenter_home(models);

    info!(
        device = %device,
        local = models.use_local_models,
        models_dir = %models.models_dir.display(),
        "loading models"
    );

    for model_type in ModelType::ALL {
        let Some(source) = source_for(models, model_type) else {
            let dir = local_model_dir(&models.models_dir, model_type);
            warn!(
                model_type = %model_type,
                path = %dir.display(),
                "model directory missing, skipping"
            );
            registry.mark_unavailable(
                model_type,
                format!("model directory {} does not exist", dir.display()),
            );
            continue;
        };

        registry.mark_loading(model_type);
        info!(model_type = %model_type, source = %source, "loading model");
        let started = Instant::now();

        let spec = LoadSpec {
            model_type,
            source: source.clone(),
            device,
            segmenter_home: segmenter_home.clone(),
        };
        let task_loader = Arc::clone(&loader);
        let model = tokio::task::spawn_blocking(move || task_loader.load(&spec))
            .await
            .map_err(|e| ServiceError::Model(format!("{model_type} load task failed: {e}")))?
            .map_err(|e| {
                ServiceError::Model(format!("failed to load {model_type} model from {source}: {e}"))
            })?;

        let handle = ModelHandle::new(model_type, device, model);
        info!(
            model_type = %model_type,
            sample_rate = handle.sample_rate(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "model loaded"
        );
        registry.install(handle);
    }

    let flags = registry.loaded_flags();
    info!(turbo = flags.turbo, multilingual = flags.multilingual, "startup complete");
    Ok(())
}
