//! Route handlers.

use super::body::wav_response;
use super::error::ApiError;
use super::form::{read_form, read_json_form};
use crate::context::{SERVICE_NAME, SERVICE_VERSION, ServiceContext};
use crate::device::Device;
use crate::model::LoadedFlags;
use crate::validate::{SynthesisRequest, validate};
use axum::Json;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::response::Response;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Body of `GET /`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Service name.
    pub name: String,
    /// Service version.
    pub version: String,
    /// Always `"running"`.
    pub status: String,
    /// Resolved device.
    pub device: Device,
    /// Which models are ready.
    pub models_loaded: LoadedFlags,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthInfo {
    /// Always `"healthy"`.
    pub status: String,
    /// Resolved device.
    pub device: Device,
    /// Which models are ready.
    pub models_loaded: LoadedFlags,
}

pub(super) async fn root(State(ctx): State<Arc<ServiceContext>>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: SERVICE_NAME.to_owned(),
        version: SERVICE_VERSION.to_owned(),
        status: "running".to_owned(),
        device: ctx.device(),
        models_loaded: ctx.registry().loaded_flags(),
    })
}

pub(super) async fn health(State(ctx): State<Arc<ServiceContext>>) -> Json<HealthInfo> {
    Json(HealthInfo {
        status: "healthy".to_owned(),
        device: ctx.device(),
        models_loaded: ctx.registry().loaded_flags(),
    })
}

pub(super) async fn tts(
    State(ctx): State<Arc<ServiceContext>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let request = read_form(multipart?).await?;
    synthesize(&ctx, request).await
}

pub(super) async fn tts_json(
    State(ctx): State<Arc<ServiceContext>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let request = read_json_form(multipart?).await?;
    synthesize(&ctx, request).await
}

async fn synthesize(ctx: &ServiceContext, request: SynthesisRequest) -> Result<Response, ApiError> {
    let handle = validate(&request, ctx.registry())?;
    info!(
        model_type = %handle.model_type(),
        chars = request.text.chars().count(),
        audio_bytes = request.audio.len(),
        "synthesis request accepted"
    );

    let output = ctx.synthesizer().synthesize(&request, handle).await?;
    info!(
        sample_rate = output.sample_rate,
        samples = output.samples,
        "synthesis complete, streaming response"
    );
    wav_response(output).await
}
