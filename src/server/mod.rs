//! HTTP API for speech synthesis.
//!
//! ## Endpoints
//!
//! - `GET /`: service metadata and per-model loaded flags
//! - `GET /health`: health status and per-model loaded flags
//! - `POST /api/v1/tts`: multipart form fields plus `audio_file`, returns WAV
//! - `POST /api/v1/tts/json`: multipart `request` (JSON) plus `audio_file`, returns WAV

pub mod body;
pub mod error;
pub mod form;
pub mod handlers;

pub use error::{ApiError, ErrorBody};
pub use handlers::{HealthInfo, ServiceInfo};

use crate::config::ServerConfig;
use crate::context::ServiceContext;
use crate::error::{Result, ServiceError};
use axum::Router;
use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::Request;
use axum::routing::{get, post};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

/// Build the application router.
pub fn router(ctx: Arc<ServiceContext>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/api/v1/tts", post(handlers::tts))
        .route("/api/v1/tts/json", post(handlers::tts_json))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    id = %Uuid::new_v4(),
                    method = %req.method(),
                    uri = %req.uri(),
                )
            }),
        )
        .with_state(ctx)
}

/// A running synthesis server.
pub struct TtsServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl TtsServer {
    /// Bind `{config.host}:{config.port}` (port `0` for auto-assign) and serve
    /// in a background task.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind.
    pub async fn start(ctx: Arc<ServiceContext>, config: &ServerConfig) -> Result<Self> {
        let app = router(ctx, config.max_upload_bytes);

        let bind_addr = config.bind_addr();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| ServiceError::Config(format!("failed to bind {bind_addr}: {e}")))?;
        let addr = listener.local_addr()?;

        info!("TTS server listening on http://{addr}");

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("TTS server error: {e}");
            }
        });

        Ok(Self { addr, handle })
    }

    /// Address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Abort the server task.
    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for TtsServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
