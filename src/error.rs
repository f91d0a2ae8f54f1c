//! Error types for the synthesis service.

/// Top-level error type for request handling and model lifecycle.
///
/// The first three variants are the request-facing taxonomy; the HTTP layer
/// maps them to 400, 503 and 500 respectively. The remaining variants only
/// occur during startup or in tooling.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Client-correctable problem with the request (bad text, model type, audio, parameters).
    #[error("{0}")]
    InvalidInput(String),

    /// The requested model type has no loaded handle.
    #[error("{0}")]
    ServiceUnavailable(String),

    /// The model's generation call failed.
    #[error("speech generation failed: {0}")]
    GenerationFailed(String),

    /// Model construction failed during startup.
    #[error("model error: {0}")]
    Model(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    /// Shorthand for [`ServiceError::InvalidInput`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ServiceError>;
