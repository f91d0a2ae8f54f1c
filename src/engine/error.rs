//! Error types for the model runtime.

/// Errors raised while constructing or invoking a model.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Failed to spawn the worker process.
    #[error("failed to spawn model worker: {0}")]
    SpawnFailed(#[source] std::io::Error),

    /// JSON-RPC protocol violation.
    #[error("protocol error: {message}")]
    ProtocolError {
        /// Description of the violation.
        message: String,
    },

    /// Worker process exited unexpectedly.
    #[error("model worker exited unexpectedly (exit code: {exit_code:?})")]
    ProcessExited {
        /// Exit code, if available.
        exit_code: Option<i32>,
    },

    /// The model runtime reported a failure (load or generate).
    #[error("{message}")]
    Remote {
        /// Message reported by the runtime.
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[source] serde_json::Error),
}

impl EngineError {
    /// Shorthand for a protocol violation.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolError {
            message: message.into(),
        }
    }

    /// Shorthand for a runtime-reported failure.
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn display_spawn_failed() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "python3 not found");
        let err = EngineError::SpawnFailed(io_err);
        assert!(err.to_string().contains("failed to spawn model worker"));
        assert!(err.to_string().contains("python3 not found"));
    }

    #[test]
    fn display_process_exited() {
        let err = EngineError::ProcessExited { exit_code: Some(1) };
        assert!(err.to_string().contains("exit code: Some(1)"));
    }

    #[test]
    fn remote_message_is_verbatim() {
        let err = EngineError::remote("CUDA out of memory");
        assert_eq!(err.to_string(), "CUDA out of memory");
    }

    #[test]
    fn json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err = EngineError::from(json_err);
        assert!(err.to_string().contains("JSON error"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EngineError>();
    }
}
