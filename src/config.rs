//! Configuration types for the synthesis service.
//!
//! Values come from three layers, later layers winning: built-in defaults, an
//! optional TOML file, and environment variables (`DEVICE`, `MODELS_DIR`,
//! `PKUSEG_HOME`, `HOST`, `PORT`, ...).

use crate::device::Device;
use crate::error::{Result, ServiceError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP listener settings.
    pub server: ServerConfig,
    /// Model location and loading settings.
    pub models: ModelsConfig,
    /// Model runtime (Python worker) settings.
    pub engine: EngineConfig,
    /// Request processing settings.
    pub synthesis: SynthesisConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` for auto-assign).
    pub port: u16,
    /// Largest accepted request body in bytes.
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    /// `host:port` string for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 8000,
            max_upload_bytes: 32 * 1024 * 1024,
        }
    }
}

/// Model location configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Base directory holding `chatterbox-turbo/`, `chatterbox/` and `pkuseg/`.
    pub models_dir: PathBuf,
    /// Load from `models_dir` (offline) instead of fetching by repository id.
    pub use_local_models: bool,
    /// Requested device; accelerators fall back to CPU when unavailable.
    pub device: Device,
    /// Explicit segmentation resource location (`PKUSEG_HOME`).
    pub pkuseg_home: Option<PathBuf>,
    /// Repository id of the turbo model.
    pub turbo_repo_id: String,
    /// Repository id of the multilingual model.
    pub multilingual_repo_id: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("./models"),
            use_local_models: true,
            device: Device::Cpu,
            pkuseg_home: None,
            turbo_repo_id: crate::model::TURBO_REPO_ID.to_owned(),
            multilingual_repo_id: crate::model::MULTILINGUAL_REPO_ID.to_owned(),
        }
    }
}

/// Model runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Python interpreter with the `chatterbox` package installed.
    pub python: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_owned(),
        }
    }
}

/// Request processing configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Directory for staged uploads and generated audio (None = system temp dir).
    pub scratch_dir: Option<PathBuf>,
    /// Upper bound on in-flight generations (`0` = unbounded).
    pub max_concurrent: usize,
}

impl ServiceConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ServiceError::Config(e.to_string()))
    }

    /// Apply overrides from a variable lookup (normally [`std::env::var`]).
    ///
    /// Empty values are treated as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Config`] naming the offending variable.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = get("HOST") {
            self.server.host = host;
        }
        if let Some(port) = get("PORT") {
            self.server.port = parse_var("PORT", &port)?;
        }
        if let Some(limit) = get("MAX_UPLOAD_BYTES") {
            self.server.max_upload_bytes = parse_var("MAX_UPLOAD_BYTES", &limit)?;
        }
        if let Some(dir) = get("MODELS_DIR") {
            self.models.models_dir = PathBuf::from(dir);
        }
        if let Some(flag) = get("USE_LOCAL_MODELS") {
            self.models.use_local_models = parse_flag("USE_LOCAL_MODELS", &flag)?;
        }
        if let Some(device) = get("DEVICE") {
            self.models.device = device
                .parse()
                .map_err(|e| ServiceError::Config(format!("DEVICE: {e}")))?;
        }
        if let Some(home) = get("PKUSEG_HOME") {
            self.models.pkuseg_home = Some(PathBuf::from(home));
        }
        if let Some(python) = get("CHATTERBOX_PYTHON") {
            self.engine.python = python;
        }
        if let Some(dir) = get("SCRATCH_DIR") {
            self.synthesis.scratch_dir = Some(PathBuf::from(dir));
        }
        if let Some(limit) = get("MAX_CONCURRENT_SYNTHESIS") {
            self.synthesis.max_concurrent = parse_var("MAX_CONCURRENT_SYNTHESIS", &limit)?;
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ServiceError::Config(format!("{key}={value:?}: {e}")))
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ServiceError::Config(format!(
            "{key}={value:?}: expected true or false"
        ))),
    }
}
