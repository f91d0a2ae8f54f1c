//! Compute device selection for model execution.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Device a model runs on.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// Host CPU. Always available.
    #[default]
    Cpu,
    /// NVIDIA GPU via CUDA.
    Cuda,
    /// Apple Metal Performance Shaders.
    Mps,
}

impl Device {
    /// Returns `true` for accelerator devices that may be missing at runtime.
    pub fn is_accelerator(self) -> bool {
        !matches!(self, Self::Cpu)
    }

    /// Wire name understood by the model runtime.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
            Self::Mps => "mps",
        }
    }

    /// Falls back to [`Device::Cpu`] when an accelerator was requested but is unavailable.
    pub fn or_cpu(self, available: bool) -> Self {
        if self.is_accelerator() && !available {
            Self::Cpu
        } else {
            self
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda),
            "mps" | "metal" => Ok(Self::Mps),
            other => Err(format!(
                "unknown device {other:?} (expected cpu, cuda or mps)"
            )),
        }
    }
}
