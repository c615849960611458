use std::fmt;
use std::str::FromStr;

use candle_core::Device;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::error::EngineError;

/// Device requested in the settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// GPU if one is available, CPU otherwise
    #[default]
    Auto,
    Cpu,
    /// Require CUDA device 0
    #[serde(alias = "gpu")]
    Cuda,
}

impl FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(DevicePreference::Auto),
            "cpu" => Ok(DevicePreference::Cpu),
            "cuda" | "gpu" | "cuda:0" => Ok(DevicePreference::Cuda),
            other => Err(format!("Unknown device '{}'. Must be one of: auto, cpu, cuda", other)),
        }
    }
}

/// Where the weights ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Cpu,
    Gpu,
}

impl DeviceKind {
    pub fn of(device: &Device) -> Self {
        if device.is_cpu() {
            DeviceKind::Cpu
        } else {
            DeviceKind::Gpu
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Cpu => write!(f, "cpu"),
            DeviceKind::Gpu => write!(f, "gpu"),
        }
    }
}

/// Resolves the compute device for the model weights.
pub fn select_device(preference: DevicePreference) -> Result<Device, EngineError> {
    let device = match preference {
        DevicePreference::Cpu => Device::Cpu,
        DevicePreference::Auto => match Device::cuda_if_available(0) {
            Ok(device) => device,
            Err(e) => {
                warn!("CUDA unavailable, falling back to CPU: {}", e);
                Device::Cpu
            }
        },
        DevicePreference::Cuda => Device::new_cuda(0)
            .map_err(|e| EngineError::configuration(format!("Failed to initialize CUDA: {}", e)))?,
    };
    info!("Selected compute device: {}", DeviceKind::of(&device));
    Ok(device)
}
