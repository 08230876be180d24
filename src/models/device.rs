//! Compute device selection
//!
//! Read once at initialization: a GPU index from the environment (or the
//! config file) selects CUDA when the runtime can provide it, otherwise CPU.

use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

/// Environment variable carrying the host-assigned GPU index
pub const GPU_ID_ENV: &str = "GPU_ID";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "index")]
pub enum Device {
    #[default]
    Cpu,
    Cuda(u32),
}

impl Device {
    /// Pure selection rule
    pub fn select(gpu_id: Option<u32>, cuda_available: bool) -> Self {
        match gpu_id {
            Some(id) if cuda_available => Device::Cuda(id),
            _ => Device::Cpu,
        }
    }

    /// Select a device, probing the runtime for CUDA support
    pub fn detect(gpu_id: Option<u32>) -> Self {
        let cuda_available = gpu_id.is_some() && cuda_available();
        let device = Self::select(gpu_id, cuda_available);
        if let (Some(id), Device::Cpu) = (gpu_id, device) {
            warn!("GPU {} requested but CUDA is unavailable, falling back to CPU", id);
        }
        info!("Selected compute device: {}", device);
        device
    }

    /// GPU index from `GPU_ID`, if set and numeric
    pub fn gpu_id_from_env() -> Option<u32> {
        gpu_id_from_var(std::env::var(GPU_ID_ENV).ok().as_deref())
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(id) => write!(f, "cuda:{}", id),
        }
    }
}

fn gpu_id_from_var(raw: Option<&str>) -> Option<u32> {
    let raw = raw?;
    let id = parse_gpu_id(raw);
    if id.is_none() {
        warn!("Ignoring non-numeric {}={:?}", GPU_ID_ENV, raw);
    }
    id
}

fn parse_gpu_id(raw: &str) -> Option<u32> {
    raw.trim().parse().ok()
}

#[cfg(feature = "cuda")]
fn cuda_available() -> bool {
    use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};

    CUDAExecutionProvider::default().is_available().unwrap_or(false)
}

#[cfg(not(feature = "cuda"))]
fn cuda_available() -> bool {
    false
}
