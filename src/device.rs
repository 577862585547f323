//! Compute device detection
//!
//! Picks where inference pipelines run, best first: a discrete CUDA GPU
//! (detected via nvidia-smi), an integrated Apple accelerator (CoreML on
//! Apple Silicon), then the CPU.

use serde::Serialize;
use std::process::Command;
use std::sync::OnceLock;

/// Cached detection result (hardware does not change while we run)
static DETECTED: OnceLock<ComputeDevice> = OnceLock::new();

/// Where a pipeline executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeDevice {
    /// Discrete NVIDIA GPU, by CUDA ordinal
    Cuda(u32),
    /// Apple Neural Engine / GPU via CoreML
    CoreMl,
    Cpu,
}

impl std::fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cuda(idx) => write!(f, "cuda:{}", idx),
            Self::CoreMl => write!(f, "coreml"),
            Self::Cpu => write!(f, "cpu"),
        }
    }
}

/// Indices of CUDA GPUs visible to this process, from nvidia-smi
fn detect_cuda_gpus() -> Vec<u32> {
    let output = Command::new("nvidia-smi")
        .args(["--query-gpu=index", "--format=csv,noheader"])
        .output();

    match output {
        Ok(output) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            parse_gpu_indices(&stdout)
        }
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::debug!(stderr = %stderr, "nvidia-smi failed, assuming no CUDA GPUs");
            Vec::new()
        }
        Err(e) => {
            tracing::debug!(error = %e, "nvidia-smi not available, assuming no CUDA GPUs");
            Vec::new()
        }
    }
}

fn parse_gpu_indices(stdout: &str) -> Vec<u32> {
    stdout
        .lines()
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .collect()
}

fn has_integrated_accelerator() -> bool {
    cfg!(all(target_os = "macos", target_arch = "aarch64"))
}

/// Choose the best device given what is present
fn select(cuda_gpus: &[u32], integrated: bool) -> ComputeDevice {
    if let Some(&first) = cuda_gpus.first() {
        ComputeDevice::Cuda(first)
    } else if integrated {
        ComputeDevice::CoreMl
    } else {
        ComputeDevice::Cpu
    }
}

/// Detect the best available device (call once at startup; cached)
pub fn detect() -> ComputeDevice {
    *DETECTED.get_or_init(|| {
        let gpus = detect_cuda_gpus();
        let device = select(&gpus, has_integrated_accelerator());
        tracing::info!(
            device = %device,
            cuda_gpus = ?gpus,
            "Selected compute device"
        );
        device
    })
}

/// Device for new pipelines, honouring the `use_gpu` switch
pub fn preferred(use_gpu: bool) -> ComputeDevice {
    if use_gpu { detect() } else { ComputeDevice::Cpu }
}
