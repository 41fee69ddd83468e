//! Compute context: the device and dtype every tensor of a dream run lives on

use candle_core::{DType, Device};
use tracing::info;

/// Explicit device placement passed into the network and gradient extractor.
#[derive(Debug, Clone)]
pub struct ComputeContext {
    device: Device,
    dtype: DType,
}

impl ComputeContext {
    /// Host-only context
    pub fn cpu() -> Self {
        Self {
            device: Device::Cpu,
            dtype: DType::F32,
        }
    }

    /// CUDA if available, CPU otherwise
    pub fn auto() -> Self {
        Self::with_device(None)
    }

    /// Explicit device choice (None = auto-detect)
    pub fn with_device(force_cpu: Option<bool>) -> Self {
        if force_cpu == Some(true) {
            info!("Forcing CPU mode");
            return Self::cpu();
        }
        match Device::cuda_if_available(0) {
            Ok(device) if device.is_cuda() => {
                info!("Using CUDA device");
                // Gradient ascent accumulates tiny steps; half precision loses them.
                Self {
                    device,
                    dtype: DType::F32,
                }
            }
            _ => {
                info!("CUDA not available, using CPU");
                Self::cpu()
            }
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn is_accelerated(&self) -> bool {
        !self.device.is_cpu()
    }
}

impl Default for ComputeContext {
    fn default() -> Self {
        Self::cpu()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forced_cpu() {
        let ctx = ComputeContext::with_device(Some(true));
        assert!(ctx.device().is_cpu());
        assert_eq!(ctx.dtype(), DType::F32);
        assert!(!ctx.is_accelerated());
    }
}
