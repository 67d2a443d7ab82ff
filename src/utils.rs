/// Utility functions
use candle_core::Device;
use candle_nn::VarMap;

/// First CUDA device when available, CPU otherwise
pub fn select_device() -> crate::Result<Device> {
    let device = if candle_core::utils::cuda_is_available() {
        Device::new_cuda(0)?
    } else {
        Device::Cpu
    };
    Ok(device)
}

/// Total number of scalar parameters held by a VarMap
pub fn count_parameters(varmap: &VarMap) -> usize {
    varmap
        .all_vars()
        .iter()
        .map(|var| var.elem_count())
        .sum()
}
