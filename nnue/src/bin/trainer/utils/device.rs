use candle_core::Device;

/// Picks the first accelerator enabled at build time, falling back to the CPU.
pub fn get_device() -> candle_core::Result<Device> {
    #[cfg(feature = "cuda")]
    if let Ok(device) = Device::cuda_if_available(0) {
        if device.is_cuda() {
            return Ok(device);
        }
    }
    #[cfg(feature = "metal")]
    if let Ok(device) = Device::new_metal(0) {
        if device.is_metal() {
            return Ok(device);
        }
    }
    Ok(Device::Cpu)
}
