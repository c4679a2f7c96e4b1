//! Headless device context and buffer-map error handling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

/// Global flag indicating the GPU device was lost
static GPU_DEVICE_LOST: AtomicBool = AtomicBool::new(false);

/// Check if the GPU device has been lost
pub fn is_device_lost() -> bool {
    GPU_DEVICE_LOST.load(Ordering::SeqCst)
}

/// Reset the device lost flag (call after recreating device)
pub fn reset_device_lost() {
    GPU_DEVICE_LOST.store(false, Ordering::SeqCst);
}

/// Device setup and buffer transfer failures.
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    #[error("failed to create GPU device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[error("buffer map failed: {0:?}")]
    BufferMap(wgpu::BufferAsyncError),

    #[error("buffer map channel disconnected")]
    ChannelDisconnected,

    #[error("GPU device lost")]
    DeviceLost,

    #[error("GPU backend used before prepare()")]
    NotPrepared,

    #[error("{0} invocations exceed the device dispatch limit")]
    DispatchLimit(usize),

    #[error("pending momentum at site {site} exceeds the fixed-point deposit range")]
    FixedPointOverflow { site: usize },
}

impl From<GpuError> for lbm3d::LbError {
    fn from(e: GpuError) -> Self {
        lbm3d::LbError::Backend(e.to_string())
    }
}

/// Wait for a buffer map operation to complete.
pub fn await_buffer_map(
    rx: std::sync::mpsc::Receiver<Result<(), wgpu::BufferAsyncError>>,
) -> Result<(), GpuError> {
    if is_device_lost() {
        return Err(GpuError::DeviceLost);
    }
    match rx.recv() {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            log::error!("Buffer map failed: {:?}", e);
            Err(GpuError::BufferMap(e))
        }
        Err(_) => {
            log::error!("Buffer map channel disconnected - possible device lost");
            GPU_DEVICE_LOST.store(true, Ordering::SeqCst);
            Err(GpuError::ChannelDisconnected)
        }
    }
}

/// Compute-only device and queue.
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub adapter_info: wgpu::AdapterInfo,
}

impl GpuContext {
    /// Open the first high-performance adapter without a surface.
    pub async fn new() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let adapter_info = adapter.get_info();
        log::info!("Using GPU: {:?}", adapter_info);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("LB Compute Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        device.on_uncaptured_error(Box::new(|error| {
            log::error!("GPU uncaptured error: {:?}", error);
            if matches!(error, wgpu::Error::OutOfMemory { .. }) {
                GPU_DEVICE_LOST.store(true, Ordering::SeqCst);
            }
        }));

        // Fresh device
        reset_device_lost();

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_info,
        })
    }

    /// Blocking variant of [`GpuContext::new`].
    pub fn new_blocking() -> Result<Self, GpuError> {
        pollster::block_on(Self::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_error_converts_to_backend_error() {
        let e: lbm3d::LbError = GpuError::NoAdapter.into();
        match e {
            lbm3d::LbError::Backend(msg) => assert!(msg.contains("adapter")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_disconnected_channel_marks_device_lost() {
        let (tx, rx) = std::sync::mpsc::channel::<Result<(), wgpu::BufferAsyncError>>();
        drop(tx);
        reset_device_lost();
        assert!(matches!(await_buffer_map(rx), Err(GpuError::ChannelDisconnected)));
        assert!(is_device_lost());

        let (_tx, rx) = std::sync::mpsc::channel();
        assert!(matches!(await_buffer_map(rx), Err(GpuError::DeviceLost)));
        reset_device_lost();
    }
}
