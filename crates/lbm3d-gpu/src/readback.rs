//! Blocking readback of device buffers through staging buffers.

use std::sync::mpsc;

use bytemuck::Pod;

use crate::context::{await_buffer_map, GpuError};

/// A mappable copy target sized for one device buffer.
pub(crate) struct StagingBuffer {
    buffer: wgpu::Buffer,
    size: u64,
}

impl StagingBuffer {
    pub fn new(device: &wgpu::Device, label: &str, size: u64) -> Self {
        Self {
            buffer: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            size,
        }
    }

    /// Record a copy of the first `size` bytes of `src`.
    pub fn copy_from(&self, encoder: &mut wgpu::CommandEncoder, src: &wgpu::Buffer) {
        encoder.copy_buffer_to_buffer(src, 0, &self.buffer, 0, self.size);
    }

    /// Map, wait, and copy out the contents.
    ///
    /// The copy must already be submitted.
    pub fn read<T: Pod>(&self, device: &wgpu::Device) -> Result<Vec<T>, GpuError> {
        let slice = self.buffer.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device.poll(wgpu::Maintain::Wait);
        await_buffer_map(rx)?;

        let out = {
            let data = slice.get_mapped_range();
            bytemuck::cast_slice::<u8, T>(&data).to_vec()
        };
        self.buffer.unmap();
        Ok(out)
    }
}
