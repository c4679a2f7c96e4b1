//! Compute pipeline builder.
//!
//! Collects buffer bindings in order (binding 0, 1, ...) and creates the
//! shader module, bind group layout and pipeline in one go:
//!
//! ```ignore
//! let (pipeline, layout) = PipelineBuilder::new(device, include_str!("shaders/stream.wgsl"))
//!     .label("LB Stream")
//!     .entry_point("stream")
//!     .uniform_buffer_size(std::mem::size_of::<LatticeParams>() as u64)
//!     .storage_buffer(true)   // source populations
//!     .storage_buffer(false)  // target populations
//!     .build();
//! ```

use std::num::NonZeroU64;

/// Builder for GPU compute pipelines.
pub struct PipelineBuilder<'a> {
    device: &'a wgpu::Device,
    shader_source: &'a str,
    label: &'a str,
    entry_point: &'a str,
    bindings: Vec<BufferBinding>,
}

/// Specification for a single buffer binding.
#[derive(Clone, Debug, PartialEq)]
enum BufferBinding {
    Uniform(Option<NonZeroU64>),
    Storage { read_only: bool },
}

impl BufferBinding {
    fn layout_entry(&self, binding: u32) -> wgpu::BindGroupLayoutEntry {
        let ty = match self {
            BufferBinding::Uniform(min_size) => wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: *min_size,
            },
            BufferBinding::Storage { read_only } => wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage {
                    read_only: *read_only,
                },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
        };
        wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty,
            count: None,
        }
    }
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(device: &'a wgpu::Device, shader_source: &'a str) -> Self {
        Self {
            device,
            shader_source,
            label: "LB Pipeline",
            entry_point: "main",
            bindings: Vec::new(),
        }
    }

    /// Label used for the shader, layouts and pipeline.
    pub fn label(mut self, label: &'a str) -> Self {
        self.label = label;
        self
    }

    /// Entry point function name (default: "main").
    pub fn entry_point(mut self, entry_point: &'a str) -> Self {
        self.entry_point = entry_point;
        self
    }

    /// Add a uniform buffer binding with explicit size.
    pub fn uniform_buffer_size(mut self, size: u64) -> Self {
        self.bindings.push(BufferBinding::Uniform(NonZeroU64::new(size)));
        self
    }

    /// Add a storage buffer binding.
    pub fn storage_buffer(mut self, read_only: bool) -> Self {
        self.bindings.push(BufferBinding::Storage { read_only });
        self
    }

    /// Build the compute pipeline and its bind group layout.
    pub fn build(self) -> (wgpu::ComputePipeline, wgpu::BindGroupLayout) {
        let shader = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(self.label),
            source: wgpu::ShaderSource::Wgsl(self.shader_source.into()),
        });

        let entries: Vec<wgpu::BindGroupLayoutEntry> = self
            .bindings
            .iter()
            .enumerate()
            .map(|(binding, spec)| spec.layout_entry(binding as u32))
            .collect();

        let layout_label = format!("{} Bind Group Layout", self.label);
        let bind_group_layout =
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(&layout_label),
                    entries: &entries,
                });

        let pipeline_layout_label = format!("{} Pipeline Layout", self.label);
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&pipeline_layout_label),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(self.label),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some(self.entry_point),
                compilation_options: Default::default(),
                cache: None,
            });

        (pipeline, bind_group_layout)
    }
}

/// Bind group over `buffers` in binding order.
pub fn bind_buffers(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::BindGroupLayout,
    buffers: &[&wgpu::Buffer],
) -> wgpu::BindGroup {
    let entries: Vec<wgpu::BindGroupEntry> = buffers
        .iter()
        .enumerate()
        .map(|(binding, buffer)| wgpu::BindGroupEntry {
            binding: binding as u32,
            resource: buffer.as_entire_binding(),
        })
        .collect();
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &entries,
    })
}

/// Workgroups needed to cover `count` invocations.
#[inline]
pub fn workgroups(count: u32, workgroup_size: u32) -> u32 {
    count.div_ceil(workgroup_size).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_entries_follow_binding_order() {
        let uniform = BufferBinding::Uniform(NonZeroU64::new(64)).layout_entry(0);
        let storage = BufferBinding::Storage { read_only: true }.layout_entry(3);
        assert_eq!(uniform.binding, 0);
        assert_eq!(storage.binding, 3);
        assert!(matches!(
            storage.ty,
            wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                ..
            }
        ));
    }

    #[test]
    fn test_workgroups_round_up() {
        assert_eq!(workgroups(0, 64), 1);
        assert_eq!(workgroups(64, 64), 1);
        assert_eq!(workgroups(65, 64), 2);
    }
}
