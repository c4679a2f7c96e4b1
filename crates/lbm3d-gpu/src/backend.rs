//! wgpu implementation of [`lbm3d::Backend`].
//!
//! Populations live in two device buffers used in ping-pong order. Pending
//! momentum is held as fixed-point `i32` per site and axis so that particle
//! deposits can use `atomicAdd`.
//!
//! Host synchronisation:
//! - before any kernel, the host lattice is uploaded if its revision moved
//!   since the backend last synchronised;
//! - `collide` clears the host's pending forces (the device consumed them);
//! - `stream` reads the new populations back, plus the populations reflected
//!   at boundary links for the force report;
//! - `couple` reads back particle forces and the pending momentum.
//!
//! Between `collide` and `stream` the host populations lag the device.
//!
//! Stencils and thermostat noise are computed on the host with the same
//! code as the CPU backend; the device gathers fluid velocity, computes the
//! forces and scatters the reaction.

use lbm3d::coupling::CouplingOutcome;
use lbm3d::kernels::trilinear_stencil;
use lbm3d::streaming::StreamReport;
use lbm3d::{
    Backend, BoundaryMask, CouplingError, DVec3, Lattice, ParticleState, Result, Thermostat,
};
use wgpu::util::DeviceExt;

use crate::context::{GpuContext, GpuError};
use crate::params::{
    fits_fixed, from_fixed, to_fixed, CoupleParams, GpuParticle, LatticeParams, WORKGROUP_SIZE,
};
use crate::pipeline_builder::{bind_buffers, workgroups, PipelineBuilder};
use crate::readback::StagingBuffer;

const Q: usize = lbm3d::constants::Q;

/// Compiled pipelines, independent of grid size.
struct Pipelines {
    collide: wgpu::ComputePipeline,
    collide_layout: wgpu::BindGroupLayout,
    stream: wgpu::ComputePipeline,
    stream_layout: wgpu::BindGroupLayout,
    links: wgpu::ComputePipeline,
    links_layout: wgpu::BindGroupLayout,
    couple: wgpu::ComputePipeline,
    couple_layout: wgpu::BindGroupLayout,
}

impl Pipelines {
    fn new(device: &wgpu::Device) -> Self {
        let lattice_params = std::mem::size_of::<LatticeParams>() as u64;

        let (collide, collide_layout) =
            PipelineBuilder::new(device, include_str!("shaders/collide.wgsl"))
                .label("LB Collide")
                .entry_point("collide")
                .uniform_buffer_size(lattice_params)
                .storage_buffer(false) // populations
                .storage_buffer(false) // momentum source
                .storage_buffer(true) // classes
                .build();

        let (stream, stream_layout) =
            PipelineBuilder::new(device, include_str!("shaders/stream.wgsl"))
                .label("LB Stream")
                .entry_point("stream")
                .uniform_buffer_size(lattice_params)
                .storage_buffer(true) // source populations
                .storage_buffer(false) // target populations
                .storage_buffer(true) // classes
                .storage_buffer(true) // blocked links
                .build();

        let (links, links_layout) =
            PipelineBuilder::new(device, include_str!("shaders/links.wgsl"))
                .label("LB Boundary Links")
                .entry_point("gather_links")
                .uniform_buffer_size(lattice_params)
                .storage_buffer(true) // source populations
                .storage_buffer(true) // link slots
                .storage_buffer(false) // bounced populations
                .build();

        let (couple, couple_layout) =
            PipelineBuilder::new(device, include_str!("shaders/couple.wgsl"))
                .label("LB Couple")
                .entry_point("couple")
                .uniform_buffer_size(std::mem::size_of::<CoupleParams>() as u64)
                .storage_buffer(true) // populations
                .storage_buffer(true) // particles
                .storage_buffer(false) // particle forces
                .storage_buffer(false) // momentum source
                .build();

        Self {
            collide,
            collide_layout,
            stream,
            stream_layout,
            links,
            links_layout,
            couple,
            couple_layout,
        }
    }
}

/// Per-particle buffers, grown on demand.
struct ParticleBuffers {
    capacity: usize,
    params: wgpu::Buffer,
    particles: wgpu::Buffer,
    forces: wgpu::Buffer,
    forces_staging: StagingBuffer,
    /// Indexed by the current population buffer
    groups: [wgpu::BindGroup; 2],
}

/// Device copy of one lattice and its mask.
struct DeviceLattice {
    site_count: usize,
    link_count: usize,
    workgroups_sites: u32,
    params: wgpu::Buffer,
    populations: [wgpu::Buffer; 2],
    /// Index of the buffer holding the current populations
    current: usize,
    momentum_source: wgpu::Buffer,
    bounced: wgpu::Buffer,
    collide_groups: [wgpu::BindGroup; 2],
    stream_groups: [wgpu::BindGroup; 2],
    link_groups: [wgpu::BindGroup; 2],
    populations_staging: StagingBuffer,
    source_staging: StagingBuffer,
    bounced_staging: StagingBuffer,
    particles: Option<ParticleBuffers>,
    /// Host revision last uploaded or read back
    synced_revision: Option<u64>,
}

fn storage_buffer(device: &wgpu::Device, label: &str, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        // Zero-sized bindings are invalid
        size: size.max(4),
        usage: wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_SRC
            | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn init_buffer(device: &wgpu::Device, label: &str, contents: &[u8]) -> wgpu::Buffer {
    let padded;
    let contents = if contents.is_empty() {
        padded = [0u8; 4];
        &padded[..]
    } else {
        contents
    };
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents,
        usage: wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_SRC
            | wgpu::BufferUsages::COPY_DST,
    })
}

impl DeviceLattice {
    fn new(
        device: &wgpu::Device,
        pipelines: &Pipelines,
        lattice: &Lattice,
        mask: &BoundaryMask,
    ) -> std::result::Result<Self, GpuError> {
        let site_count = lattice.site_count();
        let workgroups_sites = workgroups(site_count as u32, WORKGROUP_SIZE);
        if workgroups_sites > device.limits().max_compute_workgroups_per_dimension {
            return Err(GpuError::DispatchLimit(site_count));
        }

        let links = mask.boundary_links();
        let link_count = links.len();
        let f32_size = std::mem::size_of::<f32>() as u64;
        let population_bytes = (site_count * Q) as u64 * f32_size;
        let source_bytes = (site_count * 3) as u64 * std::mem::size_of::<i32>() as u64;
        let bounced_bytes = link_count as u64 * f32_size;

        let params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("LB Lattice Params"),
            contents: bytemuck::bytes_of(&LatticeParams::new(lattice, link_count)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let populations = [
            storage_buffer(device, "LB Populations A", population_bytes),
            storage_buffer(device, "LB Populations B", population_bytes),
        ];
        let momentum_source = storage_buffer(device, "LB Momentum Source", source_bytes);

        let classes: Vec<u32> = mask.classes().iter().map(|c| c.code() as u32).collect();
        let classes = init_buffer(device, "LB Site Classes", bytemuck::cast_slice(&classes));
        let blocked: Vec<u32> = (0..site_count).map(|idx| mask.links(idx).bits()).collect();
        let blocked = init_buffer(device, "LB Blocked Links", bytemuck::cast_slice(&blocked));
        let slots: Vec<u32> = links
            .iter()
            .map(|link| (link.site * Q + link.dir) as u32)
            .collect();
        let slots = init_buffer(device, "LB Link Slots", bytemuck::cast_slice(&slots));
        let bounced = storage_buffer(device, "LB Bounced Populations", bounced_bytes);

        let collide_groups = [0, 1].map(|cur| {
            bind_buffers(
                device,
                "LB Collide Bind Group",
                &pipelines.collide_layout,
                &[&params, &populations[cur], &momentum_source, &classes],
            )
        });
        let stream_groups = [0, 1].map(|cur| {
            bind_buffers(
                device,
                "LB Stream Bind Group",
                &pipelines.stream_layout,
                &[&params, &populations[cur], &populations[1 - cur], &classes, &blocked],
            )
        });
        let link_groups = [0, 1].map(|cur| {
            bind_buffers(
                device,
                "LB Boundary Links Bind Group",
                &pipelines.links_layout,
                &[&params, &populations[cur], &slots, &bounced],
            )
        });

        Ok(Self {
            site_count,
            link_count,
            workgroups_sites,
            params,
            populations_staging: StagingBuffer::new(
                device,
                "LB Populations Staging",
                population_bytes,
            ),
            source_staging: StagingBuffer::new(device, "LB Momentum Source Staging", source_bytes),
            bounced_staging: StagingBuffer::new(
                device,
                "LB Bounced Staging",
                bounced_bytes.max(4),
            ),
            populations,
            current: 0,
            momentum_source,
            bounced,
            collide_groups,
            stream_groups,
            link_groups,
            particles: None,
            synced_revision: None,
        })
    }

    /// Upload the host lattice if it changed since the last sync.
    fn sync(&mut self, queue: &wgpu::Queue, lattice: &Lattice) -> Result<(), GpuError> {
        if self.synced_revision == Some(lattice.revision()) {
            return Ok(());
        }
        log::debug!("Uploading lattice revision {}", lattice.revision());

        let populations: Vec<f32> = lattice.populations().iter().map(|&f| f as f32).collect();
        queue.write_buffer(
            &self.populations[self.current],
            0,
            bytemuck::cast_slice(&populations),
        );

        let mut source = Vec::with_capacity(lattice.site_count() * 3);
        for (site, &f) in lattice.forces().iter().enumerate() {
            let m = lattice.force_to_lattice(f);
            if !fits_fixed(m) {
                return Err(GpuError::FixedPointOverflow { site });
            }
            source.extend([to_fixed(m.x), to_fixed(m.y), to_fixed(m.z)]);
        }
        queue.write_buffer(&self.momentum_source, 0, bytemuck::cast_slice(&source));

        self.synced_revision = Some(lattice.revision());
        Ok(())
    }

    /// Make room for `count` particles.
    fn reserve_particles(&mut self, device: &wgpu::Device, pipelines: &Pipelines, count: usize) {
        if self.particles.as_ref().is_some_and(|p| p.capacity >= count) {
            return;
        }
        let capacity = count.next_power_of_two().max(64);
        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("LB Couple Params"),
            size: std::mem::size_of::<CoupleParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let particles = storage_buffer(
            device,
            "LB Particles",
            (capacity * std::mem::size_of::<GpuParticle>()) as u64,
        );
        let force_bytes = (capacity * std::mem::size_of::<[f32; 4]>()) as u64;
        let forces = storage_buffer(device, "LB Particle Forces", force_bytes);
        let groups = [0, 1].map(|cur| {
            bind_buffers(
                device,
                "LB Couple Bind Group",
                &pipelines.couple_layout,
                &[
                    &params,
                    &self.populations[cur],
                    &particles,
                    &forces,
                    &self.momentum_source,
                ],
            )
        });
        self.particles = Some(ParticleBuffers {
            capacity,
            params,
            particles,
            forces,
            forces_staging: StagingBuffer::new(device, "LB Particle Forces Staging", force_bytes),
            groups,
        });
    }
}

/// wgpu compute backend.
pub struct GpuBackend {
    context: GpuContext,
    pipelines: Pipelines,
    state: Option<DeviceLattice>,
}

impl GpuBackend {
    /// Backend on the default adapter.
    pub fn new() -> std::result::Result<Self, GpuError> {
        Ok(Self::with_context(GpuContext::new_blocking()?))
    }

    pub fn with_context(context: GpuContext) -> Self {
        let pipelines = Pipelines::new(&context.device);
        Self {
            context,
            pipelines,
            state: None,
        }
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }
}

impl Backend for GpuBackend {
    fn name(&self) -> &str {
        "wgpu"
    }

    fn prepare(&mut self, lattice: &Lattice, mask: &BoundaryMask) -> Result<()> {
        mask.check_matches(lattice)?;
        let state = DeviceLattice::new(&self.context.device, &self.pipelines, lattice, mask)?;
        log::info!(
            "GPU lattice: {} sites, {} boundary links on {}",
            state.site_count,
            state.link_count,
            self.context.adapter_info.name
        );
        self.state = Some(state);
        Ok(())
    }

    fn collide(&mut self, lattice: &mut Lattice, _mask: &BoundaryMask) -> Result<()> {
        let state = self.state.as_mut().ok_or(GpuError::NotPrepared)?;
        let device = &self.context.device;
        let queue = &self.context.queue;
        state.sync(queue, lattice)?;

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("LB Collide Encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("LB Collide"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipelines.collide);
            pass.set_bind_group(0, &state.collide_groups[state.current], &[]);
            pass.dispatch_workgroups(state.workgroups_sites, 1, 1);
        }
        queue.submit(Some(encoder.finish()));

        lattice.forces_mut().fill(DVec3::ZERO);
        state.synced_revision = Some(lattice.revision());
        Ok(())
    }

    fn stream(&mut self, lattice: &mut Lattice, mask: &BoundaryMask) -> Result<StreamReport> {
        let state = self.state.as_mut().ok_or(GpuError::NotPrepared)?;
        let device = &self.context.device;
        let queue = &self.context.queue;
        state.sync(queue, lattice)?;

        let src = state.current;
        let dst = 1 - src;
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("LB Stream Encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("LB Stream"),
                timestamp_writes: None,
            });
            if state.link_count > 0 {
                pass.set_pipeline(&self.pipelines.links);
                pass.set_bind_group(0, &state.link_groups[src], &[]);
                pass.dispatch_workgroups(workgroups(state.link_count as u32, WORKGROUP_SIZE), 1, 1);
            }
            pass.set_pipeline(&self.pipelines.stream);
            pass.set_bind_group(0, &state.stream_groups[src], &[]);
            pass.dispatch_workgroups(state.workgroups_sites, 1, 1);
        }
        state
            .populations_staging
            .copy_from(&mut encoder, &state.populations[dst]);
        if state.link_count > 0 {
            state.bounced_staging.copy_from(&mut encoder, &state.bounced);
        }
        queue.submit(Some(encoder.finish()));
        state.current = dst;

        let populations: Vec<f32> = state.populations_staging.read(device)?;
        let bounced: Vec<f32> = if state.link_count > 0 {
            state.bounced_staging.read(device)?
        } else {
            Vec::new()
        };

        for (host, &f) in lattice.populations_mut().iter_mut().zip(&populations) {
            *host = f as f64;
        }
        state.synced_revision = Some(lattice.revision());

        let mut values = bounced.iter();
        let report = StreamReport::from_links(
            mask.boundary_links(),
            mask.shape_count(),
            lattice,
            |_| values.next().map_or(0.0, |&f| f as f64),
        );
        Ok(report)
    }

    fn couple(
        &mut self,
        lattice: &mut Lattice,
        mask: &BoundaryMask,
        particles: &[ParticleState],
        thermostat: &Thermostat,
    ) -> Result<CouplingOutcome> {
        let state = self.state.as_mut().ok_or(GpuError::NotPrepared)?;
        let device = &self.context.device;
        let queue = &self.context.queue;

        // Host side: stencils and noise, in snapshot order
        let mut coupled = Vec::with_capacity(particles.len());
        let mut stencils = Vec::with_capacity(particles.len());
        let mut uploads = Vec::with_capacity(particles.len());
        for (i, p) in particles.iter().enumerate() {
            if p.is_virtual {
                continue;
            }
            if !p.velocity.is_finite() {
                return Err(CouplingError::NonFinite { particle: i }.into());
            }
            let stencil = trilinear_stencil(lattice, mask, p.position, i)?;
            uploads.push(GpuParticle::new(
                &stencil,
                p.velocity,
                thermostat.noise(p.identity),
            ));
            coupled.push(i);
            stencils.push(stencil);
        }

        let mut forces = vec![DVec3::ZERO; particles.len()];
        if uploads.is_empty() {
            return Ok(CouplingOutcome {
                forces,
                deposited: DVec3::ZERO,
            });
        }

        state.sync(queue, lattice)?;
        state.reserve_particles(device, &self.pipelines, uploads.len());
        let Some(buffers) = state.particles.as_ref() else {
            return Err(GpuError::NotPrepared.into());
        };

        let params = CoupleParams::new(lattice, thermostat.gamma(), uploads.len());
        queue.write_buffer(&buffers.params, 0, bytemuck::bytes_of(&params));
        queue.write_buffer(&buffers.particles, 0, bytemuck::cast_slice(&uploads));

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("LB Couple Encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("LB Couple"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipelines.couple);
            pass.set_bind_group(0, &buffers.groups[state.current], &[]);
            pass.dispatch_workgroups(workgroups(uploads.len() as u32, WORKGROUP_SIZE), 1, 1);
        }
        buffers.forces_staging.copy_from(&mut encoder, &buffers.forces);
        state
            .source_staging
            .copy_from(&mut encoder, &state.momentum_source);
        queue.submit(Some(encoder.finish()));

        let particle_forces: Vec<[f32; 4]> = buffers.forces_staging.read(device)?;
        let source: Vec<i32> = state.source_staging.read(device)?;

        for (&i, f) in coupled.iter().zip(&particle_forces) {
            forces[i] = DVec3::new(f[0] as f64, f[1] as f64, f[2] as f64);
        }

        // Device atomics wrap on overflow, so replay the deposit on the host
        // and refuse the step if any site left the fixed-point range
        let mut expected = lattice.forces().to_vec();
        for (stencil, &i) in stencils.iter().zip(&coupled) {
            for (site, w) in stencil.iter() {
                expected[site] -= w * forces[i];
            }
        }
        if let Some(site) = expected
            .iter()
            .position(|&f| !fits_fixed(lattice.force_to_lattice(f)))
        {
            log::error!("Fixed-point momentum overflow at site {}", site);
            state.synced_revision = None;
            return Err(GpuError::FixedPointOverflow { site }.into());
        }

        // Pending momentum back to MD force units
        let to_force = lattice.agrid() / (lattice.tau() * lattice.tau());
        let before = lattice.total_force();
        for (host, m) in lattice.forces_mut().iter_mut().zip(source.chunks_exact(3)) {
            *host = DVec3::new(from_fixed(m[0]), from_fixed(m[1]), from_fixed(m[2])) * to_force;
        }
        let deposited = lattice.total_force() - before;
        state.synced_revision = Some(lattice.revision());

        Ok(CouplingOutcome { forces, deposited })
    }
}
