//! `#[repr(C)]` blocks uploaded to uniform and storage buffers.
//!
//! Layouts must match the WGSL structs field for field.

use bytemuck::{Pod, Zeroable};
use lbm3d::kernels::Stencil;
use lbm3d::{DVec3, Lattice};

/// Fixed-point scale for momentum deposits.
///
/// `atomicAdd` only exists for integers, so lattice momentum is accumulated
/// as `round(value * SCALE)` in `i32`. The range is about ±2048 per site and
/// step in lattice momentum units. Shaders receive the scale through the
/// parameter blocks.
pub const FIXED_POINT_SCALE: f64 = (1u32 << 20) as f64;

/// Threads per workgroup for site and particle kernels.
pub const WORKGROUP_SIZE: u32 = 64;

/// Grid layout and collision rates (64 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub(crate) struct LatticeParams {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub site_count: u32,
    pub periodic_x: u32,
    pub periodic_y: u32,
    pub periodic_z: u32,
    pub link_count: u32,
    /// External body force per site, lattice momentum per step
    pub ext_x: f32,
    pub ext_y: f32,
    pub ext_z: f32,
    pub omega_even: f32,
    pub omega_odd: f32,
    pub inv_scale: f32,
    pub _pad0: u32,
    pub _pad1: u32,
}

impl LatticeParams {
    pub fn new(lattice: &Lattice, link_count: usize) -> Self {
        let [width, height, depth] = lattice.dims();
        let [px, py, pz] = lattice.periodic();
        let ext = lattice.force_to_lattice(lbm3d::collision::external_force(lattice));
        let relaxation = lattice.relaxation();
        Self {
            width: width as u32,
            height: height as u32,
            depth: depth as u32,
            site_count: lattice.site_count() as u32,
            periodic_x: px as u32,
            periodic_y: py as u32,
            periodic_z: pz as u32,
            link_count: link_count as u32,
            ext_x: ext.x as f32,
            ext_y: ext.y as f32,
            ext_z: ext.z as f32,
            omega_even: relaxation.omega_even as f32,
            omega_odd: relaxation.omega_odd as f32,
            inv_scale: (1.0 / FIXED_POINT_SCALE) as f32,
            _pad0: 0,
            _pad1: 0,
        }
    }
}

/// Thermostat constants for one coupling pass (48 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub(crate) struct CoupleParams {
    pub particle_count: u32,
    pub _pad0: u32,
    pub gamma: f32,
    /// Lattice velocity to MD velocity
    pub velocity_to_md: f32,
    /// MD force to lattice momentum per step
    pub force_to_lattice: f32,
    pub scale: f32,
    pub _pad1: u32,
    pub _pad2: u32,
    /// Half the external body force per site, lattice momentum
    pub half_ext_x: f32,
    pub half_ext_y: f32,
    pub half_ext_z: f32,
    pub _pad3: u32,
}

impl CoupleParams {
    pub fn new(lattice: &Lattice, gamma: f64, particle_count: usize) -> Self {
        let half_ext = 0.5 * lattice.force_to_lattice(lattice.external_force());
        Self {
            particle_count: particle_count as u32,
            _pad0: 0,
            gamma: gamma as f32,
            velocity_to_md: (lattice.agrid() / lattice.tau()) as f32,
            force_to_lattice: (lattice.tau() * lattice.tau() / lattice.agrid()) as f32,
            scale: FIXED_POINT_SCALE as f32,
            _pad1: 0,
            _pad2: 0,
            half_ext_x: half_ext.x as f32,
            half_ext_y: half_ext.y as f32,
            half_ext_z: half_ext.z as f32,
            _pad3: 0,
        }
    }
}

/// One coupled particle: stencil, velocity and this step's noise (96 bytes).
///
/// Unused stencil slots carry zero weight.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub(crate) struct GpuParticle {
    pub sites: [u32; 8],
    pub weights: [f32; 8],
    pub velocity: [f32; 4],
    pub noise: [f32; 4],
}

impl GpuParticle {
    pub fn new(stencil: &Stencil, velocity: DVec3, noise: DVec3) -> Self {
        let mut sites = [0u32; 8];
        let mut weights = [0.0f32; 8];
        for (slot, (site, w)) in stencil.iter().enumerate() {
            sites[slot] = site as u32;
            weights[slot] = w as f32;
        }
        Self {
            sites,
            weights,
            velocity: [velocity.x as f32, velocity.y as f32, velocity.z as f32, 0.0],
            noise: [noise.x as f32, noise.y as f32, noise.z as f32, 0.0],
        }
    }
}

/// Whether every component of `momentum` (lattice units) fits a fixed-point slot.
///
/// Non-finite values never fit.
#[inline]
pub(crate) fn fits_fixed(momentum: DVec3) -> bool {
    momentum.abs().max_element() * FIXED_POINT_SCALE <= i32::MAX as f64
}

/// Host momentum (lattice units) to fixed point.
///
/// Callers check [`fits_fixed`] first; out-of-range values would saturate.
#[inline]
pub(crate) fn to_fixed(value: f64) -> i32 {
    (value * FIXED_POINT_SCALE).round() as i32
}

/// Fixed point back to host momentum (lattice units).
#[inline]
pub(crate) fn from_fixed(value: i32) -> f64 {
    value as f64 / FIXED_POINT_SCALE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_sizes_match_wgsl() {
        assert_eq!(std::mem::size_of::<LatticeParams>(), 64);
        assert_eq!(std::mem::size_of::<CoupleParams>(), 48);
        assert_eq!(std::mem::size_of::<GpuParticle>(), 96);
    }

    #[test]
    fn test_fixed_point_resolution() {
        let v = 0.012_345_6;
        assert!((from_fixed(to_fixed(v)) - v).abs() <= 0.5 / FIXED_POINT_SCALE);
        assert_eq!(to_fixed(-1.0), -(1 << 20));
    }

    #[test]
    fn test_fixed_point_range() {
        let limit = i32::MAX as f64 / FIXED_POINT_SCALE;
        assert!(fits_fixed(DVec3::new(-2047.0, 0.5, 2047.0)));
        assert!(fits_fixed(DVec3::splat(limit)));
        assert!(!fits_fixed(DVec3::new(0.0, 3000.0, 0.0)));
        assert!(!fits_fixed(DVec3::new(-2048.5, 0.0, 0.0)));
        assert!(!fits_fixed(DVec3::new(f64::NAN, 0.0, 0.0)));
        assert!(!fits_fixed(DVec3::new(0.0, 0.0, f64::INFINITY)));
    }

    #[test]
    fn test_particle_pads_unused_slots() {
        let stencil = Stencil {
            sites: [3, 4, 0, 0, 0, 0, 0, 0],
            weights: [0.25, 0.75, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            len: 2,
        };
        let p = GpuParticle::new(&stencil, DVec3::X, DVec3::ZERO);
        assert_eq!(p.sites[..2], [3, 4]);
        assert_eq!(p.weights[2..], [0.0; 6]);
        assert_eq!(p.velocity, [1.0, 0.0, 0.0, 0.0]);
    }
}
