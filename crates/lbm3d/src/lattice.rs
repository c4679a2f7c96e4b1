//! Regular 3D lattice of D3Q19 populations.
//!
//! Sites are stored in a flat arena, x fastest, then y, then z. Every site
//! owns [`Q`] populations stored contiguously. Populations are mass per site
//! in MD units; velocities carried by the populations are in lattice units
//! (`agrid / tau`).
//!
//! Density and momentum are always derived from the populations.

use glam::DVec3;

use crate::collision::equilibrium;
use crate::config::{FluidConfig, RelaxationParams, SimulationConfig};
use crate::constants::{velocity, Q, VELOCITIES};
use crate::error::ConfigError;

/// The fluid lattice.
#[derive(Clone, Debug)]
pub struct Lattice {
    /// Number of sites in X direction
    pub width: usize,
    /// Number of sites in Y direction
    pub height: usize,
    /// Number of sites in Z direction
    pub depth: usize,

    periodic: [bool; 3],
    fluid: FluidConfig,
    relaxation: RelaxationParams,

    /// Populations, `Q` per site
    populations: Vec<f64>,

    /// Streaming target, swapped with `populations` after every stream
    scratch: Vec<f64>,

    /// Pending momentum source per site (MD force units), consumed by collision
    force: Vec<DVec3>,

    /// Bumped whenever host code mutates populations or forces
    revision: u64,
}

impl Lattice {
    /// Create a lattice at rest with the configured density.
    pub fn new(config: &SimulationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let relaxation = config.fluid.relaxation()?;
        let [width, height, depth] = config.grid;
        let site_count = width * height * depth;

        let rest = equilibrium(config.fluid.site_mass(), DVec3::ZERO);
        let mut populations = Vec::with_capacity(site_count * Q);
        for _ in 0..site_count {
            populations.extend_from_slice(&rest);
        }

        Ok(Self {
            width,
            height,
            depth,
            periodic: config.periodic,
            fluid: config.fluid.clone(),
            relaxation,
            scratch: vec![0.0; populations.len()],
            populations,
            force: vec![DVec3::ZERO; site_count],
            revision: 0,
        })
    }

    // ========== Geometry ==========

    #[inline]
    pub fn dims(&self) -> [usize; 3] {
        [self.width, self.height, self.depth]
    }

    #[inline]
    pub fn site_count(&self) -> usize {
        self.width * self.height * self.depth
    }

    #[inline]
    pub fn periodic(&self) -> [bool; 3] {
        self.periodic
    }

    #[inline]
    pub fn agrid(&self) -> f64 {
        self.fluid.agrid
    }

    #[inline]
    pub fn tau(&self) -> f64 {
        self.fluid.tau
    }

    pub fn fluid(&self) -> &FluidConfig {
        &self.fluid
    }

    pub fn relaxation(&self) -> RelaxationParams {
        self.relaxation
    }

    /// Box lengths in MD units.
    pub fn box_length(&self) -> DVec3 {
        DVec3::new(
            self.width as f64 * self.agrid(),
            self.height as f64 * self.agrid(),
            self.depth as f64 * self.agrid(),
        )
    }

    /// Index into site arrays.
    #[inline]
    pub fn cell_index(&self, i: usize, j: usize, k: usize) -> usize {
        k * self.width * self.height + j * self.width + i
    }

    /// Site coordinates of a flat index.
    #[inline]
    pub fn cell_coords(&self, idx: usize) -> [usize; 3] {
        let i = idx % self.width;
        let j = (idx / self.width) % self.height;
        let k = idx / (self.width * self.height);
        [i, j, k]
    }

    /// World position of the site centre.
    #[inline]
    pub fn cell_center(&self, i: usize, j: usize, k: usize) -> DVec3 {
        DVec3::new(i as f64 + 0.5, j as f64 + 0.5, k as f64 + 0.5) * self.agrid()
    }

    /// Site containing a world position (floored, not wrapped).
    #[inline]
    pub fn world_to_cell(&self, pos: DVec3) -> [i64; 3] {
        let p = pos / self.agrid();
        [p.x.floor() as i64, p.y.floor() as i64, p.z.floor() as i64]
    }

    #[inline]
    pub fn cell_in_bounds(&self, i: i64, j: i64, k: i64) -> bool {
        i >= 0
            && i < self.width as i64
            && j >= 0
            && j < self.height as i64
            && k >= 0
            && k < self.depth as i64
    }

    /// Resolve possibly out-of-range site coordinates.
    ///
    /// Periodic axes wrap; a coordinate outside a bounded axis gives `None`.
    #[inline]
    pub fn resolve(&self, coords: [i64; 3]) -> Option<usize> {
        let dims = self.dims();
        let mut wrapped = [0usize; 3];
        for axis in 0..3 {
            let n = dims[axis] as i64;
            let c = coords[axis];
            wrapped[axis] = if (0..n).contains(&c) {
                c as usize
            } else if self.periodic[axis] {
                c.rem_euclid(n) as usize
            } else {
                return None;
            };
        }
        Some(self.cell_index(wrapped[0], wrapped[1], wrapped[2]))
    }

    /// Neighbour of site `idx` along direction `q`.
    #[inline]
    pub fn neighbor(&self, idx: usize, q: usize) -> Option<usize> {
        let [i, j, k] = self.cell_coords(idx);
        let c = VELOCITIES[q];
        self.resolve([
            i as i64 + c[0] as i64,
            j as i64 + c[1] as i64,
            k as i64 + c[2] as i64,
        ])
    }

    // ========== Unit conversion ==========

    /// MD velocity to lattice velocity.
    #[inline]
    pub fn velocity_to_lattice(&self, v: DVec3) -> DVec3 {
        v * (self.tau() / self.agrid())
    }

    /// Lattice velocity to MD velocity.
    #[inline]
    pub fn velocity_to_md(&self, u: DVec3) -> DVec3 {
        u * (self.agrid() / self.tau())
    }

    /// MD force to momentum change per lattice step, in lattice momentum units.
    #[inline]
    pub fn force_to_lattice(&self, f: DVec3) -> DVec3 {
        f * (self.tau() * self.tau() / self.agrid())
    }

    /// Lattice momentum (mass times lattice velocity) to MD momentum.
    #[inline]
    pub fn momentum_to_md(&self, m: DVec3) -> DVec3 {
        m * (self.agrid() / self.tau())
    }

    // ========== Populations ==========

    /// Populations of one site.
    #[inline]
    pub fn site(&self, idx: usize) -> &[f64] {
        &self.populations[idx * Q..(idx + 1) * Q]
    }

    /// Mutable populations of one site.
    pub fn site_mut(&mut self, idx: usize) -> &mut [f64] {
        self.revision += 1;
        &mut self.populations[idx * Q..(idx + 1) * Q]
    }

    /// All populations, `Q` per site.
    pub fn populations(&self) -> &[f64] {
        &self.populations
    }

    /// Mutable access to all populations.
    pub fn populations_mut(&mut self) -> &mut [f64] {
        self.revision += 1;
        &mut self.populations
    }

    /// Source and target buffers for a streaming pass.
    pub(crate) fn stream_buffers(&mut self) -> (&[f64], &mut [f64]) {
        (&self.populations, &mut self.scratch)
    }

    /// Make the streaming target the current populations.
    pub(crate) fn swap_buffers(&mut self) {
        std::mem::swap(&mut self.populations, &mut self.scratch);
    }

    /// Split borrow of populations and pending forces for collision.
    pub(crate) fn collision_buffers(&mut self) -> (&mut [f64], &mut [DVec3]) {
        (&mut self.populations, &mut self.force)
    }

    /// Change counter for host-side mutation.
    ///
    /// Device backends compare it with the revision they last synchronised.
    #[inline]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    // ========== Moments ==========

    /// Fluid mass held by a site.
    #[inline]
    pub fn site_mass(&self, idx: usize) -> f64 {
        self.site(idx).iter().sum()
    }

    /// Mass density of a site in MD units.
    #[inline]
    pub fn site_density(&self, idx: usize) -> f64 {
        self.site_mass(idx) / self.agrid().powi(3)
    }

    /// Momentum of a site in lattice units (mass times lattice velocity).
    #[inline]
    pub fn site_momentum_lattice(&self, idx: usize) -> DVec3 {
        let f = self.site(idx);
        let mut m = DVec3::ZERO;
        for q in 1..Q {
            m += f[q] * DVec3::from_array(velocity(q));
        }
        m
    }

    /// Fluid velocity of a site in MD units.
    ///
    /// Empty (solid) sites report zero velocity.
    #[inline]
    pub fn site_velocity(&self, idx: usize) -> DVec3 {
        let mass = self.site_mass(idx);
        if mass <= 0.0 {
            return DVec3::ZERO;
        }
        self.velocity_to_md(self.site_momentum_lattice(idx) / mass)
    }

    /// External body force per site in MD units.
    #[inline]
    pub fn external_force(&self) -> DVec3 {
        DVec3::from_array(self.fluid().ext_force_density) * self.agrid().powi(3)
    }

    /// Physical fluid velocity of a site in MD units.
    ///
    /// Adds half of the external body force to the momentum, as the forcing
    /// scheme defines the velocity at the middle of a step. Particle deposits
    /// of the current step are still accumulating and are left out. Empty
    /// sites report zero velocity.
    #[inline]
    pub fn fluid_velocity(&self, idx: usize) -> DVec3 {
        let mass = self.site_mass(idx);
        if mass <= 0.0 {
            return DVec3::ZERO;
        }
        let half_force = 0.5 * self.force_to_lattice(self.external_force());
        self.velocity_to_md((self.site_momentum_lattice(idx) + half_force) / mass)
    }

    /// Total fluid mass.
    pub fn total_mass(&self) -> f64 {
        (0..self.site_count()).map(|idx| self.site_mass(idx)).sum()
    }

    /// Total fluid momentum in MD units.
    pub fn total_momentum(&self) -> DVec3 {
        let m: DVec3 = (0..self.site_count())
            .map(|idx| self.site_momentum_lattice(idx))
            .sum();
        self.momentum_to_md(m)
    }

    /// Set a site to equilibrium at the given MD density and velocity.
    pub fn set_equilibrium(&mut self, idx: usize, density: f64, velocity: DVec3) {
        let mass = density * self.agrid().powi(3);
        let u = self.velocity_to_lattice(velocity);
        let feq = equilibrium(mass, u);
        self.site_mut(idx).copy_from_slice(&feq);
    }

    /// Reset a site to equilibrium at a new velocity, keeping its density.
    pub fn set_velocity(&mut self, idx: usize, velocity: DVec3) {
        let density = self.site_density(idx);
        self.set_equilibrium(idx, density, velocity);
    }

    /// Empty a site. Used for solid sites, which carry no fluid.
    pub fn clear_site(&mut self, idx: usize) {
        self.site_mut(idx).fill(0.0);
        self.force[idx] = DVec3::ZERO;
    }

    // ========== Momentum source ==========

    /// Pending force on a site (MD units).
    #[inline]
    pub fn force(&self, idx: usize) -> DVec3 {
        self.force[idx]
    }

    /// All pending site forces.
    pub fn forces(&self) -> &[DVec3] {
        &self.force
    }

    /// Mutable access to pending site forces.
    pub fn forces_mut(&mut self) -> &mut [DVec3] {
        self.revision += 1;
        &mut self.force
    }

    /// Add to the momentum source of a site.
    #[inline]
    pub fn add_force(&mut self, idx: usize, f: DVec3) {
        self.revision += 1;
        self.force[idx] += f;
    }

    /// Sum of pending site forces.
    pub fn total_force(&self) -> DVec3 {
        self.force.iter().copied().sum()
    }
}
