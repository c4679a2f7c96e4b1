//! Particle-fluid coupling.
//!
//! Gather: interpolate the fluid velocity at each particle and compute the
//! thermostat force. Scatter: deposit the reaction force on the lattice
//! with the same stencil weights.
//!
//! Gathers run in parallel. The scatter is a per-site reduction done in
//! particle order, so deposits are additive and deterministic.

use glam::DVec3;
use rayon::prelude::*;

use crate::boundary::BoundaryMask;
use crate::error::CouplingError;
use crate::kernels::{trilinear_stencil, Stencil};
use crate::lattice::Lattice;
use crate::particle::ParticleState;
use crate::thermostat::Thermostat;

/// Result of one coupling pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CouplingOutcome {
    /// Force on each particle, in snapshot order.
    pub forces: Vec<DVec3>,
    /// Total force deposited on the lattice. Equals minus the sum of `forces`.
    pub deposited: DVec3,
}

impl CouplingOutcome {
    /// Sum of particle forces.
    pub fn total_particle_force(&self) -> DVec3 {
        self.forces.iter().copied().sum()
    }
}

/// Coupling data of one particle.
#[derive(Clone, Copy, Debug)]
struct Exchange {
    stencil: Stencil,
    force: DVec3,
}

/// Fluid velocity at an arbitrary position, MD units.
///
/// Uses [`Lattice::fluid_velocity`], so a constant body force shows up as a
/// half-step velocity shift.
pub fn interpolate_velocity(
    lattice: &Lattice,
    mask: &BoundaryMask,
    position: DVec3,
) -> Result<DVec3, CouplingError> {
    let stencil = trilinear_stencil(lattice, mask, position, 0)?;
    Ok(stencil.gather(|site| lattice.fluid_velocity(site)))
}

/// Check that every coupled particle has a valid stencil.
///
/// Needs only geometry, so a step can be refused before the lattice moves.
pub fn check_particles(
    lattice: &Lattice,
    mask: &BoundaryMask,
    particles: &[ParticleState],
) -> Result<(), CouplingError> {
    particles
        .par_iter()
        .enumerate()
        .filter(|(_, p)| !p.is_virtual)
        .try_for_each(|(i, p)| {
            if !p.velocity.is_finite() {
                return Err(CouplingError::NonFinite { particle: i });
            }
            trilinear_stencil(lattice, mask, p.position, i).map(|_| ())
        })
}

/// Couple all particles to the lattice for one step.
pub fn couple(
    lattice: &mut Lattice,
    mask: &BoundaryMask,
    particles: &[ParticleState],
    thermostat: &Thermostat,
) -> Result<CouplingOutcome, CouplingError> {
    let exchanges: Vec<Option<Exchange>> = {
        let lattice = &*lattice;
        particles
            .par_iter()
            .enumerate()
            .map(|(i, p)| {
                if p.is_virtual {
                    return Ok(None);
                }
                if !p.velocity.is_finite() {
                    return Err(CouplingError::NonFinite { particle: i });
                }
                let stencil = trilinear_stencil(lattice, mask, p.position, i)?;
                let fluid = stencil.gather(|site| lattice.fluid_velocity(site));
                let force = thermostat.force(p.identity, p.velocity - fluid);
                Ok(Some(Exchange { stencil, force }))
            })
            .collect::<Result<_, _>>()?
    };

    let mut forces = Vec::with_capacity(exchanges.len());
    let mut deposited = DVec3::ZERO;
    let site_forces = lattice.forces_mut();
    for exchange in &exchanges {
        match exchange {
            Some(e) => {
                let reaction = -e.force;
                for (site, w) in e.stencil.iter() {
                    site_forces[site] += w * reaction;
                }
                deposited += reaction;
                forces.push(e.force);
            }
            None => forces.push(DVec3::ZERO),
        }
    }

    Ok(CouplingOutcome { forces, deposited })
}
