//! Execution backends.
//!
//! A backend runs the three per-step kernels. The host [`Lattice`] is the
//! source of truth between steps: a device backend re-uploads whenever
//! [`Lattice::revision`] has moved since it last synchronised, and leaves
//! populations and pending forces on the host after every coupling pass.

use crate::boundary::BoundaryMask;
use crate::collision;
use crate::coupling::{self, CouplingOutcome};
use crate::error::Result;
use crate::lattice::Lattice;
use crate::particle::ParticleState;
use crate::streaming::{self, StreamReport};
use crate::thermostat::Thermostat;

/// Per-step kernels over a lattice and its boundary mask.
pub trait Backend {
    fn name(&self) -> &str;

    /// Called once the mask is (re)built, before the next step.
    fn prepare(&mut self, _lattice: &Lattice, _mask: &BoundaryMask) -> Result<()> {
        Ok(())
    }

    /// Relax every fluid site and consume pending forces.
    fn collide(&mut self, lattice: &mut Lattice, mask: &BoundaryMask) -> Result<()>;

    /// Propagate populations with bounce-back.
    fn stream(&mut self, lattice: &mut Lattice, mask: &BoundaryMask) -> Result<StreamReport>;

    /// Thermostat coupling: particle forces out, reaction deposited on the lattice.
    fn couple(
        &mut self,
        lattice: &mut Lattice,
        mask: &BoundaryMask,
        particles: &[ParticleState],
        thermostat: &Thermostat,
    ) -> Result<CouplingOutcome>;
}

/// Thread-pool backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Backend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn collide(&mut self, lattice: &mut Lattice, mask: &BoundaryMask) -> Result<()> {
        collision::collide(lattice, mask);
        Ok(())
    }

    fn stream(&mut self, lattice: &mut Lattice, mask: &BoundaryMask) -> Result<StreamReport> {
        Ok(streaming::stream(lattice, mask))
    }

    fn couple(
        &mut self,
        lattice: &mut Lattice,
        mask: &BoundaryMask,
        particles: &[ParticleState],
        thermostat: &Thermostat,
    ) -> Result<CouplingOutcome> {
        Ok(coupling::couple(lattice, mask, particles, thermostat)?)
    }
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn prepare(&mut self, lattice: &Lattice, mask: &BoundaryMask) -> Result<()> {
        (**self).prepare(lattice, mask)
    }

    fn collide(&mut self, lattice: &mut Lattice, mask: &BoundaryMask) -> Result<()> {
        (**self).collide(lattice, mask)
    }

    fn stream(&mut self, lattice: &mut Lattice, mask: &BoundaryMask) -> Result<StreamReport> {
        (**self).stream(lattice, mask)
    }

    fn couple(
        &mut self,
        lattice: &mut Lattice,
        mask: &BoundaryMask,
        particles: &[ParticleState],
        thermostat: &Thermostat,
    ) -> Result<CouplingOutcome> {
        (**self).couple(lattice, mask, particles, thermostat)
    }
}
