//! Coupled time stepping.
//!
//! One step is collide, stream, couple, then particle integration with the
//! coupling forces. A step that fails leaves the step counter unchanged and
//! is never retried; the run should be abandoned.

use crate::backend::{Backend, CpuBackend};
use crate::boundary::{BoundaryMask, MaskOptions};
use crate::config::SimulationConfig;
use crate::coupling::{self, CouplingOutcome};
use crate::diagnostics::NumericalHealth;
use crate::error::{ConfigError, Result};
use crate::lattice::Lattice;
use crate::particle::{CoupledParticles, ParticleIntegrator, ParticleState};
use crate::shapes::Shape;
use crate::streaming::StreamReport;
use crate::thermostat::Thermostat;

/// Relative tolerance when comparing the step size with the lattice time step.
const TIME_STEP_TOLERANCE: f64 = 1e-9;

/// Health is measured every this many steps by default.
const DEFAULT_HEALTH_INTERVAL: u64 = 100;

/// What happened during one step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepReport {
    /// Index of the completed step (1 for the first)
    pub step: u64,
    /// Forces on the static boundaries
    pub boundary: StreamReport,
    /// Particle forces and lattice deposit
    pub coupling: CouplingOutcome,
}

/// Lattice fluid coupled to a particle system.
pub struct Simulation<B: Backend = CpuBackend> {
    config: SimulationConfig,
    lattice: Lattice,
    mask: BoundaryMask,
    shapes: Vec<Shape>,
    mask_options: MaskOptions,
    thermostat: Thermostat,
    backend: B,
    step: u64,
    health_interval: u64,
}

impl Simulation<CpuBackend> {
    /// Simulation on the thread-pool backend.
    pub fn cpu(config: SimulationConfig, shapes: Vec<Shape>) -> Result<Self> {
        Self::new(config, shapes, CpuBackend::new())
    }
}

impl<B: Backend> Simulation<B> {
    /// Build lattice and mask and hand both to the backend.
    pub fn new(config: SimulationConfig, shapes: Vec<Shape>, backend: B) -> Result<Self> {
        Self::with_mask_options(config, shapes, MaskOptions::default(), backend)
    }

    pub fn with_mask_options(
        config: SimulationConfig,
        shapes: Vec<Shape>,
        mask_options: MaskOptions,
        mut backend: B,
    ) -> Result<Self> {
        let mut lattice = Lattice::new(&config)?;
        let mask = BoundaryMask::build(&lattice, &shapes, mask_options)?;
        mask.clear_solid_sites(&mut lattice);
        backend.prepare(&lattice, &mask)?;

        let relax = lattice.relaxation();
        log::info!(
            "LB fluid {:?} agrid={} tau={} density={} viscosity={} (omega+={:.4}, omega-={:.4}) on {} backend",
            lattice.dims(),
            config.fluid.agrid,
            config.fluid.tau,
            config.fluid.density,
            config.fluid.viscosity,
            relax.omega_even,
            relax.omega_odd,
            backend.name()
        );
        log::info!(
            "Thermostat kT={} gamma={} seed={}",
            config.thermostat.kt,
            config.thermostat.gamma,
            config.thermostat.seed
        );

        let thermostat = Thermostat::new(&config.thermostat, config.fluid.tau);
        Ok(Self {
            config,
            lattice,
            mask,
            shapes,
            mask_options,
            thermostat,
            backend,
            step: 0,
            health_interval: DEFAULT_HEALTH_INTERVAL,
        })
    }

    /// Measure health every `interval` steps (0 disables).
    pub fn set_health_interval(&mut self, interval: u64) {
        self.health_interval = interval;
    }

    // ========== Accessors ==========

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    /// Host lattice for initialisation. Device backends re-upload on the next step.
    pub fn lattice_mut(&mut self) -> &mut Lattice {
        &mut self.lattice
    }

    pub fn mask(&self) -> &BoundaryMask {
        &self.mask
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn thermostat(&self) -> &Thermostat {
        &self.thermostat
    }

    /// Thermostat access, e.g. to restore the noise counter.
    pub fn thermostat_mut(&mut self) -> &mut Thermostat {
        &mut self.thermostat
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Completed steps.
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Simulated time.
    pub fn time(&self) -> f64 {
        self.step as f64 * self.config.fluid.tau
    }

    pub fn health(&self) -> NumericalHealth {
        NumericalHealth::measure(&self.lattice, &self.mask)
    }

    // ========== Stepping ==========

    /// Advance fluid and particles by one lattice time step.
    pub fn advance<P>(&mut self, particles: &mut P, dt: f64) -> Result<StepReport>
    where
        P: CoupledParticles + ParticleIntegrator + ?Sized,
    {
        let tau = self.config.fluid.tau;
        if !((dt - tau).abs() <= TIME_STEP_TOLERANCE * tau) {
            return Err(ConfigError::TimeStepMismatch {
                expected: tau,
                got: dt,
            }
            .into());
        }

        let states = ParticleState::collect(particles);
        coupling::check_particles(&self.lattice, &self.mask, &states)?;

        self.backend.collide(&mut self.lattice, &self.mask)?;
        let boundary = self.backend.stream(&mut self.lattice, &self.mask)?;
        let coupling = self
            .backend
            .couple(&mut self.lattice, &self.mask, &states, &self.thermostat)?;

        for (i, force) in coupling.forces.iter().enumerate() {
            particles.add_force(i, *force);
        }
        particles.integrate(dt);

        self.thermostat.advance();
        self.step += 1;

        log::debug!(
            "step {}: boundary force {:?}, deposited {:?}",
            self.step,
            boundary.boundary_force,
            coupling.deposited
        );

        if self.health_interval > 0 && self.step % self.health_interval == 0 {
            let health = self.health();
            if !health.is_stable() {
                log::warn!("LB fluid unstable at step {}: {:?}", self.step, health);
            }
        }

        Ok(StepReport {
            step: self.step,
            boundary,
            coupling,
        })
    }

    /// Advance `steps` lattice time steps.
    pub fn run<P>(&mut self, particles: &mut P, steps: u64) -> Result<()>
    where
        P: CoupledParticles + ParticleIntegrator + ?Sized,
    {
        let dt = self.config.fluid.tau;
        for _ in 0..steps {
            self.advance(particles, dt)?;
        }
        Ok(())
    }

    // ========== Geometry ==========

    /// Replace all shapes and rebuild the mask from scratch.
    ///
    /// Sites that turn solid are emptied; sites that open up start at rest
    /// with the configured density. If the mask cannot be built or the
    /// backend refuses it, the old geometry and the lattice stay untouched.
    pub fn rebuild_geometry(&mut self, shapes: Vec<Shape>) -> Result<()> {
        let mask = BoundaryMask::build(&self.lattice, &shapes, self.mask_options)?;
        let density = self.config.fluid.density;
        let mut lattice = self.lattice.clone();
        for idx in 0..lattice.site_count() {
            let was_solid = self.mask.is_solid(idx);
            let now_solid = mask.is_solid(idx);
            if now_solid && !was_solid {
                lattice.clear_site(idx);
            } else if was_solid && !now_solid {
                lattice.set_equilibrium(idx, density, glam::DVec3::ZERO);
            }
        }
        self.backend.prepare(&lattice, &mask)?;
        self.lattice = lattice;
        self.mask = mask;
        self.shapes = shapes;
        log::info!("Rebuilt geometry with {} shapes", self.shapes.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FluidConfig, ThermostatConfig};
    use crate::error::{CouplingError, GeometryError, LbError};
    use crate::particle::Particles;
    use crate::backend::CpuBackend;
    use crate::coupling::CouplingOutcome;
    use crate::particle::ParticleState;
    use crate::shapes::Sphere;
    use crate::streaming::StreamReport;
    use crate::thermostat::Thermostat;
    use glam::DVec3;

    /// CPU kernels behind a `prepare` that can be made to fail.
    struct Flaky {
        inner: CpuBackend,
        refuse_prepare: bool,
    }

    impl Backend for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        fn prepare(&mut self, _lattice: &Lattice, _mask: &BoundaryMask) -> Result<()> {
            if self.refuse_prepare {
                return Err(LbError::Backend("out of device memory".to_string()));
            }
            Ok(())
        }

        fn collide(&mut self, lattice: &mut Lattice, mask: &BoundaryMask) -> Result<()> {
            self.inner.collide(lattice, mask)
        }

        fn stream(&mut self, lattice: &mut Lattice, mask: &BoundaryMask) -> Result<StreamReport> {
            self.inner.stream(lattice, mask)
        }

        fn couple(
            &mut self,
            lattice: &mut Lattice,
            mask: &BoundaryMask,
            particles: &[ParticleState],
            thermostat: &Thermostat,
        ) -> Result<CouplingOutcome> {
            self.inner.couple(lattice, mask, particles, thermostat)
        }
    }

    fn config() -> SimulationConfig {
        SimulationConfig::new(
            [6, 6, 6],
            FluidConfig::new(1.0, 0.1, 1.0, 1.0),
            ThermostatConfig::new(0.5, 1.0, 7),
        )
    }

    #[test]
    fn test_rejects_wrong_time_step() {
        let mut sim = Simulation::cpu(config(), vec![]).unwrap();
        let mut particles = Particles::new();
        let err = sim.advance(&mut particles, 0.05);
        assert!(matches!(
            err,
            Err(LbError::Config(ConfigError::TimeStepMismatch { .. }))
        ));
        assert_eq!(sim.step(), 0);
    }

    #[test]
    fn test_failed_step_leaves_state() {
        let mut sim = Simulation::cpu(config().with_periodic([true, true, false]), vec![]).unwrap();
        let mut particles = Particles::new();
        particles.spawn_at(DVec3::new(1.0, 1.0, 10.0));
        let before = sim.lattice().populations().to_vec();
        let err = sim.advance(&mut particles, 0.1);
        assert!(matches!(
            err,
            Err(LbError::Coupling(CouplingError::OutsideDomain { particle: 0, .. }))
        ));
        assert_eq!(sim.step(), 0);
        assert_eq!(sim.thermostat().rng_counter(), 0);
        assert_eq!(sim.lattice().populations(), &before[..]);
    }

    #[test]
    fn test_steps_advance_counter() {
        let mut sim = Simulation::cpu(config(), vec![]).unwrap();
        let mut particles = Particles::new();
        particles.spawn_at(DVec3::splat(3.0));
        let report = sim.advance(&mut particles, 0.1).unwrap();
        assert_eq!(report.step, 1);
        sim.run(&mut particles, 4).unwrap();
        assert_eq!(sim.step(), 5);
        assert_eq!(sim.thermostat().rng_counter(), 5);
        assert!((sim.time() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_rebuild_geometry_refills_opened_sites() {
        let sphere = Sphere::new(DVec3::splat(3.0), 1.5);
        let mut sim = Simulation::cpu(config(), vec![sphere.into()]).unwrap();
        let centre = sim.lattice().cell_index(2, 2, 2);
        assert!(sim.mask().is_solid(centre));
        assert_eq!(sim.lattice().site_mass(centre), 0.0);

        sim.rebuild_geometry(vec![]).unwrap();
        assert!(!sim.mask().is_solid(centre));
        assert!((sim.lattice().site_density(centre) - 1.0).abs() < 1e-12);

        let everything = Sphere::new(DVec3::splat(3.0), 100.0);
        let err = sim.rebuild_geometry(vec![everything.into()]);
        assert!(matches!(err, Err(LbError::Geometry(GeometryError::NoFluidSites))));
        assert!(sim.shapes().is_empty());
    }

    #[test]
    fn test_refused_prepare_keeps_lattice_and_geometry() {
        let backend = Flaky {
            inner: CpuBackend::new(),
            refuse_prepare: false,
        };
        let mut sim = Simulation::new(config(), vec![], backend).unwrap();
        let before = sim.lattice().populations().to_vec();

        sim.backend.refuse_prepare = true;
        let sphere = Sphere::new(DVec3::splat(3.0), 1.5);
        let err = sim.rebuild_geometry(vec![sphere.into()]);
        assert!(matches!(err, Err(LbError::Backend(_))));
        assert!(sim.shapes().is_empty());
        assert_eq!(sim.mask().solid_count(), 0);
        assert_eq!(sim.lattice().populations(), &before[..]);

        sim.backend.refuse_prepare = false;
        let sphere = Sphere::new(DVec3::splat(3.0), 1.5);
        sim.rebuild_geometry(vec![sphere.into()]).unwrap();
        let centre = sim.lattice().cell_index(2, 2, 2);
        assert_eq!(sim.lattice().site_mass(centre), 0.0);
    }
}
