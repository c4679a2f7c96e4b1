//! 3D Lattice-Boltzmann fluid with a particle thermostat
//!
//! A D3Q19 lattice fluid with static bounce-back boundaries, coupled to
//! point particles through a friction force with fluctuating noise. The
//! reaction force of every particle is deposited back onto the lattice, so
//! the particle-fluid exchange conserves momentum exactly.
//!
//! # Example
//!
//! ```
//! use lbm3d::{
//!     Cylinder, DVec3, FluidConfig, Particles, Simulation, SimulationConfig, ThermostatConfig,
//! };
//!
//! let config = SimulationConfig::new(
//!     [16, 12, 12],
//!     FluidConfig::new(1.0, 0.01, 1.0, 1.0),
//!     ThermostatConfig::new(1.0, 1.0, 42),
//! );
//! let pipe = Cylinder::pipe(DVec3::new(8.0, 6.0, 6.0), DVec3::X, 5.0, 100.0);
//! let mut sim = Simulation::cpu(config, vec![pipe.into()]).unwrap();
//!
//! let mut particles = Particles::new();
//! particles.spawn_at(DVec3::new(8.0, 6.0, 6.0));
//!
//! sim.run(&mut particles, 10).unwrap();
//! assert!(sim.health().is_stable());
//! ```

pub mod backend;
pub mod boundary;
pub mod collision;
pub mod config;
pub mod constants;
pub mod coupling;
pub mod diagnostics;
pub mod error;
pub mod export;
pub mod kernels;
pub mod lattice;
pub mod particle;
pub mod shapes;
pub mod simulation;
pub mod streaming;
pub mod thermostat;

pub use backend::{Backend, CpuBackend};
pub use boundary::{BoundaryLink, BoundaryMask, LinkSet, MaskOptions, SiteClass};
pub use config::{CollisionModel, FluidConfig, RelaxationParams, SimulationConfig, ThermostatConfig};
pub use coupling::CouplingOutcome;
pub use diagnostics::NumericalHealth;
pub use error::{ConfigError, CouplingError, GeometryError, LbError, Result};
pub use glam::DVec3;
pub use lattice::Lattice;
pub use particle::{CoupledParticles, Particle, ParticleIntegrator, ParticleState, Particles};
pub use shapes::{Cylinder, HollowCone, Shape, ShapeOracle, Sphere, Wall};
pub use simulation::{Simulation, StepReport};
pub use streaming::StreamReport;
pub use thermostat::Thermostat;
