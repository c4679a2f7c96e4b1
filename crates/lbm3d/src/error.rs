//! Error types for setup, geometry and coupling failures.
//!
//! Numerical instability is deliberately not an error: see
//! [`crate::diagnostics::NumericalHealth`].

use glam::DVec3;
use thiserror::Error;

/// Invalid or inconsistent configuration, detected at setup or at step time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("grid spacing must be positive, got {0}")]
    NonPositiveSpacing(f64),

    #[error("time step must be positive, got {0}")]
    NonPositiveTimeStep(f64),

    #[error("kinematic viscosity must be positive, got {0}")]
    NonPositiveViscosity(f64),

    #[error("fluid density must be positive, got {0}")]
    NonPositiveDensity(f64),

    #[error("thermal energy kT must be non-negative, got {0}")]
    NegativeTemperature(f64),

    #[error("friction coefficient gamma must be non-negative, got {0}")]
    NegativeFriction(f64),

    #[error("grid must have at least one site per axis, got {0:?}")]
    EmptyGrid([usize; 3]),

    #[error("TRT magic parameter must be positive and finite, got {0}")]
    InvalidMagic(f64),

    #[error("step size {got} does not match the lattice time step {expected}")]
    TimeStepMismatch { expected: f64, got: f64 },

    #[error("failed to read or write configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Boundary geometry could not be turned into a usable mask.
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("boundary geometry leaves no fluid sites in the domain")]
    NoFluidSites,

    #[error("mask was built for grid {mask:?} but the lattice is {lattice:?}")]
    GridMismatch { mask: [usize; 3], lattice: [usize; 3] },

    #[error("invalid shape: {0}")]
    InvalidShape(String),
}

/// A particle violated the coupling contract.
#[derive(Debug, Error)]
pub enum CouplingError {
    #[error("particle {particle} at {position} lies outside a non-periodic domain axis")]
    OutsideDomain { particle: usize, position: DVec3 },

    #[error("particle {particle} has no fluid site in its interpolation stencil")]
    NoFluidSupport { particle: usize },

    #[error("particle {particle} has a non-finite position or velocity")]
    NonFinite { particle: usize },
}

/// Top-level error for a simulation run.
#[derive(Debug, Error)]
pub enum LbError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Coupling(#[from] CouplingError),

    #[error("backend failure: {0}")]
    Backend(String),
}

pub type Result<T, E = LbError> = std::result::Result<T, E>;
