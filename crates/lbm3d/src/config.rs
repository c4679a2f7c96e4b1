//! Simulation configuration.
//!
//! All quantities are given in MD units (the units of the particle system).
//! The configuration is validated once when the lattice is constructed and is
//! immutable afterwards.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{CS2, DEFAULT_TRT_MAGIC};
use crate::error::ConfigError;

/// Collision operator selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionModel {
    /// Single relaxation time.
    #[default]
    Bgk,
    /// Two relaxation times; odd moments relax at the rate fixed by `magic`.
    Trt {
        #[serde(default = "default_magic")]
        magic: f64,
    },
}

fn default_magic() -> f64 {
    DEFAULT_TRT_MAGIC
}

/// Fluid and lattice parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FluidConfig {
    /// Grid spacing.
    pub agrid: f64,
    /// Lattice time step.
    pub tau: f64,
    /// Mass density of the fluid at rest.
    pub density: f64,
    /// Kinematic viscosity.
    pub viscosity: f64,
    #[serde(default)]
    pub collision: CollisionModel,
    /// Constant body force density acting on every fluid site.
    #[serde(default)]
    pub ext_force_density: [f64; 3],
}

/// Particle-fluid coupling parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThermostatConfig {
    /// Thermal energy.
    #[serde(default)]
    pub kt: f64,
    /// Friction coefficient.
    #[serde(default = "default_gamma")]
    pub gamma: f64,
    /// Seed for the counter-based noise.
    #[serde(default)]
    pub seed: u64,
}

fn default_gamma() -> f64 {
    1.0
}

impl Default for ThermostatConfig {
    fn default() -> Self {
        Self {
            kt: 0.0,
            gamma: default_gamma(),
            seed: 0,
        }
    }
}

/// Complete run configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Number of sites along x, y and z.
    pub grid: [usize; 3],
    /// Periodicity per axis; bounded axes are closed by static walls.
    #[serde(default = "default_periodic")]
    pub periodic: [bool; 3],
    pub fluid: FluidConfig,
    #[serde(default)]
    pub thermostat: ThermostatConfig,
}

fn default_periodic() -> [bool; 3] {
    [true, true, true]
}

/// Relaxation rates derived from the fluid configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RelaxationParams {
    /// Rate for even (shear and bulk) moments.
    pub omega_even: f64,
    /// Rate for odd (momentum flux) moments. Equal to `omega_even` for BGK.
    pub omega_odd: f64,
}

impl RelaxationParams {
    /// Single relaxation time.
    pub fn bgk(omega: f64) -> Self {
        Self {
            omega_even: omega,
            omega_odd: omega,
        }
    }
}

impl FluidConfig {
    /// Fluid with BGK collisions and no body force.
    pub fn new(agrid: f64, tau: f64, density: f64, viscosity: f64) -> Self {
        Self {
            agrid,
            tau,
            density,
            viscosity,
            collision: CollisionModel::Bgk,
            ext_force_density: [0.0; 3],
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.agrid > 0.0) || !self.agrid.is_finite() {
            return Err(ConfigError::NonPositiveSpacing(self.agrid));
        }
        if !(self.tau > 0.0) || !self.tau.is_finite() {
            return Err(ConfigError::NonPositiveTimeStep(self.tau));
        }
        if !(self.density > 0.0) || !self.density.is_finite() {
            return Err(ConfigError::NonPositiveDensity(self.density));
        }
        if !(self.viscosity > 0.0) || !self.viscosity.is_finite() {
            return Err(ConfigError::NonPositiveViscosity(self.viscosity));
        }
        if let CollisionModel::Trt { magic } = self.collision {
            if !(magic > 0.0) || !magic.is_finite() {
                return Err(ConfigError::InvalidMagic(magic));
            }
        }
        Ok(())
    }

    /// Viscosity in lattice units.
    pub fn lattice_viscosity(&self) -> f64 {
        self.viscosity * self.tau / (self.agrid * self.agrid)
    }

    /// Fluid mass held by one site at rest.
    pub fn site_mass(&self) -> f64 {
        self.density * self.agrid.powi(3)
    }

    /// Relaxation rates for the configured collision model.
    pub fn relaxation(&self) -> Result<RelaxationParams, ConfigError> {
        self.validate()?;
        let tau_even = self.lattice_viscosity() / CS2 + 0.5;
        let omega_even = 1.0 / tau_even;
        match self.collision {
            CollisionModel::Bgk => Ok(RelaxationParams::bgk(omega_even)),
            CollisionModel::Trt { magic } => {
                let tau_odd = magic / (tau_even - 0.5) + 0.5;
                Ok(RelaxationParams {
                    omega_even,
                    omega_odd: 1.0 / tau_odd,
                })
            }
        }
    }
}

impl ThermostatConfig {
    pub fn new(kt: f64, gamma: f64, seed: u64) -> Self {
        Self { kt, gamma, seed }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.kt >= 0.0) || !self.kt.is_finite() {
            return Err(ConfigError::NegativeTemperature(self.kt));
        }
        if !(self.gamma >= 0.0) || !self.gamma.is_finite() {
            return Err(ConfigError::NegativeFriction(self.gamma));
        }
        Ok(())
    }
}

impl SimulationConfig {
    /// Fully periodic box with the given fluid and thermostat.
    pub fn new(grid: [usize; 3], fluid: FluidConfig, thermostat: ThermostatConfig) -> Self {
        Self {
            grid,
            periodic: default_periodic(),
            fluid,
            thermostat,
        }
    }

    pub fn with_periodic(mut self, periodic: [bool; 3]) -> Self {
        self.periodic = periodic;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid.iter().any(|&n| n == 0) {
            return Err(ConfigError::EmptyGrid(self.grid));
        }
        self.fluid.validate()?;
        self.thermostat.validate()
    }

    /// Box lengths in MD units.
    pub fn box_length(&self) -> [f64; 3] {
        self.grid.map(|n| n as f64 * self.fluid.agrid)
    }

    /// Save configuration to JSON file
    pub fn save_json(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from JSON file
    pub fn load_json(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config: SimulationConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fluid() -> FluidConfig {
        FluidConfig::new(2.5, 0.05, 1.7, 2.7)
    }

    #[test]
    fn test_bgk_relaxation_from_viscosity() {
        let f = fluid();
        let params = f.relaxation().unwrap();
        let nu = 2.7 * 0.05 / (2.5 * 2.5);
        let expected = 1.0 / (3.0 * nu + 0.5);
        assert!((params.omega_even - expected).abs() < 1e-12);
        assert_eq!(params.omega_even, params.omega_odd);
        assert!(params.omega_even > 0.0 && params.omega_even < 2.0);
    }

    #[test]
    fn test_trt_magic_relation() {
        let mut f = fluid();
        f.collision = CollisionModel::Trt { magic: 0.25 };
        let p = f.relaxation().unwrap();
        let lambda = (1.0 / p.omega_even - 0.5) * (1.0 / p.omega_odd - 0.5);
        assert!((lambda - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_bad_parameters() {
        let mut f = fluid();
        f.viscosity = -1.0;
        assert!(matches!(f.validate(), Err(ConfigError::NonPositiveViscosity(_))));

        let mut f = fluid();
        f.agrid = 0.0;
        assert!(matches!(f.validate(), Err(ConfigError::NonPositiveSpacing(_))));

        let mut f = fluid();
        f.viscosity = f64::NAN;
        assert!(f.validate().is_err());

        let t = ThermostatConfig::new(-0.1, 1.0, 0);
        assert!(matches!(t.validate(), Err(ConfigError::NegativeTemperature(_))));

        let c = SimulationConfig::new([0, 4, 4], fluid(), ThermostatConfig::default());
        assert!(matches!(c.validate(), Err(ConfigError::EmptyGrid(_))));
    }

    #[test]
    fn test_json_defaults() {
        let json = r#"{
            "grid": [8, 8, 8],
            "fluid": { "agrid": 1.0, "tau": 0.01, "density": 1.0, "viscosity": 1.0 }
        }"#;
        let config: SimulationConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.periodic, [true, true, true]);
        assert_eq!(config.fluid.collision, CollisionModel::Bgk);
        assert_eq!(config.thermostat.gamma, 1.0);
        assert_eq!(config.thermostat.kt, 0.0);
        config.validate().unwrap();
    }

    #[test]
    fn test_json_round_trip_through_file() {
        let mut config = SimulationConfig::new(
            [10, 6, 4],
            fluid(),
            ThermostatConfig::new(0.25, 5.0, 123),
        )
        .with_periodic([true, false, true]);
        config.fluid.collision = CollisionModel::Trt { magic: 0.1875 };

        let path = std::env::temp_dir().join(format!("lbm3d-config-{}.json", std::process::id()));
        config.save_json(&path).unwrap();
        let loaded = SimulationConfig::load_json(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, config);
    }
}
