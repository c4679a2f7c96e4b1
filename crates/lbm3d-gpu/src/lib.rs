//! wgpu compute backend for [`lbm3d`].
//!
//! ```no_run
//! use lbm3d::{FluidConfig, Simulation, SimulationConfig, ThermostatConfig};
//! use lbm3d_gpu::GpuBackend;
//!
//! let config = SimulationConfig::new(
//!     [32, 32, 32],
//!     FluidConfig::new(1.0, 0.01, 1.0, 1.0),
//!     ThermostatConfig::new(1.0, 1.0, 7),
//! );
//! let backend = GpuBackend::new().expect("GPU adapter");
//! let sim = Simulation::new(config, vec![], backend).unwrap();
//! assert_eq!(sim.step(), 0);
//! ```

pub mod backend;
pub mod context;
pub mod params;
pub mod pipeline_builder;
mod readback;

pub use backend::GpuBackend;
pub use context::{GpuContext, GpuError};
