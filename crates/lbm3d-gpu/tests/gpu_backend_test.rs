//! GPU backend against the CPU backend.
//!
//! Tests return early when no adapter is available.

use lbm3d::{
    Backend, BoundaryMask, CpuBackend, DVec3, FluidConfig, Lattice, MaskOptions, Particles,
    Shape, Simulation, SimulationConfig, ThermostatConfig, Wall,
};
use lbm3d_gpu::params::FIXED_POINT_SCALE;
use lbm3d_gpu::GpuBackend;

fn gpu() -> Option<GpuBackend> {
    let _ = env_logger::builder().is_test(true).try_init();
    match GpuBackend::new() {
        Ok(backend) => Some(backend),
        Err(e) => {
            eprintln!("Skipping GPU test: {}", e);
            None
        }
    }
}

fn config() -> SimulationConfig {
    SimulationConfig::new(
        [8, 8, 8],
        FluidConfig::new(1.0, 0.05, 1.0, 1.0),
        ThermostatConfig::new(0.1, 2.0, 17),
    )
}

fn particles(count: usize) -> Particles {
    let mut particles = Particles::new().with_box(DVec3::splat(8.0), [true; 3]);
    for i in 0..count {
        let t = i as f64;
        particles.spawn(
            DVec3::new((t * 1.37) % 8.0, (t * 2.91) % 8.0, (t * 0.73) % 8.0),
            DVec3::new(0.3 * (t * 0.5).sin(), -0.2, 0.1 * t.cos()),
            1.0,
        );
    }
    particles
}

/// Same seed, same parameters: trajectories agree to single precision
#[test]
fn test_gpu_matches_cpu_trajectory() {
    let Some(backend) = gpu() else { return };
    let mut gpu_sim = Simulation::new(config(), vec![], backend).unwrap();
    let mut cpu_sim = Simulation::cpu(config(), vec![]).unwrap();
    let mut gpu_particles = particles(12);
    let mut cpu_particles = particles(12);

    for _ in 0..50 {
        gpu_sim.advance(&mut gpu_particles, 0.05).unwrap();
        cpu_sim.advance(&mut cpu_particles, 0.05).unwrap();
    }

    for (g, c) in gpu_particles.list.iter().zip(&cpu_particles.list) {
        let err = (g.velocity - c.velocity).length();
        assert!(
            err < 5e-3 * (1.0 + c.velocity.length()),
            "GPU velocity {:?} vs CPU {:?}",
            g.velocity,
            c.velocity
        );
    }
    let dm = (gpu_sim.lattice().total_mass() - cpu_sim.lattice().total_mass()).abs();
    assert!(dm < 1e-3 * cpu_sim.lattice().total_mass());
    assert!(gpu_sim.health().is_stable());
}

/// Particles + fluid + pending deposits keep their momentum up to the
/// fixed-point resolution of the deposits
#[test]
fn test_gpu_conserves_momentum() {
    let Some(backend) = gpu() else { return };
    let config = config();
    let tau = config.fluid.tau;
    let agrid = config.fluid.agrid;
    let mut sim = Simulation::new(config, vec![], backend).unwrap();
    let count = 20;
    let mut particles = particles(count);

    // Worst case: every stencil weight rounds by half a unit on every axis
    let resolution = agrid / (tau * tau) / FIXED_POINT_SCALE;
    let bound = (count * 8) as f64 * 0.5 * resolution * 3f64.sqrt();

    let total = |sim: &Simulation<GpuBackend>, particles: &Particles| {
        particles.momentum() + sim.lattice().total_momentum() + sim.lattice().total_force() * tau
    };
    let p0 = total(&sim, &particles);
    let steps = 40;
    for _ in 0..steps {
        let report = sim.advance(&mut particles, tau).unwrap();
        let net = report.coupling.total_particle_force() + report.coupling.deposited;
        assert!(
            net.length() < bound + 1e-4,
            "Step {}: net force {:?} (bound {})",
            report.step,
            net,
            bound
        );
    }
    let drift = (total(&sim, &particles) - p0).length();
    assert!(drift < steps as f64 * bound * tau + 1e-2, "Momentum drift {}", drift);
}

/// Bounce-back and its force report agree with the CPU stream
#[test]
fn test_gpu_boundary_matches_cpu() {
    let Some(mut gpu_backend) = gpu() else { return };
    let config = SimulationConfig::new(
        [6, 12, 6],
        FluidConfig::new(1.0, 1.0, 1.0, 1.0 / 6.0),
        ThermostatConfig::default(),
    );
    let shapes: Vec<Shape> = vec![
        Wall::new(DVec3::Y, 1.0).into(),
        Wall::new(DVec3::NEG_Y, -11.0).into(),
    ];
    let mut lattice = Lattice::new(&config).unwrap();
    let mask = BoundaryMask::build(&lattice, &shapes, MaskOptions::default()).unwrap();
    for idx in 0..lattice.site_count() {
        if mask.is_solid(idx) {
            lattice.clear_site(idx);
        } else {
            lattice.set_equilibrium(idx, 1.0, DVec3::new(0.05, -0.08, 0.02));
        }
    }
    let mut cpu_lattice = lattice.clone();
    let mut cpu_backend = CpuBackend::new();
    gpu_backend.prepare(&lattice, &mask).unwrap();

    for step in 0..20 {
        gpu_backend.collide(&mut lattice, &mask).unwrap();
        cpu_backend.collide(&mut cpu_lattice, &mask).unwrap();
        let g = gpu_backend.stream(&mut lattice, &mask).unwrap();
        let c = cpu_backend.stream(&mut cpu_lattice, &mask).unwrap();
        for (gf, cf) in g.shape_forces.iter().zip(&c.shape_forces) {
            assert!(
                (*gf - *cf).length() < 1e-4 * (1.0 + cf.length()),
                "Step {}: wall force {:?} vs {:?}",
                step,
                gf,
                cf
            );
        }
    }

    for (g, c) in lattice.populations().iter().zip(cpu_lattice.populations()) {
        assert!((g - c).abs() < 1e-5, "population {} vs {}", g, c);
    }
}

/// Host edits between steps reach the device
#[test]
fn test_host_edit_is_uploaded() {
    let Some(backend) = gpu() else { return };
    let mut sim = Simulation::new(config(), vec![], backend).unwrap();
    let mut particles = Particles::new();
    sim.run(&mut particles, 3).unwrap();

    let kick = DVec3::new(0.2, 0.0, 0.0);
    for idx in 0..sim.lattice().site_count() {
        sim.lattice_mut().set_equilibrium(idx, 1.0, kick);
    }
    sim.run(&mut particles, 3).unwrap();

    // Uniform flow in a periodic box keeps its momentum
    let expected = kick * sim.lattice().total_mass();
    let p = sim.lattice().total_momentum();
    assert!((p - expected).length() < 1e-3 * expected.length(), "{:?} vs {:?}", p, expected);
}

/// A constant body force shifts the coupled fluid velocity the same way on
/// both backends
#[test]
fn test_gpu_body_force_matches_cpu() {
    let Some(backend) = gpu() else { return };
    let mut config = config();
    config.fluid.ext_force_density = [0.05, 0.0, -0.02];
    config.thermostat.kt = 0.0;
    let mut gpu_sim = Simulation::new(config.clone(), vec![], backend).unwrap();
    let mut cpu_sim = Simulation::cpu(config, vec![]).unwrap();
    let mut gpu_particles = particles(4);
    let mut cpu_particles = particles(4);

    let g = gpu_sim.advance(&mut gpu_particles, 0.05).unwrap();
    let c = cpu_sim.advance(&mut cpu_particles, 0.05).unwrap();
    for (fg, fc) in g.coupling.forces.iter().zip(&c.coupling.forces) {
        assert!((*fg - *fc).length() < 1e-4, "GPU force {:?} vs CPU {:?}", fg, fc);
    }
}

/// Deposits outside the fixed-point range fail the step instead of wrapping
#[test]
fn test_deposit_overflow_is_an_error() {
    let Some(backend) = gpu() else { return };
    let mut sim = Simulation::new(config(), vec![], backend).unwrap();
    let mut particles = Particles::new().with_box(DVec3::splat(8.0), [true; 3]);
    // 2e7 MD force is 5e4 lattice momentum per step, far beyond one slot
    particles.spawn(DVec3::splat(4.5), DVec3::new(1.0e7, 0.0, 0.0), 1.0);
    let err = sim.advance(&mut particles, 0.05).unwrap_err();
    assert!(err.to_string().contains("fixed-point"), "{}", err);
    assert_eq!(sim.step(), 0);
}

/// Pending host forces outside the fixed-point range are refused on upload
#[test]
fn test_oversized_host_force_is_refused() {
    let Some(backend) = gpu() else { return };
    let mut sim = Simulation::new(config(), vec![], backend).unwrap();
    sim.lattice_mut().add_force(7, DVec3::new(0.0, -1.0e7, 0.0));
    let err = sim.advance(&mut Particles::new(), 0.05).unwrap_err();
    assert!(err.to_string().contains("site 7"), "{}", err);
    assert_eq!(sim.step(), 0);
}
