//! Momentum exchange between particles and fluid over full steps.

use lbm3d::{
    CoupledParticles, DVec3, FluidConfig, Particles, Simulation, SimulationConfig,
    ThermostatConfig,
};

fn config(kt: f64) -> SimulationConfig {
    SimulationConfig::new(
        [8, 8, 8],
        FluidConfig::new(1.0, 0.05, 1.0, 1.0),
        ThermostatConfig::new(kt, 2.0, 5),
    )
}

fn particles(count: usize, box_length: DVec3) -> Particles {
    let mut particles = Particles::new().with_box(box_length, [true; 3]);
    for i in 0..count {
        let t = i as f64;
        particles.spawn(
            DVec3::new((t * 1.37) % 8.0, (t * 2.91) % 8.0, (t * 0.73) % 8.0),
            DVec3::new(0.3 * (t * 0.5).sin(), -0.2, 0.1 * t.cos()),
            1.0 + 0.1 * t,
        );
    }
    particles
}

/// Per step: particle forces and lattice deposit cancel exactly
#[test]
fn test_step_forces_cancel() {
    let config = config(0.5);
    let box_length = DVec3::from_array(config.box_length());
    let mut sim = Simulation::cpu(config, vec![]).unwrap();
    let mut particles = particles(30, box_length);

    for _ in 0..20 {
        let report = sim.advance(&mut particles, 0.05).unwrap();
        let net = report.coupling.total_particle_force() + report.coupling.deposited;
        assert!(net.length() < 1e-10, "Step {}: net force {:?}", report.step, net);
    }
}

/// Over many steps: particle + fluid + pending deposit momentum is constant
#[test]
fn test_total_momentum_is_conserved() {
    let config = config(1.0);
    let tau = config.fluid.tau;
    let box_length = DVec3::from_array(config.box_length());
    let mut sim = Simulation::cpu(config, vec![]).unwrap();
    let mut particles = particles(25, box_length);

    let total = |sim: &Simulation, particles: &Particles| {
        particles.momentum() + sim.lattice().total_momentum() + sim.lattice().total_force() * tau
    };
    let p0 = total(&sim, &particles);

    for step in 0..100 {
        sim.advance(&mut particles, tau).unwrap();
        let p = total(&sim, &particles);
        assert!(
            (p - p0).length() < 1e-9,
            "Momentum drift after step {}: {:?} -> {:?}",
            step,
            p0,
            p
        );
    }
}

/// Friction only: a moving particle drags the fluid along
#[test]
fn test_friction_drags_fluid() {
    let config = config(0.0);
    let mut sim = Simulation::cpu(config, vec![]).unwrap();
    let mut particles = Particles::new().with_box(DVec3::splat(8.0), [true; 3]);
    particles.spawn(DVec3::splat(4.0), DVec3::new(1.0, 0.0, 0.0), 10.0);

    sim.run(&mut particles, 50).unwrap();

    let fluid = sim.lattice().total_momentum();
    assert!(fluid.x > 0.0, "Fluid should move with the particle: {:?}", fluid);
    assert!(particles.velocity(0).x < 1.0, "Particle should slow down");
    assert!(fluid.y.abs() < 1e-12 && fluid.z.abs() < 1e-12);
}

/// The same seed replays the same trajectory
#[test]
fn test_seeded_replay() {
    let config = config(1.0);
    let box_length = DVec3::from_array(config.box_length());
    let run = || {
        let mut sim = Simulation::cpu(config.clone(), vec![]).unwrap();
        let mut particles = particles(10, box_length);
        sim.run(&mut particles, 30).unwrap();
        particles.list.iter().map(|p| p.velocity).collect::<Vec<_>>()
    };
    assert_eq!(run(), run());
}
