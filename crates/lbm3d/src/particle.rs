//! Particle contract for lattice coupling, plus a simple particle store.
//!
//! The lattice never owns particles. Anything implementing
//! [`CoupledParticles`] can be coupled; [`ParticleIntegrator`] advances it
//! once the coupling forces have been added.

use glam::DVec3;

/// Read access to particle state and an additive force accumulator.
pub trait CoupledParticles {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn position(&self, index: usize) -> DVec3;

    fn velocity(&self, index: usize) -> DVec3;

    /// Stable identity keying the thermostat noise. Defaults to the index.
    fn identity(&self, index: usize) -> u64 {
        index as u64
    }

    /// Self-propulsion velocity, subtracted before friction is computed.
    fn swim_velocity(&self, _index: usize) -> DVec3 {
        DVec3::ZERO
    }

    /// Virtual particles are not coupled to the fluid.
    fn is_virtual(&self, _index: usize) -> bool {
        false
    }

    /// Add to the particle's force accumulator.
    fn add_force(&mut self, index: usize, force: DVec3);
}

/// Time stepping of particle positions and velocities.
pub trait ParticleIntegrator {
    fn integrate(&mut self, dt: f64);
}

/// Snapshot of one particle as seen by the coupling kernels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParticleState {
    pub position: DVec3,
    /// Velocity minus swim velocity
    pub velocity: DVec3,
    pub identity: u64,
    pub is_virtual: bool,
}

impl ParticleState {
    /// Snapshot every particle of a store.
    pub fn collect<P: CoupledParticles + ?Sized>(particles: &P) -> Vec<ParticleState> {
        (0..particles.len())
            .map(|i| ParticleState {
                position: particles.position(i),
                velocity: particles.velocity(i) - particles.swim_velocity(i),
                identity: particles.identity(i),
                is_virtual: particles.is_virtual(i),
            })
            .collect()
    }
}

/// A point particle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    /// World position
    pub position: DVec3,
    /// Current velocity
    pub velocity: DVec3,
    /// Force accumulated for the current step
    pub force: DVec3,
    pub mass: f64,
    pub identity: u64,
    pub swim_velocity: DVec3,
    pub is_virtual: bool,
}

impl Particle {
    /// Create a new particle at the given position with initial velocity.
    pub fn new(position: DVec3, velocity: DVec3, mass: f64) -> Self {
        Self {
            position,
            velocity,
            force: DVec3::ZERO,
            mass,
            identity: 0,
            swim_velocity: DVec3::ZERO,
            is_virtual: false,
        }
    }

    /// Create a stationary unit-mass particle at the given position.
    pub fn at(position: DVec3) -> Self {
        Self::new(position, DVec3::ZERO, 1.0)
    }
}

/// Collection of particles.
#[derive(Clone, Debug, Default)]
pub struct Particles {
    pub list: Vec<Particle>,
    /// Bounded axes clamp positions to the box; periodic axes wrap.
    box_length: Option<(DVec3, [bool; 3])>,
}

impl Particles {
    /// Create an empty particle collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            list: Vec::with_capacity(capacity),
            box_length: None,
        }
    }

    /// Fold positions back into a box after every integration step.
    pub fn with_box(mut self, box_length: DVec3, periodic: [bool; 3]) -> Self {
        self.box_length = Some((box_length, periodic));
        self
    }

    /// Add a particle; its identity is its insertion order.
    pub fn spawn(&mut self, position: DVec3, velocity: DVec3, mass: f64) {
        let mut p = Particle::new(position, velocity, mass);
        p.identity = self.list.len() as u64;
        self.list.push(p);
    }

    /// Add a stationary unit-mass particle.
    pub fn spawn_at(&mut self, position: DVec3) {
        self.spawn(position, DVec3::ZERO, 1.0);
    }

    /// Number of particles.
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Clear all particles.
    pub fn clear(&mut self) {
        self.list.clear();
    }

    /// Total momentum.
    pub fn momentum(&self) -> DVec3 {
        self.list.iter().map(|p| p.mass * p.velocity).sum()
    }

    /// Total kinetic energy.
    pub fn kinetic_energy(&self) -> f64 {
        self.list
            .iter()
            .map(|p| 0.5 * p.mass * p.velocity.length_squared())
            .sum()
    }
}

impl CoupledParticles for Particles {
    fn len(&self) -> usize {
        self.list.len()
    }

    fn position(&self, index: usize) -> DVec3 {
        self.list[index].position
    }

    fn velocity(&self, index: usize) -> DVec3 {
        self.list[index].velocity
    }

    fn identity(&self, index: usize) -> u64 {
        self.list[index].identity
    }

    fn swim_velocity(&self, index: usize) -> DVec3 {
        self.list[index].swim_velocity
    }

    fn is_virtual(&self, index: usize) -> bool {
        self.list[index].is_virtual
    }

    fn add_force(&mut self, index: usize, force: DVec3) {
        self.list[index].force += force;
    }
}

impl ParticleIntegrator for Particles {
    /// Semi-implicit Euler; consumes the accumulated forces.
    fn integrate(&mut self, dt: f64) {
        for p in &mut self.list {
            if p.mass > 0.0 {
                p.velocity += p.force / p.mass * dt;
            }
            p.position += p.velocity * dt;
            p.force = DVec3::ZERO;
        }

        if let Some((box_length, periodic)) = self.box_length {
            for p in &mut self.list {
                for axis in 0..3 {
                    let l = box_length[axis];
                    if periodic[axis] {
                        p.position[axis] = p.position[axis].rem_euclid(l);
                    } else if p.position[axis] < 0.0 || p.position[axis] > l {
                        // Reflect off the closing wall
                        p.position[axis] = p.position[axis].clamp(0.0, l);
                        p.velocity[axis] = -p.velocity[axis];
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_particle_creation() {
        let p = Particle::new(DVec3::new(1.0, 2.0, 3.0), DVec3::new(0.1, 0.2, 0.3), 2.0);
        assert_eq!(p.position, DVec3::new(1.0, 2.0, 3.0));
        assert_eq!(p.velocity, DVec3::new(0.1, 0.2, 0.3));
        assert_eq!(p.force, DVec3::ZERO);
        assert!(!p.is_virtual);
    }

    #[test]
    fn test_particles_spawn() {
        let mut particles = Particles::new();
        particles.spawn(DVec3::ONE, DVec3::ZERO, 1.0);
        particles.spawn_at(DVec3::new(2.0, 2.0, 2.0));
        assert_eq!(particles.len(), 2);
        assert_eq!(CoupledParticles::identity(&particles, 1), 1);
    }

    #[test]
    fn test_integrate_semi_implicit_euler() {
        let mut particles = Particles::new();
        particles.spawn(DVec3::ZERO, DVec3::X, 2.0);
        particles.add_force(0, DVec3::new(0.0, 4.0, 0.0));
        particles.integrate(0.5);
        let p = particles.list[0];
        assert_eq!(p.velocity, DVec3::new(1.0, 1.0, 0.0));
        assert_eq!(p.position, DVec3::new(0.5, 0.5, 0.0));
        assert_eq!(p.force, DVec3::ZERO);
    }

    #[test]
    fn test_periodic_box_wraps() {
        let mut particles = Particles::new().with_box(DVec3::splat(4.0), [true, false, true]);
        particles.spawn(DVec3::new(3.9, 3.9, 0.1), DVec3::new(1.0, 1.0, -1.0), 1.0);
        particles.integrate(0.2);
        let p = particles.list[0];
        assert!((p.position.x - 0.1).abs() < 1e-12);
        assert_eq!(p.position.y, 4.0);
        assert!(p.velocity.y < 0.0);
        assert!((p.position.z - 3.9).abs() < 1e-12);
    }

    #[test]
    fn test_snapshot_subtracts_swim_velocity() {
        let mut particles = Particles::new();
        particles.spawn(DVec3::ZERO, DVec3::new(1.0, 0.0, 0.0), 1.0);
        particles.list[0].swim_velocity = DVec3::new(0.25, 0.0, 0.0);
        let states = ParticleState::collect(&particles);
        assert_eq!(states[0].velocity, DVec3::new(0.75, 0.0, 0.0));
    }
}
