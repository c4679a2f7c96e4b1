//! Langevin friction and counter-based noise for particle-fluid coupling.
//!
//! The noise for a particle depends only on `(seed, identity, step)`, never on
//! the order particles are visited in, so parallel and serial coupling draw
//! identical forces.

use glam::DVec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::ThermostatConfig;
use crate::constants::UNIFORM_NOISE_COEFF;

/// ChaCha words reserved per particle and step. Three f64 draws use six.
const WORDS_PER_STEP: u128 = 16;

/// Friction and noise generator for one run.
#[derive(Clone, Debug, PartialEq)]
pub struct Thermostat {
    kt: f64,
    gamma: f64,
    seed: u64,
    /// Step counter keying the noise
    counter: u64,
    noise_amplitude: f64,
}

impl Thermostat {
    /// Thermostat for time step `dt`.
    pub fn new(config: &ThermostatConfig, dt: f64) -> Self {
        Self {
            kt: config.kt,
            gamma: config.gamma,
            seed: config.seed,
            counter: 0,
            noise_amplitude: (UNIFORM_NOISE_COEFF * config.kt * config.gamma / dt).sqrt(),
        }
    }

    #[inline]
    pub fn kt(&self) -> f64 {
        self.kt
    }

    #[inline]
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    #[inline]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Current noise counter (one per coupled step).
    #[inline]
    pub fn rng_counter(&self) -> u64 {
        self.counter
    }

    /// Restore the noise counter, e.g. from a checkpoint.
    pub fn set_rng_counter(&mut self, counter: u64) {
        self.counter = counter;
    }

    /// Move to the next step's noise.
    pub fn advance(&mut self) {
        self.counter += 1;
    }

    /// Random force for a particle at the current step.
    ///
    /// Uniform in each axis with zero mean and variance `2 kT gamma / dt`.
    pub fn noise(&self, identity: u64) -> DVec3 {
        if self.noise_amplitude == 0.0 {
            return DVec3::ZERO;
        }
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_stream(identity);
        rng.set_word_pos(self.counter as u128 * WORDS_PER_STEP);
        let u = DVec3::new(
            rng.gen::<f64>() - 0.5,
            rng.gen::<f64>() - 0.5,
            rng.gen::<f64>() - 0.5,
        );
        u * self.noise_amplitude
    }

    /// Friction for a velocity relative to the fluid.
    #[inline]
    pub fn friction(&self, relative_velocity: DVec3) -> DVec3 {
        -self.gamma * relative_velocity
    }

    /// Total coupling force: friction plus noise.
    #[inline]
    pub fn force(&self, identity: u64, relative_velocity: DVec3) -> DVec3 {
        self.friction(relative_velocity) + self.noise(identity)
    }
}
