//! Numerical health of the lattice.
//!
//! Instability is reported, never corrected.

use rayon::prelude::*;

use crate::boundary::BoundaryMask;
use crate::constants::{velocity, Q};
use crate::lattice::Lattice;

/// Above this lattice speed the low-Mach expansion breaks down.
pub const MAX_STABLE_LATTICE_SPEED: f64 = 0.3;

/// Summary of population sanity over all fluid sites.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NumericalHealth {
    /// Sites holding a NaN or infinite population
    pub non_finite_sites: usize,
    /// Sites with non-positive density
    pub negative_density_sites: usize,
    /// Sites with at least one negative population
    pub negative_population_sites: usize,
    /// Smallest site density, MD units
    pub min_density: f64,
    /// Largest site speed, lattice units
    pub max_lattice_speed: f64,
}

#[derive(Clone, Copy)]
struct SiteHealth {
    non_finite: usize,
    negative_density: usize,
    negative_population: usize,
    min_density: f64,
    max_speed: f64,
}

impl SiteHealth {
    const IDENTITY: SiteHealth = SiteHealth {
        non_finite: 0,
        negative_density: 0,
        negative_population: 0,
        min_density: f64::INFINITY,
        max_speed: 0.0,
    };

    fn merge(self, other: SiteHealth) -> SiteHealth {
        SiteHealth {
            non_finite: self.non_finite + other.non_finite,
            negative_density: self.negative_density + other.negative_density,
            negative_population: self.negative_population + other.negative_population,
            min_density: self.min_density.min(other.min_density),
            max_speed: self.max_speed.max(other.max_speed),
        }
    }
}

impl NumericalHealth {
    /// Scan every fluid site.
    pub fn measure(lattice: &Lattice, mask: &BoundaryMask) -> Self {
        let volume = lattice.agrid().powi(3);
        let h = lattice
            .populations()
            .par_chunks(Q)
            .enumerate()
            .filter(|(idx, _)| !mask.is_solid(*idx))
            .map(|(_, f)| {
                let mut site = SiteHealth::IDENTITY;
                if f.iter().any(|v| !v.is_finite()) {
                    site.non_finite = 1;
                    return site;
                }
                if f.iter().any(|&v| v < 0.0) {
                    site.negative_population = 1;
                }
                let rho: f64 = f.iter().sum();
                site.min_density = rho / volume;
                if rho <= 0.0 {
                    site.negative_density = 1;
                    return site;
                }
                let mut m = [0.0f64; 3];
                for q in 1..Q {
                    let c = velocity(q);
                    for axis in 0..3 {
                        m[axis] += f[q] * c[axis];
                    }
                }
                site.max_speed = (m[0] * m[0] + m[1] * m[1] + m[2] * m[2]).sqrt() / rho;
                site
            })
            .reduce(|| SiteHealth::IDENTITY, SiteHealth::merge);

        Self {
            non_finite_sites: h.non_finite,
            negative_density_sites: h.negative_density,
            negative_population_sites: h.negative_population,
            min_density: h.min_density,
            max_lattice_speed: h.max_speed,
        }
    }

    /// No NaNs, no empty or negative fluid sites, and a sane Mach number.
    pub fn is_stable(&self) -> bool {
        self.non_finite_sites == 0
            && self.negative_density_sites == 0
            && self.max_lattice_speed < MAX_STABLE_LATTICE_SPEED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FluidConfig, SimulationConfig, ThermostatConfig};

    fn lattice() -> Lattice {
        let config = SimulationConfig::new(
            [4, 4, 4],
            FluidConfig::new(1.0, 1.0, 1.5, 1.0 / 6.0),
            ThermostatConfig::default(),
        );
        Lattice::new(&config).unwrap()
    }

    #[test]
    fn test_rest_fluid_is_healthy() {
        let l = lattice();
        let mask = BoundaryMask::open(&l).unwrap();
        let h = NumericalHealth::measure(&l, &mask);
        assert!(h.is_stable());
        assert!((h.min_density - 1.5).abs() < 1e-12);
        assert!(h.max_lattice_speed < 1e-15);
    }

    #[test]
    fn test_detects_nan_and_negative_density() {
        let mut l = lattice();
        let mask = BoundaryMask::open(&l).unwrap();
        l.site_mut(3)[5] = f64::NAN;
        l.site_mut(7).fill(-0.1);
        let h = NumericalHealth::measure(&l, &mask);
        assert_eq!(h.non_finite_sites, 1);
        assert_eq!(h.negative_density_sites, 1);
        assert_eq!(h.negative_population_sites, 1);
        assert!(!h.is_stable());
    }

    #[test]
    fn test_detects_high_speed() {
        let mut l = lattice();
        let mask = BoundaryMask::open(&l).unwrap();
        l.set_equilibrium(0, 1.5, glam::DVec3::new(0.5, 0.0, 0.0));
        let h = NumericalHealth::measure(&l, &mask);
        assert!((h.max_lattice_speed - 0.5).abs() < 1e-12);
        assert!(!h.is_stable());
    }
}
