//! D3Q19 velocity set and lattice constants.
//!
//! Directions are ordered rest, faces, then edges, with every direction
//! followed directly by its opposite:
//!
//! | index | velocity |
//! |---|---|
//! | 0 | (0, 0, 0) |
//! | 1, 2 | (±1, 0, 0) |
//! | 3, 4 | (0, ±1, 0) |
//! | 5, 6 | (0, 0, ±1) |
//! | 7, 8 | ±(1, 1, 0) |
//! | 9, 10 | ±(1, -1, 0) |
//! | 11, 12 | ±(1, 0, 1) |
//! | 13, 14 | ±(1, 0, -1) |
//! | 15, 16 | ±(0, 1, 1) |
//! | 17, 18 | ±(0, 1, -1) |

/// Number of discrete velocities.
pub const Q: usize = 19;

/// Discrete lattice velocities.
pub const VELOCITIES: [[i32; 3]; Q] = [
    [0, 0, 0],
    // Faces (6)
    [1, 0, 0],
    [-1, 0, 0],
    [0, 1, 0],
    [0, -1, 0],
    [0, 0, 1],
    [0, 0, -1],
    // Edges (12)
    [1, 1, 0],
    [-1, -1, 0],
    [1, -1, 0],
    [-1, 1, 0],
    [1, 0, 1],
    [-1, 0, -1],
    [1, 0, -1],
    [-1, 0, 1],
    [0, 1, 1],
    [0, -1, -1],
    [0, 1, -1],
    [0, -1, 1],
];

/// Quadrature weights.
pub const WEIGHTS: [f64; Q] = [
    1.0 / 3.0,
    // Faces
    1.0 / 18.0,
    1.0 / 18.0,
    1.0 / 18.0,
    1.0 / 18.0,
    1.0 / 18.0,
    1.0 / 18.0,
    // Edges
    1.0 / 36.0,
    1.0 / 36.0,
    1.0 / 36.0,
    1.0 / 36.0,
    1.0 / 36.0,
    1.0 / 36.0,
    1.0 / 36.0,
    1.0 / 36.0,
    1.0 / 36.0,
    1.0 / 36.0,
    1.0 / 36.0,
    1.0 / 36.0,
];

/// Index of the reversed velocity, used by bounce-back.
pub const OPPOSITE: [usize; Q] = [0, 2, 1, 4, 3, 6, 5, 8, 7, 10, 9, 12, 11, 14, 13, 16, 15, 18, 17];

/// Lattice speed of sound squared.
pub const CS2: f64 = 1.0 / 3.0;

/// Default TRT magic parameter (places the bounce-back wall halfway between sites).
pub const DEFAULT_TRT_MAGIC: f64 = 3.0 / 16.0;

/// Thermostat noise prefactor coefficient for uniform noise in [-0.5, 0.5).
///
/// Uniform noise has variance 1/12, so `sqrt(24 kT gamma / dt) * U` has
/// variance `2 kT gamma / dt`.
pub const UNIFORM_NOISE_COEFF: f64 = 24.0;

/// Lattice velocity of direction `q` as floats.
#[inline]
pub fn velocity(q: usize) -> [f64; 3] {
    let c = VELOCITIES[q];
    [c[0] as f64, c[1] as f64, c[2] as f64]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_sum_to_one() {
        let sum: f64 = WEIGHTS.iter().sum();
        assert!((sum - 1.0).abs() < 1e-14);
    }

    #[test]
    fn test_opposite_reverses_velocity() {
        for q in 0..Q {
            let c = VELOCITIES[q];
            let o = VELOCITIES[OPPOSITE[q]];
            assert_eq!([c[0] + o[0], c[1] + o[1], c[2] + o[2]], [0, 0, 0], "direction {}", q);
            assert_eq!(OPPOSITE[OPPOSITE[q]], q);
        }
    }

    #[test]
    fn test_second_moment_is_isotropic() {
        // sum_q w_q c_qa c_qb = cs^2 delta_ab
        for a in 0..3 {
            for b in 0..3 {
                let m: f64 = (0..Q)
                    .map(|q| WEIGHTS[q] * velocity(q)[a] * velocity(q)[b])
                    .sum();
                let expected = if a == b { CS2 } else { 0.0 };
                assert!((m - expected).abs() < 1e-14, "moment ({}, {}) = {}", a, b, m);
            }
        }
    }
}
