//! Trilinear interpolation and deposit properties.

use lbm3d::coupling::{couple, interpolate_velocity};
use lbm3d::kernels::trilinear_stencil;
use lbm3d::{
    BoundaryMask, DVec3, FluidConfig, Lattice, ParticleState, SimulationConfig, Thermostat,
    ThermostatConfig,
};
use proptest::prelude::*;

const GRID: [usize; 3] = [7, 6, 5];
const AGRID: f64 = 0.5;

fn lattice(periodic: [bool; 3]) -> Lattice {
    let config = SimulationConfig::new(
        GRID,
        FluidConfig::new(AGRID, 0.05, 1.0, 1.0),
        ThermostatConfig::new(1.0, 3.0, 11),
    )
    .with_periodic(periodic);
    Lattice::new(&config).unwrap()
}

/// Positions whose stencil lies fully inside the grid
fn interior_position() -> impl Strategy<Value = DVec3> {
    let lo = 0.5 * AGRID;
    (
        lo..(GRID[0] as f64 - 0.5) * AGRID,
        lo..(GRID[1] as f64 - 0.5) * AGRID,
        lo..(GRID[2] as f64 - 0.5) * AGRID,
    )
        .prop_map(|(x, y, z)| DVec3::new(x, y, z))
}

fn small_vec() -> impl Strategy<Value = DVec3> {
    (-0.1f64..0.1, -0.1f64..0.1, -0.1f64..0.1).prop_map(|(x, y, z)| DVec3::new(x, y, z))
}

fn anywhere() -> impl Strategy<Value = DVec3> {
    (-10.0f64..10.0, -10.0f64..10.0, -10.0f64..10.0).prop_map(|(x, y, z)| DVec3::new(x, y, z))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: a velocity field linear in each axis is reproduced exactly
    #[test]
    fn test_linear_field_is_exact(
        offset in small_vec(),
        gx in small_vec(),
        gy in small_vec(),
        gz in small_vec(),
        position in interior_position(),
    ) {
        let mut l = lattice([false; 3]);
        let mask = BoundaryMask::open(&l).unwrap();
        let field = |p: DVec3| offset + gx * p.x + gy * p.y + gz * p.z;
        let [w, h, d] = l.dims();
        for k in 0..d {
            for j in 0..h {
                for i in 0..w {
                    let idx = l.cell_index(i, j, k);
                    let c = l.cell_center(i, j, k);
                    l.set_equilibrium(idx, 1.0, field(c));
                }
            }
        }
        let u = interpolate_velocity(&l, &mask, position).unwrap();
        let expected = field(position);
        prop_assert!((u - expected).length() < 1e-12, "{:?} vs {:?}", u, expected);
    }

    /// Property: stencil weights always sum to one
    #[test]
    fn test_weights_normalised(position in anywhere()) {
        let l = lattice([true; 3]);
        let mask = BoundaryMask::open(&l).unwrap();
        let st = trilinear_stencil(&l, &mask, position, 0).unwrap();
        let sum: f64 = st.iter().map(|(_, w)| w).sum();
        prop_assert!((sum - 1.0).abs() < 1e-12);
        prop_assert!(st.iter().all(|(_, w)| w > 0.0));
    }

    /// Property: everything taken from particles is put on the lattice
    #[test]
    fn test_deposit_conserves_momentum(
        positions in prop::collection::vec(anywhere(), 1..40),
        velocity in small_vec(),
    ) {
        let mut l = lattice([true; 3]);
        let mask = BoundaryMask::open(&l).unwrap();
        let thermostat = Thermostat::new(&ThermostatConfig::new(1.0, 3.0, 11), 0.05);
        let states: Vec<ParticleState> = positions
            .iter()
            .enumerate()
            .map(|(i, &position)| ParticleState {
                position,
                velocity: velocity * i as f64,
                identity: i as u64,
                is_virtual: false,
            })
            .collect();
        let out = couple(&mut l, &mask, &states, &thermostat).unwrap();
        let net = out.total_particle_force() + l.total_force();
        prop_assert!(net.length() < 1e-9, "net force {:?}", net);
    }
}
