//! Collision: local relaxation of populations towards equilibrium.
//!
//! Populations split into even and odd parts under velocity reversal,
//! `f+ = (f_q + f_opp) / 2` and `f- = (f_q - f_opp) / 2`. The even part
//! relaxes at `omega_even`, the odd part at `omega_odd`. With equal rates
//! this is plain BGK.
//!
//! The pending momentum source of a site (coupling deposits plus the
//! external body force) is applied with Guo forcing, split the same way.
//! The equilibrium is built from the half-step velocity `(m + F/2) / rho`,
//! so one collision adds exactly `F` to the site momentum and leaves its
//! mass unchanged.

use glam::DVec3;
use rayon::prelude::*;

use crate::boundary::BoundaryMask;
use crate::config::RelaxationParams;
use crate::constants::{velocity, OPPOSITE, Q, WEIGHTS};
use crate::lattice::Lattice;

/// Second-order equilibrium for site mass `rho` and lattice velocity `u`.
#[inline]
pub fn equilibrium(rho: f64, u: DVec3) -> [f64; Q] {
    let usq = u.length_squared();
    let mut feq = [0.0; Q];
    for q in 0..Q {
        let cu = DVec3::from_array(velocity(q)).dot(u);
        feq[q] = WEIGHTS[q] * rho * (1.0 + 3.0 * cu + 4.5 * cu * cu - 1.5 * usq);
    }
    feq
}

/// Collide one site.
///
/// `force` is the momentum added during this step, in lattice units.
/// Empty sites are left untouched.
#[inline]
pub fn collide_site(f: &mut [f64], force: DVec3, params: RelaxationParams) {
    let rho: f64 = f.iter().sum();
    if rho == 0.0 {
        return;
    }
    let mut m = DVec3::ZERO;
    for q in 1..Q {
        m += f[q] * DVec3::from_array(velocity(q));
    }
    let u = (m + 0.5 * force) / rho;
    let feq = equilibrium(rho, u);

    let even_src = 1.0 - 0.5 * params.omega_even;
    let odd_src = 1.0 - 0.5 * params.omega_odd;
    let uf = u.dot(force);

    let mut out = [0.0; Q];
    out[0] = f[0] - params.omega_even * (f[0] - feq[0]) + even_src * WEIGHTS[0] * (-3.0 * uf);

    // Directions come in (q, opp) pairs: 1/2, 3/4, ...
    for q in (1..Q).step_by(2) {
        let o = OPPOSITE[q];
        let c = DVec3::from_array(velocity(q));
        let cu = c.dot(u);
        let cf = c.dot(force);

        let f_even = 0.5 * (f[q] + f[o]);
        let f_odd = 0.5 * (f[q] - f[o]);
        let eq_even = 0.5 * (feq[q] + feq[o]);
        let eq_odd = 0.5 * (feq[q] - feq[o]);

        let d_even = -params.omega_even * (f_even - eq_even)
            + even_src * WEIGHTS[q] * (9.0 * cu * cf - 3.0 * uf);
        let d_odd = -params.omega_odd * (f_odd - eq_odd) + odd_src * WEIGHTS[q] * 3.0 * cf;

        out[q] = f[q] + d_even + d_odd;
        out[o] = f[o] + d_even - d_odd;
    }

    f.copy_from_slice(&out);
}

/// Collide every non-solid site and consume the pending forces.
pub fn collide(lattice: &mut Lattice, mask: &BoundaryMask) {
    let params = lattice.relaxation();
    let ext = external_force(lattice);
    let to_lattice = lattice.tau() * lattice.tau() / lattice.agrid();
    let classes = mask.classes();

    let (populations, forces) = lattice.collision_buffers();
    populations
        .par_chunks_mut(Q)
        .zip(forces.par_iter_mut())
        .zip(classes.par_iter())
        .for_each(|((f, force), class)| {
            if !class.is_solid() {
                collide_site(f, (*force + ext) * to_lattice, params);
            }
            *force = DVec3::ZERO;
        });
}

/// External body force per site in MD units.
pub fn external_force(lattice: &Lattice) -> DVec3 {
    lattice.external_force()
}
