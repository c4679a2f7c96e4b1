//! Streaming with halfway bounce-back.
//!
//! Pull scheme: site `x` gathers `f_q` from `x - c_q`. When that link is
//! blocked the population reflected at the wall is taken instead,
//! `f_q(x) = f*_opp(q)(x)`. Solid sites carry no fluid.
//!
//! Each reflected population hands `2 f c` of momentum to the solid it hit.
//! Those transfers are summed per shape into a [`StreamReport`].

use glam::DVec3;
use rayon::prelude::*;

use crate::boundary::{BoundaryLink, BoundaryMask};
use crate::constants::{velocity, OPPOSITE, Q, VELOCITIES};
use crate::lattice::Lattice;

/// Forces exerted by the fluid on static boundaries during one stream, MD units.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamReport {
    /// Total force on all boundaries, domain edges included.
    pub boundary_force: DVec3,
    /// Force per shape, indexed like the shape list of the mask.
    pub shape_forces: Vec<DVec3>,
    /// Force on the walls closing non-periodic axes.
    pub edge_force: DVec3,
}

impl StreamReport {
    /// Sum the momentum handed over at every blocked link.
    ///
    /// `bounced` returns the post-collision population leaving through a link.
    pub fn from_links<F>(
        links: &[BoundaryLink],
        shape_count: usize,
        lattice: &Lattice,
        mut bounced: F,
    ) -> Self
    where
        F: FnMut(&BoundaryLink) -> f64,
    {
        let mut shape_momentum = vec![DVec3::ZERO; shape_count];
        let mut edge_momentum = DVec3::ZERO;
        for link in links {
            let m = 2.0 * bounced(link) * DVec3::from_array(velocity(link.dir));
            match link.shape {
                Some(s) => shape_momentum[s] += m,
                None => edge_momentum += m,
            }
        }

        // Momentum per lattice step -> force
        let to_force = |m: DVec3| lattice.momentum_to_md(m) / lattice.tau();
        let shape_forces: Vec<DVec3> = shape_momentum.into_iter().map(to_force).collect();
        let edge_force = to_force(edge_momentum);
        let boundary_force = shape_forces.iter().copied().sum::<DVec3>() + edge_force;

        Self {
            boundary_force,
            shape_forces,
            edge_force,
        }
    }
}

/// Propagate all populations one lattice step.
pub fn stream(lattice: &mut Lattice, mask: &BoundaryMask) -> StreamReport {
    let dims = lattice.dims();
    let periodic = lattice.periodic();
    let (src, dst) = lattice.stream_buffers();

    dst.par_chunks_mut(Q).enumerate().for_each(|(idx, out)| {
        if mask.is_solid(idx) {
            out.fill(0.0);
            return;
        }
        let links = mask.links(idx);
        out[0] = src[idx * Q];
        for q in 1..Q {
            let back = OPPOSITE[q];
            out[q] = if links.contains(back) {
                src[idx * Q + back]
            } else {
                match upstream(dims, periodic, idx, q) {
                    Some(from) => src[from * Q + q],
                    // Unreachable for a mask built on this lattice
                    None => src[idx * Q + back],
                }
            };
        }
    });

    let report = StreamReport::from_links(
        mask.boundary_links(),
        mask.shape_count(),
        lattice,
        |link| lattice.populations()[link.site * Q + link.dir],
    );
    lattice.swap_buffers();
    report
}

/// Site at `x - c_q`, with periodic wrap.
#[inline]
fn upstream(dims: [usize; 3], periodic: [bool; 3], idx: usize, q: usize) -> Option<usize> {
    let [w, h, _] = dims;
    let coords = [idx % w, (idx / w) % h, idx / (w * h)];
    let c = VELOCITIES[q];
    let mut out = [0usize; 3];
    for axis in 0..3 {
        let n = dims[axis] as i64;
        let p = coords[axis] as i64 - c[axis] as i64;
        out[axis] = if (0..n).contains(&p) {
            p as usize
        } else if periodic[axis] {
            p.rem_euclid(n) as usize
        } else {
            return None;
        };
    }
    Some(out[2] * w * h + out[1] * w + out[0])
}
