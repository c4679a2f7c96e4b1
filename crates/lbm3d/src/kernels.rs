//! Trilinear interpolation stencil for particle-lattice transfers.
//!
//! The same weights are used to gather fluid velocity at a particle and to
//! scatter the reaction force back, which keeps the exchange momentum
//! conserving.

use glam::DVec3;

use crate::boundary::BoundaryMask;
use crate::error::CouplingError;
use crate::lattice::Lattice;

/// 1D linear hat weight.
/// Support: [-1, 1] (covers 2 lattice sites)
#[inline]
pub fn linear_1d(r: f64) -> f64 {
    let r_abs = r.abs();
    if r_abs < 1.0 {
        1.0 - r_abs
    } else {
        0.0
    }
}

/// 3D trilinear weight (tensor product of 1D).
#[inline]
pub fn trilinear_3d(delta: DVec3) -> f64 {
    linear_1d(delta.x) * linear_1d(delta.y) * linear_1d(delta.z)
}

/// Up to eight lattice sites with normalised weights.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Stencil {
    pub sites: [usize; 8],
    pub weights: [f64; 8],
    pub len: usize,
}

impl Stencil {
    /// `(site, weight)` pairs in a fixed order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.sites[..self.len]
            .iter()
            .copied()
            .zip(self.weights[..self.len].iter().copied())
    }

    /// Weighted sum of a per-site quantity.
    #[inline]
    pub fn gather(&self, mut value: impl FnMut(usize) -> DVec3) -> DVec3 {
        self.iter().map(|(site, w)| w * value(site)).sum()
    }
}

/// Stencil around `position` for `particle`.
///
/// Periodic axes wrap. Sites beyond a bounded axis and solid sites are
/// dropped and the remaining weights renormalised.
pub fn trilinear_stencil(
    lattice: &Lattice,
    mask: &BoundaryMask,
    position: DVec3,
    particle: usize,
) -> Result<Stencil, CouplingError> {
    if !position.is_finite() {
        return Err(CouplingError::NonFinite { particle });
    }

    let dims = lattice.dims();
    let periodic = lattice.periodic();
    let p = position / lattice.agrid();
    for axis in 0..3 {
        if !periodic[axis] && !(0.0..=dims[axis] as f64).contains(&p[axis]) {
            return Err(CouplingError::OutsideDomain { particle, position });
        }
    }

    // Site centres sit at half-integer positions
    let s = p - DVec3::splat(0.5);
    let base = s.floor();
    let frac = s - base;
    let (bi, bj, bk) = (base.x as i64, base.y as i64, base.z as i64);

    let mut stencil = Stencil::default();
    let mut total = 0.0;
    for dk in 0..2i64 {
        for dj in 0..2i64 {
            for di in 0..2i64 {
                let offset = DVec3::new(di as f64, dj as f64, dk as f64);
                let w = trilinear_3d(frac - offset);
                if w <= 0.0 {
                    continue;
                }
                let Some(site) = lattice.resolve([bi + di, bj + dj, bk + dk]) else {
                    continue;
                };
                if mask.is_solid(site) {
                    continue;
                }
                stencil.sites[stencil.len] = site;
                stencil.weights[stencil.len] = w;
                stencil.len += 1;
                total += w;
            }
        }
    }

    if stencil.len == 0 || total <= 0.0 {
        return Err(CouplingError::NoFluidSupport { particle });
    }
    for w in &mut stencil.weights[..stencil.len] {
        *w /= total;
    }
    Ok(stencil)
}
