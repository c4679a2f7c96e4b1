//! Static boundary mask.
//!
//! One [`SiteClass`] per lattice site, in the lattice's flat index order.
//! A site is solid when it lies inside any shape (ordered union); a fluid
//! site with at least one blocked link is a [`SiteClass::LinkBoundary`].
//! A link is blocked when the neighbour along it is solid or lies beyond a
//! non-periodic domain edge.
//!
//! The mask is immutable once built. Changing geometry means building a new
//! mask from scratch.

use glam::DVec3;
use rayon::prelude::*;

use crate::constants::Q;
use crate::error::GeometryError;
use crate::lattice::Lattice;
use crate::shapes::{Shape, ShapeOracle};

/// Set of blocked lattice directions, bit `q` for direction `q`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct LinkSet(u32);

impl LinkSet {
    pub const EMPTY: LinkSet = LinkSet(0);

    #[inline]
    pub fn contains(self, q: usize) -> bool {
        self.0 & (1 << q) != 0
    }

    #[inline]
    pub fn insert(&mut self, q: usize) {
        self.0 |= 1 << q;
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Raw bits, as uploaded to device buffers.
    #[inline]
    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn iter(self) -> impl Iterator<Item = usize> {
        (0..Q).filter(move |&q| self.contains(q))
    }
}

/// Classification of one lattice site.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SiteClass {
    Fluid,
    /// Inside shape number `shape` (the first in the ordered list containing it).
    Solid { shape: u32 },
    /// Fluid site with blocked outgoing links.
    LinkBoundary { links: LinkSet },
}

impl SiteClass {
    #[inline]
    pub fn is_solid(self) -> bool {
        matches!(self, SiteClass::Solid { .. })
    }

    /// Numeric code used by the exporters: 0 fluid, 1 solid, 2 link boundary.
    #[inline]
    pub fn code(self) -> u8 {
        match self {
            SiteClass::Fluid => 0,
            SiteClass::Solid { .. } => 1,
            SiteClass::LinkBoundary { .. } => 2,
        }
    }
}

/// One blocked link: population `dir` leaving `site` hits a solid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundaryLink {
    pub site: usize,
    pub dir: usize,
    /// Shape owning the solid neighbour, `None` for a bounded domain edge.
    pub shape: Option<usize>,
}

/// Mask construction options.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MaskOptions {
    /// Samples per axis within each site. 1 samples the site centre only.
    pub subsamples: usize,
}

impl Default for MaskOptions {
    fn default() -> Self {
        Self { subsamples: 1 }
    }
}

/// Site classification for a lattice.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundaryMask {
    dims: [usize; 3],
    classes: Vec<SiteClass>,
    boundary_links: Vec<BoundaryLink>,
    shape_count: usize,
}

impl BoundaryMask {
    /// Classify every site of `lattice` against `shapes`.
    pub fn build(
        lattice: &Lattice,
        shapes: &[Shape],
        options: MaskOptions,
    ) -> Result<Self, GeometryError> {
        for shape in shapes {
            shape.validate()?;
        }
        if options.subsamples == 0 {
            return Err(GeometryError::InvalidShape(
                "mask subsampling needs at least one sample per axis".to_string(),
            ));
        }

        let agrid = lattice.agrid();
        let site_count = lattice.site_count();

        // Pass 1: solid/fluid by sampling
        let owners: Vec<Option<u32>> = (0..site_count)
            .into_par_iter()
            .map(|idx| {
                let [i, j, k] = lattice.cell_coords(idx);
                let origin = DVec3::new(i as f64, j as f64, k as f64) * agrid;
                classify_site(origin, agrid, shapes, options.subsamples)
            })
            .collect();

        if owners.iter().all(Option::is_some) {
            return Err(GeometryError::NoFluidSites);
        }

        // Pass 2: blocked links of fluid sites
        let classes: Vec<SiteClass> = (0..site_count)
            .into_par_iter()
            .map(|idx| match owners[idx] {
                Some(shape) => SiteClass::Solid { shape },
                None => {
                    let mut links = LinkSet::EMPTY;
                    for q in 1..Q {
                        let blocked = match lattice.neighbor(idx, q) {
                            Some(n) => owners[n].is_some(),
                            None => true,
                        };
                        if blocked {
                            links.insert(q);
                        }
                    }
                    if links.is_empty() {
                        SiteClass::Fluid
                    } else {
                        SiteClass::LinkBoundary { links }
                    }
                }
            })
            .collect();

        let mut boundary_links = Vec::new();
        for (site, class) in classes.iter().enumerate() {
            if let SiteClass::LinkBoundary { links } = *class {
                for dir in links.iter() {
                    let shape = lattice
                        .neighbor(site, dir)
                        .and_then(|n| owners[n])
                        .map(|s| s as usize);
                    boundary_links.push(BoundaryLink { site, dir, shape });
                }
            }
        }

        let mask = Self {
            dims: lattice.dims(),
            classes,
            boundary_links,
            shape_count: shapes.len(),
        };
        log::info!(
            "Boundary mask {:?}: {} fluid, {} link, {} solid sites from {} shapes",
            mask.dims,
            mask.count(|c| c == SiteClass::Fluid),
            mask.count(|c| matches!(c, SiteClass::LinkBoundary { .. })),
            mask.solid_count(),
            shapes.len()
        );
        Ok(mask)
    }

    /// Mask for a lattice with no shapes.
    pub fn open(lattice: &Lattice) -> Result<Self, GeometryError> {
        Self::build(lattice, &[], MaskOptions::default())
    }

    #[inline]
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    #[inline]
    pub fn class(&self, idx: usize) -> SiteClass {
        self.classes[idx]
    }

    pub fn classes(&self) -> &[SiteClass] {
        &self.classes
    }

    #[inline]
    pub fn is_solid(&self, idx: usize) -> bool {
        self.classes[idx].is_solid()
    }

    /// Blocked links of a site (empty for fluid and solid sites).
    #[inline]
    pub fn links(&self, idx: usize) -> LinkSet {
        match self.classes[idx] {
            SiteClass::LinkBoundary { links } => links,
            _ => LinkSet::EMPTY,
        }
    }

    /// Shape owning a solid site.
    #[inline]
    pub fn owner(&self, idx: usize) -> Option<usize> {
        match self.classes[idx] {
            SiteClass::Solid { shape } => Some(shape as usize),
            _ => None,
        }
    }

    /// All blocked links in site order.
    pub fn boundary_links(&self) -> &[BoundaryLink] {
        &self.boundary_links
    }

    pub fn shape_count(&self) -> usize {
        self.shape_count
    }

    pub fn solid_count(&self) -> usize {
        self.count(SiteClass::is_solid)
    }

    pub fn fluid_count(&self) -> usize {
        self.classes.len() - self.solid_count()
    }

    fn count(&self, pred: impl Fn(SiteClass) -> bool) -> usize {
        self.classes.iter().filter(|&&c| pred(c)).count()
    }

    /// Confirm this mask was built for `lattice`.
    pub fn check_matches(&self, lattice: &Lattice) -> Result<(), GeometryError> {
        if self.dims != lattice.dims() {
            return Err(GeometryError::GridMismatch {
                mask: self.dims,
                lattice: lattice.dims(),
            });
        }
        Ok(())
    }

    /// Empty the populations of all solid sites.
    pub fn clear_solid_sites(&self, lattice: &mut Lattice) {
        for (idx, class) in self.classes.iter().enumerate() {
            if class.is_solid() {
                lattice.clear_site(idx);
            }
        }
    }
}

/// Owner shape of a site whose lower corner is `origin`, or `None` for fluid.
///
/// With `n` samples per axis the site is solid when at least half of its
/// `n^3` samples are inside; the owner is the shape claiming most samples.
fn classify_site(origin: DVec3, agrid: f64, shapes: &[Shape], n: usize) -> Option<u32> {
    if shapes.is_empty() {
        return None;
    }
    if n == 1 {
        let center = origin + DVec3::splat(0.5 * agrid);
        return first_containing(shapes, center);
    }

    let mut votes = vec![0usize; shapes.len()];
    let mut inside = 0usize;
    let step = agrid / n as f64;
    for sk in 0..n {
        for sj in 0..n {
            for si in 0..n {
                let p = origin
                    + DVec3::new(
                        (si as f64 + 0.5) * step,
                        (sj as f64 + 0.5) * step,
                        (sk as f64 + 0.5) * step,
                    );
                if let Some(owner) = first_containing(shapes, p) {
                    votes[owner as usize] += 1;
                    inside += 1;
                }
            }
        }
    }

    if 2 * inside < n * n * n {
        return None;
    }
    // Ties go to the earlier shape
    let mut best = 0;
    for (s, &v) in votes.iter().enumerate() {
        if v > votes[best] {
            best = s;
        }
    }
    Some(best as u32)
}

#[inline]
fn first_containing(shapes: &[Shape], p: DVec3) -> Option<u32> {
    shapes.iter().position(|s| s.inside(p)).map(|s| s as u32)
}
