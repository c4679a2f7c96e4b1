//! Boundary shapes for building the solid mask.
//!
//! Every shape is a signed-distance oracle in MD units: negative distance is
//! inside the solid, positive is in open fluid. `direction = -1` flips a shape
//! inside out, which turns a capped cylinder into a closed pipe.
//!
//! - Wall: half-space `p . normal < offset`
//! - Cylinder: capped cylinder around an axis
//! - HollowCone: conical funnel wall of finite thickness
//! - Sphere: ball around a centre

use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};

use crate::error::GeometryError;

/// Inside/outside and distance queries against a solid primitive.
pub trait ShapeOracle {
    /// Signed distance to the surface (negative = inside solid).
    fn distance(&self, point: DVec3) -> f64;

    /// Whether the point lies in the solid. Points on the surface count as solid.
    fn inside(&self, point: DVec3) -> bool {
        self.distance(point) <= 0.0
    }
}

/// Half-space bounded by a plane.
///
/// Fluid is on the side the normal points to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Wall {
    pub normal: DVec3, // Unit normal pointing into the fluid
    pub offset: f64,   // Plane is p . normal = offset
}

impl Wall {
    /// Wall with the given normal (normalised here) and offset.
    pub fn new(normal: DVec3, offset: f64) -> Self {
        Self {
            normal: normal.normalize_or_zero(),
            offset,
        }
    }
}

impl ShapeOracle for Wall {
    fn distance(&self, point: DVec3) -> f64 {
        point.dot(self.normal) - self.offset
    }
}

/// Capped cylinder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cylinder {
    pub center: DVec3,
    pub axis: DVec3, // Unit axis
    pub radius: f64,
    pub length: f64, // Full length along the axis
    pub direction: f64,
}

impl Cylinder {
    pub fn new(center: DVec3, axis: DVec3, radius: f64, length: f64) -> Self {
        Self {
            center,
            axis: axis.normalize_or_zero(),
            radius,
            length,
            direction: 1.0,
        }
    }

    /// Solid outside, fluid inside.
    pub fn pipe(center: DVec3, axis: DVec3, radius: f64, length: f64) -> Self {
        Self {
            direction: -1.0,
            ..Self::new(center, axis, radius, length)
        }
    }
}

impl ShapeOracle for Cylinder {
    fn distance(&self, point: DVec3) -> f64 {
        let (rho, a) = axial_coords(point - self.center, self.axis);
        let d = box_sdf(
            DVec2::new(rho, a.abs()),
            DVec2::new(self.radius, 0.5 * self.length),
        );
        d * self.direction
    }
}

/// Funnel-shaped conical wall.
///
/// The wall starts at a rim of radius `inner_radius` in the plane through
/// `center` normal to `axis`, and flares towards `+axis` at `opening_angle`
/// from the axis. `outer_radius` is the length of the wall along the slant,
/// so the far rim sits at radius `inner_radius + outer_radius * sin(angle)`.
/// `width` is the wall thickness measured normal to the wall.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HollowCone {
    pub center: DVec3,
    pub axis: DVec3,
    pub inner_radius: f64,
    pub outer_radius: f64,
    pub width: f64,
    pub opening_angle: f64, // Radians, in (0, pi/2]
    pub direction: f64,
}

impl HollowCone {
    pub fn new(
        center: DVec3,
        axis: DVec3,
        inner_radius: f64,
        outer_radius: f64,
        width: f64,
        opening_angle: f64,
    ) -> Self {
        Self {
            center,
            axis: axis.normalize_or_zero(),
            inner_radius,
            outer_radius,
            width,
            opening_angle,
            direction: 1.0,
        }
    }

    /// Length of the wall along its slant.
    pub fn slant_length(&self) -> f64 {
        self.outer_radius
    }

    /// Radius of the far rim.
    pub fn outer_rim_radius(&self) -> f64 {
        self.inner_radius + self.outer_radius * self.opening_angle.sin()
    }
}

impl ShapeOracle for HollowCone {
    fn distance(&self, point: DVec3) -> f64 {
        let (rho, a) = axial_coords(point - self.center, self.axis);
        let (sin, cos) = self.opening_angle.sin_cos();

        // Wall frame: s along the slant from the rim, t normal to the wall
        let q = DVec2::new(rho - self.inner_radius, a);
        let along = DVec2::new(sin, cos);
        let normal = DVec2::new(cos, -sin);
        let half_len = 0.5 * self.slant_length();
        let local = DVec2::new(q.dot(along) - half_len, q.dot(normal));

        box_sdf(local.abs(), DVec2::new(half_len, 0.5 * self.width)) * self.direction
    }
}

/// Ball.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    pub center: DVec3,
    pub radius: f64,
    pub direction: f64,
}

impl Sphere {
    pub fn new(center: DVec3, radius: f64) -> Self {
        Self {
            center,
            radius,
            direction: 1.0,
        }
    }
}

impl ShapeOracle for Sphere {
    fn distance(&self, point: DVec3) -> f64 {
        ((point - self.center).length() - self.radius) * self.direction
    }
}

/// Any boundary shape. Shapes are combined by ordered union.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    Wall(Wall),
    Cylinder(Cylinder),
    HollowCone(HollowCone),
    Sphere(Sphere),
}

impl Shape {
    /// Flip inside and outside.
    pub fn inverted(mut self) -> Self {
        match &mut self {
            Shape::Wall(w) => {
                w.normal = -w.normal;
                w.offset = -w.offset;
            }
            Shape::Cylinder(c) => c.direction = -c.direction,
            Shape::HollowCone(c) => c.direction = -c.direction,
            Shape::Sphere(s) => s.direction = -s.direction,
        }
        self
    }

    pub fn name(&self) -> &'static str {
        match self {
            Shape::Wall(_) => "wall",
            Shape::Cylinder(_) => "cylinder",
            Shape::HollowCone(_) => "hollow_cone",
            Shape::Sphere(_) => "sphere",
        }
    }

    /// Reject degenerate parameters before they reach the mask builder.
    pub fn validate(&self) -> Result<(), GeometryError> {
        let invalid = |msg: &str| Err(GeometryError::InvalidShape(format!("{}: {}", self.name(), msg)));
        match self {
            Shape::Wall(w) => {
                if !w.normal.is_finite() || w.normal.length_squared() < 0.5 {
                    return invalid("normal must be a non-zero vector");
                }
                if !w.offset.is_finite() {
                    return invalid("offset must be finite");
                }
            }
            Shape::Cylinder(c) => {
                if !c.axis.is_finite() || c.axis.length_squared() < 0.5 {
                    return invalid("axis must be a non-zero vector");
                }
                if !(c.radius > 0.0) || !(c.length > 0.0) {
                    return invalid("radius and length must be positive");
                }
                if c.direction.abs() != 1.0 {
                    return invalid("direction must be +1 or -1");
                }
            }
            Shape::HollowCone(c) => {
                if !c.axis.is_finite() || c.axis.length_squared() < 0.5 {
                    return invalid("axis must be a non-zero vector");
                }
                if !(c.inner_radius >= 0.0) || !(c.outer_radius > 0.0) {
                    return invalid("inner radius must be non-negative and slant length positive");
                }
                if !(c.width > 0.0) {
                    return invalid("width must be positive");
                }
                if !(c.opening_angle > 0.0 && c.opening_angle <= std::f64::consts::FRAC_PI_2) {
                    return invalid("opening angle must lie in (0, pi/2]");
                }
                if c.direction.abs() != 1.0 {
                    return invalid("direction must be +1 or -1");
                }
            }
            Shape::Sphere(s) => {
                if !s.center.is_finite() || !(s.radius > 0.0) {
                    return invalid("radius must be positive");
                }
                if s.direction.abs() != 1.0 {
                    return invalid("direction must be +1 or -1");
                }
            }
        }
        Ok(())
    }
}

impl ShapeOracle for Shape {
    fn distance(&self, point: DVec3) -> f64 {
        match self {
            Shape::Wall(s) => s.distance(point),
            Shape::Cylinder(s) => s.distance(point),
            Shape::HollowCone(s) => s.distance(point),
            Shape::Sphere(s) => s.distance(point),
        }
    }
}

impl From<Wall> for Shape {
    fn from(s: Wall) -> Self {
        Shape::Wall(s)
    }
}

impl From<Cylinder> for Shape {
    fn from(s: Cylinder) -> Self {
        Shape::Cylinder(s)
    }
}

impl From<HollowCone> for Shape {
    fn from(s: HollowCone) -> Self {
        Shape::HollowCone(s)
    }
}

impl From<Sphere> for Shape {
    fn from(s: Sphere) -> Self {
        Shape::Sphere(s)
    }
}

/// Radial distance from the axis and signed axial coordinate.
#[inline]
fn axial_coords(rel: DVec3, axis: DVec3) -> (f64, f64) {
    let a = rel.dot(axis);
    let rho = (rel - a * axis).length();
    (rho, a)
}

/// Signed distance to an axis-aligned box centred at the origin, evaluated
/// in the positive quadrant.
#[inline]
fn box_sdf(p: DVec2, half_extents: DVec2) -> f64 {
    let d = p - half_extents;
    d.max(DVec2::ZERO).length() + d.x.max(d.y).min(0.0)
}
