//! Planar geometry used by the rectifier, the laser detector and the scoring engine.
//!
//! Everything here works in `f64` pixel units. Angles are radians measured
//! with `atan2(dy, dx)`, so with image coordinates (y pointing down) positive
//! angles turn clockwise on screen.

use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Errors raised when constructing geometric primitives.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("ellipse axes must be finite and > 0 (major={major}, minor={minor})")]
    InvalidAxes { major: f64, minor: f64 },
}

/// A vector in polar form.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolarVector {
    /// Radians, as returned by `atan2(dy, dx)`.
    pub angle: f64,
    pub distance: f64,
}

impl PolarVector {
    pub fn new(angle: f64, distance: f64) -> Self {
        Self { angle, distance }
    }

    pub fn from_cartesian(v: Vector2<f64>) -> Self {
        Self {
            angle: v.y.atan2(v.x),
            distance: v.norm(),
        }
    }

    pub fn to_cartesian(self) -> Vector2<f64> {
        let (sin, cos) = self.angle.sin_cos();
        Vector2::new(self.distance * cos, self.distance * sin)
    }
}

/// Axis-aligned box in pixel units. `(x, y)` is the top-left corner.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Smallest box enclosing all points. `None` for an empty slice.
    pub fn from_points(points: &[Point2<f64>]) -> Option<Self> {
        let first = points.first()?;
        let (mut x0, mut y0, mut x1, mut y1) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            x0 = x0.min(p.x);
            y0 = y0.min(p.y);
            x1 = x1.max(p.x);
            y1 = y1.max(p.y);
        }
        Some(Self::new(x0, y0, x1 - x0, y1 - y0))
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn center(&self) -> Point2<f64> {
        Point2::new(self.x + 0.5 * self.width, self.y + 0.5 * self.height)
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn translated(&self, offset: Vector2<f64>) -> Self {
        Self::new(self.x + offset.x, self.y + offset.y, self.width, self.height)
    }

    /// Overlapping region, `None` when the boxes do not overlap.
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(BoundingBox::new(x0, y0, x1 - x0, y1 - y0))
    }

    /// Intersection area divided by union area, in `[0, 1]`.
    pub fn intersection_ratio(&self, other: &BoundingBox) -> f64 {
        let inter = self.intersection(other).map(|b| b.area()).unwrap_or(0.0);
        let union = self.area() + other.area() - inter;
        if union <= f64::EPSILON {
            return 0.0;
        }
        inter / union
    }
}

/// Axis-aligned ellipse.
///
/// `major_axis` is the full horizontal extent and `minor_axis` the full
/// vertical extent; for a ring fitted from a bounding box these are simply
/// the box width and height, so `major_axis < minor_axis` is allowed.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EllipseFields")]
pub struct Ellipse {
    pub center_x: f64,
    pub center_y: f64,
    pub major_axis: f64,
    pub minor_axis: f64,
}

/// Wire form of [`Ellipse`]; validated through [`Ellipse::new`].
#[derive(Deserialize)]
struct EllipseFields {
    center_x: f64,
    center_y: f64,
    major_axis: f64,
    minor_axis: f64,
}

impl TryFrom<EllipseFields> for Ellipse {
    type Error = GeometryError;

    fn try_from(f: EllipseFields) -> Result<Self, Self::Error> {
        Ellipse::new(f.center_x, f.center_y, f.major_axis, f.minor_axis)
    }
}

impl Ellipse {
    pub fn new(
        center_x: f64,
        center_y: f64,
        major_axis: f64,
        minor_axis: f64,
    ) -> Result<Self, GeometryError> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if !valid(major_axis) || !valid(minor_axis) {
            return Err(GeometryError::InvalidAxes {
                major: major_axis,
                minor: minor_axis,
            });
        }
        Ok(Self {
            center_x,
            center_y,
            major_axis,
            minor_axis,
        })
    }

    /// Ellipse inscribed in a bounding box.
    pub fn from_bounding_box(bbox: &BoundingBox) -> Result<Self, GeometryError> {
        let c = bbox.center();
        Self::new(c.x, c.y, bbox.width, bbox.height)
    }

    pub fn center(&self) -> Point2<f64> {
        Point2::new(self.center_x, self.center_y)
    }

    /// Horizontal semi-axis.
    pub fn semi_x(&self) -> f64 {
        0.5 * self.major_axis
    }

    /// Vertical semi-axis.
    pub fn semi_y(&self) -> f64 {
        0.5 * self.minor_axis
    }

    pub fn area(&self) -> f64 {
        std::f64::consts::PI * self.semi_x() * self.semi_y()
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::new(
            self.center_x - self.semi_x(),
            self.center_y - self.semi_y(),
            self.major_axis,
            self.minor_axis,
        )
    }

    /// True when `p` lies inside or on the ellipse.
    pub fn contains(&self, p: Point2<f64>) -> bool {
        let dx = (p.x - self.center_x) / self.semi_x();
        let dy = (p.y - self.center_y) / self.semi_y();
        dx * dx + dy * dy <= 1.0
    }

    /// Distance from the centre to the boundary along direction `angle`.
    pub fn radius_at_angle(&self, angle: f64) -> f64 {
        let a = self.semi_x();
        let b = self.semi_y();
        let (sin, cos) = angle.sin_cos();
        a * b / ((b * cos).powi(2) + (a * sin).powi(2)).sqrt()
    }

    /// Euclidean distance from `p` to the nearest point of the ellipse curve.
    ///
    /// Works for points inside and outside the ellipse.
    pub fn distance_to_boundary(&self, p: Point2<f64>) -> f64 {
        let y0 = (p.x - self.center_x).abs();
        let y1 = (p.y - self.center_y).abs();
        let a = self.semi_x();
        let b = self.semi_y();
        // The solver expects the larger semi-axis first.
        if a >= b {
            distance_point_ellipse(a, b, y0, y1)
        } else {
            distance_point_ellipse(b, a, y1, y0)
        }
    }
}

const ROOT_MAX_ITERATIONS: usize = 128;

/// Distance from `(y0, y1)` (first quadrant) to the ellipse with semi-axes
/// `e0 >= e1 > 0`, by bisection on the Lagrange parameter.
fn distance_point_ellipse(e0: f64, e1: f64, y0: f64, y1: f64) -> f64 {
    if y1 > 0.0 {
        if y0 > 0.0 {
            let z0 = y0 / e0;
            let z1 = y1 / e1;
            let g = z0 * z0 + z1 * z1 - 1.0;
            if g == 0.0 {
                return 0.0;
            }
            let r0 = (e0 / e1).powi(2);
            let sbar = bisect_root(r0, z0, z1, g);
            let x0 = r0 * y0 / (sbar + r0);
            let x1 = y1 / (sbar + 1.0);
            ((x0 - y0).powi(2) + (x1 - y1).powi(2)).sqrt()
        } else {
            (y1 - e1).abs()
        }
    } else {
        let numer0 = e0 * y0;
        let denom0 = e0 * e0 - e1 * e1;
        if numer0 < denom0 {
            let xde0 = numer0 / denom0;
            let x0 = e0 * xde0;
            let x1 = e1 * (1.0 - xde0 * xde0).sqrt();
            ((x0 - y0).powi(2) + x1 * x1).sqrt()
        } else {
            (y0 - e0).abs()
        }
    }
}

fn bisect_root(r0: f64, z0: f64, z1: f64, g: f64) -> f64 {
    let n0 = r0 * z0;
    let mut s0 = z1 - 1.0;
    let mut s1 = if g < 0.0 { 0.0 } else { n0.hypot(z1) - 1.0 };
    let mut s = 0.0;
    for _ in 0..ROOT_MAX_ITERATIONS {
        s = 0.5 * (s0 + s1);
        if s == s0 || s == s1 {
            break;
        }
        let ratio0 = n0 / (s + r0);
        let ratio1 = z1 / (s + 1.0);
        let g = ratio0 * ratio0 + ratio1 * ratio1 - 1.0;
        if g > 0.0 {
            s0 = s;
        } else if g < 0.0 {
            s1 = s;
        } else {
            break;
        }
    }
    s
}
