//! Fiducial marker quads and their classification into target corner roles.

use lasershot_core::{BoundingBox, RgbImageView};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// One decoded fiducial marker: its four corners in camera pixels plus the
/// decoded payload. The payload does not take part in any geometry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerQuad {
    pub top_left: Point2<f64>,
    pub top_right: Point2<f64>,
    pub bottom_left: Point2<f64>,
    pub bottom_right: Point2<f64>,
    #[serde(default)]
    pub label: String,
}

impl MarkerQuad {
    pub fn new(
        top_left: Point2<f64>,
        top_right: Point2<f64>,
        bottom_left: Point2<f64>,
        bottom_right: Point2<f64>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            top_left,
            top_right,
            bottom_left,
            bottom_right,
            label: label.into(),
        }
    }

    /// Axis-aligned quad covering `bbox`.
    pub fn from_bounding_box(bbox: &BoundingBox, label: impl Into<String>) -> Self {
        Self::new(
            Point2::new(bbox.x, bbox.y),
            Point2::new(bbox.right(), bbox.y),
            Point2::new(bbox.x, bbox.bottom()),
            Point2::new(bbox.right(), bbox.bottom()),
            label,
        )
    }

    pub fn corners(&self) -> [Point2<f64>; 4] {
        [
            self.top_left,
            self.top_right,
            self.bottom_right,
            self.bottom_left,
        ]
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let corners = self.corners();
        // Four points are always present.
        BoundingBox::from_points(&corners).unwrap_or(BoundingBox::new(0.0, 0.0, 0.0, 0.0))
    }
}

/// Decodes fiducial markers from a camera image.
///
/// Implemented by the host environment (QR/ArUco decoder); the pipeline
/// only consumes the corner quads.
pub trait MarkerDecoder {
    fn detect_markers(&mut self, image: &RgbImageView<'_>) -> Vec<MarkerQuad>;
}

impl<F> MarkerDecoder for F
where
    F: FnMut(&RgbImageView<'_>) -> Vec<MarkerQuad>,
{
    fn detect_markers(&mut self, image: &RgbImageView<'_>) -> Vec<MarkerQuad> {
        self(image)
    }
}

/// Position of a marker on the paper target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CornerRole {
    UpperLeft,
    UpperRight,
    LowerLeft,
    LowerRight,
}

impl CornerRole {
    pub const ALL: [CornerRole; 4] = [
        CornerRole::UpperLeft,
        CornerRole::UpperRight,
        CornerRole::LowerLeft,
        CornerRole::LowerRight,
    ];

    /// Marker corner closest to the target interior for this role.
    pub fn interior_corner(self, quad: &MarkerQuad) -> Point2<f64> {
        match self {
            CornerRole::UpperLeft => quad.bottom_right,
            CornerRole::UpperRight => quad.bottom_left,
            CornerRole::LowerLeft => quad.top_right,
            CornerRole::LowerRight => quad.top_left,
        }
    }
}

/// Four points assigned to their target corner roles.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CornerRoles {
    pub upper_left: Point2<f64>,
    pub upper_right: Point2<f64>,
    pub lower_left: Point2<f64>,
    pub lower_right: Point2<f64>,
}

impl CornerRoles {
    pub fn get(&self, role: CornerRole) -> Point2<f64> {
        match role {
            CornerRole::UpperLeft => self.upper_left,
            CornerRole::UpperRight => self.upper_right,
            CornerRole::LowerLeft => self.lower_left,
            CornerRole::LowerRight => self.lower_right,
        }
    }

    /// Points in the order UL, UR, LR, LL (clockwise on screen).
    pub fn clockwise(&self) -> [Point2<f64>; 4] {
        [
            self.upper_left,
            self.upper_right,
            self.lower_right,
            self.lower_left,
        ]
    }
}

/// Assign four points to target corner roles.
///
/// The two points with the smallest `y` are the upper pair, within each pair
/// the smaller `x` is left. Returns `None` unless exactly four points are
/// given.
pub fn classify_corners(points: &[Point2<f64>]) -> Option<CornerRoles> {
    let idx = classify_indices(points)?;
    Some(CornerRoles {
        upper_left: points[idx[0]],
        upper_right: points[idx[1]],
        lower_left: points[idx[2]],
        lower_right: points[idx[3]],
    })
}

/// Order four marker quads as `[UL, UR, LL, LR]` using their top-left corners.
pub fn classify_markers(quads: &[MarkerQuad]) -> Option<[MarkerQuad; 4]> {
    let anchors: Vec<Point2<f64>> = quads.iter().map(|q| q.top_left).collect();
    let idx = classify_indices(&anchors)?;
    Some(idx.map(|i| quads[i].clone()))
}

/// Indices of `[UL, UR, LL, LR]` into `points`.
fn classify_indices(points: &[Point2<f64>]) -> Option<[usize; 4]> {
    if points.len() != 4 {
        return None;
    }
    let mut order = [0usize, 1, 2, 3];
    order.sort_by(|&a, &b| {
        points[a]
            .y
            .partial_cmp(&points[b].y)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let left_right = |i: usize, j: usize| {
        if points[i].x <= points[j].x {
            (i, j)
        } else {
            (j, i)
        }
    };
    let (ul, ur) = left_right(order[0], order[1]);
    let (ll, lr) = left_right(order[2], order[3]);
    Some([ul, ur, ll, lr])
}
