//! Perspective rectification from four classified marker corners.

use crate::corners::{classify_markers, CornerRole, CornerRoles, MarkerQuad};
use lasershot_core::{
    homography_from_4pt, warp_perspective_gray, warp_perspective_rgb, GrayImage, GrayImageView,
    Homography, RgbImage, RgbImageView,
};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RectifyError {
    #[error("expected exactly 4 markers, found {found}")]
    WrongMarkerCount { found: usize },
    #[error("frame has zero size ({width}x{height})")]
    EmptyFrame { width: usize, height: usize },
    #[error("corner quadrilateral is degenerate (area={area:.1} px^2)")]
    Degenerate { area: f64 },
    #[error("perspective transform is not invertible")]
    NonInvertible,
}

/// Rectification settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RectifyParams {
    /// Width of the canonical canvas. `None` keeps the source frame width.
    /// The height always follows the source frame aspect ratio.
    pub output_width: Option<usize>,
    /// Minimal quad area as a fraction of the frame area.
    pub min_area_frac: f64,
}

impl Default for RectifyParams {
    fn default() -> Self {
        Self {
            output_width: None,
            min_area_frac: 0.01,
        }
    }
}

/// Raw camera space -> canonical target space.
#[derive(Clone, Debug, PartialEq)]
pub struct RectificationMapping {
    canonical_from_raw: Homography,
    raw_from_canonical: Homography,
    width: usize,
    height: usize,
    source: CornerRoles,
}

impl RectificationMapping {
    /// Map `roles` onto the corners of the canonical canvas.
    pub fn from_corners(
        roles: &CornerRoles,
        frame_width: usize,
        frame_height: usize,
        params: &RectifyParams,
    ) -> Result<Self, RectifyError> {
        if frame_width == 0 || frame_height == 0 {
            return Err(RectifyError::EmptyFrame {
                width: frame_width,
                height: frame_height,
            });
        }

        let src = roles.clockwise();
        let area = convex_area(&src).unwrap_or(0.0);
        let min_area = params.min_area_frac * (frame_width * frame_height) as f64;
        if area <= min_area.max(f64::EPSILON) {
            return Err(RectifyError::Degenerate { area });
        }

        let (width, height) = canonical_size(frame_width, frame_height, params.output_width);
        let (w, h) = (width as f64, height as f64);
        let dst = [
            Point2::new(0.0, 0.0),
            Point2::new(w, 0.0),
            Point2::new(w, h),
            Point2::new(0.0, h),
        ];

        let canonical_from_raw =
            homography_from_4pt(&src, &dst).ok_or(RectifyError::NonInvertible)?;
        let raw_from_canonical = canonical_from_raw
            .inverse()
            .ok_or(RectifyError::NonInvertible)?;

        Ok(Self {
            canonical_from_raw,
            raw_from_canonical,
            width,
            height,
            source: *roles,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    /// Raw-space points the mapping was built from.
    pub fn source_corners(&self) -> &CornerRoles {
        &self.source
    }

    pub fn canonical_from_raw(&self) -> Homography {
        self.canonical_from_raw
    }

    pub fn to_canonical(&self, p: Point2<f64>) -> Point2<f64> {
        self.canonical_from_raw.apply(p)
    }

    pub fn to_raw(&self, p: Point2<f64>) -> Point2<f64> {
        self.raw_from_canonical.apply(p)
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, src), fields(width = src.width, height = src.height))
    )]
    pub fn warp_rgb(&self, src: &RgbImageView<'_>) -> RgbImage {
        warp_perspective_rgb(src, self.raw_from_canonical, self.width, self.height)
    }

    pub fn warp_gray(&self, src: &GrayImageView<'_>) -> GrayImage {
        warp_perspective_gray(src, self.raw_from_canonical, self.width, self.height)
    }
}

/// Outcome of a successful calibration attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct Calibration {
    pub mapping: RectificationMapping,
    /// `topLeft` points of the four markers, by role.
    pub roles: CornerRoles,
    /// Markers ordered UL, UR, LL, LR.
    pub markers: [MarkerQuad; 4],
}

/// Classify four marker quads and build the rectification from their
/// interior-facing corners.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(quads, params), fields(markers = quads.len()))
)]
pub fn rectify_markers(
    quads: &[MarkerQuad],
    frame_width: usize,
    frame_height: usize,
    params: &RectifyParams,
) -> Result<Calibration, RectifyError> {
    let markers = classify_markers(quads).ok_or(RectifyError::WrongMarkerCount {
        found: quads.len(),
    })?;

    let roles = CornerRoles {
        upper_left: markers[0].top_left,
        upper_right: markers[1].top_left,
        lower_left: markers[2].top_left,
        lower_right: markers[3].top_left,
    };
    let interior = CornerRoles {
        upper_left: CornerRole::UpperLeft.interior_corner(&markers[0]),
        upper_right: CornerRole::UpperRight.interior_corner(&markers[1]),
        lower_left: CornerRole::LowerLeft.interior_corner(&markers[2]),
        lower_right: CornerRole::LowerRight.interior_corner(&markers[3]),
    };

    let mapping = RectificationMapping::from_corners(&interior, frame_width, frame_height, params)?;
    Ok(Calibration {
        mapping,
        roles,
        markers,
    })
}

fn canonical_size(frame_w: usize, frame_h: usize, output_width: Option<usize>) -> (usize, usize) {
    match output_width {
        Some(w) if w > 0 => {
            let h = (w as f64 * frame_h as f64 / frame_w as f64).round().max(1.0);
            (w, h as usize)
        }
        _ => (frame_w, frame_h),
    }
}

/// Area of a polygon given in traversal order, `None` when it is not convex.
fn convex_area(pts: &[Point2<f64>; 4]) -> Option<f64> {
    let mut sign = 0.0_f64;
    let mut twice_area = 0.0;
    for i in 0..4 {
        let a = pts[i];
        let b = pts[(i + 1) % 4];
        let c = pts[(i + 2) % 4];
        let cross = (b - a).perp(&(c - b));
        if cross.abs() < f64::EPSILON {
            return None;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return None;
        }
        twice_area += a.x * b.y - b.x * a.y;
    }
    Some(0.5 * twice_area.abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corners::classify_corners;
    use approx::assert_relative_eq;

    fn image_corners(w: f64, h: f64) -> CornerRoles {
        classify_corners(&[
            Point2::new(0.0, 0.0),
            Point2::new(w, 0.0),
            Point2::new(0.0, h),
            Point2::new(w, h),
        ])
        .expect("four corners")
    }

    #[test]
    fn image_corners_give_identity_and_keep_aspect() {
        let roles = image_corners(640.0, 480.0);
        let mapping =
            RectificationMapping::from_corners(&roles, 640, 480, &RectifyParams::default())
                .expect("mapping");
        assert_eq!((mapping.width(), mapping.height()), (640, 480));
        assert_relative_eq!(mapping.aspect_ratio(), 640.0 / 480.0, epsilon = 1e-9);

        let p = mapping.to_canonical(Point2::new(123.0, 321.0));
        assert_relative_eq!(p.x, 123.0, epsilon = 1e-6);
        assert_relative_eq!(p.y, 321.0, epsilon = 1e-6);
    }

    #[test]
    fn scaled_output_keeps_aspect() {
        let roles = image_corners(1280.0, 720.0);
        let params = RectifyParams {
            output_width: Some(320),
            ..RectifyParams::default()
        };
        let mapping = RectificationMapping::from_corners(&roles, 1280, 720, &params).expect("ok");
        assert_eq!((mapping.width(), mapping.height()), (320, 180));
        assert_relative_eq!(
            mapping.aspect_ratio(),
            1280.0 / 720.0,
            epsilon = 1e-2
        );
        let p = mapping.to_canonical(Point2::new(1280.0, 720.0));
        assert_relative_eq!(p.x, 320.0, epsilon = 1e-6);
        assert_relative_eq!(p.y, 180.0, epsilon = 1e-6);
    }

    #[test]
    fn skewed_corners_map_to_canvas_corners_and_back() {
        let roles = CornerRoles {
            upper_left: Point2::new(110.0, 60.0),
            upper_right: Point2::new(520.0, 80.0),
            lower_left: Point2::new(90.0, 430.0),
            lower_right: Point2::new(560.0, 410.0),
        };
        let mapping =
            RectificationMapping::from_corners(&roles, 640, 480, &RectifyParams::default())
                .expect("mapping");
        let lr = mapping.to_canonical(roles.lower_right);
        assert_relative_eq!(lr.x, 640.0, epsilon = 1e-6);
        assert_relative_eq!(lr.y, 480.0, epsilon = 1e-6);

        let mid = Point2::new(300.0, 250.0);
        let back = mapping.to_raw(mapping.to_canonical(mid));
        assert_relative_eq!(back.x, mid.x, epsilon = 1e-6);
        assert_relative_eq!(back.y, mid.y, epsilon = 1e-6);
    }

    #[test]
    fn colinear_corners_are_degenerate() {
        let roles = CornerRoles {
            upper_left: Point2::new(0.0, 0.0),
            upper_right: Point2::new(10.0, 10.0),
            lower_right: Point2::new(20.0, 20.0),
            lower_left: Point2::new(30.0, 30.0),
        };
        let err = RectificationMapping::from_corners(&roles, 640, 480, &RectifyParams::default())
            .unwrap_err();
        assert!(matches!(err, RectifyError::Degenerate { .. }));
    }

    #[test]
    fn rectify_markers_uses_interior_corners() {
        let m = |x: f64, y: f64| {
            MarkerQuad::new(
                Point2::new(x, y),
                Point2::new(x + 40.0, y),
                Point2::new(x, y + 40.0),
                Point2::new(x + 40.0, y + 40.0),
                "",
            )
        };
        let quads = vec![m(560.0, 400.0), m(20.0, 20.0), m(560.0, 20.0), m(20.0, 400.0)];
        let cal = rectify_markers(&quads, 640, 480, &RectifyParams::default()).expect("cal");
        assert_eq!(cal.roles.upper_left, Point2::new(20.0, 20.0));
        assert_eq!(
            cal.mapping.source_corners().upper_left,
            Point2::new(60.0, 60.0)
        );
        assert_eq!(
            cal.mapping.source_corners().lower_right,
            Point2::new(560.0, 400.0)
        );
        let origin = cal.mapping.to_canonical(Point2::new(60.0, 60.0));
        assert_relative_eq!(origin.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(origin.y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn three_markers_fail() {
        let q = MarkerQuad::new(
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(0.0, 1.0),
            Point2::new(1.0, 1.0),
            "",
        );
        let err = rectify_markers(&[q.clone(), q.clone(), q], 640, 480, &RectifyParams::default())
            .unwrap_err();
        assert_eq!(err, RectifyError::WrongMarkerCount { found: 3 });
    }
}
