//! Single-flash laser detection on rectified frames.
//!
//! Pipeline: ROI crop, bright/colour threshold, opening, 8-connected
//! components, size filter, largest survivor.

use crate::components::{label_components, Component, Connectivity};
use crate::corners::MarkerQuad;
use crate::mask::{luminance_mask, non_gray_mask, open, NonGrayParams};
use lasershot_core::{BoundingBox, RgbImageView};
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Region of interest as fractions of the frame size.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoiFrac {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Default for RoiFrac {
    fn default() -> Self {
        Self {
            left: 0.02,
            top: 0.10,
            right: 0.98,
            bottom: 0.98,
        }
    }
}

impl RoiFrac {
    /// Pixel rectangle `(x, y, w, h)` inside a `width x height` frame, or
    /// `None` when it is empty or leaves the frame.
    pub fn to_pixels(&self, width: usize, height: usize) -> Option<(usize, usize, usize, usize)> {
        let fracs = [self.left, self.top, self.right, self.bottom];
        if fracs.iter().any(|f| !f.is_finite() || *f < 0.0 || *f > 1.0) {
            return None;
        }
        let x0 = (self.left * width as f64).round() as usize;
        let y0 = (self.top * height as f64).round() as usize;
        let x1 = ((self.right * width as f64).round() as usize).min(width);
        let y1 = ((self.bottom * height as f64).round() as usize).min(height);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0, y0, x1 - x0, y1 - y0))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaserDetectorParams {
    pub roi: RoiFrac,
    /// Luma cutoff for the bright mask (inclusive).
    pub luminance_threshold: u8,
    /// Colour gate OR-ed with the bright mask; `None` disables it.
    pub non_gray: Option<NonGrayParams>,
    /// Square opening kernel; `0` or `1` disables the opening.
    pub open_kernel: usize,
    /// Accepted bounding-box side range `[min_box_size, max_box_size)`.
    pub min_box_size: usize,
    pub max_box_size: usize,
}

impl Default for LaserDetectorParams {
    fn default() -> Self {
        Self {
            roi: RoiFrac::default(),
            luminance_threshold: 230,
            non_gray: Some(NonGrayParams::default()),
            open_kernel: 3,
            min_box_size: 6,
            max_box_size: 100,
        }
    }
}

/// Best laser blob of one frame, in full rectified-frame pixels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LaserCandidate {
    pub bbox: BoundingBox,
    pub center: Point2<f64>,
    pub frame_index: u64,
}

impl LaserCandidate {
    /// The candidate box shaped like a marker quad.
    pub fn quad(&self) -> MarkerQuad {
        MarkerQuad::from_bounding_box(&self.bbox, format!("laser#{}", self.frame_index))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LaserDetection {
    pub found: bool,
    pub candidate: Option<LaserCandidate>,
}

impl LaserDetection {
    pub fn none() -> Self {
        Self::default()
    }

    fn from_candidate(candidate: LaserCandidate) -> Self {
        Self {
            found: true,
            candidate: Some(candidate),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LaserDetector {
    params: LaserDetectorParams,
}

impl LaserDetector {
    pub fn new(params: LaserDetectorParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &LaserDetectorParams {
        &self.params
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, frame), fields(width = frame.width, height = frame.height))
    )]
    pub fn detect(&self, frame: &RgbImageView<'_>, frame_index: u64) -> LaserDetection {
        let p = &self.params;
        if !frame.is_consistent() {
            log::warn!("frame {frame_index}: buffer does not match {}x{}", frame.width, frame.height);
            return LaserDetection::none();
        }
        let Some((rx, ry, rw, rh)) = p.roi.to_pixels(frame.width, frame.height) else {
            return LaserDetection::none();
        };
        let Some(roi) = frame.crop(rx, ry, rw, rh) else {
            return LaserDetection::none();
        };

        let mut mask = luminance_mask(&roi.view(), p.luminance_threshold);
        if let Some(ng) = &p.non_gray {
            mask = mask.or(&non_gray_mask(&roi.view(), ng));
        }
        if mask.is_empty() {
            return LaserDetection::none();
        }
        let mask = open(&mask, p.open_kernel);

        let components = label_components(&mask, Connectivity::Eight);
        let total = components.len();
        let best = components
            .into_iter()
            .filter(|c| self.size_ok(c))
            .fold(None::<Component>, |best, c| match best {
                Some(b) if b.bbox.area() >= c.bbox.area() => Some(b),
                _ => Some(c),
            });

        let Some(best) = best else {
            log::trace!("frame {frame_index}: {total} blobs, none in size range");
            return LaserDetection::none();
        };

        let bbox = best.bbox.translated(Vector2::new(rx as f64, ry as f64));
        log::debug!(
            "frame {frame_index}: laser at ({:.1}, {:.1}) {}x{} of {total} blobs",
            bbox.center().x,
            bbox.center().y,
            best.width(),
            best.height()
        );
        LaserDetection::from_candidate(LaserCandidate {
            center: bbox.center(),
            bbox,
            frame_index,
        })
    }

    fn size_ok(&self, c: &Component) -> bool {
        let range = self.params.min_box_size..self.params.max_box_size;
        range.contains(&c.width()) && range.contains(&c.height())
    }
}
