//! Nested-ellipse ring target and point scoring.

use crate::components::{label_components, Connectivity};
use crate::mask::dark_mask;
use crate::threshold::otsu_threshold;
use lasershot_core::{Ellipse, GeometryError, GrayImageView, PolarVector};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Distance reported for a point that overlaps no ring.
pub const MISS_DISTANCE: f64 = -1.0;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TargetError {
    #[error("no target rings found")]
    NoRings,
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetParams {
    /// Ink cutoff; pixels strictly below it are ink. `None` picks it with Otsu.
    pub ink_threshold: Option<u8>,
    /// Components narrower or shorter than this are noise.
    pub min_ring_size: usize,
}

impl Default for TargetParams {
    fn default() -> Self {
        Self {
            ink_threshold: None,
            min_ring_size: 12,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetRing {
    pub score: i32,
    pub ellipse: Ellipse,
}

/// Score of a single point against a [`Target`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointScore {
    pub score: i32,
    /// Radial distance from the target centre in units of the outermost
    /// ring's radius along the same angle; [`MISS_DISTANCE`] on a miss.
    pub distance: f64,
    /// `atan2(dy, dx)` from the target centre, radians.
    pub angle: f64,
}

impl PointScore {
    pub fn is_miss(&self) -> bool {
        self.distance == MISS_DISTANCE
    }

    pub fn position(&self) -> PolarVector {
        PolarVector::new(self.angle, self.distance)
    }
}

/// Rings ordered by ascending ellipse area; ring `i` of `N` scores `N-1-i`.
///
/// Deserialization re-ranks the stored ellipses, so stored scores and ring
/// order are never trusted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredTarget")]
pub struct Target {
    rings: Vec<TargetRing>,
}

#[derive(Deserialize)]
struct StoredTarget {
    rings: Vec<TargetRing>,
}

impl TryFrom<StoredTarget> for Target {
    type Error = TargetError;

    fn try_from(stored: StoredTarget) -> Result<Self, Self::Error> {
        Target::from_ellipses(stored.rings.into_iter().map(|r| r.ellipse).collect())
    }
}

impl Target {
    /// Rank externally built ring ellipses.
    pub fn from_ellipses(mut ellipses: Vec<Ellipse>) -> Result<Self, TargetError> {
        if ellipses.is_empty() {
            return Err(TargetError::NoRings);
        }
        ellipses.sort_by(|a, b| a.area().total_cmp(&b.area()));
        let n = ellipses.len() as i32;
        let rings = ellipses
            .into_iter()
            .enumerate()
            .map(|(i, ellipse)| TargetRing {
                score: n - 1 - i as i32,
                ellipse,
            })
            .collect();
        Ok(Self { rings })
    }

    /// Extract rings from a grayscale photo or print of the target.
    ///
    /// Each dark 4-connected component that does not touch the left image
    /// edge and is at least `min_ring_size` on both sides becomes one ring.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(img, params), fields(width = img.width, height = img.height))
    )]
    pub fn from_photo(img: &GrayImageView<'_>, params: &TargetParams) -> Result<Self, TargetError> {
        // Otsu's dark class is `<= t`; the mask is strict.
        let threshold = params
            .ink_threshold
            .unwrap_or_else(|| otsu_threshold(img).saturating_add(1));
        let mask = dark_mask(img, threshold);
        let components = label_components(&mask, Connectivity::Four);
        let total = components.len();

        let min = params.min_ring_size;
        let ellipses = components
            .iter()
            .filter(|c| c.bbox.x > 0.0 && c.width() >= min && c.height() >= min)
            .map(|c| Ellipse::from_bounding_box(&c.bbox))
            .collect::<Result<Vec<_>, _>>()?;

        log::info!(
            "target: threshold {threshold}, {} rings from {total} components",
            ellipses.len()
        );
        Self::from_ellipses(ellipses)
    }

    /// Rings from highest to lowest score.
    pub fn rings(&self) -> &[TargetRing] {
        &self.rings
    }

    pub fn len(&self) -> usize {
        self.rings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rings.is_empty()
    }

    pub fn outermost(&self) -> Option<&TargetRing> {
        self.rings.last()
    }

    pub fn center(&self) -> Option<Point2<f64>> {
        self.outermost().map(|r| r.ellipse.center())
    }

    /// Score a shot of `radius` pixels centred at `(x, y)`.
    ///
    /// The first ring the shot overlaps, from the innermost outwards, wins.
    pub fn classify_point(&self, x: f64, y: f64, radius: f64) -> PointScore {
        let p = Point2::new(x, y);
        let Some(outer) = self.outermost().map(|r| &r.ellipse) else {
            return PointScore {
                score: 0,
                distance: MISS_DISTANCE,
                angle: 0.0,
            };
        };
        let d = p - outer.center();
        let angle = d.y.atan2(d.x);

        let hit = self.rings.iter().find(|ring| {
            ring.ellipse.contains(p) || ring.ellipse.distance_to_boundary(p) <= radius
        });

        match hit {
            Some(ring) => PointScore {
                score: ring.score,
                distance: d.norm() / outer.radius_at_angle(angle),
                angle,
            },
            None => PointScore {
                score: 0,
                distance: MISS_DISTANCE,
                angle,
            },
        }
    }
}
