//! Vision stages of the lasershot pipeline.
//!
//! This crate covers:
//! - classification of four fiducial markers into target corner roles,
//! - the rectification mapping built from their interior corners and the
//!   stability gate that decides when a calibration is trustworthy,
//! - laser flash detection on rectified frames,
//! - ring extraction from a target photo and point scoring.
//!
//! It does **not** decode the markers themselves. A [`MarkerDecoder`]
//! supplied by the host turns camera frames into [`MarkerQuad`]s.

mod calibration;
mod components;
mod corners;
mod laser;
mod mask;
mod rectify;
mod target;
mod threshold;

pub use calibration::{CalibrationParams, CalibrationTracker};
pub use components::{label_components, Component, Connectivity};
pub use corners::{
    classify_corners, classify_markers, CornerRole, CornerRoles, MarkerDecoder, MarkerQuad,
};
pub use laser::{LaserCandidate, LaserDetection, LaserDetector, LaserDetectorParams, RoiFrac};
pub use mask::{dark_mask, dilate, erode, luminance_mask, non_gray_mask, open, Mask, NonGrayParams};
pub use rectify::{rectify_markers, Calibration, RectificationMapping, RectifyError, RectifyParams};
pub use target::{PointScore, Target, TargetError, TargetParams, TargetRing, MISS_DISTANCE};
pub use threshold::{otsu_threshold, Histogram};
