//! Stability gate in front of the rectifier.
//!
//! Marker decoding is noisy: a frame may miss a marker or report one from a
//! stale buffer. Calibration is only accepted once the same four markers have
//! been seen over a short, dense run of frames.

use crate::corners::{classify_markers, MarkerQuad};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationParams {
    /// Number of consecutive four-marker observations required.
    pub stable_frames: usize,
    /// The accepted run must span fewer than `stable_frames + frame_slack`
    /// frame indices.
    pub frame_slack: u64,
    /// Minimal per-role bounding-box intersection ratio between consecutive
    /// observations.
    pub min_overlap: f64,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            stable_frames: 5,
            frame_slack: 10,
            min_overlap: 0.5,
        }
    }
}

/// Collects consecutive four-marker observations.
#[derive(Clone, Debug, Default)]
pub struct CalibrationTracker {
    params: CalibrationParams,
    run: Vec<(u64, [MarkerQuad; 4])>,
}

impl CalibrationTracker {
    pub fn new(params: CalibrationParams) -> Self {
        Self {
            params,
            run: Vec::new(),
        }
    }

    pub fn params(&self) -> &CalibrationParams {
        &self.params
    }

    /// Number of observations in the current run.
    pub fn run_len(&self) -> usize {
        self.run.len()
    }

    pub fn reset(&mut self) {
        self.run.clear();
    }

    /// Feed the markers decoded from frame `frame_index`.
    ///
    /// Returns the latest role-ordered markers once the run is long and dense
    /// enough; the run is cleared in that case.
    pub fn observe(&mut self, frame_index: u64, markers: &[MarkerQuad]) -> Option<[MarkerQuad; 4]> {
        let Some(ordered) = classify_markers(markers) else {
            if !self.run.is_empty() {
                log::debug!(
                    "calibration run reset at frame {frame_index}: {} markers",
                    markers.len()
                );
            }
            self.run.clear();
            return None;
        };

        if let Some((last_index, last)) = self.run.last() {
            let stale = frame_index <= *last_index;
            if stale || !self.overlaps(last, &ordered) {
                log::debug!("calibration run restarted at frame {frame_index}");
                self.run.clear();
            }
        }
        self.run.push((frame_index, ordered));

        let needed = self.params.stable_frames.max(1);
        if self.run.len() > needed {
            let excess = self.run.len() - needed;
            self.run.drain(..excess);
        }
        if self.run.len() < needed {
            return None;
        }

        let first = self.run.first().map(|(i, _)| *i)?;
        let span = frame_index - first;
        if span >= needed as u64 + self.params.frame_slack {
            log::debug!("calibration run too sparse (span {span} frames)");
            self.run.remove(0);
            return None;
        }

        let (_, markers) = self.run.pop()?;
        self.run.clear();
        Some(markers)
    }

    fn overlaps(&self, prev: &[MarkerQuad; 4], next: &[MarkerQuad; 4]) -> bool {
        prev.iter().zip(next.iter()).all(|(a, b)| {
            a.bounding_box().intersection_ratio(&b.bounding_box()) >= self.params.min_overlap
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;

    fn markers(shift: f64) -> Vec<MarkerQuad> {
        [(20.0, 20.0), (580.0, 20.0), (20.0, 420.0), (580.0, 420.0)]
            .iter()
            .map(|&(x, y)| {
                let x = x + shift;
                MarkerQuad::new(
                    Point2::new(x, y),
                    Point2::new(x + 40.0, y),
                    Point2::new(x, y + 40.0),
                    Point2::new(x + 40.0, y + 40.0),
                    "m",
                )
            })
            .collect()
    }

    #[test]
    fn accepts_after_five_consecutive_frames() {
        let mut tracker = CalibrationTracker::new(CalibrationParams::default());
        for f in 0..4 {
            assert!(tracker.observe(f, &markers(0.0)).is_none());
        }
        let out = tracker.observe(4, &markers(0.0)).expect("stable");
        assert_eq!(out[0].top_left, Point2::new(20.0, 20.0));
        assert_eq!(tracker.run_len(), 0);
    }

    #[test]
    fn missing_marker_resets_run() {
        let mut tracker = CalibrationTracker::new(CalibrationParams::default());
        for f in 0..4 {
            tracker.observe(f, &markers(0.0));
        }
        let three = &markers(0.0)[..3];
        assert!(tracker.observe(4, three).is_none());
        assert_eq!(tracker.run_len(), 0);
        for f in 5..9 {
            assert!(tracker.observe(f, &markers(0.0)).is_none());
        }
        assert!(tracker.observe(9, &markers(0.0)).is_some());
    }

    #[test]
    fn sparse_run_is_rejected() {
        let mut tracker = CalibrationTracker::new(CalibrationParams::default());
        // Five observations spread over 20 frames: span 20 >= 5 + 10.
        for f in [0, 5, 10, 15] {
            assert!(tracker.observe(f, &markers(0.0)).is_none());
        }
        assert!(tracker.observe(20, &markers(0.0)).is_none());
    }

    #[test]
    fn jumping_markers_restart_run() {
        let mut tracker = CalibrationTracker::new(CalibrationParams::default());
        for f in 0..4 {
            tracker.observe(f, &markers(0.0));
        }
        // Markers moved by a full marker width: no overlap with the run.
        assert!(tracker.observe(4, &markers(40.0)).is_none());
        assert_eq!(tracker.run_len(), 1);
    }

    #[test]
    fn small_jitter_is_tolerated() {
        let mut tracker = CalibrationTracker::new(CalibrationParams::default());
        for f in 0..4 {
            tracker.observe(f, &markers(f as f64));
        }
        assert!(tracker.observe(4, &markers(4.0)).is_some());
    }
}
