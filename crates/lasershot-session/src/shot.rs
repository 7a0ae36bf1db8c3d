//! Shots and frame-to-shot coalescing.

use chrono::{DateTime, Utc};
use lasershot_core::PolarVector;
use serde::{Deserialize, Serialize};

/// Position of a flash at one frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DriftSample {
    pub time: DateTime<Utc>,
    pub position: PolarVector,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Shot {
    pub time: DateTime<Utc>,
    pub position: PolarVector,
    pub score: i32,
    /// Starts with the shot's own detection.
    pub drift_samples: Vec<DriftSample>,
}

impl Shot {
    pub fn new(time: DateTime<Utc>, position: PolarVector, score: i32) -> Self {
        Self {
            time,
            position,
            score,
            drift_samples: vec![DriftSample { time, position }],
        }
    }

    /// Displacement from the first to the last drift sample.
    pub fn drift_vector(&self) -> PolarVector {
        match (self.drift_samples.first(), self.drift_samples.last()) {
            (Some(first), Some(last)) => PolarVector::from_cartesian(
                last.position.to_cartesian() - first.position.to_cartesian(),
            ),
            _ => PolarVector::new(0.0, 0.0),
        }
    }
}

/// Outcome of one detection fed to [`ShotTracker`].
#[derive(Clone, Debug, PartialEq)]
pub enum ShotUpdate {
    NewShot(Shot),
    /// Same flash as the previous frame.
    Drift(DriftSample),
    /// Inside the debounce window of the last shot; ignored.
    Debounced,
}

pub const DEFAULT_DEBOUNCE_FRAMES: u64 = 10;

/// Merges detections on consecutive frames into one shot and debounces new
/// shots.
#[derive(Clone, Debug)]
pub struct ShotTracker {
    debounce_frames: u64,
    last_detection: Option<u64>,
    last_shot: Option<u64>,
}

impl Default for ShotTracker {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE_FRAMES)
    }
}

impl ShotTracker {
    pub fn new(debounce_frames: u64) -> Self {
        Self {
            debounce_frames,
            last_detection: None,
            last_shot: None,
        }
    }

    pub fn reset(&mut self) {
        self.last_detection = None;
        self.last_shot = None;
    }

    pub fn observe(
        &mut self,
        frame_index: u64,
        time: DateTime<Utc>,
        position: PolarVector,
        score: i32,
    ) -> ShotUpdate {
        let continues = match (self.last_detection, frame_index.checked_sub(1)) {
            (Some(last), Some(prev)) => last == prev,
            _ => false,
        };
        if continues {
            self.last_detection = Some(frame_index);
            return ShotUpdate::Drift(DriftSample { time, position });
        }

        let clear = self
            .last_shot
            .is_none_or(|last| frame_index.saturating_sub(last) >= self.debounce_frames);
        if !clear {
            log::debug!("frame {frame_index}: detection debounced");
            return ShotUpdate::Debounced;
        }

        self.last_detection = Some(frame_index);
        self.last_shot = Some(frame_index);
        ShotUpdate::NewShot(Shot::new(time, position, score))
    }
}
