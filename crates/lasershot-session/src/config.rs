//! JSON configuration for the whole pipeline.

use lasershot_vision::{CalibrationParams, LaserDetectorParams, RectifyParams, TargetParams};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::controller::ControllerParams;
use crate::queue::QueueParams;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Every tunable of the pipeline. Missing sections fall back to defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaserShotConfig {
    pub laser: LaserDetectorParams,
    pub target: TargetParams,
    pub rectify: RectifyParams,
    pub calibration: CalibrationParams,
    pub controller: ControllerParams,
    pub queue: QueueParams,
}

impl LaserShotConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
