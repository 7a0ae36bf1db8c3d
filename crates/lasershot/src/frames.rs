//! Adapters between `image` buffers and the pipeline's image types.

use crate::LaserShotError;
use chrono::{DateTime, Duration, Utc};
use lasershot_core::{Frame, GrayImage, GrayImageView, RgbImage, RgbImageView};
use std::path::{Path, PathBuf};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Borrow an `image::GrayImage` as a [`GrayImageView`].
pub fn gray_view(img: &::image::GrayImage) -> GrayImageView<'_> {
    GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// Borrow an `image::RgbImage` as an [`RgbImageView`].
pub fn rgb_view(img: &::image::RgbImage) -> RgbImageView<'_> {
    RgbImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// Decode any supported image file as RGB.
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
pub fn load_rgb(path: impl AsRef<Path>) -> Result<RgbImage, LaserShotError> {
    let path = path.as_ref();
    let img = ::image::open(path)?.to_rgb8();
    if img.width() == 0 || img.height() == 0 {
        return Err(LaserShotError::EmptyImage {
            path: path.display().to_string(),
        });
    }
    Ok(RgbImage {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.into_raw(),
    })
}

/// Decode any supported image file as 8-bit luma.
pub fn load_gray(path: impl AsRef<Path>) -> Result<GrayImage, LaserShotError> {
    let path = path.as_ref();
    let img = ::image::open(path)?.to_luma8();
    if img.width() == 0 || img.height() == 0 {
        return Err(LaserShotError::EmptyImage {
            path: path.display().to_string(),
        });
    }
    Ok(GrayImage {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.into_raw(),
    })
}

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "tif"];

/// Frames read from the image files of a directory, in file-name order.
///
/// Timestamps start at `start` and advance by `frame_interval`. Unreadable
/// files are logged and skipped without consuming a frame index.
#[derive(Debug)]
pub struct ImageSequence {
    paths: Vec<PathBuf>,
    next: usize,
    index: u64,
    start: DateTime<Utc>,
    frame_interval: Duration,
}

impl ImageSequence {
    pub fn from_dir(dir: impl AsRef<Path>, fps: f64) -> Result<Self, LaserShotError> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir.as_ref())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();
        Ok(Self::from_paths(paths, fps))
    }

    pub fn from_paths(paths: Vec<PathBuf>, fps: f64) -> Self {
        let micros = if fps.is_finite() && fps > 0.0 {
            (1e6 / fps).round() as i64
        } else {
            0
        };
        Self {
            paths,
            next: 0,
            index: 0,
            start: Utc::now(),
            frame_interval: Duration::microseconds(micros),
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl Iterator for ImageSequence {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        while let Some(path) = self.paths.get(self.next) {
            self.next += 1;
            match load_rgb(path) {
                Ok(image) => {
                    let timestamp = self.start + self.frame_interval * self.index as i32;
                    let frame = Frame::new(image, self.index, timestamp);
                    self.index += 1;
                    return Some(frame);
                }
                Err(e) => log::warn!("skipping {}: {e}", path.display()),
            }
        }
        None
    }
}
