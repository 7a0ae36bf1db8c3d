//! Core types and utilities for the lasershot pipeline.
//!
//! This crate is intentionally small and purely geometric: points, polar
//! vectors, ellipses, bounding boxes, homographies, and image buffers. It
//! knows nothing about markers, lasers, or sessions.

mod frame;
mod geometry;
mod homography;
mod image;
mod logger;

pub use frame::{Frame, FrameSource};
pub use geometry::{BoundingBox, Ellipse, GeometryError, PolarVector};
pub use homography::{
    estimate_homography, homography_from_4pt, warp_perspective_gray, warp_perspective_rgb,
    Homography,
};
pub use image::{
    luminance, sample_bilinear, sample_bilinear_rgb, sample_bilinear_u8, GrayImage, GrayImageView,
    RgbImage, RgbImageView,
};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_from_env, init_with_level, parse_level, LOG_ENV};
