//! High-level facade crate for the `lasershot-*` workspace.
//!
//! This crate provides:
//! - stable re-exports of the underlying crates,
//! - (feature `image`) adapters between `image` buffers and the lightweight
//!   views the pipeline consumes, plus a directory-backed frame source,
//! - (feature `cli`) the `lasershot` command-line tool.
//!
//! ## Quickstart
//!
//! ```no_run
//! use lasershot::vision::{Target, TargetParams};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let photo = lasershot::frames::load_gray("target.png")?;
//! let target = Target::from_photo(&photo.view(), &TargetParams::default())?;
//! let hit = target.classify_point(320.0, 240.0, 3.0);
//! println!("score {} at {:.2}", hit.score, hit.distance);
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `lasershot::core`: geometry, homographies, image buffers, frames, logger.
//! - `lasershot::vision`: corner roles, rectification, laser detection, ring scoring.
//! - `lasershot::session`: state machine, sessions, events, outbound queue, controller.
//! - `lasershot::frames` (feature `image`): image loading and frame sources.

mod error;

pub use lasershot_core as core;
pub use lasershot_session as session;
pub use lasershot_vision as vision;

pub use error::LaserShotError;
pub use lasershot_core::{Frame, FrameSource, PolarVector};
pub use lasershot_session::{
    AppState, LaserShotConfig, Session, SessionController, SessionEvent, Shot,
};
pub use lasershot_vision::{LaserDetection, LaserDetector, MarkerQuad, PointScore, Target};

#[cfg(feature = "image")]
pub mod frames;
