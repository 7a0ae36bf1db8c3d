//! Session layer of the lasershot pipeline.
//!
//! [`SessionController`] owns the [`StateMachine`], the calibration result
//! and the live [`Session`]. Shots are coalesced by [`ShotTracker`] and
//! reported as [`SessionEvent`]s through an [`EventSink`], normally a
//! [`queue::QueueHandle`] backed by a durable store and drained by a
//! [`queue::DeliveryWorker`].

mod config;
mod controller;
mod events;
mod persist;
pub mod queue;
mod session;
mod shot;
mod state;

pub use config::{ConfigError, LaserShotConfig};
pub use controller::{ControllerParams, FrameSnapshot, SessionController};
pub use events::{
    format_timestamp, parse_timestamp, timestamp, EventSink, SessionEvent, TIMESTAMP_FORMAT,
};
pub use persist::StoreError;
pub use session::{FileSessionStore, MemorySessionStore, Session, SessionError, SessionStore};
pub use shot::{DriftSample, Shot, ShotTracker, ShotUpdate, DEFAULT_DEBOUNCE_FRAMES};
pub use state::{transition, AppEvent, AppState, StateMachine};
