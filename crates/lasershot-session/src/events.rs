//! Outbound event payloads.
//!
//! Every payload is a flat JSON object tagged by `command`. Timestamps are
//! UTC strings in [`TIMESTAMP_FORMAT`] on both the producing and consuming
//! side.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::queue::QueueError;
use crate::session::Session;
use crate::shot::Shot;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

pub fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).map(|naive| naive.and_utc())
}

/// `#[serde(with = "timestamp")]` adapter for [`TIMESTAMP_FORMAT`].
pub mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_timestamp(t))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_timestamp(&raw).map_err(D::Error::custom)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum SessionEvent {
    NewSession {
        id: Uuid,
        #[serde(with = "timestamp")]
        start_time: DateTime<Utc>,
    },
    EndSession {
        id: Uuid,
        #[serde(with = "timestamp")]
        finish_time: DateTime<Utc>,
    },
    AddShotToSession {
        session_id: Uuid,
        #[serde(with = "timestamp")]
        timestamp: DateTime<Utc>,
        score: i32,
        angle: f64,
        distance: f64,
    },
}

impl SessionEvent {
    pub fn new_session(session: &Session) -> Self {
        Self::NewSession {
            id: session.id,
            start_time: session.start_time,
        }
    }

    /// `None` while the session is still running.
    pub fn end_session(session: &Session) -> Option<Self> {
        session.finish_time.map(|finish_time| Self::EndSession {
            id: session.id,
            finish_time,
        })
    }

    pub fn add_shot(session_id: Uuid, shot: &Shot) -> Self {
        Self::AddShotToSession {
            session_id,
            timestamp: shot.time,
            score: shot.score,
            angle: shot.position.angle,
            distance: shot.position.distance,
        }
    }

    pub fn command(&self) -> &'static str {
        match self {
            Self::NewSession { .. } => "new_session",
            Self::EndSession { .. } => "end_session",
            Self::AddShotToSession { .. } => "add_shot_to_session",
        }
    }

    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_payload(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

/// One-way hand-off of events to the delivery side.
pub trait EventSink {
    fn submit(&mut self, event: &SessionEvent) -> Result<(), QueueError>;
}

impl<T: EventSink + ?Sized> EventSink for Box<T> {
    fn submit(&mut self, event: &SessionEvent) -> Result<(), QueueError> {
        (**self).submit(event)
    }
}
