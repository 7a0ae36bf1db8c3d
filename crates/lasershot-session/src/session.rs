//! Training sessions and their persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::persist::{load_snapshot, write_snapshot, StoreError};
use crate::shot::{DriftSample, Shot};

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("session {0} is already finished")]
    AlreadyFinished(Uuid),
    #[error("session {0} has no shot to attach drift to")]
    NoShot(Uuid),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub start_time: DateTime<Utc>,
    pub finish_time: Option<DateTime<Utc>>,
    pub shots: Vec<Shot>,
    pub total_score: i32,
}

impl Session {
    pub fn start(id: Uuid, start_time: DateTime<Utc>) -> Self {
        Self {
            id,
            start_time,
            finish_time: None,
            shots: Vec::new(),
            total_score: 0,
        }
    }

    /// Fresh session with a random v4 id.
    pub fn start_now(start_time: DateTime<Utc>) -> Self {
        Self::start(Uuid::new_v4(), start_time)
    }

    pub fn is_active(&self) -> bool {
        self.finish_time.is_none()
    }

    pub fn shots_fired(&self) -> usize {
        self.shots.len()
    }

    pub fn record_shot(&mut self, shot: Shot) -> Result<(), SessionError> {
        if !self.is_active() {
            return Err(SessionError::AlreadyFinished(self.id));
        }
        self.total_score += shot.score;
        self.shots.push(shot);
        Ok(())
    }

    /// Append a drift sample to the latest shot.
    pub fn record_drift(&mut self, sample: DriftSample) -> Result<(), SessionError> {
        if !self.is_active() {
            return Err(SessionError::AlreadyFinished(self.id));
        }
        let shot = self.shots.last_mut().ok_or(SessionError::NoShot(self.id))?;
        shot.drift_samples.push(sample);
        Ok(())
    }

    pub fn finish(&mut self, finish_time: DateTime<Utc>) -> Result<(), SessionError> {
        if !self.is_active() {
            return Err(SessionError::AlreadyFinished(self.id));
        }
        self.finish_time = Some(finish_time);
        Ok(())
    }
}

/// Where finished sessions are kept.
pub trait SessionStore {
    fn create(&mut self, session: &Session) -> Result<(), StoreError>;
    fn get_all(&self) -> Result<Vec<Session>, StoreError>;
    fn delete(&mut self, id: Uuid) -> Result<(), StoreError>;
}

#[derive(Clone, Debug, Default)]
pub struct MemorySessionStore {
    sessions: Vec<Session>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn create(&mut self, session: &Session) -> Result<(), StoreError> {
        upsert(&mut self.sessions, session);
        Ok(())
    }

    fn get_all(&self) -> Result<Vec<Session>, StoreError> {
        Ok(self.sessions.clone())
    }

    fn delete(&mut self, id: Uuid) -> Result<(), StoreError> {
        remove(&mut self.sessions, id)
    }
}

/// Sessions kept in a single JSON file.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    sessions: Vec<Session>,
}

impl FileSessionStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let sessions: Vec<Session> = load_snapshot(&path)?;
        log::info!("opened session store {} ({} sessions)", path.display(), sessions.len());
        Ok(Self { path, sessions })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn create(&mut self, session: &Session) -> Result<(), StoreError> {
        let mut next = self.sessions.clone();
        upsert(&mut next, session);
        write_snapshot(&self.path, &next)?;
        self.sessions = next;
        Ok(())
    }

    fn get_all(&self) -> Result<Vec<Session>, StoreError> {
        Ok(self.sessions.clone())
    }

    fn delete(&mut self, id: Uuid) -> Result<(), StoreError> {
        let mut next = self.sessions.clone();
        remove(&mut next, id)?;
        write_snapshot(&self.path, &next)?;
        self.sessions = next;
        Ok(())
    }
}

fn upsert(sessions: &mut Vec<Session>, session: &Session) {
    match sessions.iter_mut().find(|s| s.id == session.id) {
        Some(existing) => *existing = session.clone(),
        None => sessions.push(session.clone()),
    }
}

fn remove(sessions: &mut Vec<Session>, id: Uuid) -> Result<(), StoreError> {
    let before = sessions.len();
    sessions.retain(|s| s.id != id);
    if sessions.len() == before {
        return Err(StoreError::NotFound(id.to_string()));
    }
    Ok(())
}
