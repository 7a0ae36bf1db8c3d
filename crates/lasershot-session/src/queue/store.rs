//! Outbound message rows and their stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::persist::{load_snapshot, write_snapshot, StoreError};

/// One queued payload. `id` is assigned by the store and grows with enqueue
/// order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub id: i64,
    pub payload: String,
    pub enqueued_at: DateTime<Utc>,
    pub sent: bool,
}

/// Crash-safe FIFO of outbound payloads.
pub trait MessageStore {
    fn insert(&mut self, payload: &str, enqueued_at: DateTime<Utc>) -> Result<i64, StoreError>;
    fn select_oldest_unsent(&self) -> Result<Option<OutboundMessage>, StoreError>;
    fn mark_sent(&mut self, id: i64) -> Result<(), StoreError>;
    fn delete(&mut self, id: i64) -> Result<(), StoreError>;
    /// Unsent rows, oldest first.
    fn pending(&self) -> Result<Vec<OutboundMessage>, StoreError>;
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Rows {
    next_id: i64,
    messages: Vec<OutboundMessage>,
}

impl Rows {
    fn insert(&mut self, payload: &str, enqueued_at: DateTime<Utc>) -> i64 {
        let id = self.next_id.max(1);
        self.next_id = id + 1;
        self.messages.push(OutboundMessage {
            id,
            payload: payload.to_owned(),
            enqueued_at,
            sent: false,
        });
        id
    }

    fn oldest_unsent(&self) -> Option<OutboundMessage> {
        self.messages.iter().find(|m| !m.sent).cloned()
    }

    fn mark_sent(&mut self, id: i64) -> Result<(), StoreError> {
        let row = self
            .messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        row.sent = true;
        Ok(())
    }

    fn delete(&mut self, id: i64) -> Result<(), StoreError> {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != id);
        if self.messages.len() == before {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn pending(&self) -> Vec<OutboundMessage> {
        self.messages.iter().filter(|m| !m.sent).cloned().collect()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemoryMessageStore {
    rows: Rows,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageStore for MemoryMessageStore {
    fn insert(&mut self, payload: &str, enqueued_at: DateTime<Utc>) -> Result<i64, StoreError> {
        Ok(self.rows.insert(payload, enqueued_at))
    }

    fn select_oldest_unsent(&self) -> Result<Option<OutboundMessage>, StoreError> {
        Ok(self.rows.oldest_unsent())
    }

    fn mark_sent(&mut self, id: i64) -> Result<(), StoreError> {
        self.rows.mark_sent(id)
    }

    fn delete(&mut self, id: i64) -> Result<(), StoreError> {
        self.rows.delete(id)
    }

    fn pending(&self) -> Result<Vec<OutboundMessage>, StoreError> {
        Ok(self.rows.pending())
    }
}

/// Message rows persisted as one JSON file; every mutation rewrites it.
#[derive(Debug)]
pub struct FileMessageStore {
    path: PathBuf,
    rows: Rows,
}

impl FileMessageStore {
    /// Open or create the store. Rows already marked sent were delivered
    /// before the last shutdown and are dropped.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut rows: Rows = load_snapshot(&path)?;

        let total = rows.messages.len();
        rows.messages.retain(|m| !m.sent);
        rows.messages.sort_by_key(|m| m.id);
        let max_id = rows.messages.iter().map(|m| m.id).max().unwrap_or(0);
        rows.next_id = rows.next_id.max(max_id + 1).max(1);

        let mut store = Self { path, rows };
        if store.rows.messages.len() != total {
            log::info!(
                "purged {} delivered rows from {}",
                total - store.rows.messages.len(),
                store.path.display()
            );
            store.flush()?;
        }
        log::info!(
            "opened outbound store {} ({} pending)",
            store.path.display(),
            store.rows.messages.len()
        );
        Ok(store)
    }

    /// Unsent rows of the snapshot at `path`, oldest first, without opening
    /// the store. Nothing is written, so this is safe next to a live worker.
    pub fn read_pending(path: impl AsRef<Path>) -> Result<Vec<OutboundMessage>, StoreError> {
        let rows: Rows = load_snapshot(path.as_ref())?;
        let mut pending = rows.pending();
        pending.sort_by_key(|m| m.id);
        Ok(pending)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StoreError> {
        write_snapshot(&self.path, &self.rows)
    }

    /// Apply `f` to a copy of the rows and keep it only once written.
    fn update<R>(
        &mut self,
        f: impl FnOnce(&mut Rows) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let mut next = self.rows.clone();
        let out = f(&mut next)?;
        write_snapshot(&self.path, &next)?;
        self.rows = next;
        Ok(out)
    }
}

impl MessageStore for FileMessageStore {
    fn insert(&mut self, payload: &str, enqueued_at: DateTime<Utc>) -> Result<i64, StoreError> {
        self.update(|rows| Ok(rows.insert(payload, enqueued_at)))
    }

    fn select_oldest_unsent(&self) -> Result<Option<OutboundMessage>, StoreError> {
        Ok(self.rows.oldest_unsent())
    }

    fn mark_sent(&mut self, id: i64) -> Result<(), StoreError> {
        self.update(|rows| rows.mark_sent(id))
    }

    fn delete(&mut self, id: i64) -> Result<(), StoreError> {
        self.update(|rows| rows.delete(id))
    }

    fn pending(&self) -> Result<Vec<OutboundMessage>, StoreError> {
        Ok(self.rows.pending())
    }
}

/// A message store behind a mutex; the only path to the rows.
#[derive(Debug)]
pub struct SharedStore<S> {
    inner: Arc<Mutex<S>>,
}

impl<S> Clone for SharedStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: MessageStore> SharedStore<S> {
    pub fn new(store: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Run `f` with exclusive access to the store.
    pub fn with<R>(
        &self,
        f: impl FnOnce(&mut S) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let mut guard = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        f(&mut guard)
    }

    pub fn insert(&self, payload: &str, enqueued_at: DateTime<Utc>) -> Result<i64, StoreError> {
        self.with(|s| s.insert(payload, enqueued_at))
    }

    pub fn pending(&self) -> Result<Vec<OutboundMessage>, StoreError> {
        self.with(|s| s.pending())
    }
}
