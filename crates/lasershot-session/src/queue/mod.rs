//! Durable outbound queue.
//!
//! Payloads are written to a [`MessageStore`] before anything touches the
//! network. A [`DeliveryWorker`] drains the store strictly oldest-first,
//! retrying a failed row after a fixed backoff until it is accepted. Rows
//! are removed only after a confirmed send, so delivery is at-least-once.

mod store;
mod worker;

use chrono::Utc;
use std::sync::mpsc::Sender;

pub use store::{FileMessageStore, MemoryMessageStore, MessageStore, OutboundMessage, SharedStore};
pub use worker::{
    status_to_result, Courier, DeliveryError, DeliveryOutcome, DeliveryWorker, QueueParams,
    Transport,
};

use crate::events::{EventSink, SessionEvent};
use crate::persist::StoreError;
use worker::Control;

#[derive(thiserror::Error, Debug)]
pub enum QueueError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to start delivery worker: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Producer side of the queue.
pub struct QueueHandle<S> {
    store: SharedStore<S>,
    wake: Option<Sender<Control>>,
}

impl<S> Clone for QueueHandle<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            wake: self.wake.clone(),
        }
    }
}

impl<S: MessageStore> QueueHandle<S> {
    /// Handle with no worker attached; rows wait for a later worker.
    pub fn detached(store: SharedStore<S>) -> Self {
        Self { store, wake: None }
    }

    pub(crate) fn with_wake(store: SharedStore<S>, wake: Sender<Control>) -> Self {
        Self {
            store,
            wake: Some(wake),
        }
    }

    /// Persist `payload` and nudge the worker. Returns the row id.
    pub fn enqueue(&self, payload: &str) -> Result<i64, QueueError> {
        let id = self.store.insert(payload, Utc::now())?;
        if let Some(wake) = &self.wake {
            // A stopped worker picks the row up on its next start.
            let _ = wake.send(Control::Wake);
        }
        log::debug!("enqueued message {id}");
        Ok(id)
    }

    pub fn enqueue_event(&self, event: &SessionEvent) -> Result<i64, QueueError> {
        self.enqueue(&event.to_payload()?)
    }

    pub fn pending(&self) -> Result<Vec<OutboundMessage>, QueueError> {
        Ok(self.store.pending()?)
    }
}

impl<S: MessageStore> EventSink for QueueHandle<S> {
    fn submit(&mut self, event: &SessionEvent) -> Result<(), QueueError> {
        self.enqueue_event(event).map(|_| ())
    }
}
