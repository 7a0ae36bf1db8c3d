//! Delivery lane: one thread drains the store through a transport.

use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::store::{MessageStore, OutboundMessage, SharedStore};
use super::{QueueError, QueueHandle};
use crate::persist::StoreError;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("server answered with status {0}")]
    Status(u16),
    #[error("transport failure: {0}")]
    Transport(String),
}

/// `Ok` for 2xx status codes.
pub fn status_to_result(status: u16) -> Result<(), DeliveryError> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(DeliveryError::Status(status))
    }
}

/// Sends one message to the collector (an HTTP POST in production).
pub trait Transport {
    fn deliver(&mut self, message: &OutboundMessage) -> Result<(), DeliveryError>;
}

impl<F> Transport for F
where
    F: FnMut(&OutboundMessage) -> Result<(), DeliveryError>,
{
    fn deliver(&mut self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        self(message)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueParams {
    /// Pause before retrying a failed message.
    pub retry_backoff_ms: u64,
    /// Poll interval while the queue is empty.
    pub idle_poll_ms: u64,
}

impl Default for QueueParams {
    fn default() -> Self {
        Self {
            retry_backoff_ms: 1_000,
            idle_poll_ms: 5_000,
        }
    }
}

impl QueueParams {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Idle,
    Delivered(i64),
    Failed(i64),
}

/// One delivery attempt at a time against the oldest unsent row.
pub struct Courier<S, T> {
    store: SharedStore<S>,
    transport: T,
}

impl<S: MessageStore, T: Transport> Courier<S, T> {
    pub fn new(store: SharedStore<S>, transport: T) -> Self {
        Self { store, transport }
    }

    pub fn deliver_next(&mut self) -> Result<DeliveryOutcome, StoreError> {
        let Some(message) = self.store.with(|s| s.select_oldest_unsent())? else {
            return Ok(DeliveryOutcome::Idle);
        };

        match self.transport.deliver(&message) {
            Ok(()) => {
                self.store.with(|s| {
                    s.mark_sent(message.id)?;
                    s.delete(message.id)
                })?;
                log::debug!("delivered message {}", message.id);
                Ok(DeliveryOutcome::Delivered(message.id))
            }
            Err(e) => {
                log::warn!("delivery of message {} failed: {e}", message.id);
                Ok(DeliveryOutcome::Failed(message.id))
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Control {
    Wake,
    Shutdown,
}

enum Wait {
    Continue,
    Stop,
}

/// Background delivery thread. The transport lives on that thread only.
pub struct DeliveryWorker<S> {
    store: SharedStore<S>,
    control: Sender<Control>,
    thread: Option<JoinHandle<()>>,
}

impl<S> DeliveryWorker<S>
where
    S: MessageStore + Send + 'static,
{
    pub fn spawn<T>(store: SharedStore<S>, transport: T, params: QueueParams) -> Result<Self, QueueError>
    where
        T: Transport + Send + 'static,
    {
        let (control, rx) = mpsc::channel();
        let courier = Courier::new(store.clone(), transport);
        let thread = std::thread::Builder::new()
            .name("lasershot-delivery".into())
            .spawn(move || run_loop(courier, rx, params))
            .map_err(QueueError::Spawn)?;
        log::info!("delivery worker started");
        Ok(Self {
            store,
            control,
            thread: Some(thread),
        })
    }

    /// Enqueue handle that wakes this worker.
    pub fn handle(&self) -> QueueHandle<S> {
        QueueHandle::with_wake(self.store.clone(), self.control.clone())
    }

    /// Stop after the attempt in flight. Undelivered rows stay in the store.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.control.send(Control::Shutdown);
        if thread.join().is_err() {
            log::error!("delivery worker panicked");
        } else {
            log::info!("delivery worker stopped");
        }
    }
}

impl<S> Drop for DeliveryWorker<S> {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.control.send(Control::Shutdown);
            let _ = thread.join();
        }
    }
}

fn run_loop<S: MessageStore, T: Transport>(
    mut courier: Courier<S, T>,
    rx: Receiver<Control>,
    params: QueueParams,
) {
    loop {
        let wait = match courier.deliver_next() {
            Ok(DeliveryOutcome::Delivered(_)) => drain(&rx),
            Ok(DeliveryOutcome::Failed(_)) => sleep(&rx, params.retry_backoff(), false),
            Ok(DeliveryOutcome::Idle) => sleep(&rx, params.idle_poll(), true),
            Err(e) => {
                log::error!("outbound store unavailable: {e}");
                sleep(&rx, params.retry_backoff(), false)
            }
        };
        if let Wait::Stop = wait {
            break;
        }
    }
}

/// Consume queued wakes without blocking.
fn drain(rx: &Receiver<Control>) -> Wait {
    loop {
        match rx.try_recv() {
            Ok(Control::Wake) => continue,
            Ok(Control::Shutdown) | Err(mpsc::TryRecvError::Disconnected) => return Wait::Stop,
            Err(mpsc::TryRecvError::Empty) => return Wait::Continue,
        }
    }
}

/// Block for `timeout`. Only a shutdown ends a backoff early; a wake also
/// ends an idle wait.
fn sleep(rx: &Receiver<Control>, timeout: Duration, wake_interrupts: bool) -> Wait {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Wait::Continue;
        }
        match rx.recv_timeout(remaining) {
            Ok(Control::Wake) if wake_interrupts => return drain(rx),
            Ok(Control::Wake) => continue,
            Ok(Control::Shutdown) | Err(RecvTimeoutError::Disconnected) => return Wait::Stop,
            Err(RecvTimeoutError::Timeout) => return Wait::Continue,
        }
    }
}
