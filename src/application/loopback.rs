//! Process-wide inbound event queue
//!
//! The transport pump and every plugin push into the same channel, so a
//! loopback event is always queued ahead of external events that arrive
//! after [`LoopbackHandle::push`] returned.

use crate::application::errors::PluginError;
use crate::domain::entities::Event;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

#[derive(Clone)]
pub struct LoopbackHandle {
    tx: mpsc::UnboundedSender<Event>,
}

impl LoopbackHandle {
    /// Enqueue an event for dispatch. Usable from any thread.
    pub fn push(&self, event: Event) -> Result<(), PluginError> {
        debug!(event_id = %event.id, sender = %event.sender, "Pushing event");
        self.tx.send(event).map_err(|_| PluginError::QueueClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving end shared by the shared workers
#[derive(Clone)]
pub struct EventQueue {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Event>>>,
}

impl EventQueue {
    /// Wait for the next event; `None` once every sender is gone.
    pub async fn recv(&self) -> Option<Event> {
        self.rx.lock().await.recv().await
    }

    /// Take an event if one is already queued.
    pub fn try_recv(&self) -> Option<Event> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }
}

pub fn channel() -> (LoopbackHandle, EventQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        LoopbackHandle { tx },
        EventQueue {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}
