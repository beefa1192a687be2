//! In-process domain events.
//!
//! The bus is an ordinary value owned by [`AppState`](crate::models::AppState)
//! and handed to whoever needs it. Each subscriber runs on its own task fed
//! by a broadcast receiver, so publishing never waits on a handler.
//! Subscribing returns a [`Subscription`]; the handler task lives for as
//! long as that guard is alive.

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

use crate::models::{AppointmentStatus, QueueStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    AppointmentScheduled {
        appointment_id: Uuid,
        practitioner_id: Option<Uuid>,
    },
    AppointmentUpdated {
        appointment_id: Uuid,
        status: AppointmentStatus,
    },
    AppointmentDeleted {
        appointment_id: Uuid,
    },
    PatientCheckedIn {
        queue_entry_id: Uuid,
        patient_id: Uuid,
    },
    QueueStatusChanged {
        queue_entry_id: Uuid,
        from: QueueStatus,
        to: QueueStatus,
    },
    QueueEntryRemoved {
        queue_entry_id: Uuid,
    },
}

const CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Runs `handler` for every event published after this call, on a
    /// spawned task. Must be called from within a tokio runtime.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(DomainEvent) + Send + 'static,
    {
        let mut receiver = self.sender.subscribe();
        let task = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => handler(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Subscription { task }
    }

    /// A raw receiver for callers that want to pull events themselves.
    pub fn receiver(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }

    /// Never blocks. Events published with no live receiver are dropped.
    pub fn publish(&self, event: DomainEvent) {
        let _ = self.sender.send(event);
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Disposer returned by [`EventBus::subscribe`]. Dropping it stops the handler task.
#[must_use = "dropping a Subscription unsubscribes the handler immediately"]
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
