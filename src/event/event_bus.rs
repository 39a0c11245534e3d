//! # Event Bus Implementation
//!
//! The EventBus is the hub the evaluation core publishes to. Presentation layers
//! (the output projector, the CLI printer) subscribe and react.
//!
//! ## Design Decisions
//!
//! The implementation uses Tokio's broadcast channel rather than MPSC channels to:
//!
//! 1. Allow multiple subscribers to receive the same event
//! 2. Keep publishing non-blocking; delivery is fire-and-forget
//! 3. Bound memory through the channel capacity
//!
//! The bus keeps no receiver of its own: an event published while nobody is
//! subscribed is dropped and reported as [`EventError::SendFailed`].

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::eval::diagnostic::Diagnostic;
use crate::interpreter::Value;
use crate::workspace::OutputEntry;

#[derive(Debug, Clone, PartialEq, strum::Display)]
pub enum EventType {
    /// An evaluation finished with a value.
    EvalSuccess { value: Value },
    /// An evaluation settled without a value; diagnostics were read from its context.
    EvalError { diagnostics: Vec<Diagnostic> },
    /// An entry was appended to the REPL output history outside of a result (echo).
    OutputAppended { entry: OutputEntry },
    OutputCleared,
}

/// # Event
///
/// A discrete message on the bus. `request_id` ties terminal events back to the
/// evaluation request that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event_type: EventType,
    pub request_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            request_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn for_request(request_id: Uuid, event_type: EventType) -> Self {
        Self {
            event_type,
            request_id: Some(request_id),
            timestamp: Utc::now(),
        }
    }

    pub fn success(request_id: Uuid, value: Value) -> Self {
        Self::for_request(request_id, EventType::EvalSuccess { value })
    }

    pub fn error(request_id: Uuid, diagnostics: Vec<Diagnostic>) -> Self {
        Self::for_request(request_id, EventType::EvalError { diagnostics })
    }

    /// Success and error are the only events closing out an evaluation.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.event_type,
            EventType::EvalSuccess { .. } | EventType::EvalError { .. }
        )
    }
}

/// # EventBus
///
/// Broadcast-based publish/subscribe for playground events.
pub struct EventBus {
    event_sender: broadcast::Sender<Event>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the specified buffer capacity.
    ///
    /// A subscriber that falls more than `capacity` events behind observes
    /// [`EventError::Lagged`] on its next receive.
    pub fn new(capacity: usize) -> Self {
        let (event_sender, _) = broadcast::channel(capacity);
        Self {
            event_sender,
            capacity,
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver::new(self.event_sender.subscribe())
    }

    pub async fn publish(&self, event: Event) -> EventResult<()> {
        self.sync_publish(event)
    }

    /// Publishes without awaiting; usable from synchronous code.
    pub fn sync_publish(&self, event: Event) -> EventResult<()> {
        debug_event("Publishing", &event);
        self.event_sender
            .send(event)
            .map_err(|e| EventError::SendFailed {
                message: e.to_string(),
            })?;
        Ok(())
    }

    pub fn queue_size(&self) -> usize {
        self.event_sender.len()
    }

    pub fn subscribers_size(&self) -> usize {
        self.event_sender.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

pub fn debug_event(prefix: &str, event: &Event) {
    match event.event_type {
        EventType::OutputAppended { .. } => trace!("{} Event: {:?}", prefix, event),
        _ => debug!("{} Event: {:?}", prefix, event),
    }
}

pub struct EventReceiver {
    pub receiver: broadcast::Receiver<Event>,
}

impl EventReceiver {
    pub fn new(receiver: broadcast::Receiver<Event>) -> Self {
        Self { receiver }
    }

    /// Receives the next event. On lag the number of skipped events is returned
    /// as an error and the receiver stays positioned at the oldest event still
    /// retained; callers should simply call `recv` again.
    pub async fn recv(&mut self) -> EventResult<Event> {
        match self.receiver.recv().await {
            Ok(event) => Ok(event),
            Err(broadcast::error::RecvError::Lagged(n)) => Err(EventError::Lagged { count: n }),
            Err(e) => Err(EventError::ReceiveFailed {
                message: e.to_string(),
            }),
        }
    }

    /// Non-blocking variant used to drain whatever is already queued.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventError {
    #[error("Event Send failed: {message}")]
    SendFailed { message: String },

    #[error("Event Receive failed: {message}")]
    ReceiveFailed { message: String },

    #[error("Event lagged: {count}")]
    Lagged { count: u64 },
}

pub type EventResult<T> = Result<T, EventError>;
