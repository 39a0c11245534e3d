//! # Interrupt Channel
//!
//! Carries interrupt requests from whoever wants evaluation to stop (a new trigger,
//! the stop button, shutdown) to every evaluation currently racing.
//!
//! A coordinator subscribes when an evaluation is accepted. Broadcast semantics do
//! the rest: a request reaches every race that subscribed before it was issued and
//! none that subscribed after, so a new evaluation never sees the interrupt that
//! made room for it.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::eval::request::TriggerOrigin;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum InterruptReason {
    /// The user explicitly asked to stop.
    UserRequested,
    /// A new evaluation was triggered from the given origin.
    Superseded(TriggerOrigin),
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct InterruptRequest {
    pub reason: InterruptReason,
    pub issued_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct InterruptChannel {
    sender: broadcast::Sender<InterruptRequest>,
}

impl InterruptChannel {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Issues an interrupt request and returns how many racing evaluations saw it.
    ///
    /// With nothing racing this is a no-op.
    pub fn request(&self, reason: InterruptReason) -> usize {
        let request = InterruptRequest {
            reason,
            issued_at: Utc::now(),
        };
        match self.sender.send(request) {
            Ok(listeners) => {
                debug!("Interrupt ({}) delivered to {} evaluation(s)", reason, listeners);
                listeners
            }
            Err(_) => {
                trace!("Interrupt ({}) with no evaluation running", reason);
                0
            }
        }
    }

    pub fn subscribe(&self) -> InterruptReceiver {
        InterruptReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn listeners(&self) -> usize {
        self.sender.receiver_count()
    }
}

pub struct InterruptReceiver {
    receiver: broadcast::Receiver<InterruptRequest>,
}

impl InterruptReceiver {
    /// Waits for the next interrupt request.
    ///
    /// Lagging still means an interrupt was issued, so it resolves with the oldest
    /// retained request. A closed channel never resolves.
    pub async fn recv(&mut self) -> InterruptRequest {
        loop {
            match self.receiver.recv().await {
                Ok(request) => return request,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    trace!("Interrupt receiver lagged by {}", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return std::future::pending().await;
                }
            }
        }
    }
}
