use tracing::debug;
use uuid::Uuid;

use super::event_bus::{Event, EventBus};
use crate::eval::diagnostic::Diagnostic;
use crate::interpreter::Value;

/// One-shot terminal notifications for an evaluation.
///
/// No buffering and no retry: whatever is subscribed at publish time sees the
/// event, nothing else does.
#[mockall::automock]
pub trait ResultPublisher: Send + Sync {
    fn publish_success(&self, request_id: Uuid, value: Value);
    fn publish_error(&self, request_id: Uuid, diagnostics: Vec<Diagnostic>);
}

impl ResultPublisher for EventBus {
    fn publish_success(&self, request_id: Uuid, value: Value) {
        if let Err(e) = self.sync_publish(Event::success(request_id, value)) {
            debug!("Success for {} dropped: {}", request_id, e);
        }
    }

    fn publish_error(&self, request_id: Uuid, diagnostics: Vec<Diagnostic>) {
        if let Err(e) = self.sync_publish(Event::error(request_id, diagnostics)) {
            debug!("Error for {} dropped: {}", request_id, e);
        }
    }
}
