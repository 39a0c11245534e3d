use uuid::Uuid;

use super::context::{ContextHandle, RunToken};
use crate::interpreter::Value;

/// Which entry point produced an evaluation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
pub enum TriggerOrigin {
    Editor,
    Repl,
}

/// A snapshot of code plus the context it runs against.
///
/// Built by the dispatcher at the moment a trigger fires and consumed once by the
/// coordinator. Construction claims the context for a new run, so the request
/// carries the token any later interrupt is bound to.
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    id: Uuid,
    origin: TriggerOrigin,
    code: String,
    context: ContextHandle,
    token: RunToken,
}

impl EvaluationRequest {
    pub async fn new(code: impl Into<String>, context: ContextHandle, origin: TriggerOrigin) -> Self {
        let token = context.begin_run().await;
        Self {
            id: Uuid::new_v4(),
            origin,
            code: code.into(),
            context,
            token,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn origin(&self) -> TriggerOrigin {
        self.origin
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn context(&self) -> &ContextHandle {
        &self.context
    }

    pub fn token(&self) -> &RunToken {
        &self.token
    }

    pub fn is_interrupted(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// How a single run settled. Diagnostics for `ErrorRaised` live on the context.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationOutcome {
    Finished { value: Value },
    ErrorRaised,
    Interrupted,
}

impl EvaluationOutcome {
    pub fn finished(value: Value) -> Self {
        Self::Finished { value }
    }
}
