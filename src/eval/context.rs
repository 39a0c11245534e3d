//! # Execution Context
//!
//! The shared, mutable state every evaluation runs against. A context collects
//! the diagnostics of the current run and the top-level bindings the interpreter
//! keeps between REPL submissions.
//!
//! ## Run ownership
//!
//! Only one run may write to a context at a time. [`ExecutionContext::begin_run`]
//! hands out a fresh [`RunToken`] and revokes whatever token was active before it.
//! Every write checks the token under the same lock that guards the state, so a run
//! that has been interrupted or superseded can keep computing in the background but
//! can no longer change what the next run observes.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, trace};
use uuid::Uuid;

use super::diagnostic::Diagnostic;
use crate::interpreter::Value;

pub type ContextHandle = Arc<ExecutionContext>;

/// Cooperative cancellation handle bound to a single run.
#[derive(Debug, Clone)]
pub struct RunToken {
    id: Uuid,
    cancelled: Arc<AtomicBool>,
}

impl RunToken {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns `true` if this call flipped the token, `false` if it was already cancelled.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl PartialEq for RunToken {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RunToken {}

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub value: Value,
    pub mutable: bool,
}

#[derive(Debug, Default)]
struct ContextState {
    errors: Vec<Diagnostic>,
    bindings: HashMap<String, Binding>,
    active_run: Option<RunToken>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContextError {
    #[error("Run {run_id} no longer owns context {context_id}")]
    RunRevoked { context_id: Uuid, run_id: Uuid },

    #[error("Name {0} not declared.")]
    NotDeclared(String),

    #[error("Name {0} declared twice.")]
    AlreadyDeclared(String),

    #[error("Cannot assign new value to constant {0}.")]
    ConstantAssignment(String),
}

pub type ContextResult<T> = Result<T, ContextError>;

#[derive(Debug)]
pub struct ExecutionContext {
    id: Uuid,
    created_at: DateTime<Utc>,
    state: RwLock<ContextState>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            state: RwLock::new(ContextState::default()),
        }
    }

    pub fn handle() -> ContextHandle {
        Arc::new(Self::new())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Claims the context for a new run, revoking the previously active run.
    pub async fn begin_run(&self) -> RunToken {
        let token = RunToken::new();
        let mut state = self.state.write().await;
        if let Some(previous) = state.active_run.replace(token.clone()) {
            if previous.cancel() {
                debug!(
                    "Context {} revoked run {} in favour of {}",
                    self.id,
                    previous.id(),
                    token.id()
                );
            }
        }
        token
    }

    /// Releases the context if `token` is still the active run.
    pub async fn end_run(&self, token: &RunToken) {
        let mut state = self.state.write().await;
        if state.active_run.as_ref() == Some(token) {
            state.active_run = None;
        }
    }

    /// Releases the context and snapshots its diagnostics in one step.
    ///
    /// Returns `None` when `token` was revoked or is no longer the active run;
    /// the context is released whenever `token` still held it.
    pub async fn finish_run(&self, token: &RunToken) -> Option<Vec<Diagnostic>> {
        let mut state = self.state.write().await;
        if state.active_run.as_ref() != Some(token) {
            return None;
        }
        state.active_run = None;
        if token.is_cancelled() {
            return None;
        }
        Some(state.errors.clone())
    }

    pub async fn active_run(&self) -> Option<Uuid> {
        self.state.read().await.active_run.as_ref().map(RunToken::id)
    }

    /// Drops diagnostics and bindings and revokes the active run.
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        if let Some(previous) = state.active_run.take() {
            previous.cancel();
        }
        state.errors.clear();
        state.bindings.clear();
        debug!("Context {} reset", self.id);
    }

    pub async fn clear_errors(&self) {
        self.state.write().await.errors.clear();
    }

    pub async fn errors(&self) -> Vec<Diagnostic> {
        self.state.read().await.errors.clone()
    }

    pub async fn push_error(&self, token: &RunToken, diagnostic: Diagnostic) -> ContextResult<()> {
        let mut state = self.state.write().await;
        self.ensure_owner(&state, token)?;
        trace!("Context {} diagnostic: {}", self.id, diagnostic);
        state.errors.push(diagnostic);
        Ok(())
    }

    pub async fn lookup(&self, name: &str) -> Option<Value> {
        self.state
            .read()
            .await
            .bindings
            .get(name)
            .map(|binding| binding.value.clone())
    }

    pub async fn binding(&self, name: &str) -> Option<Binding> {
        self.state.read().await.bindings.get(name).cloned()
    }

    pub async fn declare(
        &self,
        token: &RunToken,
        name: &str,
        value: Value,
        mutable: bool,
    ) -> ContextResult<()> {
        let mut state = self.state.write().await;
        self.ensure_owner(&state, token)?;
        if state.bindings.contains_key(name) {
            return Err(ContextError::AlreadyDeclared(name.to_string()));
        }
        state
            .bindings
            .insert(name.to_string(), Binding { value, mutable });
        Ok(())
    }

    pub async fn assign(&self, token: &RunToken, name: &str, value: Value) -> ContextResult<()> {
        let mut state = self.state.write().await;
        self.ensure_owner(&state, token)?;
        match state.bindings.get_mut(name) {
            Some(binding) if binding.mutable => {
                binding.value = value;
                Ok(())
            }
            Some(_) => Err(ContextError::ConstantAssignment(name.to_string())),
            None => Err(ContextError::NotDeclared(name.to_string())),
        }
    }

    fn ensure_owner(&self, state: &ContextState, token: &RunToken) -> ContextResult<()> {
        let owns = state.active_run.as_ref() == Some(token) && !token.is_cancelled();
        if owns {
            Ok(())
        } else {
            Err(ContextError::RunRevoked {
                context_id: self.id,
                run_id: token.id(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_begin_run_revokes_previous() {
        let context = ExecutionContext::new();
        let first = context.begin_run().await;
        let second = context.begin_run().await;

        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert_eq!(context.active_run().await, Some(second.id()));
    }

    #[tokio::test]
    async fn test_revoked_run_cannot_write() {
        let context = ExecutionContext::new();
        let first = context.begin_run().await;
        let _second = context.begin_run().await;

        let result = context
            .push_error(&first, Diagnostic::runtime("late"))
            .await;
        assert!(matches!(result, Err(ContextError::RunRevoked { .. })));
        assert!(context.errors().await.is_empty());

        let result = context.declare(&first, "x", Value::Number(1.0), true).await;
        assert!(matches!(result, Err(ContextError::RunRevoked { .. })));
        assert!(context.lookup("x").await.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_token_cannot_write() {
        let context = ExecutionContext::new();
        let token = context.begin_run().await;
        assert!(token.cancel());
        assert!(!token.cancel());

        let result = context
            .push_error(&token, Diagnostic::runtime("after interrupt"))
            .await;
        assert!(matches!(result, Err(ContextError::RunRevoked { .. })));
    }

    #[tokio::test]
    async fn test_reset_clears_state_and_revokes() {
        let context = ExecutionContext::new();
        let token = context.begin_run().await;
        context
            .declare(&token, "x", Value::Number(1.0), true)
            .await
            .unwrap();
        context
            .push_error(&token, Diagnostic::runtime("boom"))
            .await
            .unwrap();

        context.reset().await;

        assert!(token.is_cancelled());
        assert!(context.errors().await.is_empty());
        assert!(context.lookup("x").await.is_none());
        assert!(context.active_run().await.is_none());
    }

    #[tokio::test]
    async fn test_clear_errors_keeps_bindings() {
        let context = ExecutionContext::new();
        let token = context.begin_run().await;
        context
            .declare(&token, "x", Value::Number(2.0), false)
            .await
            .unwrap();
        context
            .push_error(&token, Diagnostic::runtime("boom"))
            .await
            .unwrap();

        context.clear_errors().await;

        assert!(context.errors().await.is_empty());
        assert_eq!(context.lookup("x").await, Some(Value::Number(2.0)));
    }

    #[tokio::test]
    async fn test_assign_rules() {
        let context = ExecutionContext::new();
        let token = context.begin_run().await;
        context
            .declare(&token, "x", Value::Number(1.0), true)
            .await
            .unwrap();
        context
            .declare(&token, "c", Value::Number(1.0), false)
            .await
            .unwrap();

        context.assign(&token, "x", Value::Number(5.0)).await.unwrap();
        assert_eq!(context.lookup("x").await, Some(Value::Number(5.0)));

        assert_eq!(
            context.assign(&token, "c", Value::Number(5.0)).await,
            Err(ContextError::ConstantAssignment("c".to_string()))
        );
        assert_eq!(
            context.assign(&token, "y", Value::Number(5.0)).await,
            Err(ContextError::NotDeclared("y".to_string()))
        );
        assert_eq!(
            context.declare(&token, "x", Value::Null, true).await,
            Err(ContextError::AlreadyDeclared("x".to_string()))
        );
    }

    #[tokio::test]
    async fn test_end_run_only_releases_own_token() {
        let context = ExecutionContext::new();
        let first = context.begin_run().await;
        let second = context.begin_run().await;

        context.end_run(&first).await;
        assert_eq!(context.active_run().await, Some(second.id()));

        context.end_run(&second).await;
        assert!(context.active_run().await.is_none());
    }

    #[tokio::test]
    async fn test_finish_run_snapshots_errors_and_releases() {
        let context = ExecutionContext::new();
        let token = context.begin_run().await;
        context
            .push_error(&token, Diagnostic::runtime("boom"))
            .await
            .unwrap();

        let errors = context.finish_run(&token).await.unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "boom");
        assert!(context.active_run().await.is_none());

        assert!(context.finish_run(&token).await.is_none());
    }

    #[tokio::test]
    async fn test_finish_run_refuses_superseded_token() {
        let context = ExecutionContext::new();
        let first = context.begin_run().await;
        let second = context.begin_run().await;

        assert!(context.finish_run(&first).await.is_none());
        assert_eq!(context.active_run().await, Some(second.id()));
    }

    #[tokio::test]
    async fn test_finish_run_releases_cancelled_token_without_snapshot() {
        let context = ExecutionContext::new();
        let token = context.begin_run().await;
        token.cancel();

        assert!(context.finish_run(&token).await.is_none());
        assert!(context.active_run().await.is_none());
    }
}
