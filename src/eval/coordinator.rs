//! # Evaluation Coordinator
//!
//! Runs one evaluation as a race between the interpreter finishing and an
//! interrupt request arriving.
//!
//! ```text
//!              ┌──────────────────────┐
//!  request ───▶│ subscribe interrupts │  (synchronously, inside `evaluate`)
//!              └──────────┬───────────┘
//!                         ▼
//!        ┌──────────── select! (biased) ────────────┐
//!        │ interrupt received     │ work settled     │
//!        ▼                        ▼                  │
//!  interpreter.interrupt   Finished → publish_success│
//!  (nothing published)     ErrorRaised → publish_error(context.errors)
//!                          Interrupted → absorbed    │
//!        └───────────────────────────────────────────┘
//! ```
//!
//! The losing side of the race is abandoned, not aborted. An interpreter task that
//! lost keeps running until it notices its revoked token; the context refuses its
//! writes in the meantime.

use std::{future::Future, sync::Arc};

use dashmap::DashMap;
use tracing::{debug, instrument, trace, warn, Instrument};
use uuid::Uuid;

use super::{
    diagnostic::Diagnostic,
    request::{EvaluationOutcome, EvaluationRequest, TriggerOrigin},
};
use crate::{
    event::{
        interrupt::{InterruptChannel, InterruptReceiver, InterruptRequest},
        publisher::ResultPublisher,
    },
    interpreter::Interpreter,
};

/// Which side of [`race`] resolved first.
#[derive(Debug)]
pub enum RaceResult<T> {
    Settled(T),
    Interrupted(InterruptRequest),
}

/// Waits for `work` or the next interrupt, whichever is ready first.
///
/// When both are ready on the same poll the interrupt wins.
pub async fn race<F>(work: F, interrupts: &mut InterruptReceiver) -> RaceResult<F::Output>
where
    F: Future,
{
    tokio::select! {
        biased;
        request = interrupts.recv() => RaceResult::Interrupted(request),
        output = work => RaceResult::Settled(output),
    }
}

#[derive(Clone)]
pub struct EvaluationCoordinator {
    interpreter: Arc<dyn Interpreter>,
    publisher: Arc<dyn ResultPublisher>,
    interrupts: InterruptChannel,
    in_flight: Arc<DashMap<Uuid, TriggerOrigin>>,
}

impl EvaluationCoordinator {
    pub fn new(
        interpreter: Arc<dyn Interpreter>,
        publisher: Arc<dyn ResultPublisher>,
        interrupts: InterruptChannel,
    ) -> Self {
        Self {
            interpreter,
            publisher,
            interrupts,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Accepts `request` and returns the future driving it to completion.
    ///
    /// The interrupt subscription is taken here, before the future is polled, so an
    /// interrupt issued any time after this call reaches the race. The outcome is
    /// only ever reported through the publisher.
    pub fn evaluate(&self, request: EvaluationRequest) -> impl Future<Output = ()> + Send + 'static {
        let mut interrupts = self.interrupts.subscribe();
        self.in_flight.insert(request.id(), request.origin());
        trace!("Accepted request {} from {}", request.id(), request.origin());

        let span = tracing::debug_span!(
            "evaluate",
            request_id = %request.id(),
            origin = %request.origin()
        );
        let coordinator = self.clone();
        async move { coordinator.drive(request, &mut interrupts).await }.instrument(span)
    }

    async fn drive(&self, request: EvaluationRequest, interrupts: &mut InterruptReceiver) {
        let interpreter = self.interpreter.clone();
        let work_request = request.clone();
        let work = tokio::spawn(async move { interpreter.run(&work_request).await });

        let result = race(work, interrupts).await;
        self.in_flight.remove(&request.id());

        match result {
            RaceResult::Interrupted(interrupt) => {
                debug!(
                    "Request {} interrupted ({}) before settling",
                    request.id(),
                    interrupt.reason
                );
                self.interpreter.interrupt(&request);
                request.context().end_run(request.token()).await;
            }
            RaceResult::Settled(Ok(outcome)) => self.settle(&request, outcome).await,
            RaceResult::Settled(Err(e)) => {
                warn!("Interpreter task for {} failed: {}", request.id(), e);
                let diagnostic = Diagnostic::internal(format!("Evaluation aborted: {}", e));
                let outcome = match request
                    .context()
                    .push_error(request.token(), diagnostic)
                    .await
                {
                    Ok(()) => EvaluationOutcome::ErrorRaised,
                    Err(_) => EvaluationOutcome::Interrupted,
                };
                self.settle(&request, outcome).await;
            }
        }
    }

    #[instrument(level = "debug", skip(self, request), fields(request_id = %request.id()))]
    async fn settle(&self, request: &EvaluationRequest, outcome: EvaluationOutcome) {
        // A run revoked before settling lost its context to a newer run.
        let diagnostics = match request.context().finish_run(request.token()).await {
            Some(diagnostics) => diagnostics,
            None => {
                debug!("Request {} settled after revocation, absorbed", request.id());
                return;
            }
        };

        match outcome {
            EvaluationOutcome::Finished { value } => {
                debug!("Request {} finished with {}", request.id(), value);
                self.publisher.publish_success(request.id(), value);
            }
            EvaluationOutcome::ErrorRaised => {
                debug!(
                    "Request {} raised {} diagnostic(s)",
                    request.id(),
                    diagnostics.len()
                );
                self.publisher.publish_error(request.id(), diagnostics);
            }
            EvaluationOutcome::Interrupted => {
                debug!("Request {} stopped itself, absorbed", request.id());
            }
        }
    }

    pub fn in_flight(&self) -> Vec<(Uuid, TriggerOrigin)> {
        self.in_flight
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect()
    }

    pub fn is_in_flight(&self, request_id: &Uuid) -> bool {
        self.in_flight.contains_key(request_id)
    }

    pub fn interrupts(&self) -> &InterruptChannel {
        &self.interrupts
    }
}
