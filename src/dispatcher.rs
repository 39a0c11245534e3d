//! # Trigger Dispatcher
//!
//! Turns payload-free triggers into explicit [`EvaluationRequest`]s.
//!
//! Each evaluation trigger follows the same shape: snapshot code and context from
//! the workspace, issue an interrupt, run the origin's pre-steps, then hand the
//! request to the coordinator. The interrupt always goes out before the new request
//! exists, so it can only ever reach evaluations that were already racing.
//!
//! | Trigger              | Pre-steps                                            |
//! |----------------------|------------------------------------------------------|
//! | `EvalEditor`         | reset the context, clear the output history          |
//! | `EvalRepl`           | clear the REPL input, echo it into the output history |
//! | `InterruptExecution` | none; interrupts and marks the workspace idle        |
//! | `ClearOutput`        | none; clears the output history                      |

use std::sync::Arc;

use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    eval::{
        context::ContextHandle,
        coordinator::EvaluationCoordinator,
        request::{EvaluationRequest, TriggerOrigin},
    },
    event::{
        event_bus::{Event, EventBus, EventType},
        interrupt::{InterruptChannel, InterruptReason},
    },
    workspace::{OutputEntry, SharedWorkspace},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
pub enum Trigger {
    EvalEditor,
    EvalRepl,
    InterruptExecution,
    ClearOutput,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("No context attached for {origin} evaluation")]
    MissingContext { origin: TriggerOrigin },

    #[error("Trigger channel closed")]
    ChannelClosed,

    #[error("Evaluation task failed: {0}")]
    TaskFailed(String),
}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// Cloneable front end of the trigger channel.
#[derive(Clone)]
pub struct TriggerSender {
    sender: mpsc::Sender<Trigger>,
}

impl TriggerSender {
    pub async fn send(&self, trigger: Trigger) -> DispatchResult<()> {
        self.sender
            .send(trigger)
            .await
            .map_err(|_| DispatchError::ChannelClosed)
    }

    pub async fn eval_editor(&self) -> DispatchResult<()> {
        self.send(Trigger::EvalEditor).await
    }

    pub async fn eval_repl(&self) -> DispatchResult<()> {
        self.send(Trigger::EvalRepl).await
    }

    pub async fn interrupt(&self) -> DispatchResult<()> {
        self.send(Trigger::InterruptExecution).await
    }

    pub async fn clear_output(&self) -> DispatchResult<()> {
        self.send(Trigger::ClearOutput).await
    }
}

pub fn trigger_channel(capacity: usize) -> (TriggerSender, mpsc::Receiver<Trigger>) {
    let (sender, receiver) = mpsc::channel(capacity);
    (TriggerSender { sender }, receiver)
}

/// A started evaluation. Dropping the handle does not stop it.
#[derive(Debug)]
pub struct EvaluationHandle {
    request_id: Uuid,
    origin: TriggerOrigin,
    task: JoinHandle<()>,
}

impl EvaluationHandle {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn origin(&self) -> TriggerOrigin {
        self.origin
    }

    /// Waits until the coordinator has resolved the race for this request.
    pub async fn wait(self) -> DispatchResult<()> {
        self.task
            .await
            .map_err(|e| DispatchError::TaskFailed(e.to_string()))
    }
}

pub struct TriggerDispatcher {
    workspace: SharedWorkspace,
    coordinator: EvaluationCoordinator,
    interrupts: InterruptChannel,
    event_bus: Arc<EventBus>,
}

impl TriggerDispatcher {
    pub fn new(
        workspace: SharedWorkspace,
        coordinator: EvaluationCoordinator,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let interrupts = coordinator.interrupts().clone();
        Self {
            workspace,
            coordinator,
            interrupts,
            event_bus,
        }
    }

    pub fn workspace(&self) -> &SharedWorkspace {
        &self.workspace
    }

    pub fn coordinator(&self) -> &EvaluationCoordinator {
        &self.coordinator
    }

    /// Handles one trigger. Evaluation triggers return the handle of the started run.
    #[instrument(level = "debug", skip(self))]
    pub async fn dispatch(&self, trigger: Trigger) -> DispatchResult<Option<EvaluationHandle>> {
        match trigger {
            Trigger::EvalEditor => self.eval_editor().await.map(Some),
            Trigger::EvalRepl => self.eval_repl().await.map(Some),
            Trigger::InterruptExecution => {
                self.interrupt_execution().await;
                Ok(None)
            }
            Trigger::ClearOutput => {
                self.clear_output().await;
                Ok(None)
            }
        }
    }

    pub async fn eval_editor(&self) -> DispatchResult<EvaluationHandle> {
        let origin = TriggerOrigin::Editor;
        let (code, context) = {
            let workspace = self.workspace.read().await;
            let context = workspace
                .context()
                .ok_or(DispatchError::MissingContext { origin })?;
            (workspace.editor_value().to_string(), context)
        };

        self.interrupts.request(InterruptReason::Superseded(origin));

        context.reset().await;
        self.workspace.write().await.output_mut().clear();
        self.notify(Event::new(EventType::OutputCleared));

        Ok(self.start(code, context, origin).await)
    }

    pub async fn eval_repl(&self) -> DispatchResult<EvaluationHandle> {
        let origin = TriggerOrigin::Repl;
        let (code, context) = {
            let workspace = self.workspace.read().await;
            let context = workspace
                .context()
                .ok_or(DispatchError::MissingContext { origin })?;
            (workspace.repl_value().to_string(), context)
        };

        self.interrupts.request(InterruptReason::Superseded(origin));

        let entry = OutputEntry::Code(code.clone());
        {
            let mut workspace = self.workspace.write().await;
            workspace.take_repl_value();
            workspace.output_mut().push(entry.clone());
        }
        self.notify(Event::new(EventType::OutputAppended { entry }));

        Ok(self.start(code, context, origin).await)
    }

    /// Stops whatever is running. With nothing running this changes nothing.
    pub async fn interrupt_execution(&self) {
        let reached = self.interrupts.request(InterruptReason::UserRequested);
        debug!("Stop requested, {} evaluation(s) reached", reached);
        self.workspace.write().await.mark_idle();
    }

    pub async fn clear_output(&self) {
        self.workspace.write().await.output_mut().clear();
        self.notify(Event::new(EventType::OutputCleared));
    }

    async fn start(
        &self,
        code: String,
        context: ContextHandle,
        origin: TriggerOrigin,
    ) -> EvaluationHandle {
        let request = EvaluationRequest::new(code, context, origin).await;
        let request_id = request.id();
        self.workspace.write().await.mark_running(request_id);

        let evaluation = self.coordinator.evaluate(request);
        let task = tokio::spawn(evaluation);
        debug!("Started {} evaluation {}", origin, request_id);

        EvaluationHandle {
            request_id,
            origin,
            task,
        }
    }

    fn notify(&self, event: Event) {
        if let Err(e) = self.event_bus.sync_publish(event) {
            debug!("Notification dropped: {}", e);
        }
    }

    /// Processes triggers one at a time until the channel closes or shutdown is signalled.
    pub async fn run(
        &self,
        mut triggers: mpsc::Receiver<Trigger>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                trigger = triggers.recv() => match trigger {
                    Some(trigger) => {
                        if let Err(e) = self.dispatch(trigger).await {
                            warn!("Trigger {} ignored: {}", trigger, e);
                        }
                    }
                    None => {
                        debug!("Trigger channel closed");
                        break;
                    }
                },
                _ = shutdown_rx.recv() => {
                    info!("Dispatcher received shutdown signal");
                    self.interrupts.request(InterruptReason::Shutdown);
                    break;
                }
            }
        }
    }
}
