use std::sync::Arc;

use futures::future::join_all;
use tokio::{
    sync::{broadcast, mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info};

use crate::{
    config::PlaygroundConfig,
    dispatcher::{trigger_channel, Trigger, TriggerDispatcher, TriggerSender},
    error::{PlaygroundError, PlaygroundResult},
    eval::coordinator::EvaluationCoordinator,
    event::{
        event_bus::{EventBus, EventReceiver},
        interrupt::InterruptChannel,
    },
    interpreter::{Interpreter, SourceInterpreter},
    workspace::{OutputProjector, SharedWorkspace, Workspace},
};

/// Wires the event bus, interrupt channel, coordinator, dispatcher and output
/// projector around one shared workspace.
pub struct Playground {
    config: PlaygroundConfig,
    event_bus: Arc<EventBus>,
    interrupts: InterruptChannel,
    workspace: SharedWorkspace,
    dispatcher: Arc<TriggerDispatcher>,
    trigger_tx: TriggerSender,
    trigger_rx: Mutex<Option<mpsc::Receiver<Trigger>>>,
    projector: Mutex<Option<OutputProjector>>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Playground {
    pub fn new(config: PlaygroundConfig, interpreter: Arc<dyn Interpreter>) -> PlaygroundResult<Self> {
        config.validate()?;

        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        let interrupts = InterruptChannel::new(config.interrupt_buffer_size);
        let workspace = Workspace::new(config.output_history_limit).shared();
        let coordinator =
            EvaluationCoordinator::new(interpreter, event_bus.clone(), interrupts.clone());
        let dispatcher = Arc::new(TriggerDispatcher::new(
            workspace.clone(),
            coordinator,
            event_bus.clone(),
        ));
        let projector = OutputProjector::new(workspace.clone(), &event_bus);
        let (trigger_tx, trigger_rx) = trigger_channel(config.trigger_buffer_size);
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            event_bus,
            interrupts,
            workspace,
            dispatcher,
            trigger_tx,
            trigger_rx: Mutex::new(Some(trigger_rx)),
            projector: Mutex::new(Some(projector)),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// A playground evaluating code with the built-in [`SourceInterpreter`].
    pub fn with_source_interpreter(config: PlaygroundConfig) -> PlaygroundResult<Self> {
        let interpreter = Arc::new(SourceInterpreter::new(config.interpreter.clone()));
        Self::new(config, interpreter)
    }

    /// Spawns the dispatcher loop and the output projector. Can be called once.
    pub async fn start(&self) -> PlaygroundResult<()> {
        let trigger_rx = self
            .trigger_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| PlaygroundError::internal("Playground already started"))?;
        let projector = self
            .projector
            .lock()
            .await
            .take()
            .ok_or_else(|| PlaygroundError::internal("Playground already started"))?;

        let dispatcher = self.dispatcher.clone();
        let dispatcher_shutdown = self.shutdown_tx.subscribe();
        let dispatcher_task =
            tokio::spawn(async move { dispatcher.run(trigger_rx, dispatcher_shutdown).await });
        let projector_task = tokio::spawn(projector.run(self.shutdown_tx.subscribe()));

        self.tasks
            .lock()
            .await
            .extend([dispatcher_task, projector_task]);
        info!("Playground started");
        Ok(())
    }

    /// Signals shutdown and waits for the background loops, bounded by the
    /// configured shutdown timeout. Evaluations still running are interrupted.
    pub async fn shutdown(&self) -> PlaygroundResult<()> {
        if self.shutdown_tx.send(()).is_err() {
            debug!("Shutdown signalled with no running loops");
        }
        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        tokio::time::timeout(self.config.shutdown_timeout, join_all(tasks))
            .await
            .map_err(|_| {
                PlaygroundError::internal(format!(
                    "Shutdown did not finish within {:?}",
                    self.config.shutdown_timeout
                ))
            })?;
        info!("Playground stopped");
        Ok(())
    }

    pub fn triggers(&self) -> TriggerSender {
        self.trigger_tx.clone()
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.event_bus.clone()
    }

    pub fn workspace(&self) -> &SharedWorkspace {
        &self.workspace
    }

    pub fn dispatcher(&self) -> &Arc<TriggerDispatcher> {
        &self.dispatcher
    }

    pub fn interrupts(&self) -> &InterruptChannel {
        &self.interrupts
    }

    pub fn config(&self) -> &PlaygroundConfig {
        &self.config
    }
}
