//! # Workspace
//!
//! The UI-facing state the evaluation core reads from and projects into: the
//! editor buffer, the REPL input, the REPL output history, the context handle and
//! whether an evaluation is running.
//!
//! Triggers carry no payload. The dispatcher pulls code and context from the
//! workspace at the moment a trigger is handled, and the [`OutputProjector`]
//! applies terminal events back onto it.

use std::{collections::VecDeque, pin::Pin, sync::Arc};

use futures::{stream::SelectAll, Stream};
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    eval::{
        context::{ContextHandle, ExecutionContext},
        diagnostic::Diagnostic,
    },
    event::event_bus::{Event, EventBus, EventType},
    interpreter::Value,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum OutputEntry {
    /// Echo of submitted REPL input.
    Code(String),
    Result(Value),
    Errors(Vec<Diagnostic>),
}

/// REPL output, oldest first. With a limit set the oldest entries are dropped.
#[derive(Debug, Clone, Default)]
pub struct OutputHistory {
    entries: VecDeque<OutputEntry>,
    limit: Option<usize>,
}

impl OutputHistory {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            entries: VecDeque::new(),
            limit,
        }
    }

    pub fn push(&mut self, entry: OutputEntry) {
        self.entries.push_back(entry);
        if let Some(limit) = self.limit {
            while self.entries.len() > limit {
                self.entries.pop_front();
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&OutputEntry> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutputEntry> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<OutputEntry> {
        self.entries.iter().cloned().collect()
    }
}

#[derive(Debug)]
pub struct Workspace {
    editor_value: String,
    repl_value: String,
    output: OutputHistory,
    context: Option<ContextHandle>,
    running_request: Option<Uuid>,
}

pub type SharedWorkspace = Arc<RwLock<Workspace>>;

impl Default for Workspace {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Workspace {
    /// A workspace with a fresh context attached.
    pub fn new(output_limit: Option<usize>) -> Self {
        let mut workspace = Self::detached(output_limit);
        workspace.context = Some(ExecutionContext::handle());
        workspace
    }

    /// A workspace without a context; evaluation triggers are ignored until one is attached.
    pub fn detached(output_limit: Option<usize>) -> Self {
        Self {
            editor_value: String::new(),
            repl_value: String::new(),
            output: OutputHistory::new(output_limit),
            context: None,
            running_request: None,
        }
    }

    pub fn shared(self) -> SharedWorkspace {
        Arc::new(RwLock::new(self))
    }

    pub fn editor_value(&self) -> &str {
        &self.editor_value
    }

    pub fn set_editor_value(&mut self, value: impl Into<String>) {
        self.editor_value = value.into();
    }

    pub fn repl_value(&self) -> &str {
        &self.repl_value
    }

    pub fn set_repl_value(&mut self, value: impl Into<String>) {
        self.repl_value = value.into();
    }

    /// Returns the REPL input and leaves the buffer empty.
    pub fn take_repl_value(&mut self) -> String {
        std::mem::take(&mut self.repl_value)
    }

    pub fn output(&self) -> &OutputHistory {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut OutputHistory {
        &mut self.output
    }

    pub fn context(&self) -> Option<ContextHandle> {
        self.context.clone()
    }

    pub fn attach(&mut self, context: ContextHandle) -> Option<ContextHandle> {
        self.context.replace(context)
    }

    pub fn detach(&mut self) -> Option<ContextHandle> {
        self.context.take()
    }

    pub fn is_running(&self) -> bool {
        self.running_request.is_some()
    }

    pub fn running_request(&self) -> Option<Uuid> {
        self.running_request
    }

    pub fn mark_running(&mut self, request_id: Uuid) {
        self.running_request = Some(request_id);
    }

    pub fn mark_idle(&mut self) {
        self.running_request = None;
    }

    /// Clears the running flag if `request_id` is the evaluation it refers to.
    pub fn finish(&mut self, request_id: Uuid) -> bool {
        if self.running_request == Some(request_id) {
            self.running_request = None;
            true
        } else {
            false
        }
    }
}

#[derive(Debug)]
enum StreamMessage {
    Event(Event),
    Lagged(u64),
    Shutdown,
}

/// Applies terminal evaluation events to the workspace.
pub struct OutputProjector {
    workspace: SharedWorkspace,
    event_rx: broadcast::Receiver<Event>,
}

impl OutputProjector {
    /// Subscribes immediately; events published after this call are applied once
    /// [`OutputProjector::run`] is polled.
    pub fn new(workspace: SharedWorkspace, event_bus: &EventBus) -> Self {
        Self {
            workspace,
            event_rx: event_bus.subscribe().receiver,
        }
    }

    pub async fn apply(&self, event: &Event) {
        apply_event(&self.workspace, event).await;
    }

    pub async fn run(self, shutdown_rx: broadcast::Receiver<()>) {
        let OutputProjector {
            workspace,
            event_rx,
        } = self;
        let event_stream = BroadcastStream::new(event_rx).map(|e| match e {
            Ok(event) => StreamMessage::Event(event),
            Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(n)) => {
                StreamMessage::Lagged(n)
            }
        });
        let shutdown_stream = BroadcastStream::new(shutdown_rx).map(|_| StreamMessage::Shutdown);

        let mut streams: SelectAll<Pin<Box<dyn Stream<Item = StreamMessage> + Send>>> =
            SelectAll::new();
        streams.push(Box::pin(event_stream));
        streams.push(Box::pin(shutdown_stream));

        while let Some(message) = streams.next().await {
            match message {
                StreamMessage::Event(event) => {
                    debug!("Projecting event: {}", event.event_type);
                    apply_event(&workspace, &event).await;
                }
                StreamMessage::Lagged(n) => {
                    warn!("Output projector lagged, {} event(s) lost", n);
                }
                StreamMessage::Shutdown => {
                    info!("Output projector received shutdown signal");
                    break;
                }
            }
        }
    }
}

async fn apply_event(workspace: &SharedWorkspace, event: &Event) {
    let entry = match &event.event_type {
        EventType::EvalSuccess { value } => OutputEntry::Result(value.clone()),
        EventType::EvalError { diagnostics } => OutputEntry::Errors(diagnostics.clone()),
        EventType::OutputAppended { .. } | EventType::OutputCleared => return,
    };
    let mut workspace = workspace.write().await;
    workspace.output_mut().push(entry);
    if let Some(request_id) = event.request_id {
        workspace.finish(request_id);
    }
}
