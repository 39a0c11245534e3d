use std::sync::Arc;

use playground::{
    dispatcher::{DispatchError, TriggerDispatcher},
    workspace::{OutputEntry, Workspace},
    EvaluationCoordinator, EventBus, EventType, InterruptChannel, TriggerOrigin,
};
use pretty_assertions::assert_eq;

use crate::{drain, next_terminal, terminal_for, Call, GatedInterpreter};

struct Harness {
    interpreter: Arc<GatedInterpreter>,
    event_bus: Arc<EventBus>,
    dispatcher: TriggerDispatcher,
}

fn harness(workspace: Workspace) -> Harness {
    let interpreter = GatedInterpreter::new();
    let event_bus = Arc::new(EventBus::new(64));
    let coordinator = EvaluationCoordinator::new(
        interpreter.clone(),
        event_bus.clone(),
        InterruptChannel::new(8),
    );
    let dispatcher = TriggerDispatcher::new(workspace.shared(), coordinator, event_bus.clone());
    Harness {
        interpreter,
        event_bus,
        dispatcher,
    }
}

async fn set_editor(harness: &Harness, code: &str) {
    harness
        .dispatcher
        .workspace()
        .write()
        .await
        .set_editor_value(code);
}

async fn set_repl(harness: &Harness, code: &str) {
    harness
        .dispatcher
        .workspace()
        .write()
        .await
        .set_repl_value(code);
}

#[tokio::test]
async fn test_editor_trigger_supersedes_running_evaluation() {
    let harness = harness(Workspace::new(None));
    let mut events = harness.event_bus.subscribe();

    set_editor(&harness, "block").await;
    let first = harness.dispatcher.eval_editor().await.unwrap();
    set_editor(&harness, "second").await;
    let second = harness.dispatcher.eval_editor().await.unwrap();

    assert!(harness.interpreter.wait_interrupted("block").await);
    first.wait().await.unwrap();
    let second_id = second.request_id();
    second.wait().await.unwrap();

    assert_eq!(
        harness.interpreter.calls()[1],
        Call::Started {
            code: "second".to_string(),
            prior_interrupted: true
        }
    );

    let events = drain(&mut events).await;
    let terminal: Vec<_> = events.iter().filter(|event| event.is_terminal()).collect();
    assert_eq!(terminal.len(), 1);
    assert_eq!(terminal[0].request_id, Some(second_id));
}

#[tokio::test]
async fn test_repl_trigger_echoes_input_before_result() {
    let harness = harness(Workspace::new(None));
    let mut events = harness.event_bus.subscribe();

    set_repl(&harness, "1+1").await;
    let handle = harness.dispatcher.eval_repl().await.unwrap();
    assert_eq!(handle.origin(), TriggerOrigin::Repl);
    handle.wait().await.unwrap();

    let events = drain(&mut events).await;
    let kinds: Vec<_> = events.iter().map(|event| event.event_type.clone()).collect();
    assert_eq!(
        kinds,
        vec![
            EventType::OutputAppended {
                entry: OutputEntry::Code("1+1".to_string())
            },
            EventType::EvalSuccess {
                value: "1+1".into()
            },
        ]
    );

    let workspace = harness.dispatcher.workspace().read().await;
    assert_eq!(workspace.repl_value(), "");
    assert_eq!(
        workspace.output().to_vec(),
        vec![OutputEntry::Code("1+1".to_string())]
    );
}

#[tokio::test]
async fn test_editor_run_starts_from_clean_diagnostics() {
    let harness = harness(Workspace::new(None));
    let mut events = harness.event_bus.subscribe();

    set_editor(&harness, "fail:first").await;
    harness.dispatcher.eval_editor().await.unwrap().wait().await.unwrap();
    let failed = next_terminal(&mut events).await.unwrap();
    assert!(matches!(failed.event_type, EventType::EvalError { .. }));

    set_editor(&harness, "ok").await;
    harness.dispatcher.eval_editor().await.unwrap().wait().await.unwrap();
    let succeeded = next_terminal(&mut events).await.unwrap();
    assert_eq!(
        succeeded.event_type,
        EventType::EvalSuccess { value: "ok".into() }
    );

    let context = harness.dispatcher.workspace().read().await.context().unwrap();
    assert!(context.errors().await.is_empty());
}

#[tokio::test]
async fn test_repl_runs_accumulate_diagnostics() {
    let harness = harness(Workspace::new(None));
    let mut events = harness.event_bus.subscribe();

    for message in ["first", "second"] {
        set_repl(&harness, &format!("fail:{}", message)).await;
        harness.dispatcher.eval_repl().await.unwrap().wait().await.unwrap();
    }

    let events = drain(&mut events).await;
    let errors: Vec<_> = events
        .iter()
        .filter_map(|event| match &event.event_type {
            EventType::EvalError { diagnostics } => Some(diagnostics.len()),
            _ => None,
        })
        .collect();
    assert_eq!(errors, vec![1, 2]);
}

#[tokio::test]
async fn test_interrupt_while_idle_changes_nothing() {
    let harness = harness(Workspace::new(None));
    let mut events = harness.event_bus.subscribe();

    harness.dispatcher.interrupt_execution().await;

    assert!(drain(&mut events).await.is_empty());
    assert!(harness.interpreter.calls().is_empty());
    assert!(!harness.dispatcher.workspace().read().await.is_running());
}

#[tokio::test]
async fn test_interrupt_stops_running_evaluation() {
    let harness = harness(Workspace::new(None));
    let mut events = harness.event_bus.subscribe();

    set_editor(&harness, "block").await;
    let handle = harness.dispatcher.eval_editor().await.unwrap();
    let request_id = handle.request_id();
    assert!(harness.dispatcher.workspace().read().await.is_running());

    harness.dispatcher.interrupt_execution().await;
    handle.wait().await.unwrap();

    assert!(harness.interpreter.interrupted("block"));
    assert!(!harness.dispatcher.workspace().read().await.is_running());
    assert!(terminal_for(&drain(&mut events).await, request_id).is_empty());
}

#[tokio::test]
async fn test_trigger_without_context_is_rejected() {
    let harness = harness(Workspace::detached(None));
    let mut events = harness.event_bus.subscribe();

    set_editor(&harness, "1").await;
    let result = harness.dispatcher.eval_editor().await;

    assert!(matches!(
        result,
        Err(DispatchError::MissingContext {
            origin: TriggerOrigin::Editor
        })
    ));
    assert!(drain(&mut events).await.is_empty());
    assert!(harness.interpreter.calls().is_empty());
}
