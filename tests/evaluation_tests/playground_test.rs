use std::time::Duration;

use playground::{
    config::PlaygroundConfig,
    interpreter::Value,
    playground::Playground,
    workspace::{OutputEntry, Workspace},
    EventReceiver, EventType,
};
use pretty_assertions::assert_eq;

use crate::{drain, next_terminal, EVENT_TIMEOUT};

async fn started() -> (Playground, EventReceiver) {
    let playground = Playground::with_source_interpreter(PlaygroundConfig::default()).unwrap();
    let events = playground.subscribe();
    playground.start().await.unwrap();
    (playground, events)
}

async fn submit_repl(playground: &Playground, events: &mut EventReceiver, code: &str) -> EventType {
    playground.workspace().write().await.set_repl_value(code);
    playground.triggers().eval_repl().await.unwrap();
    next_terminal(events).await.unwrap().event_type
}

/// Polls the workspace until `check` holds or the event timeout passes.
async fn eventually<F>(playground: &Playground, check: F) -> bool
where
    F: Fn(&Workspace) -> bool,
{
    tokio::time::timeout(*EVENT_TIMEOUT, async {
        loop {
            if check(&*playground.workspace().read().await) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}

#[tokio::test]
async fn test_repl_bindings_persist_between_runs() {
    let (playground, mut events) = started().await;

    assert_eq!(
        submit_repl(&playground, &mut events, "let x = 2").await,
        EventType::EvalSuccess {
            value: Value::Undefined
        }
    );
    assert_eq!(
        submit_repl(&playground, &mut events, "x * 21").await,
        EventType::EvalSuccess {
            value: Value::Number(42.0)
        }
    );

    assert!(eventually(&playground, |workspace| workspace.output().len() == 4).await);
    assert_eq!(
        playground.workspace().read().await.output().to_vec(),
        vec![
            OutputEntry::Code("let x = 2".to_string()),
            OutputEntry::Result(Value::Undefined),
            OutputEntry::Code("x * 21".to_string()),
            OutputEntry::Result(Value::Number(42.0)),
        ]
    );
    assert!(eventually(&playground, |workspace| !workspace.is_running()).await);

    playground.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stop_trigger_interrupts_endless_loop() {
    let (playground, mut events) = started().await;

    playground
        .workspace()
        .write()
        .await
        .set_editor_value("let n = 0\nwhile (true) { n = n + 1 }");
    playground.triggers().eval_editor().await.unwrap();
    assert!(eventually(&playground, |workspace| workspace.is_running()).await);

    playground.triggers().interrupt().await.unwrap();
    assert!(eventually(&playground, |workspace| !workspace.is_running()).await);
    assert!(drain(&mut events)
        .await
        .iter()
        .all(|event| !event.is_terminal()));

    assert_eq!(
        submit_repl(&playground, &mut events, "'still ' + 'alive'").await,
        EventType::EvalSuccess {
            value: "still alive".into()
        }
    );

    playground.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_editor_run_resets_bindings() {
    let (playground, mut events) = started().await;

    submit_repl(&playground, &mut events, "let y = 1").await;

    playground.workspace().write().await.set_editor_value("y + 1");
    playground.triggers().eval_editor().await.unwrap();
    match next_terminal(&mut events).await.unwrap().event_type {
        EventType::EvalError { diagnostics } => {
            assert_eq!(diagnostics.len(), 1);
            assert_eq!(diagnostics[0].message, "Name y not declared.");
        }
        other => panic!("expected error event, got {:?}", other),
    }

    assert!(eventually(&playground, |workspace| {
        workspace.output().last().map(|entry| matches!(entry, OutputEntry::Errors(_)))
            == Some(true)
    })
    .await);

    playground.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_clear_output_empties_history() {
    let (playground, mut events) = started().await;

    submit_repl(&playground, &mut events, "1").await;
    assert!(eventually(&playground, |workspace| workspace.output().len() == 2).await);

    playground.triggers().clear_output().await.unwrap();
    assert!(eventually(&playground, |workspace| workspace.output().is_empty()).await);

    playground.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_interrupts_running_evaluation() {
    let (playground, mut events) = started().await;

    playground
        .workspace()
        .write()
        .await
        .set_editor_value("while (true) {}");
    playground.triggers().eval_editor().await.unwrap();
    assert!(eventually(&playground, |workspace| workspace.is_running()).await);

    playground.shutdown().await.unwrap();

    assert!(drain(&mut events)
        .await
        .iter()
        .all(|event| !event.is_terminal()));
    let context = playground.workspace().read().await.context().unwrap();
    assert!(tokio::time::timeout(*EVENT_TIMEOUT, async {
        while context.active_run().await.is_some() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok());
}
