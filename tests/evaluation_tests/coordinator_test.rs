use std::{sync::Arc, time::Duration};

use playground::{
    interpreter::SourceInterpreter, DiagnosticKind, EvaluationCoordinator, EvaluationRequest,
    EventBus, EventType, ExecutionContext, InterruptChannel, InterruptReason, TriggerOrigin,
};

use crate::{drain, next_terminal, terminal_for, Call, GatedInterpreter, EVENT_TIMEOUT};

fn setup() -> (Arc<GatedInterpreter>, Arc<EventBus>, EvaluationCoordinator) {
    let interpreter = GatedInterpreter::new();
    let event_bus = Arc::new(EventBus::new(64));
    let coordinator =
        EvaluationCoordinator::new(interpreter.clone(), event_bus.clone(), InterruptChannel::new(8));
    (interpreter, event_bus, coordinator)
}

#[tokio::test]
async fn test_finished_run_publishes_exactly_one_success() {
    let (_, event_bus, coordinator) = setup();
    let mut events = event_bus.subscribe();
    let context = ExecutionContext::handle();

    let request = EvaluationRequest::new("42", context, TriggerOrigin::Editor).await;
    let request_id = request.id();
    coordinator.evaluate(request).await;

    let events = drain(&mut events).await;
    let terminal = terminal_for(&events, request_id);
    assert_eq!(terminal.len(), 1);
    assert_eq!(
        terminal[0].event_type,
        EventType::EvalSuccess {
            value: "42".into()
        }
    );
}

#[tokio::test]
async fn test_failed_run_publishes_context_diagnostics_once() {
    let (_, event_bus, coordinator) = setup();
    let mut events = event_bus.subscribe();
    let context = ExecutionContext::handle();

    let request = EvaluationRequest::new("fail:bad input", context.clone(), TriggerOrigin::Repl).await;
    let request_id = request.id();
    coordinator.evaluate(request).await;

    let events = drain(&mut events).await;
    let terminal = terminal_for(&events, request_id);
    assert_eq!(terminal.len(), 1);
    match &terminal[0].event_type {
        EventType::EvalError { diagnostics } => {
            assert_eq!(diagnostics, &context.errors().await);
            assert_eq!(diagnostics[0].message, "bad input");
        }
        other => panic!("expected error event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_interrupted_run_publishes_nothing() {
    let (interpreter, event_bus, coordinator) = setup();
    let mut events = event_bus.subscribe();
    let interrupts = coordinator.interrupts().clone();

    let request =
        EvaluationRequest::new("block", ExecutionContext::handle(), TriggerOrigin::Editor).await;
    let evaluation = tokio::spawn(coordinator.evaluate(request));
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(interrupts.request(InterruptReason::UserRequested), 1);
    tokio::time::timeout(*EVENT_TIMEOUT, evaluation)
        .await
        .unwrap()
        .unwrap();

    assert!(interpreter.interrupted("block"));
    assert!(drain(&mut events).await.is_empty());
    assert!(coordinator.in_flight().is_empty());
}

#[tokio::test]
async fn test_interrupt_before_evaluate_does_not_reach_new_run() {
    let (interpreter, event_bus, coordinator) = setup();
    let mut events = event_bus.subscribe();

    coordinator
        .interrupts()
        .request(InterruptReason::Superseded(TriggerOrigin::Repl));
    let request =
        EvaluationRequest::new("sleep:10:done", ExecutionContext::handle(), TriggerOrigin::Repl)
            .await;
    coordinator.evaluate(request).await;

    let event = next_terminal(&mut events).await.unwrap();
    assert_eq!(
        event.event_type,
        EventType::EvalSuccess {
            value: "done".into()
        }
    );
    assert_eq!(
        interpreter.calls(),
        vec![Call::Started {
            code: "sleep:10:done".to_string(),
            prior_interrupted: true
        }]
    );
}

#[tokio::test]
async fn test_sequential_runs_each_settle_once() {
    let (_, event_bus, coordinator) = setup();
    let mut events = event_bus.subscribe();
    let context = ExecutionContext::handle();

    let mut request_ids = Vec::new();
    for code in ["1", "fail:x", "2", "fail:y"] {
        context.reset().await;
        let request = EvaluationRequest::new(code, context.clone(), TriggerOrigin::Editor).await;
        request_ids.push(request.id());
        coordinator.evaluate(request).await;
    }

    let events = drain(&mut events).await;
    for request_id in request_ids {
        assert_eq!(terminal_for(&events, request_id).len(), 1);
    }
}

#[tokio::test]
async fn test_deeply_nested_source_publishes_syntax_error() {
    let event_bus = Arc::new(EventBus::new(64));
    let coordinator = EvaluationCoordinator::new(
        Arc::new(SourceInterpreter::default()),
        event_bus.clone(),
        InterruptChannel::new(8),
    );
    let mut events = event_bus.subscribe();

    for code in [
        format!("{}1{}", "(".repeat(5000), ")".repeat(5000)),
        format!("{}true", "!".repeat(5000)),
        format!("{}{}", "{".repeat(5000), "}".repeat(5000)),
    ] {
        let context = ExecutionContext::handle();
        let request = EvaluationRequest::new(code, context.clone(), TriggerOrigin::Editor).await;
        coordinator.evaluate(request).await;

        match next_terminal(&mut events).await.unwrap().event_type {
            EventType::EvalError { diagnostics } => {
                assert_eq!(diagnostics.len(), 1);
                assert_eq!(diagnostics[0].kind, DiagnosticKind::Syntax);
                assert!(diagnostics[0].message.ends_with("nested too deeply."));
            }
            other => panic!("expected error event, got {:?}", other),
        }
        assert!(context.active_run().await.is_none());
    }
}
