mod evaluation_tests;

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use lazy_static::lazy_static;
use playground::{
    interpreter::{Interpreter, Value},
    Diagnostic, Event, EvaluationOutcome, EvaluationRequest, EventError, EventReceiver,
};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use uuid::Uuid;

#[ctor::ctor]
fn init_tests() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

const EVENT_TIMEOUT_MS: &str = "PLAYGROUND_TEST_TIMEOUT_MS";

lazy_static! {
    /// How long a test waits for an event it expects.
    pub static ref EVENT_TIMEOUT: Duration = {
        let millis = std::env::var(EVENT_TIMEOUT_MS)
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(2000);
        Duration::from_millis(millis)
    };
}

/// How long a test waits to be confident an event is *not* coming.
pub const QUIET_PERIOD: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    /// `run` started; `prior_interrupted` tells whether every earlier run had
    /// already been revoked at that moment.
    Started {
        code: String,
        prior_interrupted: bool,
    },
    Interrupted {
        code: String,
    },
}

/// Scripted interpreter keyed on the submitted code.
///
/// - `block` runs until its token is revoked
/// - `fail:<message>` pushes a runtime diagnostic and raises
/// - `sleep:<ms>:<value>` waits, then finishes with `<value>`
/// - anything else finishes immediately with the code as a string
#[derive(Default)]
pub struct GatedInterpreter {
    calls: Mutex<Vec<Call>>,
    started: Mutex<Vec<EvaluationRequest>>,
}

impl GatedInterpreter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn interrupted(&self, code: &str) -> bool {
        self.calls().contains(&Call::Interrupted {
            code: code.to_string(),
        })
    }

    /// Polls until `code` has been interrupted through the interpreter.
    pub async fn wait_interrupted(&self, code: &str) -> bool {
        tokio::time::timeout(*EVENT_TIMEOUT, async {
            while !self.interrupted(code) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .is_ok()
    }
}

#[async_trait]
impl Interpreter for GatedInterpreter {
    async fn run(&self, request: &EvaluationRequest) -> EvaluationOutcome {
        {
            let mut started = self.started.lock().unwrap();
            let prior_interrupted = started.iter().all(|prior| prior.is_interrupted());
            started.push(request.clone());
            self.calls.lock().unwrap().push(Call::Started {
                code: request.code().to_string(),
                prior_interrupted,
            });
        }

        let code = request.code();
        if code == "block" {
            while !request.is_interrupted() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            return EvaluationOutcome::Interrupted;
        }
        if let Some(message) = code.strip_prefix("fail:") {
            let pushed = request
                .context()
                .push_error(request.token(), Diagnostic::runtime(message))
                .await;
            return match pushed {
                Ok(()) => EvaluationOutcome::ErrorRaised,
                Err(_) => EvaluationOutcome::Interrupted,
            };
        }
        if let Some(rest) = code.strip_prefix("sleep:") {
            let (millis, value) = rest.split_once(':').unwrap_or((rest, ""));
            let millis = millis.parse().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(millis)).await;
            return EvaluationOutcome::finished(Value::from(value));
        }
        EvaluationOutcome::finished(Value::from(code))
    }

    fn interrupt(&self, request: &EvaluationRequest) {
        self.calls.lock().unwrap().push(Call::Interrupted {
            code: request.code().to_string(),
        });
        request.token().cancel();
    }
}

/// Next event, skipping lag notices. `None` on timeout.
pub async fn next_event(events: &mut EventReceiver, timeout: Duration) -> Option<Event> {
    tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) => return Some(event),
                Err(EventError::Lagged { .. }) => continue,
                Err(_) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// Next success/error event.
pub async fn next_terminal(events: &mut EventReceiver) -> Option<Event> {
    tokio::time::timeout(*EVENT_TIMEOUT, async {
        loop {
            match next_event(events, *EVENT_TIMEOUT).await {
                Some(event) if event.is_terminal() => return Some(event),
                Some(_) => continue,
                None => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// Everything published until the bus stays quiet for [`QUIET_PERIOD`].
pub async fn drain(events: &mut EventReceiver) -> Vec<Event> {
    let mut drained = Vec::new();
    while let Some(event) = next_event(events, QUIET_PERIOD).await {
        drained.push(event);
    }
    drained
}

pub fn terminal_for(events: &[Event], request_id: Uuid) -> Vec<&Event> {
    events
        .iter()
        .filter(|event| event.is_terminal() && event.request_id == Some(request_id))
        .collect()
}
