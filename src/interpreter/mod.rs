//! # Interpreter
//!
//! The seam between the evaluation core and whatever actually runs code.
//!
//! The core only relies on the [`Interpreter`] trait: `run` settles a request into an
//! [`EvaluationOutcome`] and must have pushed its diagnostics onto the request's
//! context before reporting anything other than `Finished`; `interrupt` asks a run
//! to stop and may be called any number of times.
//!
//! [`SourceInterpreter`] is the built-in implementation, a small expression
//! language with `let`/`const`, `if`/`else`, `while` and the usual operators.

pub mod ast;
pub mod evaluator;
pub mod parser;
pub mod token;
pub mod value;

use async_trait::async_trait;
use thiserror::Error;

use crate::eval::{
    context::ContextError,
    diagnostic::{Diagnostic, Location},
    request::{EvaluationOutcome, EvaluationRequest},
};

pub use evaluator::SourceInterpreter;
pub use value::Value;

#[mockall::automock]
#[async_trait]
pub trait Interpreter: Send + Sync {
    async fn run(&self, request: &EvaluationRequest) -> EvaluationOutcome;

    /// Requests early termination of `request`'s run. Revoking the run token is
    /// enough for interpreters that poll it.
    fn interrupt(&self, request: &EvaluationRequest) {
        request.token().cancel();
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InterpreterError {
    #[error("{message}")]
    Syntax {
        message: String,
        location: Option<Location>,
    },

    #[error("{message}")]
    Runtime {
        message: String,
        location: Option<Location>,
    },

    #[error("{message}")]
    Type {
        message: String,
        location: Option<Location>,
    },

    #[error("Step limit of {limit} exceeded.")]
    StepLimitExceeded {
        limit: u64,
        location: Option<Location>,
    },

    #[error("Evaluation interrupted")]
    Interrupted,

    #[error(transparent)]
    Context(#[from] ContextError),
}

impl InterpreterError {
    /// Converts a context failure raised at `location`. A revoked run is an
    /// interruption, anything else is a runtime error.
    pub fn from_context(error: ContextError, location: Location) -> Self {
        match error {
            ContextError::RunRevoked { .. } => InterpreterError::Interrupted,
            other => InterpreterError::Runtime {
                message: other.to_string(),
                location: Some(location),
            },
        }
    }

    pub fn is_interruption(&self) -> bool {
        matches!(
            self,
            InterpreterError::Interrupted | InterpreterError::Context(ContextError::RunRevoked { .. })
        )
    }

    pub fn location(&self) -> Option<Location> {
        match self {
            InterpreterError::Syntax { location, .. }
            | InterpreterError::Runtime { location, .. }
            | InterpreterError::Type { location, .. }
            | InterpreterError::StepLimitExceeded { location, .. } => *location,
            InterpreterError::Interrupted | InterpreterError::Context(_) => None,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let message = self.to_string();
        let diagnostic = match self {
            InterpreterError::Syntax { .. } => Diagnostic::syntax(message),
            InterpreterError::Type { .. } => Diagnostic::type_error(message),
            InterpreterError::Runtime { .. }
            | InterpreterError::StepLimitExceeded { .. }
            | InterpreterError::Context(_) => Diagnostic::runtime(message),
            InterpreterError::Interrupted => Diagnostic::internal(message),
        };
        match self.location() {
            Some(location) => diagnostic.at(location),
            None => diagnostic,
        }
    }
}
