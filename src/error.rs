use thiserror::Error;

use crate::config::ConfigError;
use crate::dispatcher::DispatchError;
use crate::eval::context::ContextError;
use crate::event::event_bus::EventError;
use crate::interpreter::InterpreterError;

#[derive(Error, Debug)]
pub enum PlaygroundError {
    #[error("Event error: {0}")]
    Event(#[from] EventError),
    #[error("Context error: {0}")]
    Context(#[from] ContextError),
    #[error("Interpreter error: {0}")]
    Interpreter(#[from] InterpreterError),
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type PlaygroundResult<T> = Result<T, PlaygroundError>;

impl PlaygroundError {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        PlaygroundError::Internal(message.into())
    }
}
