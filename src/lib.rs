//! # Playground: evaluation coordination for an editor + REPL workspace
//!
//! The playground lets a user submit code from two entry points, a persistent
//! editor buffer and a transient REPL input, and evaluate it against a shared,
//! mutable [`ExecutionContext`](eval::ExecutionContext). Any evaluation can be
//! interrupted while it is running.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   Trigger    ┌──────────────────┐  EvaluationRequest  ┌─────────────────────┐
//! │ UI / CLI │─────────────▶│ TriggerDispatcher │────────────────────▶│ EvaluationCoordinator│
//! └──────────┘              └────────┬─────────┘                     └──────────┬──────────┘
//!                                    │ interrupt request                        │ race
//!                                    ▼                                          ▼
//!                           ┌──────────────────┐                     ┌─────────────────────┐
//!                           │ InterruptChannel │────────────────────▶│     Interpreter     │
//!                           └──────────────────┘                     └──────────┬──────────┘
//!                                                                               │ outcome
//!                                                                               ▼
//!                                   ┌──────────────┐   EvalSuccess /   ┌─────────────────────┐
//!                                   │ OutputProjector│◀──EvalError─────│ EventBus (publisher)│
//!                                   └──────────────┘                   └─────────────────────┘
//! ```
//!
//! - [`dispatcher`]: turns triggers into explicit evaluation requests, performing the
//!   per-trigger pre-steps (interrupting, resetting, echoing).
//! - [`eval`]: the execution context, request/outcome types and the coordinator that
//!   races a run against interrupt requests.
//! - [`event`]: the broadcast event bus, the result publisher and the interrupt channel.
//! - [`interpreter`]: the interpreter seam and a small built-in language.
//! - [`workspace`]: editor/REPL buffers, output history and the projector applying
//!   results to them.
//! - [`playground`]: wires everything together.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod eval;
pub mod event;
pub mod interpreter;
pub mod playground;
pub mod workspace;

// Re-exports
pub use error::*;
pub use eval::*;
pub use event::*;
