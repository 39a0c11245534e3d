//! # Evaluation Core
//!
//! Owns the lifecycle of a single evaluation: the request snapshot, the context it
//! runs against, the diagnostics it produces and the race deciding how it ends.

pub mod context;
pub mod coordinator;
pub mod diagnostic;
pub mod request;

pub use context::{ContextError, ContextHandle, ContextResult, ExecutionContext, RunToken};
pub use coordinator::{race, EvaluationCoordinator, RaceResult};
pub use diagnostic::{Diagnostic, DiagnosticKind, Location, Severity};
pub use request::{EvaluationOutcome, EvaluationRequest, TriggerOrigin};
