//! # Event-Driven Plumbing
//!
//! Everything the evaluation core sends or listens to goes through this module.
//!
//! - **EventBus**: broadcast hub for results and output notifications
//! - **ResultPublisher**: the success/error seam the coordinator publishes through
//! - **InterruptChannel**: broadcast of interrupt requests to racing evaluations
//!
//! ## Event Flow
//!
//! ```text
//! ┌───────────┐ publish_success / publish_error ┌──────────┐     ┌────────────────┐
//! │Coordinator│────────────────────────────────▶│ EventBus │────▶│OutputProjector │
//! └─────▲─────┘                                 └────┬─────┘     └────────────────┘
//!       │ interrupt request                          │
//! ┌─────┴──────────┐                                 ▼
//! │InterruptChannel│◀── dispatcher / stop      ┌──────────┐
//! └────────────────┘                           │   CLI    │
//!                                              └──────────┘
//! ```
//!
//! ### Subscribing to Results
//!
//! ```rust,no_run
//! # use playground::event::event_bus::{EventBus, EventType};
//! # fn example() {
//! let event_bus = EventBus::new(16);
//! let mut event_rx = event_bus.subscribe();
//!
//! tokio::spawn(async move {
//!     while let Ok(event) = event_rx.recv().await {
//!         match event.event_type {
//!             EventType::EvalSuccess { value } => println!("{}", value),
//!             EventType::EvalError { diagnostics } => {
//!                 for diagnostic in diagnostics {
//!                     eprintln!("{}", diagnostic);
//!                 }
//!             }
//!             _ => {}
//!         }
//!     }
//! });
//! # }
//! ```

pub mod event_bus;
pub mod interrupt;
pub mod publisher;

pub use event_bus::{Event, EventBus, EventError, EventReceiver, EventResult, EventType};
pub use interrupt::{InterruptChannel, InterruptReason, InterruptReceiver, InterruptRequest};
pub use publisher::ResultPublisher;
