//! Core of the process lifecycle system.
//!
//! Holds the declarative state table, the transition engine that applies it
//! to persisted processes, the handlers for deferred background work and
//! the builder that assembles everything from configuration.

pub mod builder;
pub mod engine;
pub mod handlers;
pub mod state;

pub use builder::{BuilderError, LifecycleBuilder, LifecycleFactories};
pub use engine::event_bus::EventBus;
pub use engine::lifecycle::Lifecycle;
pub use engine::runner::TaskRunner;
pub use engine::{TransitionEngine, TransitionError, TransitionOutcome};
pub use handlers::{HandlerError, JobHandlers, RetryPolicy};
pub use state::{DependencyGate, GateStatus, StateMachine, StateTable};
