//! Traversal execution engine

pub mod engine;
pub mod queue;

pub use engine::{Progress, ProgressFn, ProgressObserver, TimeoutHandler};
pub use queue::AdmissionQueue;
