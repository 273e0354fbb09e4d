//! midway - middleware-pipeline dispatcher
//!
//! Named routes hold an ordered chain of controllers; dispatching a request
//! walks the chain, with forward jumps, nested subroutes, per-route
//! admission control and per-controller timeout supervision.

pub mod core;
pub mod execution;
pub mod router;

// Re-export commonly used types
pub use crate::core::controller::{Controller, ControllerFn, ControllerId, ControllerRef, Flow};
pub use crate::core::error::{RouteError, TimeoutInfo};
pub use crate::core::route::{DispatchOptions, Route};
pub use crate::core::stats::{FinishedCounts, PendingCounts, RouteStatistics};
pub use crate::execution::engine::{Progress, ProgressFn, ProgressObserver, TimeoutHandler};
pub use crate::execution::queue::AdmissionQueue;
pub use crate::router::Router;
