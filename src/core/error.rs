//! Structured errors for route construction and dispatch

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where a traversal was when the timeout supervisor fired.
///
/// `last_stage` is `None` when the first controller never reported progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutInfo {
    pub last_stage: Option<String>,
    pub next_index: usize,
    pub route_size: usize,
}

/// Errors raised while building a route or running a traversal.
///
/// Construction-time errors (`MissingControllerName`, `DuplicatedControllerName`,
/// `DuplicatedSubrouteName`) are returned synchronously by the builder methods.
/// Execution-time errors fail exactly one traversal and never affect other
/// in-flight or queued traversals.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("only named controllers are authorized")]
    MissingControllerName,

    #[error("a controller named {controller} already exists in route {route}")]
    DuplicatedControllerName { controller: String, route: String },

    #[error("a subroute named {subroute} already exists in route {route}")]
    DuplicatedSubrouteName { subroute: String, route: String },

    #[error("route {route} does not contain any controller")]
    InvalidRoute { route: String },

    #[error("jump target {target} not found ahead of the current controller in route {route}")]
    ControllerJumpFailed { target: String, route: String },

    #[error("controller exceeded its time budget without reporting progress (last stage: {:?})", .info.last_stage)]
    Timeout { info: TimeoutInfo },

    /// Arbitrary failure surfaced by a controller body or progress observer,
    /// with the original error preserved as the cause chain.
    #[error(transparent)]
    Controller(anyhow::Error),
}

impl RouteError {
    /// Funnel an arbitrary failure into the structured error type. An
    /// `anyhow::Error` that already holds a `RouteError` is re-surfaced
    /// unchanged instead of being wrapped a second time.
    pub fn wrap(err: anyhow::Error) -> Self {
        match err.downcast::<RouteError>() {
            Ok(native) => native,
            Err(other) => RouteError::Controller(other),
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            RouteError::MissingControllerName => "missingControllerName",
            RouteError::DuplicatedControllerName { .. } => "duplicatedControllerName",
            RouteError::DuplicatedSubrouteName { .. } => "duplicatedSubrouteName",
            RouteError::InvalidRoute { .. } => "invalidRoute",
            RouteError::ControllerJumpFailed { .. } => "controllerJumpFailed",
            RouteError::Timeout { .. } => "timeout",
            RouteError::Controller(_) => "controllerFailed",
        }
    }
}
