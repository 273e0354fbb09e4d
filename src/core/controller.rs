//! Controller domain model: unit bodies, subroutes, verdicts and jump targets

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::core::error::RouteError;
use crate::core::route::Route;

/// Verdict a controller body produces exactly once per invocation.
#[derive(Debug)]
pub enum Flow<V> {
    /// Hand the result to the next controller in order.
    Next(V),
    /// Hand the result to a later controller, skipping the ones in between.
    /// Targets are resolved strictly forward of the current controller.
    Jump(V, ControllerRef),
    /// Short-circuit the traversal with the final result, regardless of
    /// position.
    Done(V),
}

/// Boxed future returned by a controller body.
pub type ControllerFuture<V> =
    Pin<Box<dyn Future<Output = anyhow::Result<Flow<V>>> + Send>>;

/// Type-erased controller body. Arguments are the caller-supplied execution
/// context, the initial request, and the current result (which mirrors the
/// request on the first invocation of a traversal).
pub type ControllerFn<C, V> =
    Arc<dyn Fn(Arc<C>, Arc<V>, V) -> ControllerFuture<V> + Send + Sync>;

static NEXT_CONTROLLER_ID: AtomicU64 = AtomicU64::new(0);

/// Process-unique controller identity, usable as a jump target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControllerId(u64);

impl ControllerId {
    fn next() -> Self {
        ControllerId(NEXT_CONTROLLER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Jump target: a controller referenced by identity or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerRef {
    Name(String),
    Id(ControllerId),
}

impl ControllerRef {
    pub(crate) fn matches<C, V>(&self, controller: &Controller<C, V>) -> bool {
        match self {
            ControllerRef::Name(name) => controller.name() == name,
            ControllerRef::Id(id) => controller.id() == *id,
        }
    }
}

impl fmt::Display for ControllerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerRef::Name(name) => f.write_str(name),
            ControllerRef::Id(id) => write!(f, "#{}", id.0),
        }
    }
}

impl From<&str> for ControllerRef {
    fn from(name: &str) -> Self {
        ControllerRef::Name(name.to_string())
    }
}

impl From<String> for ControllerRef {
    fn from(name: String) -> Self {
        ControllerRef::Name(name)
    }
}

impl<C, V> From<&Controller<C, V>> for ControllerRef {
    fn from(controller: &Controller<C, V>) -> Self {
        ControllerRef::Id(controller.id())
    }
}

pub(crate) enum ControllerKind<C, V> {
    Unit(ControllerFn<C, V>),
    Subroute(Arc<Route<C, V>>),
}

impl<C, V> Clone for ControllerKind<C, V> {
    fn clone(&self) -> Self {
        match self {
            ControllerKind::Unit(body) => ControllerKind::Unit(Arc::clone(body)),
            ControllerKind::Subroute(route) => ControllerKind::Subroute(Arc::clone(route)),
        }
    }
}

/// A single named step of a route: either a unit body or a nested route
/// reused as one step. Clones share the body and keep the same identity.
pub struct Controller<C, V> {
    id: ControllerId,
    name: String,
    kind: ControllerKind<C, V>,
}

impl<C, V> Controller<C, V> {
    /// Create a unit controller from an async body.
    ///
    /// Fails with [`RouteError::MissingControllerName`] when `name` is empty.
    pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Result<Self, RouteError>
    where
        F: Fn(Arc<C>, Arc<V>, V) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Flow<V>>> + Send + 'static,
    {
        let name = name.into();
        if name.is_empty() {
            return Err(RouteError::MissingControllerName);
        }
        let body: ControllerFn<C, V> =
            Arc::new(move |ctx, req, res| Box::pin(body(ctx, req, res)));
        Ok(Self {
            id: ControllerId::next(),
            name,
            kind: ControllerKind::Unit(body),
        })
    }

    /// Wrap a route so it runs as a single step of a parent route. The
    /// controller takes the subroute's name.
    pub(crate) fn subroute(route: Arc<Route<C, V>>) -> Self {
        let name = route.name().to_string();
        Self {
            id: ControllerId::next(),
            name,
            kind: ControllerKind::Subroute(route),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> ControllerId {
        self.id
    }

    pub(crate) fn kind(&self) -> &ControllerKind<C, V> {
        &self.kind
    }

    pub(crate) fn is_subroute(&self) -> bool {
        matches!(self.kind, ControllerKind::Subroute(_))
    }
}

impl<C, V> Clone for Controller<C, V> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            kind: self.kind.clone(),
        }
    }
}

impl<C, V> fmt::Debug for Controller<C, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ControllerKind::Unit(_) => "unit",
            ControllerKind::Subroute(_) => "subroute",
        };
        f.debug_struct("Controller")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &kind)
            .finish()
    }
}
