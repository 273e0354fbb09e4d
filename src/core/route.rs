//! Route domain model and admission control
//!
//! A route owns its controllers, its admission queue, its in-flight counter
//! and its statistics; no other component observes or mutates them. Every
//! dispatch is wrapped as a queued traversal task; the pump starts tasks
//! while capacity allows and re-offers freed capacity as traversals finish.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::info;
use uuid::Uuid;

use crate::core::controller::Controller;
use crate::core::error::RouteError;
use crate::core::stats::RouteStatistics;
use crate::execution::engine::{
    run_traversal, ProgressFn, ProgressObserver, TimeoutHandler, TraversalParams,
};
use crate::execution::queue::AdmissionQueue;

/// A queued traversal, type-erased so the runtime cell stays non-generic.
type QueuedRun = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct RouteRuntime {
    queue: AdmissionQueue<QueuedRun>,
    in_flight: usize,
    max_parallel: Option<usize>,
    stats: RouteStatistics,
    baseline: RouteStatistics,
}

/// Shared handle to one route's runtime bookkeeping. Mutations happen in
/// short critical sections between suspension points; nothing is held across
/// an await.
#[derive(Clone)]
pub(crate) struct Runtime(Arc<Mutex<RouteRuntime>>);

impl Runtime {
    fn new() -> Self {
        let stats = RouteStatistics::now();
        Self(Arc::new(Mutex::new(RouteRuntime {
            queue: AdmissionQueue::new(),
            in_flight: 0,
            max_parallel: None,
            baseline: stats.clone(),
            stats,
        })))
    }

    fn lock(&self) -> MutexGuard<'_, RouteRuntime> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enqueue(&self, task: QueuedRun, urgent: bool) {
        let mut rt = self.lock();
        if urgent {
            rt.queue.push_urgent(task);
        } else {
            rt.queue.push(task);
        }
    }

    /// Dequeue and start traversals while in-flight count is below the
    /// effective capacity. Unbounded capacity admits everything currently
    /// queued. Each started traversal frees its slot and re-pumps when it
    /// finishes.
    fn pump(&self) {
        loop {
            let task = {
                let mut rt = self.lock();
                let capacity = match rt.max_parallel {
                    Some(bound) => bound,
                    None => rt.in_flight.saturating_add(rt.queue.len()),
                };
                if rt.in_flight >= capacity {
                    return;
                }
                match rt.queue.pop() {
                    Some(task) => {
                        rt.in_flight += 1;
                        task
                    }
                    None => return,
                }
            };
            let runtime = self.clone();
            tokio::spawn(async move {
                // the guard releases the slot even if the traversal unwinds
                let _slot = SlotGuard(runtime);
                task.await;
            });
        }
    }

    fn set_max_parallel(&self, bound: Option<usize>) {
        self.lock().max_parallel = bound;
        self.pump();
    }

    fn seed_stage(&self, stage: &str) {
        let mut rt = self.lock();
        rt.stats.pending.stages.entry(stage.to_string()).or_insert(0);
        rt.baseline = rt.stats.clone();
    }

    pub(crate) fn traversal_started(&self, first_stage: &str) {
        let mut rt = self.lock();
        rt.stats.pending.total += 1;
        *rt.stats
            .pending
            .stages
            .entry(first_stage.to_string())
            .or_insert(0) += 1;
    }

    pub(crate) fn stage_departed(&self, stage: &str) {
        let mut rt = self.lock();
        if let Some(count) = rt.stats.pending.stages.get_mut(stage) {
            *count -= 1;
        }
    }

    pub(crate) fn stage_arrived(&self, stage: &str) {
        let mut rt = self.lock();
        *rt.stats
            .pending
            .stages
            .entry(stage.to_string())
            .or_insert(0) += 1;
    }

    pub(crate) fn traversal_finished(&self, stage: &str, success: bool) {
        let mut rt = self.lock();
        if let Some(count) = rt.stats.pending.stages.get_mut(stage) {
            *count -= 1;
        }
        rt.stats.pending.total -= 1;
        rt.stats.finished.total += 1;
        if success {
            rt.stats.finished.success += 1;
        } else {
            rt.stats.finished.errors += 1;
        }
    }

    fn snapshot(&self) -> RouteStatistics {
        let rt = self.lock();
        rt.stats.stamped(rt.queue.len() as i64)
    }

    fn baseline(&self) -> RouteStatistics {
        self.lock().baseline.clone()
    }
}

/// Releases one in-flight slot when dropped, so capacity comes back even
/// when the traversal task unwinds.
struct SlotGuard(Runtime);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        {
            let mut rt = self.0.lock();
            rt.in_flight -= 1;
        }
        self.0.pump();
    }
}

/// Per-dispatch options: progress observers, urgent admission, and per-call
/// timeout overrides.
pub struct DispatchOptions<V> {
    observers: Vec<Arc<dyn ProgressObserver<V>>>,
    urgent: bool,
    budget: Option<Duration>,
    on_timeout: Option<TimeoutHandler<V>>,
}

impl<V> Default for DispatchOptions<V> {
    fn default() -> Self {
        Self {
            observers: Vec::new(),
            urgent: false,
            budget: None,
            on_timeout: None,
        }
    }
}

impl<V> DispatchOptions<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a progress observer; may be called repeatedly, observers are
    /// awaited in registration order on every transition.
    pub fn observe(mut self, observer: Arc<dyn ProgressObserver<V>>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Register a synchronous progress closure.
    pub fn on_progress<F>(self, observer: F) -> Self
    where
        V: Send + Sync + 'static,
        F: Fn(&crate::execution::engine::Progress<V>) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.observe(Arc::new(ProgressFn(observer)))
    }

    /// Admit this dispatch ahead of the current queue front.
    pub fn urgent(mut self) -> Self {
        self.urgent = true;
        self
    }

    /// Override the route's per-controller time budget for this dispatch.
    pub fn controller_timeout(mut self, budget: Duration) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Override the route's timeout handler for this dispatch.
    pub fn on_timeout(mut self, handler: TimeoutHandler<V>) -> Self {
        self.on_timeout = Some(handler);
        self
    }
}

/// A named, ordered chain of controllers executed against one request.
///
/// Build with [`Route::new`] and [`Route::add_controller`], then share via
/// `Arc` for nesting and registry lookup. Dispatching requires a tokio
/// runtime; the returned future resolves with the traversal's final result.
pub struct Route<C, V> {
    name: String,
    controllers: Vec<Controller<C, V>>,
    default_budget: Option<Duration>,
    default_on_timeout: Option<TimeoutHandler<V>>,
    runtime: Runtime,
}

impl<C, V> Route<C, V> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            controllers: Vec::new(),
            default_budget: None,
            default_on_timeout: None,
            runtime: Runtime::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a controller. Fails when a controller with the same name is
    /// already present; the controller list is unchanged on failure.
    pub fn add_controller(&mut self, controller: Controller<C, V>) -> Result<&mut Self, RouteError> {
        if self.controllers.iter().any(|c| c.name() == controller.name()) {
            return Err(if controller.is_subroute() {
                RouteError::DuplicatedSubrouteName {
                    subroute: controller.name().to_string(),
                    route: self.name.clone(),
                }
            } else {
                RouteError::DuplicatedControllerName {
                    controller: controller.name().to_string(),
                    route: self.name.clone(),
                }
            });
        }
        self.runtime.seed_stage(controller.name());
        self.controllers.push(controller);
        Ok(self)
    }

    /// Append a nested route as a single step of this route.
    pub fn add_subroute(&mut self, route: Arc<Route<C, V>>) -> Result<&mut Self, RouteError> {
        self.add_controller(Controller::subroute(route))
    }

    /// Bound the number of simultaneously in-flight traversals. `None` means
    /// unbounded. Takes effect immediately and may admit queued work.
    pub fn set_max_parallel(&self, bound: Option<usize>) -> &Self {
        self.runtime.set_max_parallel(bound);
        self
    }

    /// Default per-controller time budget applied to every dispatch, with an
    /// optional handler deciding the error a stuck traversal fails with.
    pub fn set_controller_timeout(
        &mut self,
        budget: Duration,
        handler: Option<TimeoutHandler<V>>,
    ) -> &mut Self {
        self.default_budget = Some(budget);
        self.default_on_timeout = handler;
        self
    }

    /// Snapshot of the live statistics, stamped with the current time and
    /// queue length.
    pub fn statistics(&self) -> RouteStatistics {
        self.runtime.snapshot()
    }

    /// Difference between the current statistics and `baseline`, which
    /// defaults to the snapshot captured at construction / last
    /// `add_controller` time.
    pub fn delta(&self, baseline: Option<&RouteStatistics>) -> RouteStatistics {
        let current = self.statistics();
        match baseline {
            Some(baseline) => current.delta(baseline),
            None => current.delta(&self.runtime.baseline()),
        }
    }
}

impl<C, V> fmt::Debug for Route<C, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.name)
            .field("controllers", &self.controllers)
            .field("default_budget", &self.default_budget)
            .finish_non_exhaustive()
    }
}

impl<C, V> Route<C, V>
where
    C: Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Dispatch a request through this route with default options.
    pub fn dispatch(
        &self,
        req: V,
        ctx: Arc<C>,
    ) -> impl Future<Output = Result<V, RouteError>> + Send + 'static {
        self.dispatch_with(req, ctx, DispatchOptions::default())
    }

    /// Dispatch a request through this route.
    ///
    /// The traversal is enqueued (and, capacity permitting, started) before
    /// this returns; the returned future resolves when the traversal
    /// finishes. Must be called within a tokio runtime.
    pub fn dispatch_with(
        &self,
        req: V,
        ctx: Arc<C>,
        options: DispatchOptions<V>,
    ) -> impl Future<Output = Result<V, RouteError>> + Send + 'static {
        let dispatch_id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();

        if self.controllers.is_empty() {
            let _ = tx.send(Err(RouteError::InvalidRoute {
                route: self.name.clone(),
            }));
        } else {
            let params = TraversalParams {
                route_name: self.name.clone(),
                controllers: self.controllers.clone(),
                runtime: self.runtime.clone(),
                req: Arc::new(req),
                ctx,
                observers: options.observers,
                budget: options.budget.or(self.default_budget),
                on_timeout: options.on_timeout.or_else(|| self.default_on_timeout.clone()),
                dispatch_id,
            };
            info!(
                dispatch = %dispatch_id,
                route = %self.name,
                urgent = options.urgent,
                "traversal admitted"
            );
            let task: QueuedRun = Box::pin(async move {
                let outcome = run_traversal(params).await;
                let _ = tx.send(outcome);
            });
            self.runtime.enqueue(task, options.urgent);
            self.runtime.pump();
        }

        async move {
            match rx.await {
                Ok(outcome) => outcome,
                // the traversal task was dropped mid-flight (e.g. a panic in
                // an observer); surface it as a controller failure
                Err(_) => Err(RouteError::Controller(anyhow::anyhow!(
                    "traversal aborted before completion"
                ))),
            }
        }
    }
}
