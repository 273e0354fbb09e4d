//! Traversal engine: drives one admitted dispatch through a route's
//! controllers
//!
//! One traversal is a sequential walk over the controller list. Each body
//! produces a [`Flow`] verdict; `Next` advances by one, `Jump` resolves
//! strictly forward, `Done` short-circuits, and any error funnels into the
//! single failure path. Between bodies the engine updates per-stage pending
//! counters and awaits every progress observer in order.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinError;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::controller::{Controller, ControllerKind, ControllerRef, Flow};
use crate::core::error::{RouteError, TimeoutInfo};
use crate::core::route::Runtime;

/// Progress event emitted on every controller transition, before the next
/// body runs.
#[derive(Debug, Clone)]
pub struct Progress<V> {
    /// Name of the controller that just finished running.
    pub last_stage: String,
    /// Index of the controller about to run.
    pub next_index: usize,
    /// Number of controllers in the route.
    pub route_size: usize,
    /// The request the traversal was dispatched with.
    pub req: Arc<V>,
    /// The result produced by the last controller.
    pub res: V,
}

/// Observer notified on every controller transition of one traversal.
///
/// Observers are awaited in registration order and must all complete before
/// the next controller body runs. An observer error fails the traversal the
/// same way a controller error does.
#[async_trait]
pub trait ProgressObserver<V>: Send + Sync {
    async fn on_progress(&self, progress: &Progress<V>) -> anyhow::Result<()>;
}

/// Adapter turning a synchronous closure into a [`ProgressObserver`].
pub struct ProgressFn<F>(pub F);

#[async_trait]
impl<V, F> ProgressObserver<V> for ProgressFn<F>
where
    V: Send + Sync + 'static,
    F: Fn(&Progress<V>) -> anyhow::Result<()> + Send + Sync,
{
    async fn on_progress(&self, progress: &Progress<V>) -> anyhow::Result<()> {
        (self.0)(progress)
    }
}

/// Invoked when a controller exceeds its time budget without reporting
/// progress; receives the last known progress snapshot and returns the error
/// the traversal fails with.
pub type TimeoutHandler<V> =
    Arc<dyn Fn(Option<&Progress<V>>) -> RouteError + Send + Sync>;

/// Everything one traversal needs, captured at admission time.
pub(crate) struct TraversalParams<C, V> {
    pub route_name: String,
    pub controllers: Vec<Controller<C, V>>,
    pub runtime: Runtime,
    pub req: Arc<V>,
    pub ctx: Arc<C>,
    pub observers: Vec<Arc<dyn ProgressObserver<V>>>,
    pub budget: Option<Duration>,
    pub on_timeout: Option<TimeoutHandler<V>>,
    pub dispatch_id: Uuid,
}

/// Run one traversal to completion and record it in the route statistics.
pub(crate) async fn run_traversal<C, V>(params: TraversalParams<C, V>) -> Result<V, RouteError>
where
    C: Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    let TraversalParams {
        route_name,
        controllers,
        runtime,
        req,
        ctx,
        observers,
        budget,
        on_timeout,
        dispatch_id,
    } = params;

    let size = controllers.len();
    let mut index = 0;
    let mut last_progress: Option<Progress<V>> = None;

    runtime.traversal_started(controllers[0].name());

    // the current result mirrors the request on the first invocation only
    let mut res = (*req).clone();

    let outcome = loop {
        let current = &controllers[index];
        debug!(
            dispatch = %dispatch_id,
            route = %route_name,
            stage = current.name(),
            index,
            "running controller"
        );

        // the body runs on its own task so a panic unwinds that task alone
        // and surfaces as a join error instead of tearing down the traversal
        let mut body = tokio::spawn(invoke(
            current.clone(),
            Arc::clone(&ctx),
            Arc::clone(&req),
            res,
        ));
        let invoked = match budget {
            Some(duration) => match tokio::time::timeout(duration, &mut body).await {
                Ok(joined) => Some(joined),
                Err(_elapsed) => {
                    body.abort();
                    None
                }
            },
            None => Some(body.await),
        };

        let verdict = match invoked {
            None => {
                warn!(
                    dispatch = %dispatch_id,
                    route = %route_name,
                    stage = current.name(),
                    "controller exceeded its time budget"
                );
                break Err(timed_out(&on_timeout, last_progress.as_ref(), size));
            }
            Some(Err(join_err)) => break Err(join_failure("controller", current.name(), join_err)),
            Some(Ok(Err(err))) => break Err(RouteError::wrap(err)),
            Some(Ok(Ok(flow))) => flow,
        };

        // any verdict on the last controller finishes the traversal
        let (value, target) = match verdict {
            Flow::Done(value) => break Ok(value),
            Flow::Next(value) | Flow::Jump(value, _) if index + 1 == size => break Ok(value),
            Flow::Next(value) => (value, None),
            Flow::Jump(value, target) => (value, Some(target)),
        };

        // the departing stage is released before jump resolution; a failed
        // jump leaves per-stage counters drifted until the finish path
        // normalizes the totals
        runtime.stage_departed(current.name());
        let next_index = match target {
            None => index + 1,
            Some(target) => match resolve_jump(&controllers, index, &target) {
                Some(found) => found,
                None => {
                    warn!(
                        dispatch = %dispatch_id,
                        route = %route_name,
                        jump_target = %target,
                        "jump target not found ahead of current controller"
                    );
                    break Err(RouteError::ControllerJumpFailed {
                        target: target.to_string(),
                        route: route_name.clone(),
                    });
                }
            },
        };
        runtime.stage_arrived(controllers[next_index].name());

        let progress = Progress {
            last_stage: current.name().to_string(),
            next_index,
            route_size: size,
            req: Arc::clone(&req),
            res: value.clone(),
        };
        if !observers.is_empty() {
            // observers are supervised the same way as bodies
            match tokio::spawn(notify(observers.clone(), progress.clone())).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => break Err(RouteError::wrap(err)),
                Err(join_err) => {
                    break Err(join_failure("observer after stage", current.name(), join_err))
                }
            }
        }

        last_progress = Some(progress);
        index = next_index;
        res = value;
    };

    runtime.traversal_finished(controllers[index].name(), outcome.is_ok());
    debug!(
        dispatch = %dispatch_id,
        route = %route_name,
        success = outcome.is_ok(),
        "traversal finished"
    );
    outcome
}

/// Run one controller body. A subroute runs as a single step: its own
/// traversal, without the parent's observers, whose resolved value feeds the
/// parent's next controller.
async fn invoke<C, V>(
    controller: Controller<C, V>,
    ctx: Arc<C>,
    req: Arc<V>,
    res: V,
) -> anyhow::Result<Flow<V>>
where
    C: Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    match controller.kind() {
        ControllerKind::Unit(body) => body(ctx, req, res).await,
        ControllerKind::Subroute(inner) => {
            let value = inner.dispatch(res, ctx).await.map_err(anyhow::Error::new)?;
            Ok(Flow::Next(value))
        }
    }
}

/// Scan strictly forward of `current` for the first controller matching
/// `target`. The current controller and earlier ones never match.
fn resolve_jump<C, V>(
    controllers: &[Controller<C, V>],
    current: usize,
    target: &ControllerRef,
) -> Option<usize> {
    controllers
        .iter()
        .enumerate()
        .skip(current + 1)
        .find(|(_, controller)| target.matches(controller))
        .map(|(found, _)| found)
}

async fn notify<V>(
    observers: Vec<Arc<dyn ProgressObserver<V>>>,
    progress: Progress<V>,
) -> anyhow::Result<()>
where
    V: Send + Sync + 'static,
{
    for observer in &observers {
        observer.on_progress(&progress).await?;
    }
    Ok(())
}

/// Map a failed join of a supervised body or observer task onto the single
/// failure channel, keeping the panic payload readable where it is a string.
fn join_failure(what: &str, stage: &str, err: JoinError) -> RouteError {
    if err.is_panic() {
        let payload = err.into_panic();
        let reason = payload
            .downcast_ref::<String>()
            .map(String::as_str)
            .or_else(|| payload.downcast_ref::<&'static str>().copied())
            .unwrap_or("opaque panic payload");
        RouteError::Controller(anyhow::anyhow!("{what} {stage} panicked: {reason}"))
    } else {
        RouteError::Controller(anyhow::anyhow!("{what} {stage} was cancelled"))
    }
}

fn timed_out<V>(
    handler: &Option<TimeoutHandler<V>>,
    last_progress: Option<&Progress<V>>,
    route_size: usize,
) -> RouteError {
    match handler {
        Some(handler) => handler(last_progress),
        None => {
            let info = match last_progress {
                Some(progress) => TimeoutInfo {
                    last_stage: Some(progress.last_stage.clone()),
                    next_index: progress.next_index,
                    route_size: progress.route_size,
                },
                None => TimeoutInfo {
                    last_stage: None,
                    next_index: 0,
                    route_size,
                },
            };
            RouteError::Timeout { info }
        }
    }
}
