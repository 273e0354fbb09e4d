//! Test: live statistics and deltas

use crate::helpers::*;
use midway::{Controller, Flow};

fn flaky() -> TestController {
    Controller::new("flaky", |_ctx, _req, res: Msg| async move {
        if res.id == 13 {
            anyhow::bail!("unlucky");
        }
        Ok(Flow::Next(res))
    })
    .unwrap()
}

#[tokio::test]
async fn test_finished_counters_track_success_and_errors() {
    let mut route = TestRoute::new("r");
    route.add_controller(mark("a")).unwrap();
    route.add_controller(flaky()).unwrap();

    route.dispatch(Msg::new(1), ctx()).await.unwrap();
    route.dispatch(Msg::new(2), ctx()).await.unwrap();
    route.dispatch(Msg::new(13), ctx()).await.unwrap_err();

    let stats = route.statistics();
    assert_eq!(stats.finished.total, 3);
    assert_eq!(stats.finished.success, 2);
    assert_eq!(stats.finished.errors, 1);
    assert_eq!(stats.pending.total, 0);
    assert!(stats.pending.stages.values().all(|count| *count == 0));
}

#[tokio::test]
async fn test_delta_against_an_explicit_baseline() {
    let mut route = TestRoute::new("r");
    route.add_controller(mark("a")).unwrap();

    route.dispatch(Msg::new(1), ctx()).await.unwrap();
    let baseline = route.statistics();
    route.dispatch(Msg::new(2), ctx()).await.unwrap();

    let delta = route.delta(Some(&baseline));
    assert_eq!(delta.finished.total, 1);
    assert_eq!(delta.finished.success, 1);
    assert_eq!(delta.finished.errors, 0);
}

#[tokio::test]
async fn test_adding_a_controller_recaptures_the_default_baseline() {
    let mut route = TestRoute::new("r");
    route.add_controller(mark("a")).unwrap();
    route.dispatch(Msg::new(1), ctx()).await.unwrap();

    route.add_controller(mark("b")).unwrap();

    let delta = route.delta(None);
    assert_eq!(delta.finished.total, 0);
    assert_eq!(delta.pending.total, 0);
}

#[tokio::test]
async fn test_statistics_serialize_to_json() {
    let mut route = TestRoute::new("r");
    route.add_controller(mark("a")).unwrap();
    route.dispatch(Msg::new(1), ctx()).await.unwrap();

    let value = serde_json::to_value(route.statistics()).unwrap();
    assert_eq!(value["finished"]["success"], 1);
    assert_eq!(value["pending"]["stages"]["a"], 0);
    assert!(value["timestamp_ms"].is_i64());
}
