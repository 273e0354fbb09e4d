//! Test: progress observers on controller transitions

use std::sync::{Arc, Mutex};

use crate::helpers::*;
use midway::DispatchOptions;

#[tokio::test]
async fn test_progress_reported_on_each_transition() {
    let mut route = TestRoute::new("r");
    route.add_controller(mark("a")).unwrap();
    route.add_controller(mark("b")).unwrap();
    route.add_controller(mark("c")).unwrap();

    let seen: Arc<Mutex<Vec<(String, usize, usize)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let options = DispatchOptions::new().on_progress(move |progress| {
        sink.lock().unwrap().push((
            progress.last_stage.clone(),
            progress.next_index,
            progress.route_size,
        ));
        Ok(())
    });

    route.dispatch_with(Msg::new(1), ctx(), options).await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(*seen, vec![("a".to_string(), 1, 3), ("b".to_string(), 2, 3)]);
}

#[tokio::test]
async fn test_jump_produces_a_single_transition() {
    let mut route = TestRoute::new("r");
    route.add_controller(mark("a")).unwrap();
    route.add_controller(jump_to("b", "d")).unwrap();
    route.add_controller(mark("c")).unwrap();
    route.add_controller(mark("d")).unwrap();

    let seen: Arc<Mutex<Vec<(String, usize)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let options = DispatchOptions::new().on_progress(move |progress| {
        sink.lock()
            .unwrap()
            .push((progress.last_stage.clone(), progress.next_index));
        Ok(())
    });

    route.dispatch_with(Msg::new(1), ctx(), options).await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(*seen, vec![("a".to_string(), 1), ("b".to_string(), 3)]);
}

#[tokio::test]
async fn test_observer_error_fails_the_traversal() {
    let trail = Arc::new(Mutex::new(Vec::new()));
    let mut route = TestRoute::new("r");
    route
        .add_controller(recording("a", Arc::clone(&trail)))
        .unwrap();
    route
        .add_controller(recording("b", Arc::clone(&trail)))
        .unwrap();

    let options = DispatchOptions::new()
        .on_progress(|_progress| Err(anyhow::anyhow!("observer refused")));

    let err = route
        .dispatch_with(Msg::new(1), ctx(), options)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "controllerFailed");
    assert!(err.to_string().contains("observer refused"));
    // the failing observer ran between "a" and "b"
    assert_eq!(*trail.lock().unwrap(), vec!["a"]);
}

#[tokio::test]
async fn test_panicking_observer_fails_the_traversal_cleanly() {
    let mut route = TestRoute::new("r");
    route.add_controller(mark("a")).unwrap();
    route.add_controller(mark("b")).unwrap();

    let options =
        DispatchOptions::new().on_progress(|_progress| panic!("observer blew up"));

    let err = route
        .dispatch_with(Msg::new(1), ctx(), options)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "controllerFailed");
    assert!(err.to_string().contains("blew up"));

    let stats = route.statistics();
    assert_eq!(stats.finished.errors, 1);
    assert_eq!(stats.pending.total, 0);
}

#[tokio::test]
async fn test_observers_run_in_registration_order() {
    let mut route = TestRoute::new("r");
    route.add_controller(mark("a")).unwrap();
    route.add_controller(mark("b")).unwrap();
    route.add_controller(mark("c")).unwrap();

    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let first = Arc::clone(&order);
    let second = Arc::clone(&order);
    let options = DispatchOptions::new()
        .on_progress(move |_progress| {
            first.lock().unwrap().push("first");
            Ok(())
        })
        .on_progress(move |_progress| {
            second.lock().unwrap().push("second");
            Ok(())
        });

    route.dispatch_with(Msg::new(1), ctx(), options).await.unwrap();

    let order = order.lock().unwrap();
    assert_eq!(*order, vec!["first", "second", "first", "second"]);
}
