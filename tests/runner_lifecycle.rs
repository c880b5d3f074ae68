//! Async runner behaviour under tokio's paused clock.

use std::time::Duration;

use course_tracker::{
    spawn_session, Fix, GpsPoint, LocationError, LocationStatus, LocationUpdate, Poi, RunSession,
    SessionEvent, TrackerConfig,
};
use futures::channel::mpsc as location;
use tokio::sync::mpsc;

fn ready_session(pois: Vec<Poi>) -> RunSession {
    let _ = env_logger::builder().is_test(true).try_init();
    let path = (0..5).map(|i| GpsPoint::new(0.0, i as f64 * 0.001)).collect();
    let mut session = RunSession::new(TrackerConfig::default());
    session.load_course(path, pois).unwrap();
    session
}

fn fix(lng: f64, t_secs: i64) -> LocationUpdate {
    Ok(Fix::new(0.0, lng, t_secs * 1000))
}

fn drain(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test(start_paused = true)]
async fn test_fixes_and_ticks_interleave() {
    let (fix_tx, fix_rx) = location::unbounded();
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let handle = spawn_session(ready_session(Vec::new()), fix_rx, events_tx).unwrap();

    fix_tx.unbounded_send(fix(0.0, 0)).unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    fix_tx.unbounded_send(fix(0.002, 1)).unwrap();
    tokio::time::sleep(Duration::from_millis(1000)).await;

    let received = drain(&mut events);
    let ticks = received
        .iter()
        .filter(|e| matches!(e, SessionEvent::Metrics(_)))
        .count();
    assert_eq!(ticks, 2);
    assert!(received
        .iter()
        .any(|e| matches!(e, SessionEvent::Progress(u) if u.index == 2)));

    let summary = handle.stop().await.unwrap();
    assert_eq!(summary.metrics.elapsed_seconds, 2);
    assert!((summary.metrics.total_distance_km - 0.222).abs() < 0.001);
}

#[tokio::test(start_paused = true)]
async fn test_pause_stops_clock_and_distance() {
    let (fix_tx, fix_rx) = location::unbounded();
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let handle = spawn_session(ready_session(Vec::new()), fix_rx, events_tx).unwrap();

    fix_tx.unbounded_send(fix(0.0, 0)).unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    handle.pause().unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    fix_tx.unbounded_send(fix(0.003, 2)).unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(
        drain(&mut events)
            .iter()
            .filter(|e| matches!(e, SessionEvent::Metrics(_)))
            .count(),
        1
    );

    let summary = handle.stop().await.unwrap();
    assert_eq!(summary.metrics.elapsed_seconds, 1);
    assert_eq!(summary.metrics.total_distance_km, 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_arrivals_wait_for_acknowledgement() {
    let pois = vec![
        Poi::new("a", 0.0, 0.001).with_radius(200.0),
        Poi::new("b", 0.0, 0.001).with_radius(200.0),
    ];
    let (fix_tx, fix_rx) = location::unbounded();
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let handle = spawn_session(ready_session(pois), fix_rx, events_tx).unwrap();

    let arrived = |events: &[SessionEvent]| -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Arrived(a) => Some(a.poi_name.clone()),
                _ => None,
            })
            .collect()
    };

    fix_tx.unbounded_send(fix(0.001, 0)).unwrap();
    fix_tx.unbounded_send(fix(0.001, 1)).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(arrived(&drain(&mut events)), vec!["a".to_string()]);

    handle.acknowledge_arrival().unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    fix_tx.unbounded_send(fix(0.001, 2)).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(arrived(&drain(&mut events)), vec!["b".to_string()]);

    let summary = handle.stop().await.unwrap();
    assert_eq!(summary.visited, vec!["a".to_string(), "b".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_location_error_keeps_running() {
    let (fix_tx, fix_rx) = location::unbounded();
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let handle = spawn_session(ready_session(Vec::new()), fix_rx, events_tx).unwrap();

    fix_tx.unbounded_send(fix(0.001, 0)).unwrap();
    fix_tx
        .unbounded_send(Err(LocationError::PermissionDenied))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let received = drain(&mut events);
    assert!(received.iter().any(|e| matches!(
        e,
        SessionEvent::Status(LocationStatus::Lost {
            error: LocationError::PermissionDenied
        })
    )));
    // Timer keeps running through the outage
    assert!(received.iter().any(|e| matches!(e, SessionEvent::Metrics(_))));
    assert!(!handle.is_finished());

    let summary = handle.stop().await.unwrap();
    assert!(summary.progress_fraction > 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_single_teardown() {
    let (fix_tx, fix_rx) = location::unbounded();
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let handle = spawn_session(ready_session(Vec::new()), fix_rx, events_tx).unwrap();

    fix_tx.unbounded_send(fix(0.0, 0)).unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    handle.stop().await.unwrap();

    // Subscription released
    assert!(fix_tx.unbounded_send(fix(0.004, 5)).is_err());

    // Timer released: no events after the ones already queued, then closed
    tokio::time::sleep(Duration::from_secs(10)).await;
    let mut late_ticks = 0;
    while let Some(event) = events.recv().await {
        if matches!(event, SessionEvent::Metrics(m) if m.elapsed_seconds > 1) {
            late_ticks += 1;
        }
    }
    assert_eq!(late_ticks, 0);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handle_tears_down() {
    let (fix_tx, fix_rx) = location::unbounded();
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let handle = spawn_session(ready_session(Vec::new()), fix_rx, events_tx).unwrap();
    drop(handle);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(fix_tx.unbounded_send(fix(0.0, 0)).is_err());
    assert!(events.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_stream_end_keeps_timer() {
    let (fix_tx, fix_rx) = location::unbounded();
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let handle = spawn_session(ready_session(Vec::new()), fix_rx, events_tx).unwrap();

    drop(fix_tx);
    tokio::time::sleep(Duration::from_millis(3500)).await;
    let ticks = drain(&mut events)
        .iter()
        .filter(|e| matches!(e, SessionEvent::Metrics(_)))
        .count();
    assert_eq!(ticks, 3);
    assert_eq!(handle.stop().await.unwrap().metrics.elapsed_seconds, 3);
}
