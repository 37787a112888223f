//! TimeTrack notification tests

use parking_lot::Mutex;
use spectoda_core::time::ClockSource;
use spectoda_core::{TimeTrack, TimeTrackEvent};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

fn recorded_track() -> (TimeTrack, Arc<AtomicI64>, Arc<Mutex<Vec<TimeTrackEvent>>>) {
    let wall = Arc::new(AtomicI64::new(10_000));
    let source_wall = Arc::clone(&wall);
    let source: ClockSource = Arc::new(move || source_wall.load(Ordering::SeqCst));

    let mut track = TimeTrack::with_source(0, false, source);
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    track.on(move |event| sink.lock().push(*event));

    (track, wall, events)
}

#[test]
fn test_double_pause_emits_change_once() {
    let (mut track, wall, events) = recorded_track();

    wall.fetch_add(40, Ordering::SeqCst);
    track.pause();
    track.pause();

    assert_eq!(
        *events.lock(),
        vec![
            TimeTrackEvent::Change {
                millis: 40,
                paused: true
            },
            TimeTrackEvent::Pause,
            TimeTrackEvent::Pause,
        ]
    );
}

#[test]
fn test_unpause_running_clock_only_plays() {
    let (mut track, _wall, events) = recorded_track();
    track.unpause();
    assert_eq!(*events.lock(), vec![TimeTrackEvent::Play]);
}

#[test]
fn test_silent_setters_do_not_notify() {
    let (mut track, _wall, events) = recorded_track();

    track.set_millis_silent(1_000);
    track.set_state_silent(2_000, true);
    assert!(events.lock().is_empty());
    assert_eq!(track.millis(), 2_000);

    track.set_millis(3_000);
    assert_eq!(
        *events.lock(),
        vec![TimeTrackEvent::Change {
            millis: 3_000,
            paused: true
        }]
    );
}

#[test]
fn test_removed_listener_is_not_called() {
    let (mut track, _wall, events) = recorded_track();

    let extra = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&extra);
    let id = track.on(move |_| *counter.lock() += 1);

    track.pause();
    assert!(track.off(id));
    assert!(!track.off(id));
    track.unpause();

    assert_eq!(*extra.lock(), 2);
    assert_eq!(events.lock().len(), 4);
}

#[test]
fn test_batch_holds_notifications_until_fired() {
    let (mut track, _wall, events) = recorded_track();

    let ((), held) = track.batch(|track| {
        track.pause();
        let ((), inner) = track.batch(|track| track.pause());
        assert!(inner.events().is_empty());
        inner.fire();
    });
    assert!(events.lock().is_empty());
    assert_eq!(held.events().len(), 3);

    held.fire();
    assert_eq!(
        *events.lock(),
        vec![
            TimeTrackEvent::Change {
                millis: 0,
                paused: true
            },
            TimeTrackEvent::Pause,
            TimeTrackEvent::Pause,
        ]
    );

    track.unpause();
    assert_eq!(events.lock().len(), 5);
}
