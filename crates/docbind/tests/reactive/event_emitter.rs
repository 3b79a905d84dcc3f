//! Tests for `EventEmitter<T>`.

use std::sync::Arc;

use docbind::reactive::EventEmitter;
use docbind::{BindingEvent, BindingState};
use parking_lot::Mutex;

fn make_log() -> Arc<Mutex<Vec<String>>> {
    Arc::new(Mutex::new(Vec::new()))
}

// ============================================================================
// Subscription
// ============================================================================

#[test]
fn listeners_fire_in_registration_order() {
    let emitter: EventEmitter<BindingEvent> = EventEmitter::new();
    let log = make_log();

    for name in ["a", "b"] {
        let log = Arc::clone(&log);
        emitter.on(move |e| log.lock().push(format!("{name}:{e:?}")));
    }

    emitter.emit(&BindingEvent::StateChanged(BindingState::Active));

    assert_eq!(
        *log.lock(),
        vec!["a:StateChanged(Active)", "b:StateChanged(Active)"]
    );
}

#[test]
fn off_is_idempotent() {
    let emitter: EventEmitter<u8> = EventEmitter::new();
    let log = make_log();
    let log_clone = Arc::clone(&log);

    let id = emitter.on(move |e| log_clone.lock().push(e.to_string()));
    emitter.off(id);
    emitter.off(id);
    emitter.emit(&1);

    assert!(log.lock().is_empty());
    assert_eq!(emitter.size(), 0);
}

#[test]
fn clear_drops_every_listener() {
    let emitter: EventEmitter<u8> = EventEmitter::new();
    emitter.on(|_| {});
    emitter.on(|_| {});
    assert_eq!(emitter.size(), 2);

    emitter.clear();

    assert_eq!(emitter.size(), 0);
}

// ============================================================================
// Snapshot semantics during emit
// ============================================================================

#[test]
fn listener_added_during_emit_waits_for_next_round() {
    let emitter: Arc<EventEmitter<u8>> = Arc::new(EventEmitter::new());
    let log = make_log();

    {
        let emitter_clone = Arc::clone(&emitter);
        let log_clone = Arc::clone(&log);
        emitter.on(move |_| {
            log_clone.lock().push("outer".to_string());
            let log2 = Arc::clone(&log_clone);
            emitter_clone.on(move |_| log2.lock().push("late".to_string()));
        });
    }

    emitter.emit(&1);
    assert_eq!(*log.lock(), vec!["outer"]);

    emitter.emit(&2);
    assert!(log.lock().contains(&"late".to_string()));
}

#[test]
fn listener_removed_during_emit_still_runs_that_round() {
    let emitter: Arc<EventEmitter<u8>> = Arc::new(EventEmitter::new());
    let log = make_log();

    let first = {
        let log = Arc::clone(&log);
        emitter.on(move |e| log.lock().push(format!("first:{e}")))
    };
    {
        let emitter_clone = Arc::clone(&emitter);
        let log = Arc::clone(&log);
        emitter.on(move |e| {
            log.lock().push(format!("second:{e}"));
            emitter_clone.off(first);
        });
    }

    emitter.emit(&1);
    emitter.emit(&2);

    assert_eq!(*log.lock(), vec!["first:1", "second:1", "second:2"]);
}

#[test]
fn panicking_listener_propagates_to_emitter() {
    let emitter: EventEmitter<u8> = EventEmitter::new();
    let log = make_log();
    let log_clone = Arc::clone(&log);

    emitter.on(|_| panic!("listener panicked"));
    emitter.on(move |_| log_clone.lock().push("after".to_string()));

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| emitter.emit(&1)));

    assert!(result.is_err());
    assert!(log.lock().is_empty());
}
