//! Live subscriptions.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use docbind::reactive::Unsubscribe;
use docbind::store::{CollectionListener, DocListener};
use docbind::{
    BindError, Binding, BindingConfig, BindingState, Query, Received, RemoteError,
    RemoteErrorKind, RemoteStore, Signal,
};
use parking_lot::Mutex;
use serde_json::{json, Value};

use super::support::{advance, error_log, settle, store};

#[tokio::test(start_paused = true)]
async fn collection_watch_runs_hooks_on_every_snapshot() {
    let store = store();
    for id in ["a", "b", "c"] {
        store.set(&format!("rooms/lobby/messages/{id}"), json!({ "id": id }));
    }
    let room = Signal::new("lobby");
    let received: Arc<Mutex<Vec<(usize, Option<usize>)>>> = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&received);

    let binding: Binding<Value, usize> = Binding::new(
        store.clone(),
        BindingConfig::<Value, usize>::new("rooms/$room/messages")
            .collection()
            .watch()
            .variable("room", room.clone())
            .mutate(|raw| Ok(raw.len()))
            .on_receive(move |raw, derived| {
                log.lock().push((raw.len(), derived.copied()));
                Ok(())
            }),
    );

    assert_eq!(binding.state(), BindingState::Active);
    assert_eq!(*received.lock(), vec![(3, Some(3))]);

    store.set("rooms/lobby/messages/d", json!({ "id": "d" }));

    assert_eq!(*received.lock(), vec![(3, Some(3)), (4, Some(4))]);
    assert_eq!(binding.mutated_data(), Some(4));
    assert_eq!(store.active_watches(), 1);
    assert_eq!(store.get_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn variable_change_moves_the_subscription() {
    let store = store();
    store.set("users/1", json!({ "name": "one" }));
    store.set("users/2", json!({ "name": "two" }));
    let uid = Signal::new("1");

    let binding: Binding<Value> = Binding::new(
        store.clone(),
        BindingConfig::new("users/$uid")
            .doc()
            .watch()
            .debounce(100)
            .variable("uid", uid.clone()),
    );
    assert_eq!(binding.data(), Some(Received::Doc(Some(json!({ "name": "one" })))));

    uid.set("2");
    advance(50).await;
    assert_eq!(binding.resolved_path().as_deref(), Some("users/1"));

    advance(51).await;
    assert_eq!(binding.resolved_path().as_deref(), Some("users/2"));
    assert_eq!(binding.data(), Some(Received::Doc(Some(json!({ "name": "two" })))));
    assert_eq!(store.watch_calls(), 2);
    assert_eq!(store.active_watches(), 1);

    store.set("users/1", json!({ "name": "one, edited" }));
    assert_eq!(binding.data(), Some(Received::Doc(Some(json!({ "name": "two" })))));
}

#[tokio::test(start_paused = true)]
async fn watcher_failure_goes_idle_without_retry() {
    let store = store();
    store.set("users/1", json!({ "name": "one" }));
    let (errors, sink) = error_log();

    let binding: Binding<Value> = Binding::new(
        store.clone(),
        BindingConfig::new("users/1").doc().watch().on_error(sink),
    );
    assert_eq!(binding.state(), BindingState::Active);

    let failure = RemoteError::with_kind("connection lost", RemoteErrorKind::Unavailable);
    store.fail_watchers(failure.clone());

    assert_eq!(binding.state(), BindingState::Idle);
    assert_eq!(store.active_watches(), 0);
    assert_eq!(binding.error(), Some(BindError::Remote(failure.clone())));
    assert_eq!(*errors.lock(), vec![BindError::Remote(failure)]);
    // Data received before the failure is kept.
    assert!(binding.data().is_some());

    advance(5_000).await;
    assert_eq!(store.watch_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn rejected_subscription_is_reported() {
    let store = store();
    store.fail_with(RemoteError::with_kind("denied", RemoteErrorKind::PermissionDenied));
    let (errors, sink) = error_log();

    let binding: Binding<Value> = Binding::new(
        store.clone(),
        BindingConfig::new("secrets/1").doc().watch().on_error(sink),
    );
    settle().await;

    assert_eq!(binding.state(), BindingState::Idle);
    assert!(!binding.loading());
    assert_eq!(store.active_watches(), 0);
    assert_eq!(errors.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_then_watch_again() {
    let store = store();
    store.set("users/1", json!({ "name": "one" }));
    let binding: Binding<Value> = Binding::new(store.clone(), BindingConfig::new("users/1").doc().watch());

    binding.stop_watching();

    assert_eq!(binding.state(), BindingState::Idle);
    assert_eq!(store.active_watches(), 0);
    assert!(binding.data().is_some());

    store.set("users/1", json!({ "name": "ignored" }));
    assert_eq!(binding.data(), Some(Received::Doc(Some(json!({ "name": "one" })))));

    binding.watch_data();

    assert_eq!(binding.state(), BindingState::Active);
    assert_eq!(store.active_watches(), 1);
    assert_eq!(store.watch_calls(), 2);
    assert_eq!(binding.data(), Some(Received::Doc(Some(json!({ "name": "ignored" })))));
}

#[tokio::test(start_paused = true)]
async fn deleted_doc_becomes_none() {
    let store = store();
    store.set("users/1", json!({ "name": "one" }));
    let binding: Binding<Value> = Binding::new(store.clone(), BindingConfig::new("users/1").doc().watch());

    store.delete("users/1");

    assert_eq!(binding.data(), Some(Received::Doc(None)));
    assert_eq!(binding.state(), BindingState::Active);
}

#[tokio::test(start_paused = true)]
async fn snapshot_written_back_by_a_hook_wins() {
    let store = store();
    store.set("users/1", json!({ "v": 1 }));
    let writer = Arc::clone(&store);
    let seen: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);

    let binding: Binding<Value, i64> = Binding::new(
        store.clone(),
        BindingConfig::<Value, i64>::new("users/1")
            .doc()
            .watch()
            .mutate(|raw| Ok(raw.as_doc().and_then(|d| d["v"].as_i64()).unwrap_or_default()))
            .on_receive(move |_, derived| {
                let v = derived.copied().unwrap_or_default();
                log.lock().push(v);
                if v == 2 {
                    writer.set("users/1", json!({ "v": 3 }));
                }
                Ok(())
            }),
    );

    store.set("users/1", json!({ "v": 2 }));

    assert_eq!(store.get("users/1"), Some(json!({ "v": 3 })));
    assert_eq!(binding.data(), Some(Received::Doc(store.get("users/1"))));
    assert_eq!(binding.mutated_data(), Some(3));
    assert_eq!(*seen.lock(), vec![1, 2, 3]);
    assert_eq!(binding.state(), BindingState::Active);
}

// ============================================================================
// Late snapshots from a store that ignores unsubscribe
// ============================================================================

/// Keeps every document listener alive so snapshots can be pushed after the
/// binding has let go of its subscription.
#[derive(Default)]
struct HeldStore {
    listeners: Mutex<Vec<DocListener>>,
}

impl HeldStore {
    fn push(&self, value: Value) {
        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            listener(Ok(Some(value.clone())));
        }
    }
}

#[async_trait]
impl RemoteStore for HeldStore {
    async fn get_doc(&self, _path: &str) -> Result<Option<Value>, RemoteError> {
        Ok(None)
    }

    async fn get_collection(&self, _query: &Query) -> Result<Vec<Value>, RemoteError> {
        Ok(Vec::new())
    }

    fn watch_doc(&self, _path: &str, listener: DocListener) -> Result<Unsubscribe, RemoteError> {
        self.listeners.lock().push(listener);
        Ok(Box::new(|| {}))
    }

    fn watch_collection(
        &self,
        _query: &Query,
        _listener: CollectionListener,
    ) -> Result<Unsubscribe, RemoteError> {
        Ok(Box::new(|| {}))
    }
}

fn counted_binding(store: &Arc<HeldStore>) -> (Binding<Value>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let binding = Binding::new(
        store.clone(),
        BindingConfig::new("users/1").doc().watch().on_receive(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );
    (binding, calls)
}

#[tokio::test(start_paused = true)]
async fn hooks_skip_snapshots_after_stop() {
    let store = Arc::new(HeldStore::default());
    let (binding, calls) = counted_binding(&store);
    store.push(json!({ "v": 1 }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    binding.stop_watching();
    store.push(json!({ "v": 2 }));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(binding.data(), Some(Received::Doc(Some(json!({ "v": 1 })))));
    assert_eq!(binding.state(), BindingState::Idle);
}

#[tokio::test(start_paused = true)]
async fn hooks_skip_snapshots_after_dispose() {
    let store = Arc::new(HeldStore::default());
    let (binding, calls) = counted_binding(&store);

    binding.dispose();
    store.push(json!({ "v": 1 }));

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(binding.data(), None);
    assert_eq!(binding.state(), BindingState::TornDown);
}
