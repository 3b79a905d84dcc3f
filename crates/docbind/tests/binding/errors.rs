//! Error routing.

use docbind::{
    BindError, Binding, BindingConfig, BindingState, CallbackError, ConfigError, Received,
    RemoteError, RemoteErrorKind, Signal,
};
use serde_json::{json, Value};

use super::support::{advance, error_log, settle, store};

#[tokio::test(start_paused = true)]
async fn query_hook_on_document_is_rejected() {
    let store = store();
    let (errors, sink) = error_log();

    let binding: Binding<Value> = Binding::new(
        store.clone(),
        BindingConfig::new("users/1")
            .doc()
            .get()
            .query(|c| c.into_query())
            .on_error(sink),
    );
    settle().await;

    assert_eq!(binding.state(), BindingState::Idle);
    assert_eq!(binding.error(), Some(BindError::Config(ConfigError::QueryOnDocument)));
    assert_eq!(*errors.lock(), vec![BindError::Config(ConfigError::QueryOnDocument)]);
    assert_eq!(store.get_calls(), 0);
    assert_eq!(binding.config(), Err(&ConfigError::QueryOnDocument));
}

#[tokio::test(start_paused = true)]
async fn unbound_placeholder_is_rejected() {
    let store = store();
    let (errors, sink) = error_log();

    let binding: Binding<Value> = Binding::new(
        store.clone(),
        BindingConfig::new("users/$uid").doc().watch().on_error(sink),
    );

    let expected = BindError::Config(ConfigError::MissingVariable { name: "uid".into() });
    assert_eq!(binding.error(), Some(expected.clone()));
    assert_eq!(*errors.lock(), vec![expected]);
    assert_eq!(store.watch_calls(), 0);
    assert_eq!(binding.resolved_path(), None);
}

#[tokio::test(start_paused = true)]
async fn blank_path_is_rejected() {
    let store = store();
    let (errors, sink) = error_log();
    let binding: Binding<Value> = Binding::new(store.clone(), BindingConfig::new("  ").doc().get().on_error(sink));

    assert_eq!(binding.error(), Some(BindError::Config(ConfigError::EmptyPath)));
    assert_eq!(errors.lock().len(), 1);

    // Commands on a misconfigured binding only report again.
    binding.refresh().await;
    assert_eq!(errors.lock().len(), 2);
    assert_eq!(store.get_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn remote_failure_is_not_retried() {
    let store = store();
    let failure = RemoteError::with_kind("offline", RemoteErrorKind::Unavailable);
    store.fail_with(failure.clone());
    let (errors, sink) = error_log();

    let binding: Binding<Value> = Binding::new(
        store.clone(),
        BindingConfig::new("users/1").doc().get().on_error(sink),
    );
    settle().await;

    assert_eq!(binding.state(), BindingState::Idle);
    assert!(!binding.loading());
    assert_eq!(binding.error(), Some(BindError::Remote(failure)));
    assert_eq!(errors.lock().len(), 1);

    advance(10_000).await;
    assert_eq!(store.get_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn success_clears_previous_error() {
    let store = store();
    store.set("users/1", json!({ "name": "one" }));
    store.fail_with(RemoteError::new("flaky"));
    let binding: Binding<Value> = Binding::new(
        store.clone(),
        BindingConfig::new("users/1").doc().get().on_error(|_| {}),
    );
    settle().await;
    assert!(binding.error().is_some());

    store.clear_failure();
    binding.refresh().await;

    assert_eq!(binding.error(), None);
    assert_eq!(binding.state(), BindingState::Active);
}

#[tokio::test(start_paused = true)]
async fn failing_mutate_still_delivers_raw_data() {
    let store = store();
    store.set("users/1", json!({ "name": "one" }));
    let (errors, sink) = error_log();
    let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
    let log = std::sync::Arc::clone(&seen);

    let binding: Binding<Value, String> = Binding::new(
        store.clone(),
        BindingConfig::<Value, String>::new("users/1")
            .doc()
            .watch()
            .mutate(|_| Err("no name".into()))
            .on_receive(move |raw, derived| {
                log.lock().push((raw.len(), derived.cloned()));
                Ok(())
            })
            .on_error(sink),
    );

    assert_eq!(binding.data(), Some(Received::Doc(Some(json!({ "name": "one" })))));
    assert_eq!(binding.mutated_data(), None);
    assert_eq!(*seen.lock(), vec![(1, None)]);
    assert_eq!(
        *errors.lock(),
        vec![BindError::Callback(CallbackError::Mutate {
            message: "no name".into()
        })]
    );
    assert_eq!(binding.state(), BindingState::Active);
}

#[tokio::test(start_paused = true)]
async fn panicking_on_receive_is_contained() {
    let store = store();
    store.set("users/1", json!({ "name": "one" }));
    let (errors, sink) = error_log();

    let binding: Binding<Value> = Binding::new(
        store.clone(),
        BindingConfig::new("users/1")
            .doc()
            .watch()
            .on_receive(|_, _| panic!("boom"))
            .on_error(sink),
    );

    assert_eq!(binding.state(), BindingState::Active);
    assert!(matches!(
        errors.lock().as_slice(),
        [BindError::Callback(CallbackError::OnReceive { .. })]
    ));

    store.set("users/1", json!({ "name": "two" }));
    assert_eq!(binding.data(), Some(Received::Doc(Some(json!({ "name": "two" })))));
    assert_eq!(errors.lock().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn panicking_error_sink_does_not_break_the_binding() {
    let store = store();
    store.fail_with(RemoteError::new("offline"));
    let uid = Signal::new("1");

    let binding: Binding<Value> = Binding::new(
        store.clone(),
        BindingConfig::new("users/$uid")
            .doc()
            .get()
            .debounce(10)
            .variable("uid", uid.clone())
            .on_error(|_| panic!("sink exploded")),
    );
    settle().await;
    assert_eq!(binding.state(), BindingState::Idle);

    store.clear_failure();
    store.set("users/2", json!({ "name": "two" }));
    uid.set("2");
    advance(20).await;
    settle().await;

    assert_eq!(binding.state(), BindingState::Active);
    assert_eq!(binding.data(), Some(Received::Doc(Some(json!({ "name": "two" })))));
}
