//! MemoryStore: an in-process [`RemoteStore`].
//!
//! Documents live in a `BTreeMap` keyed by normalized path (no leading or
//! trailing `/`, no empty segments). A collection is the set of documents
//! whose parent path equals the collection path. Watchers are notified
//! synchronously on every write, and once on subscribe with the current
//! snapshot.
//!
//! Failure injection (`fail_with`, `fail_watchers`) and per-path latency
//! make it usable as a test double for real backends.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use super::{CollectionListener, DocListener, RemoteStore};
use crate::{
    error::RemoteError,
    query::Query,
    reactive::{EventEmitter, Unsubscribe},
};

#[derive(Debug, Clone)]
enum StoreEvent {
    /// The document at this normalized path was written or deleted.
    Changed(String),
    /// Every live watcher receives this error.
    Failed(RemoteError),
}

type Docs = Arc<RwLock<BTreeMap<String, Value>>>;

#[derive(Default)]
pub struct MemoryStore {
    docs: Docs,
    events: Arc<EventEmitter<StoreEvent>>,
    failure: Mutex<Option<RemoteError>>,
    latency: Mutex<HashMap<String, Duration>>,
    get_calls: AtomicUsize,
    watch_calls: AtomicUsize,
    active_watches: Arc<AtomicUsize>,
}

/// Strip leading/trailing `/` and empty segments.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

fn parent_of(doc_path: &str) -> &str {
    doc_path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

fn collection_snapshot(docs: &BTreeMap<String, Value>, query: &Query, key: &str) -> Vec<Value> {
    let members = docs
        .iter()
        .filter(|(path, _)| parent_of(path) == key)
        .map(|(_, value)| value.clone())
        .collect();
    query.apply(members)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace the document at `path` and notify watchers.
    pub fn set(&self, path: &str, value: Value) {
        let key = normalize_path(path);
        self.docs.write().insert(key.clone(), value);
        self.events.emit(&StoreEvent::Changed(key));
    }

    /// Delete the document at `path`. Returns whether it existed.
    pub fn delete(&self, path: &str) -> bool {
        let key = normalize_path(path);
        let existed = self.docs.write().remove(&key).is_some();
        if existed {
            self.events.emit(&StoreEvent::Changed(key));
        }
        existed
    }

    /// Direct read, bypassing counters and failure injection.
    pub fn get(&self, path: &str) -> Option<Value> {
        self.docs.read().get(&normalize_path(path)).cloned()
    }

    /// Make every subsequent `get_*` and `watch_*` call fail with `error`.
    pub fn fail_with(&self, error: RemoteError) {
        *self.failure.lock() = Some(error);
    }

    pub fn clear_failure(&self) {
        *self.failure.lock() = None;
    }

    /// Push `error` to every live watcher.
    pub fn fail_watchers(&self, error: RemoteError) {
        self.events.emit(&StoreEvent::Failed(error));
    }

    /// Delay one-shot reads of `path` (document or collection path).
    pub fn set_latency(&self, path: &str, delay: Duration) {
        self.latency.lock().insert(normalize_path(path), delay);
    }

    /// Number of `get_doc` + `get_collection` calls so far.
    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// Number of `watch_doc` + `watch_collection` calls so far.
    pub fn watch_calls(&self) -> usize {
        self.watch_calls.load(Ordering::SeqCst)
    }

    /// Watches that have not been unsubscribed.
    pub fn active_watches(&self) -> usize {
        self.active_watches.load(Ordering::SeqCst)
    }

    fn check_failure(&self) -> Result<(), RemoteError> {
        match self.failure.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn simulate_latency(&self, key: &str) {
        let delay = self.latency.lock().get(key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    /// Register `on_event` and return an unsubscribe handle that also keeps
    /// `active_watches` accurate.
    fn register(&self, on_event: impl Fn(&StoreEvent) + Send + Sync + 'static) -> Unsubscribe {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        self.active_watches.fetch_add(1, Ordering::SeqCst);
        let id = self.events.on(on_event);

        let events = Arc::clone(&self.events);
        let active = Arc::clone(&self.active_watches);
        let released = AtomicBool::new(false);
        Box::new(move || {
            if !released.swap(true, Ordering::SeqCst) {
                events.off(id);
                active.fetch_sub(1, Ordering::SeqCst);
            }
        })
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn get_doc(&self, path: &str) -> Result<Option<Value>, RemoteError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let key = normalize_path(path);
        self.simulate_latency(&key).await;
        self.check_failure()?;
        Ok(self.docs.read().get(&key).cloned())
    }

    async fn get_collection(&self, query: &Query) -> Result<Vec<Value>, RemoteError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let key = normalize_path(&query.collection);
        self.simulate_latency(&key).await;
        self.check_failure()?;
        let docs = self.docs.read();
        Ok(collection_snapshot(&docs, query, &key))
    }

    fn watch_doc(&self, path: &str, listener: DocListener) -> Result<Unsubscribe, RemoteError> {
        self.check_failure()?;
        let key = normalize_path(path);

        let docs = Arc::clone(&self.docs);
        let watched = key.clone();
        let on_event = Arc::clone(&listener);
        let unsubscribe = self.register(move |event| match event {
            StoreEvent::Changed(changed) if *changed == watched => {
                let current = docs.read().get(&watched).cloned();
                on_event(Ok(current));
            }
            StoreEvent::Changed(_) => {}
            StoreEvent::Failed(err) => on_event(Err(err.clone())),
        });

        let initial = self.docs.read().get(&key).cloned();
        listener(Ok(initial));
        Ok(unsubscribe)
    }

    fn watch_collection(
        &self,
        query: &Query,
        listener: CollectionListener,
    ) -> Result<Unsubscribe, RemoteError> {
        self.check_failure()?;
        let key = normalize_path(&query.collection);

        let docs = Arc::clone(&self.docs);
        let watched = key.clone();
        let watched_query = query.clone();
        let on_event = Arc::clone(&listener);
        let unsubscribe = self.register(move |event| match event {
            StoreEvent::Changed(changed) if parent_of(changed) == watched => {
                let snapshot = collection_snapshot(&docs.read(), &watched_query, &watched);
                on_event(Ok(snapshot));
            }
            StoreEvent::Changed(_) => {}
            StoreEvent::Failed(err) => on_event(Err(err.clone())),
        });

        let initial = collection_snapshot(&self.docs.read(), query, &key);
        listener(Ok(initial));
        Ok(unsubscribe)
    }
}
