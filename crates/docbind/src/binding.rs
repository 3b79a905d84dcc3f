//! Binding<T, M>: a live association between reactive path variables and
//! a remote document or collection.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──▶ Resolving ──▶ Active ──(variable change, debounced)──▶ Resolving ──▶ Active
//!  ▲           │            │
//!  └── error ──┴────────────┘            dispose() / drop ──▶ TornDown
//! ```
//!
//! - The initial load runs immediately (unless `manual`); later variable
//!   changes are debounced.
//! - Every request gets a generation number. Starting a new request, an
//!   error, `stop_watching` and `dispose` all advance the generation, and
//!   results carrying an older generation are dropped. At most one store
//!   subscription is alive, and the previous one is released before the next
//!   one is opened.
//! - Within one request, snapshots are numbered on arrival. A snapshot whose
//!   hooks finish after a later one was stored is dropped.
//! - Errors of every kind go to the configured error sink and are mirrored
//!   in [`Binding::error`]; nothing is returned to the caller and nothing is
//!   retried.
//!
//! # Threading model
//!
//! `Binding` is `Send + Sync`. All mutable state sits behind one
//! `parking_lot::Mutex` that is never held while calling the store, caller
//! hooks, or event listeners.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::{
    config::{normalize, BindingConfig, ErrorSink, NormalizedConfig, DEFAULT_INITIAL_LOADING},
    debounce::Debouncer,
    error::{BindError, ConfigError, RemoteError},
    mutation::{apply_mutation, report, Received},
    path::resolve_path,
    query::Query,
    reactive::{EventEmitter, ListenerId, Unsubscribe},
    store::RemoteStore,
    types::{FetchMode, QueryType},
};

// ============================================================================
// Public state / event types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    /// Configured, nothing requested (manual mode, after an error, or after
    /// `stop_watching`).
    Idle,
    /// A request is being prepared or a one-shot read is in flight.
    Resolving,
    /// A subscription is live, or a one-shot read has completed.
    Active,
    /// Disposed. Terminal.
    TornDown,
}

/// Notifications delivered to [`Binding::on_event`] listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum BindingEvent {
    StateChanged(BindingState),
    Loading(bool),
    /// New data (and derived data) is available.
    Data,
    Error(BindError),
}

// ============================================================================
// Internal state
// ============================================================================

struct Shared<T, M> {
    state: BindingState,
    resolved_path: Option<String>,
    data: Option<Received<T>>,
    mutated: Option<M>,
    loading: bool,
    error: Option<BindError>,
    subscription: Option<Unsubscribe>,
    in_flight: Option<JoinHandle<()>>,
    variables_unsub: Option<Unsubscribe>,
    /// Last sequence number handed to a snapshot.
    next_seq: u64,
    /// Sequence number of the snapshot currently in `data`.
    applied_seq: u64,
}

/// What to ask the store for, decided from the resolved path.
enum Target {
    Doc(String),
    Collection(Query),
}

struct Inner<T, M> {
    store: Arc<dyn RemoteStore>,
    /// `Err` when the configuration failed validation.
    config: Result<NormalizedConfig<T, M>, ConfigError>,
    on_error: ErrorSink,
    shared: Mutex<Shared<T, M>>,
    events: EventEmitter<BindingEvent>,
    debouncer: Option<Debouncer>,
    runtime: Handle,
    generation: AtomicU64,
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, RemoteError> {
    serde_json::from_value(value).map_err(|e| RemoteError::decode(&e))
}

fn decode_doc<T: DeserializeOwned>(value: Option<Value>) -> Result<Received<T>, RemoteError> {
    Ok(Received::Doc(value.map(decode).transpose()?))
}

fn decode_collection<T: DeserializeOwned>(values: Vec<Value>) -> Result<Received<T>, RemoteError> {
    let items = values.into_iter().map(decode).collect::<Result<Vec<T>, _>>()?;
    Ok(Received::Collection(items))
}

impl<T, M> Inner<T, M>
where
    T: DeserializeOwned + Send + Sync + 'static,
    M: Send + Sync + 'static,
{
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn advance(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn emit_all(&self, events: Vec<BindingEvent>) {
        for event in &events {
            self.events.emit(event);
        }
    }

    // -----------------------------------------------------------------------
    // Variables
    // -----------------------------------------------------------------------

    fn on_variable_change(self: &Arc<Self>) {
        let Ok(config) = &self.config else {
            return;
        };
        if self.shared.lock().state == BindingState::TornDown {
            return;
        }
        if config.options.manual {
            self.recompute_path();
            return;
        }
        if let Some(debouncer) = &self.debouncer {
            let weak: Weak<Self> = Arc::downgrade(self);
            debouncer.schedule(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.run_configured();
                }
            });
        }
    }

    /// Manual mode: keep `resolved_path` current without touching the store.
    fn recompute_path(&self) {
        let Ok(config) = &self.config else {
            return;
        };
        match resolve_path(&config.template, &config.variables) {
            Ok(path) => self.shared.lock().resolved_path = Some(path),
            Err(e) => {
                let err = BindError::from(e);
                self.shared.lock().error = Some(err.clone());
                report(&self.on_error, err.clone());
                self.events.emit(&BindingEvent::Error(err));
            }
        }
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    fn run_configured(self: &Arc<Self>) {
        let Ok(config) = &self.config else {
            return;
        };
        match config.options.fetch_mode {
            FetchMode::Get => {
                self.start_get();
            }
            FetchMode::Watch => self.start_watch(),
        }
    }

    /// Release whatever the previous request holds, resolve the path, and
    /// claim a new generation. `None` means nothing should be sent.
    fn begin_request(&self) -> Option<(u64, Target)> {
        let config = match &self.config {
            Ok(config) => config,
            Err(e) => {
                report(&self.on_error, e.clone());
                return None;
            }
        };

        let (generation, old_sub, old_task, mut events) = {
            let mut shared = self.shared.lock();
            if shared.state == BindingState::TornDown {
                return None;
            }
            let generation = self.advance();
            let mut events = Vec::new();
            if shared.state != BindingState::Resolving {
                shared.state = BindingState::Resolving;
                events.push(BindingEvent::StateChanged(BindingState::Resolving));
            }
            (generation, shared.subscription.take(), shared.in_flight.take(), events)
        };
        if let Some(task) = old_task {
            task.abort();
        }
        if let Some(unsubscribe) = old_sub {
            unsubscribe();
        }

        match resolve_path(&config.template, &config.variables) {
            Ok(path) => {
                {
                    let mut shared = self.shared.lock();
                    shared.resolved_path = Some(path.clone());
                    if !shared.loading {
                        shared.loading = true;
                        events.push(BindingEvent::Loading(true));
                    }
                }
                self.emit_all(events);
                tracing::debug!(
                    path = %path,
                    query_type = %config.options.query_type,
                    mode = %config.options.fetch_mode,
                    generation,
                    "binding request"
                );
                let target = match config.options.query_type {
                    QueryType::Doc => Target::Doc(path),
                    QueryType::Collection => Target::Collection(config.query_for(&path)),
                };
                Some((generation, target))
            }
            Err(e) => {
                self.emit_all(events);
                self.fail(generation, e.into());
                None
            }
        }
    }

    /// One-shot read. The receiver completes when the result has been
    /// applied (or dropped as stale).
    fn start_get(self: &Arc<Self>) -> Option<oneshot::Receiver<()>> {
        let (generation, target) = self.begin_request()?;
        let (done_tx, done_rx) = oneshot::channel();
        let store = Arc::clone(&self.store);
        let weak = Arc::downgrade(self);

        let task = self.runtime.spawn(async move {
            let result = match target {
                Target::Doc(path) => store.get_doc(&path).await.and_then(decode_doc),
                Target::Collection(query) => {
                    store.get_collection(&query).await.and_then(decode_collection)
                }
            };
            if let Some(inner) = weak.upgrade() {
                match result {
                    Ok(received) => inner.deliver(generation, received),
                    Err(e) => inner.fail(generation, e.into()),
                }
            }
            let _ = done_tx.send(());
        });

        let mut shared = self.shared.lock();
        if self.is_current(generation) && shared.state != BindingState::TornDown {
            shared.in_flight = Some(task);
        }
        Some(done_rx)
    }

    fn start_watch(self: &Arc<Self>) {
        let Some((generation, target)) = self.begin_request() else {
            return;
        };
        let weak = Arc::downgrade(self);

        let subscribed = match target {
            Target::Doc(path) => self.store.watch_doc(
                &path,
                Arc::new(move |snapshot: Result<Option<Value>, RemoteError>| {
                    if let Some(inner) = weak.upgrade() {
                        match snapshot.and_then(decode_doc) {
                            Ok(received) => inner.deliver(generation, received),
                            Err(e) => inner.fail(generation, e.into()),
                        }
                    }
                }),
            ),
            Target::Collection(query) => self.store.watch_collection(
                &query,
                Arc::new(move |snapshot: Result<Vec<Value>, RemoteError>| {
                    if let Some(inner) = weak.upgrade() {
                        match snapshot.and_then(decode_collection) {
                            Ok(received) => inner.deliver(generation, received),
                            Err(e) => inner.fail(generation, e.into()),
                        }
                    }
                }),
            ),
        };

        let unsubscribe = match subscribed {
            Ok(unsubscribe) => unsubscribe,
            Err(e) => {
                self.fail(generation, e.into());
                return;
            }
        };

        let mut shared = self.shared.lock();
        if !self.is_current(generation) || shared.state == BindingState::TornDown {
            // Failed or superseded while subscribing (possibly from inside
            // the initial snapshot).
            drop(shared);
            unsubscribe();
            return;
        }
        shared.subscription = Some(unsubscribe);
        let became_active = shared.state != BindingState::Active;
        shared.state = BindingState::Active;
        drop(shared);
        if became_active {
            self.events
                .emit(&BindingEvent::StateChanged(BindingState::Active));
        }
    }

    // -----------------------------------------------------------------------
    // Outcomes
    // -----------------------------------------------------------------------

    /// Apply a snapshot. Each snapshot claims a sequence number before the
    /// hooks run; one that finishes after a later snapshot was stored is
    /// dropped.
    fn deliver(&self, generation: u64, received: Received<T>) {
        let seq = {
            let mut shared = self.shared.lock();
            if !self.is_current(generation) || shared.state == BindingState::TornDown {
                tracing::debug!(generation, "discarding superseded result");
                return;
            }
            shared.next_seq += 1;
            shared.next_seq
        };
        let Ok(config) = &self.config else {
            return;
        };

        let derived = apply_mutation(
            &received,
            config.hooks.mutate.as_ref(),
            config.hooks.on_receive.as_ref(),
            &self.on_error,
        );

        let mut events = Vec::new();
        {
            let mut shared = self.shared.lock();
            if !self.is_current(generation) || shared.state == BindingState::TornDown {
                return;
            }
            if seq < shared.applied_seq {
                tracing::debug!(seq, applied = shared.applied_seq, "discarding out-of-order snapshot");
                return;
            }
            shared.applied_seq = seq;
            shared.data = Some(received);
            shared.mutated = derived;
            shared.error = None;
            if shared.loading {
                shared.loading = false;
                events.push(BindingEvent::Loading(false));
            }
            if shared.state != BindingState::Active {
                shared.state = BindingState::Active;
                events.push(BindingEvent::StateChanged(BindingState::Active));
            }
            events.push(BindingEvent::Data);
        }
        self.emit_all(events);
    }

    /// Route `err` to the sink and fall back to `Idle`, releasing the
    /// request that produced it.
    fn fail(&self, generation: u64, err: BindError) {
        let (sub, task, mut events) = {
            let mut shared = self.shared.lock();
            if !self.is_current(generation) || shared.state == BindingState::TornDown {
                return;
            }
            self.advance();
            let mut events = Vec::new();
            shared.error = Some(err.clone());
            if shared.loading {
                shared.loading = false;
                events.push(BindingEvent::Loading(false));
            }
            if shared.state != BindingState::Idle {
                shared.state = BindingState::Idle;
                events.push(BindingEvent::StateChanged(BindingState::Idle));
            }
            (shared.subscription.take(), shared.in_flight.take(), events)
        };
        if let Some(unsubscribe) = sub {
            unsubscribe();
        }
        // The failing read itself may be running this code; dropping the
        // handle detaches it instead of aborting.
        drop(task);

        tracing::debug!(error = %err, "binding request failed");
        report(&self.on_error, err.clone());
        events.push(BindingEvent::Error(err));
        self.emit_all(events);
    }

    fn stop(&self) {
        let (sub, task, events) = {
            let mut shared = self.shared.lock();
            if shared.state == BindingState::TornDown {
                return;
            }
            self.advance();
            let mut events = Vec::new();
            if shared.loading {
                shared.loading = false;
                events.push(BindingEvent::Loading(false));
            }
            if shared.state != BindingState::Idle {
                shared.state = BindingState::Idle;
                events.push(BindingEvent::StateChanged(BindingState::Idle));
            }
            (shared.subscription.take(), shared.in_flight.take(), events)
        };
        if let Some(debouncer) = &self.debouncer {
            debouncer.cancel();
        }
        if let Some(task) = task {
            task.abort();
        }
        if let Some(unsubscribe) = sub {
            unsubscribe();
        }
        self.emit_all(events);
    }

    fn dispose(&self) {
        let (sub, task, vars) = {
            let mut shared = self.shared.lock();
            if shared.state == BindingState::TornDown {
                return;
            }
            self.advance();
            shared.state = BindingState::TornDown;
            (
                shared.subscription.take(),
                shared.in_flight.take(),
                shared.variables_unsub.take(),
            )
        };
        if let Some(debouncer) = &self.debouncer {
            debouncer.cancel();
        }
        if let Some(task) = task {
            task.abort();
        }
        if let Some(unsubscribe) = sub {
            unsubscribe();
        }
        if let Some(unsubscribe) = vars {
            unsubscribe();
        }
        tracing::debug!("binding torn down");
        self.events
            .emit(&BindingEvent::StateChanged(BindingState::TornDown));
        self.events.clear();
    }
}

// ============================================================================
// Binding
// ============================================================================

/// Owner handle of a binding. Dropping it tears the binding down.
///
/// `T` is the record type remote JSON is decoded into; `M` is the type
/// produced by the `mutate` hook.
pub struct Binding<T, M = ()>
where
    T: DeserializeOwned + Send + Sync + 'static,
    M: Send + Sync + 'static,
{
    inner: Arc<Inner<T, M>>,
}

impl<T, M> Binding<T, M>
where
    T: DeserializeOwned + Send + Sync + 'static,
    M: Send + Sync + 'static,
{
    /// Validate `config` and start the binding.
    ///
    /// An invalid configuration never panics or returns an error: it is
    /// reported to the error sink, exposed through [`Binding::error`], and
    /// the binding stays `Idle` without contacting the store.
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime.
    pub fn new(store: Arc<dyn RemoteStore>, config: BindingConfig<T, M>) -> Self {
        let runtime = Handle::current();
        let normalized = normalize(&config);
        let on_error = match &normalized {
            Ok(n) => Arc::clone(&n.on_error),
            Err(_) => config.error_sink(),
        };

        let initial_loading = match &normalized {
            Ok(n) => n.options.initial_loading,
            Err(_) => config
                .options
                .initial_loading
                .unwrap_or(DEFAULT_INITIAL_LOADING),
        };
        let debouncer = normalized
            .as_ref()
            .ok()
            .map(|n| Debouncer::with_handle(n.options.debounce_duration(), runtime.clone()));

        let inner = Arc::new(Inner {
            store,
            config: normalized,
            on_error,
            shared: Mutex::new(Shared {
                state: BindingState::Idle,
                resolved_path: None,
                data: None,
                mutated: None,
                loading: initial_loading,
                error: None,
                subscription: None,
                in_flight: None,
                variables_unsub: None,
                next_seq: 0,
                applied_seq: 0,
            }),
            events: EventEmitter::new(),
            debouncer,
            runtime,
            generation: AtomicU64::new(0),
        });

        match &inner.config {
            Err(e) => {
                tracing::debug!(error = %e, "binding configuration rejected");
                let err = BindError::from(e.clone());
                inner.shared.lock().error = Some(err.clone());
                report(&inner.on_error, err);
            }
            Ok(config) => {
                let weak = Arc::downgrade(&inner);
                let unsub = config.variables.subscribe_all(Arc::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_variable_change();
                    }
                }));
                inner.shared.lock().variables_unsub = Some(unsub);

                if config.options.manual {
                    inner.recompute_path();
                } else {
                    inner.run_configured();
                }
            }
        }

        Self { inner }
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// One-shot read at the current path, whatever the configured mode.
    /// Resolves once the result (or error) has been applied.
    pub async fn get_data(&self) {
        if let Some(done) = self.inner.start_get() {
            let _ = done.await;
        }
    }

    /// Open a subscription at the current path, replacing any live one.
    pub fn watch_data(&self) {
        self.inner.start_watch();
    }

    /// Re-run the configured mode now, skipping any pending debounce.
    pub async fn refresh(&self) {
        if let Some(debouncer) = &self.inner.debouncer {
            debouncer.cancel();
        }
        match self.inner.config.as_ref().map(|c| c.options.fetch_mode) {
            Ok(FetchMode::Get) => self.get_data().await,
            Ok(FetchMode::Watch) => self.watch_data(),
            Err(e) => report(&self.inner.on_error, e.clone()),
        }
    }

    /// Release the live subscription (or abandon an in-flight read) and go
    /// back to `Idle`. Data already received is kept.
    pub fn stop_watching(&self) {
        self.inner.stop();
    }

    /// Tear the binding down. Idempotent; also runs on drop.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    // -----------------------------------------------------------------------
    // Observation
    // -----------------------------------------------------------------------

    pub fn state(&self) -> BindingState {
        self.inner.shared.lock().state
    }

    pub fn loading(&self) -> bool {
        self.inner.shared.lock().loading
    }

    /// The latest error, cleared by the next successful delivery.
    pub fn error(&self) -> Option<BindError> {
        self.inner.shared.lock().error.clone()
    }

    pub fn resolved_path(&self) -> Option<String> {
        self.inner.shared.lock().resolved_path.clone()
    }

    pub fn data(&self) -> Option<Received<T>>
    where
        T: Clone,
    {
        self.inner.shared.lock().data.clone()
    }

    pub fn mutated_data(&self) -> Option<M>
    where
        M: Clone,
    {
        self.inner.shared.lock().mutated.clone()
    }

    /// Borrow the current data without cloning it.
    pub fn with_data<R>(&self, f: impl FnOnce(Option<&Received<T>>) -> R) -> R {
        let shared = self.inner.shared.lock();
        f(shared.data.as_ref())
    }

    /// Options after defaults, or the configuration error.
    pub fn config(&self) -> Result<&crate::config::NormalizedOptions, &ConfigError> {
        self.inner.config.as_ref().map(|c| &c.options)
    }

    pub fn on_event(&self, listener: impl Fn(&BindingEvent) + Send + Sync + 'static) -> ListenerId {
        self.inner.events.on(listener)
    }

    pub fn off(&self, id: ListenerId) {
        self.inner.events.off(id);
    }
}

impl<T, M> Drop for Binding<T, M>
where
    T: DeserializeOwned + Send + Sync + 'static,
    M: Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl<T, M> std::fmt::Debug for Binding<T, M>
where
    T: DeserializeOwned + Send + Sync + 'static,
    M: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.inner.shared.lock();
        f.debug_struct("Binding")
            .field("state", &shared.state)
            .field("resolved_path", &shared.resolved_path)
            .field("loading", &shared.loading)
            .field("error", &shared.error)
            .finish()
    }
}
