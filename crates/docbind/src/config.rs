//! Binding configuration: the caller-facing options, their defaults, and the
//! eager validation that turns them into a [`NormalizedConfig`].
//!
//! | option           | default                  |
//! |------------------|--------------------------|
//! | `path`           | required                 |
//! | `variables`      | empty                    |
//! | `debounce`       | 200 ms                   |
//! | `initialLoading` | `true`                   |
//! | `manual`         | `false`                  |
//! | `onError`        | `tracing::error!`        |
//! | `queryType`      | required                 |
//! | `query`          | identity (collection only) |
//! | `mutate`         | none                     |
//! | `onReceive`      | none                     |
//! | `type`           | required                 |

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{BindError, ConfigError, HookError},
    mutation::Received,
    path::{check_variables, PathTemplate},
    query::{CollectionRef, Query},
    reactive::{ReactiveCell, VariableMap},
    types::{FetchMode, QueryType},
};

pub const DEFAULT_DEBOUNCE_MS: u64 = 200;
pub const DEFAULT_INITIAL_LOADING: bool = true;
pub const DEFAULT_MANUAL: bool = false;

// ============================================================================
// Hook types
// ============================================================================

/// Receives every error a binding produces.
pub type ErrorSink = Arc<dyn Fn(&BindError) + Send + Sync>;
/// Refines the collection query before it is sent to the store.
pub type QueryFn = Arc<dyn Fn(CollectionRef) -> Query + Send + Sync>;
/// Derives secondary data from what the store delivered.
pub type MutateFn<T, M> = Arc<dyn Fn(&Received<T>) -> Result<M, HookError> + Send + Sync>;
/// Called on every delivery with the raw and derived data.
pub type ReceiveFn<T, M> =
    Arc<dyn Fn(&Received<T>, Option<&M>) -> Result<(), HookError> + Send + Sync>;

/// The sink used when no `on_error` hook is configured.
pub fn default_error_sink() -> ErrorSink {
    Arc::new(|e: &BindError| {
        tracing::error!(error = %e, "binding error");
    })
}

// ============================================================================
// BindingOptions: plain data part
// ============================================================================

/// The data-only options. Deserializes from the camelCase JSON shape
/// (`{"path": "...", "queryType": "doc", "type": "get", "debounce": 100}`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingOptions {
    pub path: Option<String>,
    pub debounce: Option<u64>,
    pub initial_loading: Option<bool>,
    pub manual: Option<bool>,
    pub query_type: Option<QueryType>,
    #[serde(rename = "type")]
    pub fetch_mode: Option<FetchMode>,
}

impl BindingOptions {
    /// Parse options from JSON. Unknown `queryType` / `type` names are
    /// reported as such, other shape problems as [`ConfigError::Malformed`].
    pub fn from_json(value: &Value) -> Result<Self, ConfigError> {
        if let Some(qt) = value.get("queryType").and_then(Value::as_str) {
            qt.parse::<QueryType>()?;
        }
        if let Some(mode) = value.get("type").and_then(Value::as_str) {
            mode.parse::<FetchMode>()?;
        }
        serde_json::from_value(value.clone()).map_err(|e| ConfigError::Malformed(e.to_string()))
    }
}

/// Options with every default applied and every required field present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedOptions {
    pub path: String,
    /// Milliseconds.
    pub debounce: u64,
    pub initial_loading: bool,
    pub manual: bool,
    pub query_type: QueryType,
    #[serde(rename = "type")]
    pub fetch_mode: FetchMode,
}

impl NormalizedOptions {
    pub fn debounce_duration(&self) -> Duration {
        Duration::from_millis(self.debounce)
    }

    pub fn to_options(&self) -> BindingOptions {
        BindingOptions {
            path: Some(self.path.clone()),
            debounce: Some(self.debounce),
            initial_loading: Some(self.initial_loading),
            manual: Some(self.manual),
            query_type: Some(self.query_type),
            fetch_mode: Some(self.fetch_mode),
        }
    }
}

/// Apply defaults and check required fields.
pub fn normalize_options(options: &BindingOptions) -> Result<NormalizedOptions, ConfigError> {
    let path = options.path.clone().ok_or(ConfigError::MissingField("path"))?;
    if path.trim().is_empty() {
        return Err(ConfigError::EmptyPath);
    }
    let query_type = options.query_type.ok_or(ConfigError::MissingField("queryType"))?;
    let fetch_mode = options.fetch_mode.ok_or(ConfigError::MissingField("type"))?;

    Ok(NormalizedOptions {
        path,
        debounce: options.debounce.unwrap_or(DEFAULT_DEBOUNCE_MS),
        initial_loading: options.initial_loading.unwrap_or(DEFAULT_INITIAL_LOADING),
        manual: options.manual.unwrap_or(DEFAULT_MANUAL),
        query_type,
        fetch_mode,
    })
}

// ============================================================================
// Hooks
// ============================================================================

pub struct Hooks<T, M> {
    pub on_error: Option<ErrorSink>,
    pub query: Option<QueryFn>,
    pub mutate: Option<MutateFn<T, M>>,
    pub on_receive: Option<ReceiveFn<T, M>>,
}

impl<T, M> Default for Hooks<T, M> {
    fn default() -> Self {
        Self {
            on_error: None,
            query: None,
            mutate: None,
            on_receive: None,
        }
    }
}

impl<T, M> Clone for Hooks<T, M> {
    fn clone(&self) -> Self {
        Self {
            on_error: self.on_error.clone(),
            query: self.query.clone(),
            mutate: self.mutate.clone(),
            on_receive: self.on_receive.clone(),
        }
    }
}

impl<T, M> std::fmt::Debug for Hooks<T, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("on_error", &self.on_error.is_some())
            .field("query", &self.query.is_some())
            .field("mutate", &self.mutate.is_some())
            .field("on_receive", &self.on_receive.is_some())
            .finish()
    }
}

// ============================================================================
// BindingConfig: what the caller assembles
// ============================================================================

/// Full binding request: options, variables and hooks.
///
/// ```ignore
/// let config = BindingConfig::<User>::new("users/$uid")
///     .doc()
///     .get()
///     .variable("uid", uid_signal.clone());
/// ```
pub struct BindingConfig<T, M = ()> {
    pub options: BindingOptions,
    pub variables: VariableMap,
    pub hooks: Hooks<T, M>,
}

impl<T, M> BindingConfig<T, M> {
    pub fn new(path: impl Into<String>) -> Self {
        Self::from_options(BindingOptions {
            path: Some(path.into()),
            ..Default::default()
        })
    }

    pub fn from_options(options: BindingOptions) -> Self {
        Self {
            options,
            variables: VariableMap::new(),
            hooks: Hooks::default(),
        }
    }

    pub fn query_type(mut self, query_type: QueryType) -> Self {
        self.options.query_type = Some(query_type);
        self
    }

    pub fn collection(self) -> Self {
        self.query_type(QueryType::Collection)
    }

    pub fn doc(self) -> Self {
        self.query_type(QueryType::Doc)
    }

    pub fn fetch_mode(mut self, mode: FetchMode) -> Self {
        self.options.fetch_mode = Some(mode);
        self
    }

    pub fn watch(self) -> Self {
        self.fetch_mode(FetchMode::Watch)
    }

    pub fn get(self) -> Self {
        self.fetch_mode(FetchMode::Get)
    }

    pub fn variable(mut self, name: impl Into<String>, cell: impl ReactiveCell + 'static) -> Self {
        self.variables.insert(name, Arc::new(cell));
        self
    }

    pub fn variables(mut self, variables: VariableMap) -> Self {
        self.variables = variables;
        self
    }

    pub fn debounce(mut self, ms: u64) -> Self {
        self.options.debounce = Some(ms);
        self
    }

    pub fn initial_loading(mut self, loading: bool) -> Self {
        self.options.initial_loading = Some(loading);
        self
    }

    pub fn manual(mut self, manual: bool) -> Self {
        self.options.manual = Some(manual);
        self
    }

    pub fn on_error(mut self, f: impl Fn(&BindError) + Send + Sync + 'static) -> Self {
        self.hooks.on_error = Some(Arc::new(f));
        self
    }

    pub fn query(mut self, f: impl Fn(CollectionRef) -> Query + Send + Sync + 'static) -> Self {
        self.hooks.query = Some(Arc::new(f));
        self
    }

    pub fn mutate(
        mut self,
        f: impl Fn(&Received<T>) -> Result<M, HookError> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.mutate = Some(Arc::new(f));
        self
    }

    pub fn on_receive(
        mut self,
        f: impl Fn(&Received<T>, Option<&M>) -> Result<(), HookError> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.on_receive = Some(Arc::new(f));
        self
    }

    /// The sink errors should go to, even when the rest of the config is
    /// invalid.
    pub fn error_sink(&self) -> ErrorSink {
        self.hooks.on_error.clone().unwrap_or_else(default_error_sink)
    }
}

impl<T, M> Clone for BindingConfig<T, M> {
    fn clone(&self) -> Self {
        Self {
            options: self.options.clone(),
            variables: self.variables.clone(),
            hooks: self.hooks.clone(),
        }
    }
}

impl<T, M> std::fmt::Debug for BindingConfig<T, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingConfig")
            .field("options", &self.options)
            .field("variables", &self.variables)
            .field("hooks", &self.hooks)
            .finish()
    }
}

// ============================================================================
// NormalizedConfig
// ============================================================================

/// A validated configuration, ready to drive a binding.
pub struct NormalizedConfig<T, M> {
    pub options: NormalizedOptions,
    pub template: PathTemplate,
    pub variables: VariableMap,
    pub hooks: Hooks<T, M>,
    /// `hooks.on_error` or the default sink.
    pub on_error: ErrorSink,
}

impl<T, M> NormalizedConfig<T, M> {
    /// The query to run against `resolved_path` for a collection binding.
    pub fn query_for(&self, resolved_path: &str) -> Query {
        let coll = CollectionRef::new(resolved_path);
        match &self.hooks.query {
            Some(refine) => refine(coll),
            None => coll.into_query(),
        }
    }

    pub fn to_config(&self) -> BindingConfig<T, M> {
        BindingConfig {
            options: self.options.to_options(),
            variables: self.variables.clone(),
            hooks: self.hooks.clone(),
        }
    }
}

impl<T, M> Clone for NormalizedConfig<T, M> {
    fn clone(&self) -> Self {
        Self {
            options: self.options.clone(),
            template: self.template.clone(),
            variables: self.variables.clone(),
            hooks: self.hooks.clone(),
            on_error: Arc::clone(&self.on_error),
        }
    }
}

impl<T, M> std::fmt::Debug for NormalizedConfig<T, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NormalizedConfig")
            .field("options", &self.options)
            .field("variables", &self.variables)
            .field("hooks", &self.hooks)
            .finish()
    }
}

/// Validate `config` and apply defaults.
///
/// Rejects missing required options, a `query` hook on a document binding,
/// and path placeholders with no matching variable.
pub fn normalize<T, M>(config: &BindingConfig<T, M>) -> Result<NormalizedConfig<T, M>, ConfigError> {
    let options = normalize_options(&config.options)?;

    if options.query_type == QueryType::Doc && config.hooks.query.is_some() {
        return Err(ConfigError::QueryOnDocument);
    }

    let template = PathTemplate::parse(options.path.clone());
    check_variables(&template, &config.variables)?;

    Ok(NormalizedConfig {
        options,
        template,
        variables: config.variables.clone(),
        hooks: config.hooks.clone(),
        on_error: config.error_sink(),
    })
}

// ============================================================================
// Tests
// ============================================================================
