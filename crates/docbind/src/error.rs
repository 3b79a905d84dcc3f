use std::fmt;
use thiserror::Error;

/// Boxed error returned by caller-supplied hooks (`mutate`, `on_receive`).
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// A binding configuration that cannot be executed. Detected before any
/// remote call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Path variable \"${name}\" has no entry in the variables map")]
    MissingVariable { name: String },

    #[error("The \"query\" option is only valid for collection bindings")]
    QueryOnDocument,

    #[error("Unknown queryType \"{0}\": expected \"collection\" or \"doc\"")]
    UnknownQueryType(String),

    #[error("Unknown fetch type \"{0}\": expected \"watch\" or \"get\"")]
    UnknownFetchMode(String),

    #[error("Missing required option \"{0}\"")]
    MissingField(&'static str),

    #[error("Binding path is empty")]
    EmptyPath,

    #[error("Malformed binding options: {0}")]
    Malformed(String),
}

// ---------------------------------------------------------------------------
// RemoteError
// ---------------------------------------------------------------------------

/// Broad classification of a failure reported by the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    Unavailable,
    NotFound,
    PermissionDenied,
    /// Remote data could not be decoded into the binding's record type.
    Decode,
    Other,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RemoteErrorKind::Unavailable => "unavailable",
            RemoteErrorKind::NotFound => "not found",
            RemoteErrorKind::PermissionDenied => "permission denied",
            RemoteErrorKind::Decode => "decode",
            RemoteErrorKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// Failure reported by a [`RemoteStore`](crate::store::RemoteStore) or while
/// decoding what it returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Remote error ({kind}): {message}")]
pub struct RemoteError {
    pub message: String,
    pub kind: RemoteErrorKind,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: RemoteErrorKind::Other,
        }
    }

    pub fn with_kind(message: impl Into<String>, kind: RemoteErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    pub fn decode(source: &serde_json::Error) -> Self {
        Self::with_kind(source.to_string(), RemoteErrorKind::Decode)
    }
}

// ---------------------------------------------------------------------------
// CallbackError
// ---------------------------------------------------------------------------

/// Failure (error return or panic) inside a caller-supplied hook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackError {
    #[error("mutate hook failed: {message}")]
    Mutate { message: String },

    #[error("onReceive hook failed: {message}")]
    OnReceive { message: String },
}

// ---------------------------------------------------------------------------
// BindError: top-level rollup
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Callback(#[from] CallbackError),
}

impl BindError {
    pub fn is_config(&self) -> bool {
        matches!(self, BindError::Config(_))
    }
}

/// Convenience alias: the default error type is `BindError`.
pub type Result<T, E = BindError> = std::result::Result<T, E>;

/// Render a caught panic payload as a message.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
