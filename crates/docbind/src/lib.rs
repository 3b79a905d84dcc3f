//! docbind: reactive bindings from path templates to remote documents and
//! collections.
//!
//! A [`Binding`] resolves a path template such as `users/$uid` from reactive
//! variables, reads or watches the result through a [`RemoteStore`], runs the
//! caller's `mutate`/`on_receive` hooks, and re-resolves (debounced) whenever
//! a variable changes.
//!
//! ```ignore
//! let uid = Signal::new("42");
//! let binding: Binding<User> = Binding::new(
//!     store,
//!     BindingConfig::new("users/$uid").doc().watch().variable("uid", uid.clone()),
//! );
//! uid.set("43"); // re-subscribes to users/43 after 200 ms
//! ```

pub mod binding;
pub mod config;
pub mod debounce;
pub mod error;
pub mod mutation;
pub mod path;
pub mod query;
pub mod reactive;
pub mod store;
pub mod types;

pub use binding::{Binding, BindingEvent, BindingState};
pub use config::{normalize, normalize_options, BindingConfig, BindingOptions, NormalizedConfig, NormalizedOptions};
pub use error::{BindError, CallbackError, ConfigError, RemoteError, RemoteErrorKind, Result};
pub use mutation::{apply_mutation, Received};
pub use path::{resolve_path, PathTemplate};
pub use query::{CollectionRef, FilterOp, Query, SortDirection};
pub use reactive::{ReactiveCell, Signal, VariableMap};
pub use store::{MemoryStore, RemoteStore};
pub use types::{FetchMode, QueryType, VarValue};
