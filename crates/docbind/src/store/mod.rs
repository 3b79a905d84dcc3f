//! The remote fetch/watch engine a binding talks to.
//!
//! - [`RemoteStore`]: user-provided document/collection backend.
//! - [`memory`]: [`MemoryStore`], an in-process implementation.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::{error::RemoteError, query::Query, reactive::Unsubscribe};

pub use memory::MemoryStore;

/// Receives every snapshot of a watched document (`None` = does not exist).
pub type DocListener = Arc<dyn Fn(Result<Option<Value>, RemoteError>) + Send + Sync>;
/// Receives every snapshot of a watched collection query.
pub type CollectionListener = Arc<dyn Fn(Result<Vec<Value>, RemoteError>) + Send + Sync>;

/// Document/collection backend.
///
/// Paths are the resolved binding paths (`users/42`, `rooms/lobby/messages`).
/// Watch listeners may be invoked synchronously from inside `watch_*` (for
/// the initial snapshot) and from any thread afterwards. After the returned
/// [`Unsubscribe`] runs, no further snapshots may be delivered.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// One-shot read of a single document.
    async fn get_doc(&self, path: &str) -> Result<Option<Value>, RemoteError>;

    /// One-shot read of a collection query.
    async fn get_collection(&self, query: &Query) -> Result<Vec<Value>, RemoteError>;

    /// Subscribe to a single document.
    fn watch_doc(&self, path: &str, listener: DocListener) -> Result<Unsubscribe, RemoteError>;

    /// Subscribe to a collection query.
    fn watch_collection(
        &self,
        query: &Query,
        listener: CollectionListener,
    ) -> Result<Unsubscribe, RemoteError>;
}
