//! Delivery of raw data to the caller's `mutate` and `on_receive` hooks.

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::Serialize;

use crate::{
    config::{ErrorSink, MutateFn, ReceiveFn},
    error::{panic_message, BindError, CallbackError},
    types::QueryType,
};

/// Raw data as delivered by the store: every record of a collection, or the
/// document (absent when it does not exist).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Received<T> {
    Collection(Vec<T>),
    Doc(Option<T>),
}

impl<T> Received<T> {
    /// Record count: collection length, or 0/1 for a document.
    pub fn len(&self) -> usize {
        match self {
            Received::Collection(items) => items.len(),
            Received::Doc(doc) => usize::from(doc.is_some()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_collection(&self) -> Option<&[T]> {
        match self {
            Received::Collection(items) => Some(items),
            Received::Doc(_) => None,
        }
    }

    pub fn as_doc(&self) -> Option<&T> {
        match self {
            Received::Doc(doc) => doc.as_ref(),
            Received::Collection(_) => None,
        }
    }

    pub fn query_type(&self) -> QueryType {
        match self {
            Received::Collection(_) => QueryType::Collection,
            Received::Doc(_) => QueryType::Doc,
        }
    }
}

/// Run `mutate` over `raw`, then hand both to `on_receive`.
///
/// Returns the derived data (`None` when `mutate` is absent or failed).
/// Errors and panics from either hook go to `on_error`; `on_receive` still
/// runs after a failed `mutate`, with `None` as derived data.
pub fn apply_mutation<T, M>(
    raw: &Received<T>,
    mutate: Option<&MutateFn<T, M>>,
    on_receive: Option<&ReceiveFn<T, M>>,
    on_error: &ErrorSink,
) -> Option<M> {
    let derived = mutate.and_then(|f| {
        match catch_unwind(AssertUnwindSafe(|| f(raw))) {
            Ok(Ok(m)) => Some(m),
            Ok(Err(e)) => {
                report(on_error, CallbackError::Mutate {
                    message: e.to_string(),
                });
                None
            }
            Err(payload) => {
                report(on_error, CallbackError::Mutate {
                    message: panic_message(payload.as_ref()),
                });
                None
            }
        }
    });

    if let Some(f) = on_receive {
        match catch_unwind(AssertUnwindSafe(|| f(raw, derived.as_ref()))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => report(on_error, CallbackError::OnReceive {
                message: e.to_string(),
            }),
            Err(payload) => report(on_error, CallbackError::OnReceive {
                message: panic_message(payload.as_ref()),
            }),
        }
    }

    derived
}

/// Deliver `err` to the sink. A panicking sink is swallowed.
pub(crate) fn report(on_error: &ErrorSink, err: impl Into<BindError>) {
    let err = err.into();
    let _ = catch_unwind(AssertUnwindSafe(|| on_error(&err)));
}
