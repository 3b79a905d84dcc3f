//! Reactive cells: a current value plus change notification.

use std::sync::Arc;

use parking_lot::RwLock;

use super::{event_emitter::EventEmitter, Unsubscribe};
use crate::types::VarValue;

/// Contract a path variable must satisfy.
///
/// Listeners are called synchronously after the value changes, with no
/// internal lock held, so they may read [`ReactiveCell::value`] again.
pub trait ReactiveCell: Send + Sync {
    /// The cell's current value.
    fn value(&self) -> VarValue;

    /// Register `listener` for change notifications. Calling the returned
    /// closure removes it.
    fn subscribe(&self, listener: Arc<dyn Fn() + Send + Sync>) -> Unsubscribe;
}

/// A mutable cell holding a [`VarValue`].
///
/// `Signal` is cheap to clone; clones share the same value and listeners.
#[derive(Clone)]
pub struct Signal {
    inner: Arc<SignalInner>,
}

struct SignalInner {
    value: RwLock<VarValue>,
    changed: EventEmitter<()>,
}

impl Signal {
    pub fn new(value: impl Into<VarValue>) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                value: RwLock::new(value.into()),
                changed: EventEmitter::new(),
            }),
        }
    }

    pub fn get(&self) -> VarValue {
        self.inner.value.read().clone()
    }

    /// Replace the value. Listeners fire only when the value actually
    /// changes.
    pub fn set(&self, value: impl Into<VarValue>) {
        let value = value.into();
        {
            let mut current = self.inner.value.write();
            if *current == value {
                return;
            }
            *current = value;
        }
        self.inner.changed.emit(&());
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.changed.size()
    }
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("value", &*self.inner.value.read())
            .field("subscribers", &self.inner.changed.size())
            .finish()
    }
}

impl ReactiveCell for Signal {
    fn value(&self) -> VarValue {
        self.get()
    }

    fn subscribe(&self, listener: Arc<dyn Fn() + Send + Sync>) -> Unsubscribe {
        let id = self.inner.changed.on(move |_| listener());
        let inner = Arc::clone(&self.inner);
        Box::new(move || inner.changed.off(id))
    }
}
