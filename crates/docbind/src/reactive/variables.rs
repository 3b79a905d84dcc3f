//! VariableMap: the reactive cells substituted into a path template.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{cell::ReactiveCell, Unsubscribe};
use crate::types::VarValue;

/// Mapping from placeholder name (without the `$`) to a reactive cell.
#[derive(Clone, Default)]
pub struct VariableMap {
    cells: BTreeMap<String, Arc<dyn ReactiveCell>>,
}

impl VariableMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, cell: impl ReactiveCell + 'static) -> Self {
        self.insert(name, Arc::new(cell));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, cell: Arc<dyn ReactiveCell>) {
        self.cells.insert(name.into(), cell);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ReactiveCell>> {
        self.cells.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.cells.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Current value of every cell.
    pub fn snapshot(&self) -> BTreeMap<String, VarValue> {
        self.cells
            .iter()
            .map(|(name, cell)| (name.clone(), cell.value()))
            .collect()
    }

    /// Subscribe `listener` to every cell. The returned closure removes all
    /// of the subscriptions.
    pub fn subscribe_all(&self, listener: Arc<dyn Fn() + Send + Sync>) -> Unsubscribe {
        let unsubs: Vec<Unsubscribe> = self
            .cells
            .values()
            .map(|cell| cell.subscribe(Arc::clone(&listener)))
            .collect();
        Box::new(move || {
            for unsub in unsubs {
                unsub();
            }
        })
    }
}

impl std::fmt::Debug for VariableMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.snapshot()).finish()
    }
}
