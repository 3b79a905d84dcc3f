//! Reactive primitives: cells that hold path variable values and notify
//! on change.
//!
//! # Modules
//!
//! - [`event_emitter`]: generic typed pub/sub ([`EventEmitter<T>`]).
//! - [`cell`]: [`ReactiveCell`] contract and the [`Signal`] cell.
//! - [`variables`]: [`VariableMap`], the name → cell table used by path
//!   templates.
//!
//! Bindings only rely on the [`ReactiveCell`] trait, so any cell type that
//! exposes a current value plus change notification can drive a binding.

pub mod cell;
pub mod event_emitter;
pub mod variables;

pub use cell::{ReactiveCell, Signal};
pub use event_emitter::{EventEmitter, ListenerId};
pub use variables::VariableMap;

/// An owned one-shot closure that removes a subscription when called.
pub type Unsubscribe = Box<dyn FnOnce() + Send + Sync>;
