#![forbid(unsafe_code)]

//! Fine-grained reactive state for FrankenRx.
//!
//! This crate tracks which computations read which pieces of plain data and
//! reruns exactly those computations when the data changes:
//!
//! - [`Runtime`]: the tracking context. Owns the dependency store, the
//!   identity registry, the exemption set and the run stack.
//! - [`Reactive`]: an observable wrapper over a [`RawObject`] (object, array,
//!   map or set). Reads track, writes trigger.
//! - [`Effect`]: a function rerun whenever something it read changes.
//! - [`Ref`]: a single observable slot; [`Computed`] is a lazily evaluated
//!   ref derived from other state.
//!
//! # Architecture
//!
//! Everything is single-threaded and synchronous. Shared state uses
//! `Rc`/`RefCell`; wrappers, refs and effects hold their runtime weakly, and
//! the raw ↔ wrapper registry is weak in both directions. Raw storage is the
//! only source of truth; wrappers are created lazily on read, never by
//! walking an object graph up front.
//!
//! # Invariants
//!
//! 1. A raw container has at most one live wrapper; observing a wrapper
//!    returns it unchanged.
//! 2. Raw storage never contains a wrapper.
//! 3. An effect is subscribed to exactly what it read during its latest run.
//! 4. One mutation reruns each subscriber at most once.
//! 5. Writing a value strictly equal to the current one notifies nobody.
//!
//! # Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use frx_core::{Runtime, Value, object};
//!
//! let rt = Runtime::new();
//! let state = rt.observe(object! { "count" => 1 });
//!
//! let seen = Rc::new(Cell::new(0.0));
//! let sink = Rc::clone(&seen);
//! let reader = state.clone();
//! rt.effect(move || sink.set(reader.get("count").as_f64().unwrap_or(0.0)));
//! assert_eq!(seen.get(), 1.0);
//!
//! state.set("count", 2);
//! assert_eq!(seen.get(), 2.0);
//! assert_eq!(state.get("count"), Value::from(2));
//! ```

mod collection;
pub mod computed;
pub mod config;
mod dep;
pub mod diagnostics;
pub mod effect;
pub mod error;
mod exempt;
mod identity;
pub mod raw;
pub mod reactive;
pub mod reference;
pub mod runtime;
pub mod value;

pub use computed::Computed;
pub use config::RuntimeConfig;
pub use dep::{TargetId, TriggerKind};
pub use diagnostics::{CollectingSink, Diagnostic, DiagnosticsSink, Severity, TracingSink};
pub use effect::{Effect, EffectOptions, Scheduler};
pub use error::{ReactivityError, Result};
pub use raw::{MAX_ARRAY_LEN, RawKind, RawObject};
pub use reactive::{PropertyAccess, Reactive};
pub use reference::{Ref, RefMap};
pub use runtime::{Runtime, RuntimeStats, WeakRuntime, is_observable, is_ref, to_raw, unref};
pub use value::{MAX_INDEX, MapKey, Opaque, PropKey, Symbol, Value};
