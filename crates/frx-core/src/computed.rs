#![forbid(unsafe_code)]

//! Lazy computed values.
//!
//! # Design
//!
//! A [`Computed`] is a boxed reference backed by a lazy effect flagged
//! `computed`. The effect's scheduler does not rerun the getter; it only
//! marks the cached value dirty and notifies whoever read the computed. The
//! next [`get()`](Computed::get) reruns the getter under tracking and caches
//! the result.
//!
//! # Invariants
//!
//! 1. `get()` never returns a value older than the latest completed write to
//!    any dependency.
//! 2. The getter runs at most once per dirtying, and only when read.
//! 3. `version` increments by exactly 1 per recomputation.
//! 4. Readers are notified once per clean-to-dirty transition, not once per
//!    dependency write.
//!
//! # Failure Modes
//!
//! - **Getter panics**: the cached value remains from the last successful
//!   run and the dirty flag stays set, so the next `get()` retries.
//! - **Runtime dropped**: the getter runs untracked on every read.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::dep::next_id;
use crate::effect::{Effect, EffectOptions};
use crate::reference::{Ref, RefKind, RefNode};
use crate::runtime::Runtime;
use crate::value::Value;

/// Shared interior of a computed ref.
pub(crate) struct ComputedState {
    effect: Effect,
    cached: RefCell<Value>,
    /// Whether the cached value is stale.
    dirty: Cell<bool>,
    version: Cell<u64>,
    setter: Option<Box<dyn Fn(Value)>>,
}

impl ComputedState {
    fn new(effect: Effect, setter: Option<Box<dyn Fn(Value)>>) -> Self {
        Self {
            effect,
            cached: RefCell::new(Value::Undefined),
            dirty: Cell::new(true),
            version: Cell::new(0),
            setter,
        }
    }

    pub(crate) fn read(&self, handle: &Ref) -> Value {
        if self.dirty.get() && !self.effect.is_running() {
            let value = self.effect.run();
            *self.cached.borrow_mut() = value;
            self.dirty.set(!handle.has_runtime());
            self.version.set(self.version.get() + 1);
        }
        handle.track_value();
        self.cached.borrow().clone()
    }

    pub(crate) fn write(&self, handle: &Ref, value: Value) {
        match &self.setter {
            Some(setter) => setter(value),
            None => handle.warn("computed value is readonly"),
        }
    }

    /// Marks the cache stale. Readers hear about it only on the transition.
    pub(crate) fn mark_dirty(&self, handle: &Ref) {
        if !self.dirty.replace(true) {
            handle.trigger_value();
        }
    }
}

/// A lazily evaluated, memoized value derived from observed state.
///
/// Cloning a `Computed` creates a new handle to the **same** cached value.
/// A computed is a ref: [`to_ref`](Self::to_ref) and `Value::from` expose it
/// as one.
#[derive(Clone)]
pub struct Computed {
    handle: Ref,
}

impl Computed {
    fn state(&self) -> Option<&ComputedState> {
        self.handle.computed_state()
    }

    /// Current value, recomputing first if a dependency changed.
    #[must_use]
    pub fn get(&self) -> Value {
        self.handle.get()
    }

    /// Calls the setter, or reports `computed value is readonly`.
    pub fn set(&self, value: impl Into<Value>) {
        self.handle.set(value);
    }

    /// Access the current value by reference without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        let value = self.get();
        f(&value)
    }

    /// Whether the cached value is stale.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.state().is_some_and(|s| s.dirty.get())
    }

    /// Force invalidation. The next `get()` recomputes and readers are
    /// notified.
    pub fn invalidate(&self) {
        if let Some(state) = self.state() {
            state.mark_dirty(&self.handle);
        }
    }

    /// Current version number. Increments by 1 on each recomputation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.state().map_or(0, |s| s.version.get())
    }

    /// The backing effect.
    #[must_use]
    pub fn effect(&self) -> Option<&Effect> {
        self.state().map(|s| &s.effect)
    }

    /// Stops dependency tracking. The computed keeps its last value until
    /// read while dirty.
    pub fn stop(&self) {
        if let Some(state) = self.state() {
            state.effect.stop();
        }
    }

    #[must_use]
    pub fn to_ref(&self) -> Ref {
        self.handle.clone()
    }
}

impl From<Computed> for Value {
    fn from(c: Computed) -> Self {
        Value::Ref(c.handle)
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cached = self.state().map(|s| s.cached.borrow().clone());
        f.debug_struct("Computed")
            .field("cached", &cached)
            .field("dirty", &self.is_dirty())
            .field("version", &self.version())
            .finish()
    }
}

impl Runtime {
    /// Read-only computed value.
    pub fn computed<F, R>(&self, mut getter: F) -> Computed
    where
        F: FnMut() -> R + 'static,
        R: Into<Value>,
    {
        self.build_computed(Box::new(move || getter().into()), None)
    }

    /// Computed value whose writes go to `setter`.
    pub fn computed_with_setter<F, R>(&self, mut getter: F, setter: impl Fn(Value) + 'static) -> Computed
    where
        F: FnMut() -> R + 'static,
        R: Into<Value>,
    {
        self.build_computed(Box::new(move || getter().into()), Some(Box::new(setter)))
    }

    fn build_computed(
        &self,
        getter: Box<dyn FnMut() -> Value>,
        setter: Option<Box<dyn Fn(Value)>>,
    ) -> Computed {
        let node = Rc::new_cyclic(|weak: &Weak<RefNode>| {
            let weak = weak.clone();
            let options = EffectOptions::new()
                .with_lazy(true)
                .with_computed(true)
                .with_scheduler(move |_| {
                    if let Some(handle) = Ref::upgrade(&weak)
                        && let Some(state) = handle.computed_state()
                    {
                        state.mark_dirty(&handle);
                    }
                });
            let effect = self.create_effect(getter, options);
            RefNode::new(
                next_id(),
                RefKind::Computed(ComputedState::new(effect, setter)),
                Rc::downgrade(self.inner()),
            )
        });
        Computed {
            handle: Ref::from_node(node),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;

    #[test]
    fn lazy_evaluation() {
        let rt = Runtime::new();
        let compute_count = Rc::new(Cell::new(0u32));
        let count_clone = Rc::clone(&compute_count);
        let source = rt.create_ref(42);
        let source_clone = source.clone();

        let computed = rt.computed(move || {
            count_clone.set(count_clone.get() + 1);
            source_clone.get().as_f64().unwrap_or(0.0) * 2.0
        });

        // Not computed yet.
        assert_eq!(compute_count.get(), 0);
        assert!(computed.is_dirty());

        assert_eq!(computed.get(), Value::from(84));
        assert_eq!(compute_count.get(), 1);

        // Cached.
        assert_eq!(computed.get(), Value::from(84));
        assert_eq!(compute_count.get(), 1);
        assert_eq!(computed.version(), 1);
    }

    #[test]
    fn memoization_until_dependency_changes() {
        let rt = Runtime::new();
        let source = rt.create_ref(10);
        let source_clone = source.clone();
        let computed = rt.computed(move || source_clone.get().as_f64().unwrap_or(0.0) * 2.0);

        assert_eq!(computed.get(), Value::from(20));
        source.set(5);
        assert!(computed.is_dirty());
        assert_eq!(computed.version(), 1);
        assert_eq!(computed.get(), Value::from(10));
        assert_eq!(computed.version(), 2);
    }

    #[test]
    fn invalidate_forces_recompute() {
        let rt = Runtime::new();
        let computed = rt.computed(|| 1);
        assert_eq!(computed.get(), Value::from(1));
        computed.invalidate();
        assert!(computed.is_dirty());
        assert_eq!(computed.get(), Value::from(1));
        assert_eq!(computed.version(), 2);
    }

    #[test]
    fn readonly_write_reports() {
        let sink = CollectingSink::new();
        let rt = Runtime::new().with_diagnostics(sink.clone());
        let computed = rt.computed(|| 1);
        computed.set(2);
        assert_eq!(sink.messages(), vec!["computed value is readonly"]);
        assert_eq!(computed.get(), Value::from(1));
    }

    #[test]
    fn setter_receives_writes() {
        let rt = Runtime::new();
        let source = rt.create_ref(1);
        let (read, write) = (source.clone(), source.clone());
        let plus_one = rt.computed_with_setter(
            move || read.get().as_f64().unwrap_or(0.0) + 1.0,
            move |v| write.set(v.as_f64().unwrap_or(0.0) - 1.0),
        );
        plus_one.set(10);
        assert_eq!(source.get(), Value::from(9));
        assert_eq!(plus_one.get(), Value::from(10));
    }

    #[test]
    fn computed_is_a_ref() {
        let rt = Runtime::new();
        let computed = rt.computed(|| 1);
        let value = Value::from(computed.clone());
        assert!(crate::is_ref(&value));
        assert!(computed.to_ref().is_computed());
        assert_eq!(
            format!("{computed:?}"),
            "Computed { cached: Some(Undefined), dirty: true, version: 0 }"
        );
    }
}
