#![forbid(unsafe_code)]

//! The reactive runtime: tracking context, wrapper factory and registries.
//!
//! A [`Runtime`] owns everything that would otherwise be process-wide state
//! (the dependency store, the identity registry, the exemption set and the run
//! stack), so independent runtimes can coexist in one process. Handles are
//! cheap clones of one shared interior.
//!
//! Wrappers, refs and effects created by a runtime hold it weakly. Once every
//! `Runtime` handle is gone they keep delegating to raw storage but no longer
//! track or trigger.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::config::RuntimeConfig;
use crate::dep::{DepStore, Target, TargetId, TrackKey, TriggerKind};
use crate::diagnostics::{DiagnosticsSink, Severity, TracingSink};
use crate::effect::{Effect, EffectNode, EffectOptions};
use crate::error::{ReactivityError, Result};
use crate::exempt::ExemptionSet;
use crate::identity::IdentityRegistry;
use crate::raw::RawObject;
use crate::reactive::Reactive;
use crate::value::Value;

pub(crate) struct RuntimeInner {
    config: RuntimeConfig,
    diagnostics: RefCell<Rc<dyn DiagnosticsSink>>,
    deps: RefCell<DepStore>,
    identity: RefCell<IdentityRegistry>,
    exempt: RefCell<ExemptionSet>,
    stack: RefCell<Vec<Rc<EffectNode>>>,
    tracking: Cell<bool>,
    tracking_history: RefCell<Vec<bool>>,
    trigger_depth: Cell<usize>,
    registrations: Cell<usize>,
}

/// Counts reported by [`Runtime::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuntimeStats {
    /// Targets with at least one dep.
    pub targets: usize,
    pub deps: usize,
    /// Effect memberships summed over all deps.
    pub subscriptions: usize,
    /// Registered raw ↔ wrapper pairs.
    pub wrappers: usize,
    pub exempt: usize,
    /// Effects currently running.
    pub stack_depth: usize,
}

/// Handle to a reactive runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

/// Non-owning runtime handle, for effects that need the runtime itself.
#[derive(Clone)]
pub struct WeakRuntime {
    inner: Weak<RuntimeInner>,
}

impl WeakRuntime {
    /// `None` once every [`Runtime`] handle has been dropped.
    #[must_use]
    pub fn upgrade(&self) -> Option<Runtime> {
        self.inner.upgrade().map(|inner| Runtime { inner })
    }
}

impl fmt::Debug for WeakRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakRuntime")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// Runtime with the default config and the `tracing` diagnostics sink.
    #[must_use]
    pub fn new() -> Self {
        Self::build(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: RuntimeConfig) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                config,
                diagnostics: RefCell::new(Rc::new(TracingSink)),
                deps: RefCell::new(DepStore::default()),
                identity: RefCell::new(IdentityRegistry::default()),
                exempt: RefCell::new(ExemptionSet::default()),
                stack: RefCell::new(Vec::new()),
                tracking: Cell::new(true),
                tracking_history: RefCell::new(Vec::new()),
                trigger_depth: Cell::new(0),
                registrations: Cell::new(0),
            }),
        }
    }

    /// Replaces the diagnostics sink.
    #[must_use]
    pub fn with_diagnostics(self, sink: impl DiagnosticsSink + 'static) -> Self {
        self.set_diagnostics(sink);
        self
    }

    pub fn set_diagnostics(&self, sink: impl DiagnosticsSink + 'static) {
        *self.inner.diagnostics.borrow_mut() = Rc::new(sink);
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakRuntime {
        WeakRuntime {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub(crate) fn inner(&self) -> &Rc<RuntimeInner> {
        &self.inner
    }

    // ─── wrapper factory ────────────────────────────────────────────────────

    /// Returns the observable wrapper for `value`.
    ///
    /// Primitives come back unchanged with a `value cannot be made reactive`
    /// diagnostic. Wrappers, refs, opaque built-ins and exempt containers come
    /// back unchanged silently. A raw container gets its one wrapper, created
    /// on first observation.
    pub fn observe(&self, value: impl Into<Value>) -> Value {
        let value = value.into();
        match &value {
            Value::Object(raw) => self.inner.wrap_raw(raw),
            Value::Reactive(_) | Value::Ref(_) | Value::Opaque(_) => value,
            _ => {
                if self.inner.config.warn_non_reactive {
                    self.inner.emit(
                        Severity::Warning,
                        &format!("value cannot be made reactive: {value}"),
                    );
                }
                value
            }
        }
    }

    /// Like [`observe`](Self::observe), but only succeeds with a wrapper.
    pub fn try_reactive(&self, value: impl Into<Value>) -> Result<Reactive> {
        match self.inner.to_reactive(value.into()) {
            Value::Reactive(r) => Ok(r),
            other => Err(ReactivityError::NotReactive {
                found: describe(&other),
            }),
        }
    }

    /// Raw form of a wrapper; anything else unchanged.
    #[must_use]
    pub fn unwrap(&self, value: &Value) -> Value {
        to_raw(value)
    }

    #[must_use]
    pub fn is_observable(&self, value: &Value) -> bool {
        is_observable(value)
    }

    /// Exempts a raw container from observation for good and returns it.
    ///
    /// Already-issued wrappers are unaffected; passing one is a no-op.
    pub fn mark_exempt(&self, value: impl Into<Value>) -> Value {
        let value = value.into();
        if let Value::Object(raw) = &value {
            self.inner.exempt.borrow_mut().insert(raw);
            self.inner.note_registration();
        }
        value
    }

    #[must_use]
    pub fn is_exempt(&self, value: &Value) -> bool {
        match value {
            Value::Object(raw) => self.inner.exempt.borrow().contains(raw),
            _ => false,
        }
    }

    // ─── effects ────────────────────────────────────────────────────────────

    /// Creates an effect and, unless `options.lazy`, runs it once.
    ///
    /// A tracked effect is owned by the runtime's deps until it is stopped.
    /// If its closure also owns a `Runtime` clone, the two keep each other
    /// alive and dropping the last outside handle does not tear the runtime
    /// down. Capture [`Runtime::downgrade`] instead, or stop the effect.
    pub fn create_effect<F, R>(&self, mut f: F, options: EffectOptions) -> Effect
    where
        F: FnMut() -> R + 'static,
        R: Into<Value>,
    {
        let lazy = options.lazy;
        let node = EffectNode::new(
            Box::new(move || f().into()),
            options,
            Rc::downgrade(&self.inner),
        );
        let effect = Effect::from_node(Rc::new(node));
        if !lazy {
            effect.run();
        }
        effect
    }

    /// Eager effect with default options.
    pub fn effect<F, R>(&self, f: F) -> Effect
    where
        F: FnMut() -> R + 'static,
        R: Into<Value>,
    {
        self.create_effect(f, EffectOptions::default())
    }

    // ─── tracking control ───────────────────────────────────────────────────

    /// Suspends tracking until the matching [`reset_tracking`](Self::reset_tracking).
    pub fn pause_tracking(&self) {
        self.inner.pause_tracking();
    }

    /// Forces tracking on until the matching [`reset_tracking`](Self::reset_tracking).
    pub fn enable_tracking(&self) {
        self.inner.enable_tracking();
    }

    /// Restores the tracking state saved by the last pause/enable.
    pub fn reset_tracking(&self) {
        self.inner.reset_tracking();
    }

    /// Calls `f` with tracking paused.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        struct Resume<'a>(&'a RuntimeInner);
        impl Drop for Resume<'_> {
            fn drop(&mut self) {
                self.0.reset_tracking();
            }
        }

        self.inner.pause_tracking();
        let _resume = Resume(&self.inner);
        f()
    }

    #[must_use]
    pub fn is_tracking(&self) -> bool {
        self.inner.tracking.get()
    }

    /// Innermost running effect.
    #[must_use]
    pub fn active_effect(&self) -> Option<Effect> {
        self.inner
            .stack
            .borrow()
            .last()
            .cloned()
            .map(Effect::from_node)
    }

    // ─── bookkeeping ────────────────────────────────────────────────────────

    /// Drops registry, exemption and dep entries whose objects are gone.
    /// Returns how many entries were removed.
    pub fn sweep(&self) -> usize {
        self.inner.sweep()
    }

    #[must_use]
    pub fn stats(&self) -> RuntimeStats {
        let inner = &self.inner;
        let deps = inner.deps.borrow();
        RuntimeStats {
            targets: deps.target_count(),
            deps: deps.dep_count(),
            subscriptions: deps.subscription_count(),
            wrappers: inner.identity.borrow().len(),
            exempt: inner.exempt.borrow().len(),
            stack_depth: inner.stack.borrow().len(),
        }
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .field("tracking", &self.inner.tracking.get())
            .finish()
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Str(s) => format!("string {s:?}"),
        Value::Object(raw) => format!("exempt {}", raw.kind()),
        other if other.is_object_like() => other.type_name().to_string(),
        other => other.to_string(),
    }
}

impl RuntimeInner {
    /// Subscribes the running effect to `(target, key)`.
    pub(crate) fn track(&self, target: &Target, key: TrackKey) {
        if !self.tracking.get() {
            return;
        }
        let Some(effect) = self.stack.borrow().last().cloned() else {
            return;
        };
        if !effect.is_active() {
            return;
        }
        tracing::trace!(
            message = "reactivity.track",
            target_id = target.id(),
            effect_id = effect.id(),
            key = ?key
        );
        let dep = self.deps.borrow_mut().dep_for(target, key);
        if dep.subscribe(&effect) {
            effect.add_dep(dep);
        }
    }

    /// Notifies the subscribers of `keys` on `target`.
    ///
    /// Subscribers are snapshotted first and computed effects run before
    /// plain ones. Stopped effects, running effects and effects that already
    /// reran during a nested pass are skipped.
    pub(crate) fn trigger(&self, target: TargetId, keys: &[TrackKey], kind: TriggerKind) {
        let effects = self.deps.borrow().subscribers_for(target, keys, kind);
        if effects.is_empty() {
            return;
        }
        tracing::debug!(
            message = "reactivity.trigger",
            target_id = target,
            kind = kind.as_str(),
            subscribers = effects.len()
        );

        let depth = self.trigger_depth.get();
        if depth >= self.config.max_trigger_depth {
            self.emit(
                Severity::Error,
                &format!(
                    "maximum trigger depth {} exceeded; dropped {} update(s) for target {target}",
                    self.config.max_trigger_depth,
                    effects.len()
                ),
            );
            return;
        }
        self.trigger_depth.set(depth + 1);
        let _depth = DepthGuard(&self.trigger_depth);

        let (computed, plain): (Vec<_>, Vec<_>) = effects
            .into_iter()
            .map(|node| {
                let runs = node.run_count();
                (node, runs)
            })
            .partition(|(node, _)| node.is_computed());
        for (node, runs_at_snapshot) in computed.into_iter().chain(plain) {
            // Already rerun by a nested pass after this mutation.
            if !node.is_active() || node.is_running() || node.run_count() != runs_at_snapshot {
                continue;
            }
            Effect::from_node(node).schedule();
        }
    }

    /// The wrapper for `raw`, created and registered on first use. Exempt
    /// containers come back as they are.
    pub(crate) fn wrap_raw(self: &Rc<Self>, raw: &RawObject) -> Value {
        if self.exempt.borrow().contains(raw) {
            return Value::Object(raw.clone());
        }
        if let Some(existing) = self.identity.borrow().wrapper_for(raw) {
            return Value::Reactive(existing);
        }
        let wrapper = Reactive::new(raw.clone(), Rc::downgrade(self));
        self.identity.borrow_mut().register(raw, &wrapper);
        self.note_registration();
        Value::Reactive(wrapper)
    }

    /// Wraps raw containers, passes everything else through without a
    /// diagnostic.
    pub(crate) fn to_reactive(self: &Rc<Self>, value: Value) -> Value {
        match &value {
            Value::Object(raw) => self.wrap_raw(raw),
            _ => value,
        }
    }

    pub(crate) fn emit(&self, severity: Severity, message: &str) {
        let sink = self.diagnostics.borrow().clone();
        sink.emit(severity, message);
    }

    pub(crate) fn push_effect(&self, effect: Rc<EffectNode>) {
        self.stack.borrow_mut().push(effect);
    }

    pub(crate) fn pop_effect(&self) {
        self.stack.borrow_mut().pop();
    }

    pub(crate) fn pause_tracking(&self) {
        self.tracking_history.borrow_mut().push(self.tracking.get());
        self.tracking.set(false);
    }

    pub(crate) fn enable_tracking(&self) {
        self.tracking_history.borrow_mut().push(self.tracking.get());
        self.tracking.set(true);
    }

    pub(crate) fn reset_tracking(&self) {
        let last = self.tracking_history.borrow_mut().pop();
        self.tracking.set(last.unwrap_or(true));
    }

    fn note_registration(&self) {
        let count = self.registrations.get() + 1;
        self.registrations.set(count);
        if count % self.config.sweep_interval == 0 {
            self.sweep();
        }
    }

    fn sweep(&self) -> usize {
        let wrappers = self.identity.borrow_mut().sweep();
        let exempt = self.exempt.borrow_mut().sweep();
        let targets = self.deps.borrow_mut().sweep();
        tracing::debug!(message = "runtime.sweep", wrappers, exempt, targets);
        wrappers + exempt + targets
    }
}

impl Drop for RuntimeInner {
    fn drop(&mut self) {
        self.deps.get_mut().clear_all();
    }
}

struct DepthGuard<'a>(&'a Cell<usize>);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

// ─── free helpers ───────────────────────────────────────────────────────────

/// `true` for observable wrappers.
#[must_use]
pub fn is_observable(value: &Value) -> bool {
    value.is_reactive()
}

/// `true` for boxed references, computed values included.
#[must_use]
pub fn is_ref(value: &Value) -> bool {
    value.is_ref()
}

/// Raw form of a wrapper; anything else unchanged.
#[must_use]
pub fn to_raw(value: &Value) -> Value {
    value.to_raw()
}

/// Current value of a ref (tracked); anything else unchanged.
#[must_use]
pub fn unref(value: &Value) -> Value {
    match value {
        Value::Ref(r) => r.get(),
        other => other.clone(),
    }
}
