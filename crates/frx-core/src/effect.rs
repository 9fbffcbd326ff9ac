#![forbid(unsafe_code)]

//! Effects: functions that rerun when the state they read changes.
//!
//! # Run protocol
//!
//! 1. Drop every subscription from the previous run, so dependencies behind
//!    a branch not taken this time stop notifying.
//! 2. Push the effect on the runtime's run stack and enable tracking.
//! 3. Call the function; every tracked read subscribes the effect.
//! 4. Pop the stack and restore tracking, even if the function panics.
//!
//! # Invariants
//!
//! 1. An effect is subscribed to exactly the deps it read during its latest
//!    run.
//! 2. An effect is never re-entered: a nested `run()` of an effect already on
//!    the stack returns `Undefined` without calling the function.
//! 3. A stopped effect has no subscriptions and never subscribes again; a
//!    direct `run()` still calls the function.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use web_time::Instant;

use crate::dep::{Dep, next_id};
use crate::runtime::RuntimeInner;
use crate::value::Value;

/// Replaces synchronous reruns. Receives the effect that would have run.
pub type Scheduler = Rc<dyn Fn(&Effect)>;

/// Options for [`Runtime::create_effect`](crate::Runtime::create_effect).
#[derive(Clone, Default)]
pub struct EffectOptions {
    /// Skip the initial run.
    pub lazy: bool,
    /// Backing computation of a computed value. Runs ahead of plain effects
    /// on every trigger.
    pub computed: bool,
    pub scheduler: Option<Scheduler>,
    /// Called once, on the first `stop()`.
    pub on_stop: Option<Rc<dyn Fn()>>,
}

impl EffectOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    #[must_use]
    pub fn with_computed(mut self, computed: bool) -> Self {
        self.computed = computed;
        self
    }

    #[must_use]
    pub fn with_scheduler(mut self, scheduler: impl Fn(&Effect) + 'static) -> Self {
        self.scheduler = Some(Rc::new(scheduler));
        self
    }

    #[must_use]
    pub fn with_on_stop(mut self, on_stop: impl Fn() + 'static) -> Self {
        self.on_stop = Some(Rc::new(on_stop));
        self
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("lazy", &self.lazy)
            .field("computed", &self.computed)
            .field("scheduler", &self.scheduler.is_some())
            .field("on_stop", &self.on_stop.is_some())
            .finish()
    }
}

pub(crate) struct EffectNode {
    id: u64,
    runner: RefCell<Box<dyn FnMut() -> Value>>,
    options: EffectOptions,
    active: Cell<bool>,
    running: Cell<bool>,
    deps: RefCell<Vec<Rc<Dep>>>,
    runs: Cell<u64>,
    runtime: Weak<RuntimeInner>,
}

impl EffectNode {
    pub(crate) fn new(
        runner: Box<dyn FnMut() -> Value>,
        options: EffectOptions,
        runtime: Weak<RuntimeInner>,
    ) -> Self {
        Self {
            id: next_id(),
            runner: RefCell::new(runner),
            options,
            active: Cell::new(true),
            running: Cell::new(false),
            deps: RefCell::new(Vec::new()),
            runs: Cell::new(0),
            runtime,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.get()
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.get()
    }

    pub(crate) fn is_computed(&self) -> bool {
        self.options.computed
    }

    pub(crate) fn run_count(&self) -> u64 {
        self.runs.get()
    }

    /// Records membership after the dep accepted this effect.
    pub(crate) fn add_dep(&self, dep: Rc<Dep>) {
        self.deps.borrow_mut().push(dep);
    }

    fn cleanup(&self) {
        let deps = std::mem::take(&mut *self.deps.borrow_mut());
        for dep in deps {
            dep.unsubscribe(self.id);
        }
    }

    fn invoke(&self) -> Value {
        match self.runner.try_borrow_mut() {
            Ok(mut runner) => runner(),
            Err(_) => Value::Undefined,
        }
    }
}

/// Run-stack frame. Popping happens in `Drop` so a panicking effect leaves
/// the stack balanced.
struct EffectFrame<'a> {
    runtime: &'a RuntimeInner,
    node: &'a EffectNode,
}

impl<'a> EffectFrame<'a> {
    fn enter(runtime: &'a RuntimeInner, node: &'a Rc<EffectNode>) -> Self {
        node.running.set(true);
        runtime.push_effect(Rc::clone(node));
        runtime.enable_tracking();
        Self { runtime, node }
    }
}

impl Drop for EffectFrame<'_> {
    fn drop(&mut self) {
        self.runtime.reset_tracking();
        self.runtime.pop_effect();
        self.node.running.set(false);
    }
}

/// Handle to an effect. Clones refer to the same effect.
#[derive(Clone)]
pub struct Effect {
    node: Rc<EffectNode>,
}

impl Effect {
    pub(crate) fn from_node(node: Rc<EffectNode>) -> Self {
        Self { node }
    }

    /// Runs the function with dependency tracking and returns its result.
    pub fn run(&self) -> Value {
        let node = &self.node;
        if !node.active.get() {
            return node.invoke();
        }
        if node.running.get() {
            return Value::Undefined;
        }
        let Some(runtime) = node.runtime.upgrade() else {
            return node.invoke();
        };

        node.cleanup();
        let span = tracing::debug_span!(
            "effect.run",
            effect_id = node.id,
            computed = node.options.computed,
            run_duration_us = tracing::field::Empty
        );
        let _span_guard = span.enter();
        let start = Instant::now();

        let result = {
            let _frame = EffectFrame::enter(&runtime, node);
            node.invoke()
        };

        node.runs.set(node.runs.get() + 1);
        let elapsed_us = start.elapsed().as_micros() as u64;
        span.record("run_duration_us", elapsed_us);
        result
    }

    /// Unsubscribes from everything and deactivates. Idempotent.
    pub fn stop(&self) {
        let node = &self.node;
        if !node.active.replace(false) {
            return;
        }
        node.cleanup();
        tracing::debug!(message = "effect.stop", effect_id = node.id);
        if let Some(on_stop) = node.options.on_stop.clone() {
            on_stop();
        }
    }

    /// Hands the effect to its scheduler, or runs it when there is none.
    pub fn schedule(&self) {
        match self.node.options.scheduler.clone() {
            Some(scheduler) => scheduler(self),
            None => {
                self.run();
            }
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.node.id
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.node.is_active()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.node.is_running()
    }

    #[must_use]
    pub fn is_computed(&self) -> bool {
        self.node.is_computed()
    }

    /// Deps joined during the latest run.
    #[must_use]
    pub fn dep_count(&self) -> usize {
        self.node.deps.borrow().len()
    }

    /// Completed tracked runs.
    #[must_use]
    pub fn run_count(&self) -> u64 {
        self.node.runs.get()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.node, &other.node)
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.node.id)
            .field("active", &self.node.active.get())
            .field("computed", &self.node.options.computed)
            .field("deps", &self.dep_count())
            .field("runs", &self.node.runs.get())
            .finish()
    }
}
