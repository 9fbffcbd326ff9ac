#![forbid(unsafe_code)]

//! Boxed references.
//!
//! A [`Ref`] is a single observable slot with its own implicit key. Three
//! flavors share the handle:
//!
//! - a plain cell created by [`Runtime::create_ref`],
//! - a property ref from [`Runtime::to_refs`], which reads and writes one key
//!   of a source object,
//! - a computed value (see [`crate::computed`]).

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::computed::ComputedState;
use crate::dep::{Target, TrackKey, TriggerKind, next_id};
use crate::diagnostics::Severity;
use crate::error::{ReactivityError, Result};
use crate::reactive::PropertyAccess;
use crate::runtime::{Runtime, RuntimeInner};
use crate::value::{PropKey, Value};

pub(crate) enum RefKind {
    Cell(RefCell<Value>),
    Property { source: Value, key: PropKey },
    Computed(ComputedState),
}

pub(crate) struct RefNode {
    id: u64,
    kind: RefKind,
    runtime: Weak<RuntimeInner>,
}

impl RefNode {
    pub(crate) fn new(id: u64, kind: RefKind, runtime: Weak<RuntimeInner>) -> Self {
        Self { id, kind, runtime }
    }
}

/// Handle to a boxed reference. Clones share the slot; equality is identity.
#[derive(Clone)]
pub struct Ref {
    node: Rc<RefNode>,
}

impl Ref {
    pub(crate) fn from_node(node: Rc<RefNode>) -> Self {
        Self { node }
    }

    pub(crate) fn upgrade(weak: &Weak<RefNode>) -> Option<Self> {
        weak.upgrade().map(Self::from_node)
    }

    /// Current value, tracked.
    ///
    /// A cell holding another ref yields that ref's value.
    #[must_use]
    pub fn get(&self) -> Value {
        match &self.node.kind {
            RefKind::Cell(cell) => {
                self.track_value();
                let current = cell.borrow().clone();
                match current {
                    Value::Ref(inner) => inner.get(),
                    other => other,
                }
            }
            RefKind::Property { source, key } => source.get(key),
            RefKind::Computed(state) => state.read(self),
        }
    }

    /// Replaces the value. A cell notifies its readers only when the new
    /// value differs from the old under strict equality.
    pub fn set(&self, value: impl Into<Value>) {
        let value = value.into();
        match &self.node.kind {
            RefKind::Cell(cell) => {
                let changed = !cell.borrow().to_raw().strict_eq(&value.to_raw());
                if !changed {
                    return;
                }
                let stored = match self.runtime() {
                    Some(rt) => rt.to_reactive(value),
                    None => value,
                };
                *cell.borrow_mut() = stored;
                self.trigger_value();
            }
            RefKind::Property { source, key } => {
                source.set(key, value);
            }
            RefKind::Computed(state) => state.write(self, value),
        }
    }

    /// `set(f(get()))`.
    pub fn update(&self, f: impl FnOnce(Value) -> Value) {
        let next = f(self.get());
        self.set(next);
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.node.id
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.node, &other.node)
    }

    #[must_use]
    pub fn is_computed(&self) -> bool {
        matches!(self.node.kind, RefKind::Computed(_))
    }

    /// Backed by a property of another object.
    #[must_use]
    pub fn is_property(&self) -> bool {
        matches!(self.node.kind, RefKind::Property { .. })
    }

    pub(crate) fn computed_state(&self) -> Option<&ComputedState> {
        match &self.node.kind {
            RefKind::Computed(state) => Some(state),
            _ => None,
        }
    }

    fn runtime(&self) -> Option<Rc<RuntimeInner>> {
        self.node.runtime.upgrade()
    }

    pub(crate) fn has_runtime(&self) -> bool {
        self.node.runtime.strong_count() > 0
    }

    fn target(&self) -> Target {
        let liveness: Weak<dyn Any> = Rc::downgrade(&self.node) as Weak<dyn Any>;
        Target::new(self.node.id, liveness)
    }

    pub(crate) fn track_value(&self) {
        if let Some(rt) = self.runtime() {
            rt.track(&self.target(), TrackKey::Value);
        }
    }

    pub(crate) fn trigger_value(&self) {
        if let Some(rt) = self.runtime() {
            rt.trigger(self.node.id, &[TrackKey::Value], TriggerKind::Set);
        }
    }

    pub(crate) fn warn(&self, message: &str) {
        if let Some(rt) = self.runtime() {
            rt.emit(Severity::Warning, message);
        }
    }
}

impl PartialEq for Ref {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Ref {}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.node.kind {
            RefKind::Cell(_) => "cell",
            RefKind::Property { .. } => "property",
            RefKind::Computed(_) => "computed",
        };
        f.debug_struct("Ref")
            .field("id", &self.node.id)
            .field("kind", &kind)
            .finish()
    }
}

/// Property refs produced by [`Runtime::to_refs`], in key order.
#[derive(Debug, Clone, Default)]
pub struct RefMap {
    entries: Vec<(PropKey, Ref)>,
}

impl RefMap {
    #[must_use]
    pub fn get(&self, key: impl Into<PropKey>) -> Option<&Ref> {
        let key = key.into().normalized();
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, r)| r)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PropKey, &Ref)> {
        self.entries.iter().map(|(k, r)| (k, r))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for RefMap {
    type Item = (PropKey, Ref);
    type IntoIter = std::vec::IntoIter<(PropKey, Ref)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Runtime {
    /// New ref holding `initial`. Raw containers are stored wrapped.
    pub fn create_ref(&self, initial: impl Into<Value>) -> Ref {
        let inner = self.inner();
        let value = inner.to_reactive(initial.into());
        Ref::from_node(Rc::new(RefNode::new(
            next_id(),
            RefKind::Cell(RefCell::new(value)),
            Rc::downgrade(inner),
        )))
    }

    /// One property ref per own key of `source`.
    ///
    /// Each ref reads and writes through to the source, so both directions
    /// stay live. A raw object is observed first; primitives are rejected.
    pub fn to_refs(&self, source: &Value) -> Result<RefMap> {
        let source = match source {
            Value::Reactive(_) => source.clone(),
            Value::Object(_) => self.observe(source.clone()),
            other => {
                return Err(ReactivityError::NotAnObject {
                    found: other.type_name().to_string(),
                });
            }
        };
        let keys = match &source {
            Value::Reactive(r) => r.own_keys(),
            Value::Object(raw) => raw.own_keys(),
            _ => Vec::new(),
        };
        let inner = self.inner();
        let entries = keys
            .into_iter()
            .map(|key| {
                let node = RefNode::new(
                    next_id(),
                    RefKind::Property {
                        source: source.clone(),
                        key: key.clone(),
                    },
                    Rc::downgrade(inner),
                );
                (key, Ref::from_node(Rc::new(node)))
            })
            .collect();
        Ok(RefMap { entries })
    }
}
