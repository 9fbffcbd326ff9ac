#![forbid(unsafe_code)]

//! Observable wrappers.
//!
//! A [`Reactive`] is a transparent façade over one [`RawObject`]. Reads are
//! tracked against the running effect, writes trigger the effects that read
//! the written key, and the raw container stays the only storage.
//!
//! # Invariants
//!
//! 1. Raw storage never holds a wrapper: writes unwrap before storing.
//! 2. Reads wrap object values on demand, through the runtime's identity
//!    registry, so the same raw value always reads back as the same wrapper.
//! 3. Reading a slot that holds a ref yields the ref's current value; writing
//!    a non-ref into such a slot writes through the ref.
//! 4. A write that leaves the slot strictly equal to its old value triggers
//!    nothing.

use std::fmt;
use std::ops::{Bound, RangeBounds};
use std::rc::{Rc, Weak};

use crate::dep::{TrackKey, TriggerKind, next_id};
use crate::error::{ReactivityError, Result};
use crate::raw::{RawKind, RawObject, length_from};
use crate::runtime::RuntimeInner;
use crate::value::{PropKey, Value};

/// The five operations every observed container supports.
///
/// Implemented by [`Reactive`] (tracked) and [`RawObject`] (untracked).
/// `set_prop` and `delete_prop` return `false` when the container rejects
/// the key, like a proxy trap.
pub trait PropertyAccess {
    fn get_prop(&self, key: &PropKey) -> Value;
    fn set_prop(&self, key: &PropKey, value: Value) -> bool;
    fn has_prop(&self, key: &PropKey) -> bool;
    fn delete_prop(&self, key: &PropKey) -> bool;
    fn own_keys(&self) -> Vec<PropKey>;
}

pub(crate) struct ReactiveNode {
    id: u64,
    raw: RawObject,
    runtime: Weak<RuntimeInner>,
}

/// Observable wrapper around a raw container.
///
/// Obtained from [`Runtime::observe`](crate::Runtime::observe). Clones are
/// the same wrapper; equality is identity.
#[derive(Clone)]
pub struct Reactive {
    node: Rc<ReactiveNode>,
}

impl Reactive {
    pub(crate) fn new(raw: RawObject, runtime: Weak<RuntimeInner>) -> Self {
        Self {
            node: Rc::new(ReactiveNode {
                id: next_id(),
                raw,
                runtime,
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<ReactiveNode> {
        Rc::downgrade(&self.node)
    }

    pub(crate) fn upgrade(weak: &Weak<ReactiveNode>) -> Option<Self> {
        weak.upgrade().map(|node| Self { node })
    }

    /// Wrapper id (distinct from the raw container's id).
    #[must_use]
    pub fn id(&self) -> u64 {
        self.node.id
    }

    #[must_use]
    pub fn raw(&self) -> &RawObject {
        &self.node.raw
    }

    #[must_use]
    pub fn kind(&self) -> RawKind {
        self.node.raw.kind()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.node, &other.node)
    }

    // ─── property access ────────────────────────────────────────────────────

    /// Tracked read. Objects come back wrapped, refs come back unwrapped.
    #[must_use]
    pub fn get(&self, key: impl Into<PropKey>) -> Value {
        let key = key.into().normalized();
        self.track(self.read_key(&key));
        let value = self.node.raw.lookup(&key).unwrap_or_default();
        self.wrap_read(value, true)
    }

    /// Writes `value` at `key` and triggers the readers of that key.
    ///
    /// Returns `false` when the container rejects the key.
    pub fn set(&self, key: impl Into<PropKey>, value: impl Into<Value>) -> bool {
        let key = key.into().normalized();
        let value = value.into();
        let raw = &self.node.raw;

        let old = raw.lookup(&key);
        if let Some(Value::Ref(slot)) = &old
            && !value.is_ref()
        {
            slot.set(value);
            return true;
        }
        if raw.kind() == RawKind::Array && key.is_length() {
            return match length_from(&value) {
                Some(len) => self.set_len(len).is_ok(),
                None => false,
            };
        }

        let had = raw.contains(&key);
        let value = value.to_raw();
        if !raw.store(&key, value.clone()) {
            return false;
        }
        if !had {
            self.trigger(&[TrackKey::Prop(key)], TriggerKind::Add);
        } else if !old.is_some_and(|old| old.strict_eq(&value)) {
            self.trigger(&[TrackKey::Prop(key)], TriggerKind::Set);
        }
        true
    }

    /// Tracked existence check.
    #[must_use]
    pub fn has(&self, key: impl Into<PropKey>) -> bool {
        let key = key.into().normalized();
        self.track(self.read_key(&key));
        self.node.raw.contains(&key)
    }

    /// Removes `key`. Deleting an absent key succeeds without a trigger; an
    /// array's `length` cannot be deleted.
    pub fn delete(&self, key: impl Into<PropKey>) -> bool {
        let key = key.into().normalized();
        let raw = &self.node.raw;
        if raw.kind() == RawKind::Array && key.is_length() {
            return false;
        }
        if raw.remove_key(&key).is_some() {
            self.trigger(&[TrackKey::Prop(key)], TriggerKind::Delete);
        }
        true
    }

    /// Own keys in order; tracks the key set.
    #[must_use]
    pub fn keys(&self) -> Vec<PropKey> {
        self.track(TrackKey::Iterate);
        self.node.raw.keys()
    }

    /// Property count, array length or collection size; tracks the key set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.track(TrackKey::Iterate);
        self.node.raw.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tracked snapshot of the values, wrapped like ordinary reads.
    ///
    /// Object and array slots unwrap refs; Map values and Set members are
    /// returned as stored.
    #[must_use]
    pub fn values(&self) -> Vec<Value> {
        match self.kind() {
            RawKind::Object => self.keys().into_iter().map(|key| self.get(key)).collect(),
            RawKind::Array => {
                let len = self.len();
                (0..len).map(|i| self.get(i)).collect()
            }
            RawKind::Map | RawKind::Set => {
                self.track(TrackKey::Iterate);
                self.node
                    .raw
                    .values()
                    .into_iter()
                    .map(|v| self.wrap_read(v, false))
                    .collect()
            }
        }
    }

    // ─── arrays ─────────────────────────────────────────────────────────────

    /// Appends `value` and returns the new length.
    pub fn push(&self, value: impl Into<Value>) -> Result<usize> {
        self.expect_kind(RawKind::Array)?;
        let value = value.into().to_raw();
        let index = self.node.raw.with_array_mut(|items| {
            items.push(Some(value));
            items.len() - 1
        })?;
        self.trigger(&[TrackKey::Prop(PropKey::Index(index))], TriggerKind::Add);
        Ok(index + 1)
    }

    /// Removes the last element. Refs come back boxed.
    pub fn pop(&self) -> Result<Value> {
        self.expect_kind(RawKind::Array)?;
        let popped = self
            .node
            .raw
            .with_array_mut(|items| items.pop().map(|slot| (items.len(), slot)))?;
        let Some((index, slot)) = popped else {
            return Ok(Value::Undefined);
        };
        self.trigger(&[TrackKey::Prop(PropKey::Index(index))], TriggerKind::Delete);
        Ok(self.wrap_read(slot.unwrap_or_default(), false))
    }

    /// Inserts `value` at `index` (clamped to the length), shifting later
    /// elements up. One trigger covers every moved index.
    pub fn insert(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        self.expect_kind(RawKind::Array)?;
        let value = value.into().to_raw();
        let (at, new_len) = self.node.raw.with_array_mut(|items| {
            let at = index.min(items.len());
            items.insert(at, Some(value));
            (at, items.len())
        })?;
        let keys: Vec<TrackKey> = (at..new_len)
            .map(|i| TrackKey::Prop(PropKey::Index(i)))
            .collect();
        self.trigger(&keys, TriggerKind::Add);
        Ok(())
    }

    /// Removes the element at `index`, shifting later elements down. Refs come
    /// back boxed; an out-of-range index returns `Undefined`.
    pub fn remove(&self, index: usize) -> Result<Value> {
        self.expect_kind(RawKind::Array)?;
        let removed = self.node.raw.with_array_mut(|items| {
            (index < items.len()).then(|| {
                let old_len = items.len();
                (items.remove(index), old_len)
            })
        })?;
        let Some((slot, old_len)) = removed else {
            return Ok(Value::Undefined);
        };
        let keys: Vec<TrackKey> = (index..old_len)
            .map(|i| TrackKey::Prop(PropKey::Index(i)))
            .collect();
        self.trigger(&keys, TriggerKind::Delete);
        Ok(self.wrap_read(slot.unwrap_or_default(), false))
    }

    /// Truncates, or extends with holes.
    pub fn set_len(&self, len: usize) -> Result<()> {
        self.expect_kind(RawKind::Array)?;
        let old_len = self.node.raw.len();
        if len == old_len {
            return Ok(());
        }
        self.node.raw.set_len(len)?;
        if len < old_len {
            let keys: Vec<TrackKey> = (len..old_len)
                .map(|i| TrackKey::Prop(PropKey::Index(i)))
                .collect();
            self.trigger(&keys, TriggerKind::Delete);
        } else {
            self.trigger(&[TrackKey::Iterate], TriggerKind::Set);
        }
        Ok(())
    }

    /// Tracked copy of a range. Objects come back as the same wrappers plain
    /// reads return; refs stay boxed.
    pub fn slice(&self, range: impl RangeBounds<usize>) -> Result<Vec<Value>> {
        self.expect_kind(RawKind::Array)?;
        self.track(TrackKey::Iterate);
        let len = self.node.raw.len();
        let (start, end) = resolve_range(&range, len);
        let mut out = Vec::with_capacity(end - start);
        for i in start..end {
            let key = PropKey::Index(i);
            self.track(TrackKey::Prop(key.clone()));
            let value = self.node.raw.lookup(&key).unwrap_or_default();
            out.push(self.wrap_read(value, false));
        }
        Ok(out)
    }

    /// Position of `needle`, comparing raw forms so a wrapper finds its raw
    /// element and vice versa. Tracks every index scanned.
    pub fn index_of(&self, needle: &Value) -> Result<Option<usize>> {
        self.expect_kind(RawKind::Array)?;
        self.track(TrackKey::Iterate);
        let needle = needle.to_raw();
        let len = self.node.raw.len();
        for i in 0..len {
            let key = PropKey::Index(i);
            self.track(TrackKey::Prop(key.clone()));
            if self
                .node
                .raw
                .lookup(&key)
                .is_some_and(|v| v.strict_eq(&needle))
            {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    pub fn includes(&self, needle: &Value) -> Result<bool> {
        Ok(self.index_of(needle)?.is_some())
    }

    // ─── plumbing ───────────────────────────────────────────────────────────

    pub(crate) fn runtime(&self) -> Option<Rc<RuntimeInner>> {
        self.node.runtime.upgrade()
    }

    pub(crate) fn expect_kind(&self, expected: RawKind) -> Result<()> {
        let found = self.kind();
        if found == expected {
            Ok(())
        } else {
            Err(ReactivityError::kind_mismatch(expected.as_str(), found))
        }
    }

    pub(crate) fn track(&self, key: TrackKey) {
        if let Some(rt) = self.runtime() {
            rt.track(&self.node.raw.target(), key);
        }
    }

    pub(crate) fn trigger(&self, keys: &[TrackKey], kind: TriggerKind) {
        if let Some(rt) = self.runtime() {
            rt.trigger(self.node.raw.id(), keys, kind);
        }
    }

    /// Lengths and sizes are part of the key set.
    fn read_key(&self, key: &PropKey) -> TrackKey {
        let structural = match self.kind() {
            RawKind::Array => key.is_length(),
            RawKind::Map | RawKind::Set => key.as_name() == Some("size"),
            RawKind::Object => false,
        };
        if structural {
            TrackKey::Iterate
        } else {
            TrackKey::Prop(key.clone())
        }
    }

    pub(crate) fn wrap_read(&self, value: Value, unwrap_refs: bool) -> Value {
        match value {
            Value::Ref(r) if unwrap_refs => r.get(),
            Value::Object(raw) => match self.runtime() {
                Some(rt) => rt.wrap_raw(&raw),
                None => Value::Object(raw),
            },
            other => other,
        }
    }
}

fn resolve_range(range: &impl RangeBounds<usize>, len: usize) -> (usize, usize) {
    let start = match range.start_bound() {
        Bound::Included(&s) => s,
        Bound::Excluded(&s) => s.saturating_add(1),
        Bound::Unbounded => 0,
    };
    let end = match range.end_bound() {
        Bound::Included(&e) => e.saturating_add(1),
        Bound::Excluded(&e) => e,
        Bound::Unbounded => len,
    };
    let end = end.min(len);
    (start.min(end), end)
}

impl PartialEq for Reactive {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Reactive {}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactive")
            .field("id", &self.node.id)
            .field("raw", &self.node.raw)
            .finish()
    }
}

impl PropertyAccess for Reactive {
    fn get_prop(&self, key: &PropKey) -> Value {
        self.get(key)
    }

    fn set_prop(&self, key: &PropKey, value: Value) -> bool {
        self.set(key, value)
    }

    fn has_prop(&self, key: &PropKey) -> bool {
        self.has(key)
    }

    fn delete_prop(&self, key: &PropKey) -> bool {
        self.delete(key)
    }

    fn own_keys(&self) -> Vec<PropKey> {
        self.keys()
    }
}
