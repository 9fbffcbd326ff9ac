#![forbid(unsafe_code)]

//! Raw containers.
//!
//! A [`RawObject`] is plain shared state: a keyed object, a dense array with
//! holes, a keyed map or a set. Reading or writing it directly never tracks
//! or triggers anything; observation happens through the
//! [`Reactive`](crate::Reactive) wrapper the runtime hands out for it.
//!
//! Borrows of the inner `RefCell` never outlive a single accessor call, so
//! nothing here can be re-entered while a borrow is held.

use std::any::Any;
use std::borrow::Borrow;
use std::cell::{Ref as CellRef, RefCell};
use std::fmt;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use ahash::AHashMap;

use crate::dep::{Target, TargetId, next_id};
use crate::error::{ReactivityError, Result};
use crate::reactive::PropertyAccess;
use crate::value::{MapKey, PropKey, Value};

// ─── OrderedTable ────────────────────────────────────────────────────────────

/// Insertion-ordered hash table.
///
/// Overwriting a key keeps its position; removing one shifts later entries
/// down.
#[derive(Clone)]
pub(crate) struct OrderedTable<K, V> {
    entries: Vec<(K, V)>,
    index: AHashMap<K, usize>,
}

impl<K: Hash + Eq + Clone, V> Default for OrderedTable<K, V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: AHashMap::new(),
        }
    }
}

impl<K: Hash + Eq + Clone, V> OrderedTable<K, V> {
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.get(key).map(|&pos| &self.entries[pos].1)
    }

    pub(crate) fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.contains_key(key)
    }

    /// Returns the previous value when the key already existed.
    pub(crate) fn insert(&mut self, key: K, value: V) -> Option<V> {
        if let Some(&pos) = self.index.get(&key) {
            return Some(std::mem::replace(&mut self.entries[pos].1, value));
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, value));
        None
    }

    pub(crate) fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let pos = self.index.remove(key)?;
        let (_, value) = self.entries.remove(pos);
        for (shifted, (k, _)) in self.entries.iter().enumerate().skip(pos) {
            self.index.insert(k.clone(), shifted);
        }
        Some(value)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }
}

/// Longest array a container will hold.
///
/// Arrays are stored densely, so index and `length` writes past this bound
/// are rejected instead of allocating.
pub const MAX_ARRAY_LEN: usize = 1 << 24;

// ─── RawData ─────────────────────────────────────────────────────────────────

/// Container flavor. Fixed for the lifetime of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawKind {
    Object,
    Array,
    Map,
    Set,
}

impl RawKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Array => "array",
            Self::Map => "map",
            Self::Set => "set",
        }
    }
}

impl fmt::Display for RawKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) enum RawData {
    Object(OrderedTable<Rc<str>, Value>),
    /// `None` marks a hole.
    Array(Vec<Option<Value>>),
    Map(OrderedTable<MapKey, Value>),
    Set(OrderedTable<MapKey, ()>),
}

pub(crate) struct RawNode {
    id: TargetId,
    kind: RawKind,
    data: RefCell<RawData>,
}

// ─── RawObject ───────────────────────────────────────────────────────────────

/// Shared handle to a raw container. Clones alias the same storage.
#[derive(Clone)]
pub struct RawObject {
    node: Rc<RawNode>,
}

impl RawObject {
    fn with(kind: RawKind, data: RawData) -> Self {
        Self {
            node: Rc::new(RawNode {
                id: next_id(),
                kind,
                data: RefCell::new(data),
            }),
        }
    }

    #[must_use]
    pub fn object() -> Self {
        Self::with(RawKind::Object, RawData::Object(OrderedTable::default()))
    }

    #[must_use]
    pub fn array() -> Self {
        Self::with(RawKind::Array, RawData::Array(Vec::new()))
    }

    #[must_use]
    pub fn map() -> Self {
        Self::with(RawKind::Map, RawData::Map(OrderedTable::default()))
    }

    #[must_use]
    pub fn new_set() -> Self {
        Self::with(RawKind::Set, RawData::Set(OrderedTable::default()))
    }

    /// Keyed object from `(key, value)` pairs, in order.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<PropKey>,
        V: Into<Value>,
    {
        let mut table = OrderedTable::default();
        for (key, value) in pairs {
            table.insert(key.into().to_name(), value.into());
        }
        Self::with(RawKind::Object, RawData::Object(table))
    }

    /// Array without holes.
    pub fn from_values<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        let items = values.into_iter().map(|v| Some(v.into())).collect();
        Self::with(RawKind::Array, RawData::Array(items))
    }

    pub fn map_from<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Value>,
        V: Into<Value>,
    {
        let mut table = OrderedTable::default();
        for (key, value) in entries {
            table.insert(MapKey::new(key), value.into());
        }
        Self::with(RawKind::Map, RawData::Map(table))
    }

    pub fn set_from<K: Into<Value>>(members: impl IntoIterator<Item = K>) -> Self {
        let mut table = OrderedTable::default();
        for member in members {
            table.insert(MapKey::new(member), ());
        }
        Self::with(RawKind::Set, RawData::Set(table))
    }

    #[must_use]
    pub fn id(&self) -> TargetId {
        self.node.id
    }

    #[must_use]
    pub fn kind(&self) -> RawKind {
        self.node.kind
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.node, &other.node)
    }

    /// Property count, array length or collection size.
    #[must_use]
    pub fn len(&self) -> usize {
        match &*self.data() {
            RawData::Object(table) => table.len(),
            RawData::Array(items) => items.len(),
            RawData::Map(table) => table.len(),
            RawData::Set(table) => table.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Untracked read; `Undefined` when absent.
    #[must_use]
    pub fn get(&self, key: impl Into<PropKey>) -> Value {
        self.lookup(&key.into().normalized()).unwrap_or_default()
    }

    /// Untracked write. `false` when the container rejects the key.
    pub fn set(&self, key: impl Into<PropKey>, value: impl Into<Value>) -> bool {
        self.store(&key.into().normalized(), value.into())
    }

    /// Values in order: object values, array elements (holes as
    /// `Undefined`), map values or set members.
    #[must_use]
    pub fn values(&self) -> Vec<Value> {
        match &*self.data() {
            RawData::Object(table) => table.iter().map(|(_, v)| v.clone()).collect(),
            RawData::Array(items) => items.iter().map(|v| v.clone().unwrap_or_default()).collect(),
            RawData::Map(table) => table.iter().map(|(_, v)| v.clone()).collect(),
            RawData::Set(table) => table.iter().map(|(k, ())| k.value().clone()).collect(),
        }
    }

    /// Untracked map lookup.
    #[must_use]
    pub fn entry(&self, key: impl Into<Value>) -> Option<Value> {
        let key = MapKey::new(key);
        match &*self.data() {
            RawData::Map(table) => table.get(&key).cloned(),
            RawData::Set(table) => table.get(&key).map(|()| key.value().clone()),
            _ => None,
        }
    }

    #[must_use]
    pub fn contains_entry(&self, key: impl Into<Value>) -> bool {
        let key = MapKey::new(key);
        match &*self.data() {
            RawData::Map(table) => table.contains(&key),
            RawData::Set(table) => table.contains(&key),
            _ => false,
        }
    }

    /// Untracked map insert. Returns the previous value.
    pub fn insert_entry(
        &self,
        key: impl Into<Value>,
        value: impl Into<Value>,
    ) -> Result<Option<Value>> {
        let key = MapKey::new(key);
        self.with_data_mut(|data| match data {
            RawData::Map(table) => Ok(table.insert(key, value.into())),
            _ => Err(ReactivityError::kind_mismatch("map", self.kind())),
        })
    }

    /// Untracked set insert. `true` when the member was new.
    pub fn add(&self, member: impl Into<Value>) -> Result<bool> {
        let key = MapKey::new(member);
        self.with_data_mut(|data| match data {
            RawData::Set(table) => Ok(table.insert(key, ()).is_none()),
            _ => Err(ReactivityError::kind_mismatch("set", self.kind())),
        })
    }

    // ─── crate plumbing ─────────────────────────────────────────────────────

    pub(crate) fn target(&self) -> Target {
        let liveness: Weak<dyn Any> = Rc::downgrade(&self.node) as Weak<dyn Any>;
        Target::new(self.id(), liveness)
    }

    pub(crate) fn downgrade(&self) -> Weak<RawNode> {
        Rc::downgrade(&self.node)
    }

    fn data(&self) -> CellRef<'_, RawData> {
        self.node.data.borrow()
    }

    pub(crate) fn with_data<R>(&self, f: impl FnOnce(&RawData) -> R) -> R {
        f(&self.node.data.borrow())
    }

    pub(crate) fn with_data_mut<R>(&self, f: impl FnOnce(&mut RawData) -> R) -> R {
        f(&mut self.node.data.borrow_mut())
    }

    pub(crate) fn with_array_mut<R>(
        &self,
        f: impl FnOnce(&mut Vec<Option<Value>>) -> R,
    ) -> Result<R> {
        self.with_data_mut(|data| match data {
            RawData::Array(items) => Ok(f(items)),
            _ => Err(ReactivityError::kind_mismatch("array", self.kind())),
        })
    }

    /// Current value at `key`, `None` when absent.
    ///
    /// Arrays answer `length`; maps and sets answer `size`.
    pub(crate) fn lookup(&self, key: &PropKey) -> Option<Value> {
        match &*self.data() {
            RawData::Object(table) => match key {
                PropKey::Name(name) => table.get(&**name).cloned(),
                PropKey::Index(_) => table.get(&*key.to_name()).cloned(),
            },
            RawData::Array(items) => match key {
                PropKey::Index(i) => items.get(*i).cloned().flatten(),
                PropKey::Name(_) if key.is_length() => Some(Value::from(items.len())),
                PropKey::Name(_) => None,
            },
            RawData::Map(table) if key.as_name() == Some("size") => {
                Some(Value::from(table.len()))
            }
            RawData::Set(table) if key.as_name() == Some("size") => {
                Some(Value::from(table.len()))
            }
            RawData::Map(_) | RawData::Set(_) => None,
        }
    }

    pub(crate) fn contains(&self, key: &PropKey) -> bool {
        match &*self.data() {
            RawData::Object(table) => table.contains(&*key.to_name()),
            RawData::Array(items) => match key {
                PropKey::Index(i) => matches!(items.get(*i), Some(Some(_))),
                PropKey::Name(_) => key.is_length(),
            },
            RawData::Map(_) | RawData::Set(_) => key.as_name() == Some("size"),
        }
    }

    /// Writes `value` at `key`. Arrays grow with holes to fit an index and
    /// accept `length` as a resize; every other name on an array is rejected,
    /// as is an index at or past [`MAX_ARRAY_LEN`].
    pub(crate) fn store(&self, key: &PropKey, value: Value) -> bool {
        if self.kind() == RawKind::Array && key.is_length() {
            return match length_from(&value) {
                Some(len) => self.set_len(len).is_ok(),
                None => false,
            };
        }
        self.with_data_mut(|data| match data {
            RawData::Object(table) => {
                table.insert(key.to_name(), value);
                true
            }
            RawData::Array(items) => match key {
                PropKey::Index(i) if *i >= MAX_ARRAY_LEN => false,
                PropKey::Index(i) => {
                    if *i >= items.len() {
                        items.resize(*i + 1, None);
                    }
                    items[*i] = Some(value);
                    true
                }
                PropKey::Name(_) => false,
            },
            RawData::Map(_) | RawData::Set(_) => false,
        })
    }

    /// Removes `key`, returning the old value. Array elements leave a hole.
    pub(crate) fn remove_key(&self, key: &PropKey) -> Option<Value> {
        self.with_data_mut(|data| match data {
            RawData::Object(table) => table.remove(&*key.to_name()),
            RawData::Array(items) => match key {
                PropKey::Index(i) => items.get_mut(*i).and_then(Option::take),
                PropKey::Name(_) => None,
            },
            RawData::Map(_) | RawData::Set(_) => None,
        })
    }

    /// Own keys in order. Arrays list their populated indices.
    pub(crate) fn keys(&self) -> Vec<PropKey> {
        match &*self.data() {
            RawData::Object(table) => table
                .iter()
                .map(|(k, _)| PropKey::from(Rc::clone(k)))
                .collect(),
            RawData::Array(items) => items
                .iter()
                .enumerate()
                .filter(|(_, v)| v.is_some())
                .map(|(i, _)| PropKey::Index(i))
                .collect(),
            RawData::Map(_) | RawData::Set(_) => Vec::new(),
        }
    }

    /// Truncates or extends (with holes) an array.
    pub(crate) fn set_len(&self, len: usize) -> Result<()> {
        if len > MAX_ARRAY_LEN {
            return Err(ReactivityError::ArrayTooLong { len });
        }
        self.with_array_mut(|items| items.resize(len, None))
    }
}

/// Array length encoded by `value`: a non-negative integer no larger than
/// [`MAX_ARRAY_LEN`].
pub(crate) fn length_from(value: &Value) -> Option<usize> {
    let n = value.as_f64()?;
    (n >= 0.0 && n.fract() == 0.0 && n <= MAX_ARRAY_LEN as f64).then_some(n as usize)
}

impl PropertyAccess for RawObject {
    fn get_prop(&self, key: &PropKey) -> Value {
        self.lookup(&key.normalized()).unwrap_or_default()
    }

    fn set_prop(&self, key: &PropKey, value: Value) -> bool {
        self.store(&key.normalized(), value)
    }

    fn has_prop(&self, key: &PropKey) -> bool {
        self.contains(&key.normalized())
    }

    fn delete_prop(&self, key: &PropKey) -> bool {
        let key = key.normalized();
        if self.kind() == RawKind::Array && key.is_length() {
            return false;
        }
        self.remove_key(&key);
        true
    }

    fn own_keys(&self) -> Vec<PropKey> {
        self.keys()
    }
}

impl fmt::Debug for RawObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawObject")
            .field("id", &self.node.id)
            .field("kind", &self.node.kind)
            .finish()
    }
}

/// Builds a raw keyed object.
///
/// ```
/// use frx_core::{object, Value};
///
/// let point = object! { "x" => 1, "y" => 2 };
/// assert_eq!(point.get("x"), Value::from(1));
/// ```
#[macro_export]
macro_rules! object {
    () => {
        $crate::RawObject::object()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {
        $crate::RawObject::from_pairs([$(($key, $crate::Value::from($value))),+])
    };
}

/// Builds a raw array.
///
/// ```
/// use frx_core::{array, Value};
///
/// let items = array![1, "two", 3.5];
/// assert_eq!(items.len(), 3);
/// assert_eq!(items.get(1), Value::from("two"));
/// ```
#[macro_export]
macro_rules! array {
    () => {
        $crate::RawObject::array()
    };
    ($($value:expr),+ $(,)?) => {
        $crate::RawObject::from_values([$($crate::Value::from($value)),+])
    };
}
