#![forbid(unsafe_code)]

//! Dynamic value model.
//!
//! [`Value`] is what flows through every property slot, ref and effect
//! result. Object-like variants are shared handles compared by identity;
//! primitives are compared by value with strict-equality rules.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::dep::next_id;
use crate::raw::{RawKind, RawObject};
use crate::reactive::Reactive;
use crate::reference::Ref;

/// A value stored in, or read from, observed state.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Symbol(Symbol),
    /// Raw, unobserved container.
    Object(RawObject),
    /// Observable wrapper around a raw container.
    Reactive(Reactive),
    /// Boxed reference (plain, property-backed or computed).
    Ref(Ref),
    /// Object-like built-in that cannot be intercepted faithfully.
    Opaque(Opaque),
}

impl Value {
    #[must_use]
    pub fn is_object_like(&self) -> bool {
        matches!(
            self,
            Self::Object(_) | Self::Reactive(_) | Self::Ref(_) | Self::Opaque(_)
        )
    }

    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    #[must_use]
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    #[must_use]
    pub fn is_reactive(&self) -> bool {
        matches!(self, Self::Reactive(_))
    }

    #[must_use]
    pub fn is_ref(&self) -> bool {
        matches!(self, Self::Ref(_))
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_raw(&self) -> Option<&RawObject> {
        match self {
            Self::Object(raw) => Some(raw),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_reactive(&self) -> Option<&Reactive> {
        match self {
            Self::Reactive(r) => Some(r),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_ref_cell(&self) -> Option<&Ref> {
        match self {
            Self::Ref(r) => Some(r),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_opaque(&self) -> Option<&Opaque> {
        match self {
            Self::Opaque(o) => Some(o),
            _ => None,
        }
    }

    /// The raw form of this value: wrappers become their raw container,
    /// everything else is returned as is.
    #[must_use]
    pub fn to_raw(&self) -> Value {
        match self {
            Self::Reactive(r) => Self::Object(r.raw().clone()),
            other => other.clone(),
        }
    }

    /// Strict equality: primitives by value (`NaN` is unequal to itself,
    /// `+0` equals `-0`), strings by content, object-like values by identity.
    #[must_use]
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Symbol(a), Self::Symbol(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Reactive(a), Self::Reactive(b)) => a.ptr_eq(b),
            (Self::Ref(a), Self::Ref(b)) => a.ptr_eq(b),
            (Self::Opaque(a), Self::Opaque(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Read `key` through whatever this value is: tracked on a wrapper,
    /// untracked on a raw container, `Undefined` otherwise.
    #[must_use]
    pub fn get(&self, key: impl Into<PropKey>) -> Value {
        match self {
            Self::Reactive(r) => r.get(key),
            Self::Object(raw) => raw.get(key),
            _ => Self::Undefined,
        }
    }

    /// Write `key` through whatever this value is. Returns `false` when the
    /// value has no properties or the container rejects the key.
    pub fn set(&self, key: impl Into<PropKey>, value: impl Into<Value>) -> bool {
        match self {
            Self::Reactive(r) => r.set(key, value),
            Self::Object(raw) => raw.set(key, value),
            _ => false,
        }
    }

    /// Short type label used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Str(_) => "string",
            Self::Symbol(_) => "symbol",
            Self::Object(raw) => raw.kind().as_str(),
            Self::Reactive(_) => "reactive",
            Self::Ref(_) => "ref",
            Self::Opaque(o) => o.type_name(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_eq(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("Undefined"),
            Self::Null => f.write_str("Null"),
            Self::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Self::Number(n) => f.debug_tuple("Number").field(n).finish(),
            Self::Str(s) => f.debug_tuple("Str").field(s).finish(),
            Self::Symbol(s) => fmt::Debug::fmt(s, f),
            Self::Object(raw) => fmt::Debug::fmt(raw, f),
            Self::Reactive(r) => fmt::Debug::fmt(r, f),
            Self::Ref(r) => fmt::Debug::fmt(r, f),
            Self::Opaque(o) => fmt::Debug::fmt(o, f),
        }
    }
}

/// Renders the way `String(value)` does for primitives.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => fmt_number(*n, f),
            Self::Str(s) => f.write_str(s),
            Self::Symbol(s) => fmt::Display::fmt(s, f),
            Self::Object(raw) => fmt_container(raw.kind(), f),
            Self::Reactive(r) => fmt_container(r.kind(), f),
            Self::Ref(_) => f.write_str("[object Ref]"),
            Self::Opaque(o) => write!(f, "[object {}]", o.type_name()),
        }
    }
}

fn fmt_number(n: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if n.is_nan() {
        f.write_str("NaN")
    } else if n.is_infinite() {
        f.write_str(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else if n == 0.0 {
        f.write_str("0")
    } else if (1e-6..1e21).contains(&n.abs()) {
        write!(f, "{n}")
    } else {
        let exp = format!("{n:e}");
        match exp.split_once('e') {
            Some((mantissa, power)) if !power.starts_with('-') => {
                write!(f, "{mantissa}e+{power}")
            }
            _ => f.write_str(&exp),
        }
    }
}

fn fmt_container(kind: RawKind, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match kind {
        RawKind::Object => f.write_str("[object Object]"),
        RawKind::Array => f.write_str("[object Array]"),
        RawKind::Map => f.write_str("[object Map]"),
        RawKind::Set => f.write_str("[object Set]"),
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Self::Undefined
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s.into())
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Self::Str(s)
    }
}

impl From<Symbol> for Value {
    fn from(s: Symbol) -> Self {
        Self::Symbol(s)
    }
}

impl From<RawObject> for Value {
    fn from(raw: RawObject) -> Self {
        Self::Object(raw)
    }
}

impl From<Reactive> for Value {
    fn from(r: Reactive) -> Self {
        Self::Reactive(r)
    }
}

impl From<Ref> for Value {
    fn from(r: Ref) -> Self {
        Self::Ref(r)
    }
}

impl From<Opaque> for Value {
    fn from(o: Opaque) -> Self {
        Self::Opaque(o)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

// ─── Symbol ──────────────────────────────────────────────────────────────────

/// A unique primitive token. Two symbols are equal only if they are clones of
/// the same [`Symbol::new`] call.
#[derive(Clone)]
pub struct Symbol {
    id: u64,
    description: Option<Rc<str>>,
}

impl Symbol {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: next_id(),
            description: None,
        }
    }

    #[must_use]
    pub fn with_description(description: impl Into<Rc<str>>) -> Self {
        Self {
            id: next_id(),
            description: Some(description.into()),
        }
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Default for Symbol {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol#{}({})", self.id, self.description().unwrap_or(""))
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.description().unwrap_or(""))
    }
}

// ─── Opaque ──────────────────────────────────────────────────────────────────

struct OpaqueInner {
    id: u64,
    type_name: &'static str,
    value: Box<dyn Any>,
}

/// An object-like host value (dates, patterns, pending results, handles)
/// whose internal invariants the engine cannot intercept. It is stored and
/// compared by identity and never wrapped.
#[derive(Clone)]
pub struct Opaque {
    inner: Rc<OpaqueInner>,
}

impl Opaque {
    #[must_use]
    pub fn new<T: Any>(type_name: &'static str, value: T) -> Self {
        Self {
            inner: Rc::new(OpaqueInner {
                id: next_id(),
                type_name,
                value: Box::new(value),
            }),
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.inner.type_name
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.value.downcast_ref()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Opaque")
            .field("id", &self.inner.id)
            .field("type_name", &self.inner.type_name)
            .finish()
    }
}

// ─── PropKey ─────────────────────────────────────────────────────────────────

/// Property name or array index.
///
/// Canonical numeric strings up to [`MAX_INDEX`] (`"0"`, `"17"`; not `"01"`
/// or `"-1"`) are indices; every conversion into `PropKey` normalizes them.
/// A hand-built `Name("7")` is folded by [`PropKey::normalized`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropKey {
    Name(Rc<str>),
    Index(usize),
}

impl PropKey {
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match parse_index(s) {
            Some(index) => Self::Index(index),
            None => Self::Name(s.into()),
        }
    }

    #[must_use]
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(i) => Some(*i),
            Self::Name(_) => None,
        }
    }

    #[must_use]
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Name(name) => Some(name),
            Self::Index(_) => None,
        }
    }

    #[must_use]
    pub fn is_length(&self) -> bool {
        self.as_name() == Some("length")
    }

    /// Same key with a numeric `Name` folded into `Index`.
    #[must_use]
    pub fn normalized(&self) -> Self {
        match self {
            Self::Name(name) => match parse_index(name) {
                Some(index) => Self::Index(index),
                None => self.clone(),
            },
            Self::Index(_) => self.clone(),
        }
    }

    /// String form used as an object property name.
    pub(crate) fn to_name(&self) -> Rc<str> {
        match self {
            Self::Name(name) => Rc::clone(name),
            Self::Index(i) => i.to_string().into(),
        }
    }
}

/// Largest array index, `2^32 - 2`. Larger numeric strings are plain names.
pub const MAX_INDEX: usize = u32::MAX as usize - 1;

fn parse_index(s: &str) -> Option<usize> {
    if s.is_empty() || (s.len() > 1 && s.starts_with('0')) {
        return None;
    }
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok().filter(|&i| i <= MAX_INDEX)
}

impl fmt::Display for PropKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Index(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for PropKey {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for PropKey {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<Rc<str>> for PropKey {
    fn from(s: Rc<str>) -> Self {
        match parse_index(&s) {
            Some(index) => Self::Index(index),
            None => Self::Name(s),
        }
    }
}

impl From<usize> for PropKey {
    fn from(i: usize) -> Self {
        if i <= MAX_INDEX {
            Self::Index(i)
        } else {
            Self::Name(i.to_string().into())
        }
    }
}

impl From<i32> for PropKey {
    fn from(i: i32) -> Self {
        match usize::try_from(i) {
            Ok(index) => Self::Index(index),
            Err(_) => Self::Name(i.to_string().into()),
        }
    }
}

impl From<&PropKey> for PropKey {
    fn from(key: &PropKey) -> Self {
        key.normalized()
    }
}

// ─── MapKey ──────────────────────────────────────────────────────────────────

/// Identity of a collection key under SameValueZero.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum KeyIdentity {
    Undefined,
    Null,
    Bool(bool),
    Number(u64),
    Str(Rc<str>),
    Symbol(u64),
    Target(u64),
}

/// Key of a Map/Set entry.
///
/// Equality is SameValueZero: `NaN` equals `NaN`, `+0` equals `-0`,
/// object-like keys compare by identity. Wrappers are unwrapped on
/// construction so a wrapper and its raw container address the same entry.
#[derive(Debug, Clone)]
pub struct MapKey(Value);

impl MapKey {
    pub fn new(key: impl Into<Value>) -> Self {
        Self(key.into().to_raw())
    }

    #[must_use]
    pub fn value(&self) -> &Value {
        &self.0
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }

    pub(crate) fn identity(&self) -> KeyIdentity {
        match &self.0 {
            Value::Undefined => KeyIdentity::Undefined,
            Value::Null => KeyIdentity::Null,
            Value::Bool(b) => KeyIdentity::Bool(*b),
            Value::Number(n) => KeyIdentity::Number(number_bits(*n)),
            Value::Str(s) => KeyIdentity::Str(Rc::clone(s)),
            Value::Symbol(s) => KeyIdentity::Symbol(s.id()),
            Value::Object(raw) => KeyIdentity::Target(raw.id()),
            Value::Reactive(r) => KeyIdentity::Target(r.raw().id()),
            Value::Ref(r) => KeyIdentity::Target(r.id()),
            Value::Opaque(o) => KeyIdentity::Target(o.id()),
        }
    }
}

fn number_bits(n: f64) -> u64 {
    if n.is_nan() {
        f64::NAN.to_bits()
    } else if n == 0.0 {
        0.0f64.to_bits()
    } else {
        n.to_bits()
    }
}

impl PartialEq for MapKey {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for MapKey {}

impl Hash for MapKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}
