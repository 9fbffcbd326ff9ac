#![forbid(unsafe_code)]

//! Map and Set operations on observable wrappers.
//!
//! Reading one key tracks that key; size and iteration track the key set.
//! Keys and values are stored raw and read back wrapped. Refs stored in a
//! collection are returned boxed.

use crate::dep::{TrackKey, TriggerKind};
use crate::error::{ReactivityError, Result};
use crate::raw::{RawData, RawKind};
use crate::reactive::Reactive;
use crate::value::{MapKey, Value};

impl Reactive {
    fn expect_collection(&self) -> Result<()> {
        match self.kind() {
            RawKind::Map | RawKind::Set => Ok(()),
            other => Err(ReactivityError::kind_mismatch("map or set", other)),
        }
    }

    /// Tracked Map lookup. `None` when the key is absent.
    pub fn get_entry(&self, key: impl Into<Value>) -> Result<Option<Value>> {
        self.expect_kind(RawKind::Map)?;
        let key = MapKey::new(key);
        self.track(TrackKey::Entry(key.identity()));
        let found = self.raw().with_data(|data| match data {
            RawData::Map(table) => table.get(&key).cloned(),
            _ => None,
        });
        Ok(found.map(|v| self.wrap_read(v, false)))
    }

    /// Map insert. Returns the previous value (raw).
    ///
    /// A new key triggers as an addition; a changed value triggers the key
    /// and the key set, since iteration observes values.
    pub fn insert_entry(
        &self,
        key: impl Into<Value>,
        value: impl Into<Value>,
    ) -> Result<Option<Value>> {
        self.expect_kind(RawKind::Map)?;
        let key = MapKey::new(key);
        let value = value.into().to_raw();
        let identity = key.identity();
        let old = self.raw().with_data_mut(|data| match data {
            RawData::Map(table) => table.insert(key, value.clone()),
            _ => None,
        });
        match &old {
            None => self.trigger(&[TrackKey::Entry(identity)], TriggerKind::Add),
            Some(prev) if !prev.strict_eq(&value) => self.trigger(
                &[TrackKey::Entry(identity), TrackKey::Iterate],
                TriggerKind::Set,
            ),
            Some(_) => {}
        }
        Ok(old)
    }

    /// Set insert. `true` when `member` was new.
    pub fn add(&self, member: impl Into<Value>) -> Result<bool> {
        self.expect_kind(RawKind::Set)?;
        let key = MapKey::new(member);
        let identity = key.identity();
        let added = self.raw().with_data_mut(|data| match data {
            RawData::Set(table) => table.insert(key, ()).is_none(),
            _ => false,
        });
        if added {
            self.trigger(&[TrackKey::Entry(identity)], TriggerKind::Add);
        }
        Ok(added)
    }

    /// Tracked membership test.
    pub fn has_entry(&self, key: impl Into<Value>) -> Result<bool> {
        self.expect_collection()?;
        let key = MapKey::new(key);
        self.track(TrackKey::Entry(key.identity()));
        Ok(self.raw().with_data(|data| match data {
            RawData::Map(table) => table.contains(&key),
            RawData::Set(table) => table.contains(&key),
            _ => false,
        }))
    }

    /// Removes `key`. `true` when it was present.
    pub fn remove_entry(&self, key: impl Into<Value>) -> Result<bool> {
        self.expect_collection()?;
        let key = MapKey::new(key);
        let identity = key.identity();
        let removed = self.raw().with_data_mut(|data| match data {
            RawData::Map(table) => table.remove(&key).is_some(),
            RawData::Set(table) => table.remove(&key).is_some(),
            _ => false,
        });
        if removed {
            self.trigger(&[TrackKey::Entry(identity)], TriggerKind::Delete);
        }
        Ok(removed)
    }

    /// Empties the collection and notifies every reader of it.
    pub fn clear(&self) -> Result<()> {
        self.expect_collection()?;
        let had_entries = self.raw().with_data_mut(|data| match data {
            RawData::Map(table) => {
                let had = !table.is_empty();
                table.clear();
                had
            }
            RawData::Set(table) => {
                let had = !table.is_empty();
                table.clear();
                had
            }
            _ => false,
        });
        if had_entries {
            self.trigger(&[], TriggerKind::Clear);
        }
        Ok(())
    }

    /// Tracked entry count.
    pub fn size(&self) -> Result<usize> {
        self.expect_collection()?;
        Ok(self.len())
    }

    /// Tracked `(key, value)` snapshot. Set entries pair each member with
    /// itself.
    pub fn entries(&self) -> Result<Vec<(Value, Value)>> {
        self.expect_collection()?;
        self.track(TrackKey::Iterate);
        let snapshot: Vec<(Value, Value)> = self.raw().with_data(|data| match data {
            RawData::Map(table) => table
                .iter()
                .map(|(k, v)| (k.value().clone(), v.clone()))
                .collect(),
            RawData::Set(table) => table
                .iter()
                .map(|(k, ())| (k.value().clone(), k.value().clone()))
                .collect(),
            _ => Vec::new(),
        });
        Ok(snapshot
            .into_iter()
            .map(|(k, v)| (self.wrap_read(k, false), self.wrap_read(v, false)))
            .collect())
    }
}
