#![forbid(unsafe_code)]

//! Raw ↔ wrapper identity registry.
//!
//! Entries are weak. A wrapper keeps its raw container alive, not the other
//! way round, so a raw object with no outstanding wrapper simply gets a fresh
//! one on its next observation. The reverse direction needs no table: every
//! wrapper owns its raw container.

use std::rc::Weak;

use ahash::AHashMap;

use crate::dep::TargetId;
use crate::raw::RawObject;
use crate::reactive::{Reactive, ReactiveNode};

#[derive(Default)]
pub(crate) struct IdentityRegistry {
    by_raw: AHashMap<TargetId, Weak<ReactiveNode>>,
}

impl IdentityRegistry {
    /// Live wrapper registered for `raw`, if any.
    pub(crate) fn wrapper_for(&self, raw: &RawObject) -> Option<Reactive> {
        self.by_raw.get(&raw.id()).and_then(Reactive::upgrade)
    }

    pub(crate) fn register(&mut self, raw: &RawObject, wrapper: &Reactive) {
        self.by_raw.insert(raw.id(), wrapper.downgrade());
    }

    /// Removes pairs whose wrapper is gone. Returns how many were removed.
    pub(crate) fn sweep(&mut self) -> usize {
        let before = self.by_raw.len();
        self.by_raw.retain(|_, wrapper| wrapper.strong_count() > 0);
        before - self.by_raw.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_raw.len()
    }
}
