#![forbid(unsafe_code)]

//! Exemption registry: raw containers that must never be wrapped.

use std::rc::Weak;

use ahash::AHashMap;

use crate::dep::TargetId;
use crate::raw::{RawNode, RawObject};

#[derive(Default)]
pub(crate) struct ExemptionSet {
    entries: AHashMap<TargetId, Weak<RawNode>>,
}

impl ExemptionSet {
    /// Returns `false` if `raw` was already exempt.
    pub(crate) fn insert(&mut self, raw: &RawObject) -> bool {
        self.entries.insert(raw.id(), raw.downgrade()).is_none()
    }

    pub(crate) fn contains(&self, raw: &RawObject) -> bool {
        self.entries.contains_key(&raw.id())
    }

    pub(crate) fn sweep(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, raw| raw.strong_count() > 0);
        before - self.entries.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
