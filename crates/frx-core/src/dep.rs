#![forbid(unsafe_code)]

//! Dependency store.
//!
//! Maps `(target, key)` pairs to the set of effects that read them during
//! their latest run. Targets are held weakly: an entry whose target has been
//! dropped is unreachable by any trigger and is reclaimed by [`DepStore::sweep`].

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::effect::EffectNode;
use crate::value::{KeyIdentity, PropKey};

/// Identifier of anything that can own dependencies.
pub type TargetId = u64;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier shared by containers, wrappers, refs, effects
/// and symbols.
pub(crate) fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// What an effect read on a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum TrackKey {
    /// A named or indexed property.
    Prop(PropKey),
    /// A Map/Set entry.
    Entry(KeyIdentity),
    /// The key set (array length, collection size and enumeration).
    Iterate,
    /// A ref's boxed value.
    Value,
}

/// Mutation category carried by a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    Add,
    Set,
    Delete,
    Clear,
}

impl TriggerKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Set => "set",
            Self::Delete => "delete",
            Self::Clear => "clear",
        }
    }

    /// Changes the key set, so enumeration readers rerun as well.
    pub const fn is_structural(self) -> bool {
        matches!(self, Self::Add | Self::Delete)
    }
}

/// Identity of a tracked target plus a liveness probe.
#[derive(Clone)]
pub(crate) struct Target {
    id: TargetId,
    liveness: Weak<dyn Any>,
}

impl Target {
    pub(crate) fn new(id: TargetId, liveness: Weak<dyn Any>) -> Self {
        Self { id, liveness }
    }

    pub(crate) fn id(&self) -> TargetId {
        self.id
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.liveness.strong_count() > 0
    }
}

/// Subscribers of one `(target, key)` pair.
#[derive(Default)]
pub(crate) struct Dep {
    subscribers: RefCell<SmallVec<[Rc<EffectNode>; 4]>>,
}

impl Dep {
    /// Returns `false` when `effect` was already subscribed.
    pub(crate) fn subscribe(&self, effect: &Rc<EffectNode>) -> bool {
        let mut subs = self.subscribers.borrow_mut();
        if subs.iter().any(|s| s.id() == effect.id()) {
            return false;
        }
        subs.push(Rc::clone(effect));
        true
    }

    pub(crate) fn unsubscribe(&self, effect_id: u64) {
        self.subscribers.borrow_mut().retain(|s| s.id() != effect_id);
    }

    pub(crate) fn clear(&self) {
        self.subscribers.borrow_mut().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.subscribers.borrow().len()
    }

    fn collect_into(&self, out: &mut Vec<Rc<EffectNode>>) {
        for sub in self.subscribers.borrow().iter() {
            if !out.iter().any(|s| s.id() == sub.id()) {
                out.push(Rc::clone(sub));
            }
        }
    }
}

struct TargetDeps {
    target: Target,
    keys: AHashMap<TrackKey, Rc<Dep>>,
    /// Creation order, so a clear visits deps deterministically.
    order: Vec<Rc<Dep>>,
}

/// Target → key → dep.
#[derive(Default)]
pub(crate) struct DepStore {
    targets: AHashMap<TargetId, TargetDeps>,
}

impl DepStore {
    /// The dep for `(target, key)`, created on first use.
    pub(crate) fn dep_for(&mut self, target: &Target, key: TrackKey) -> Rc<Dep> {
        let entry = self
            .targets
            .entry(target.id())
            .or_insert_with(|| TargetDeps {
                target: target.clone(),
                keys: AHashMap::new(),
                order: Vec::new(),
            });
        if let Some(dep) = entry.keys.get(&key) {
            return Rc::clone(dep);
        }
        let dep = Rc::new(Dep::default());
        entry.keys.insert(key, Rc::clone(&dep));
        entry.order.push(Rc::clone(&dep));
        dep
    }

    /// Snapshot of the effects to notify for a mutation, deduplicated.
    ///
    /// Structural kinds add the enumeration subscribers; `Clear` notifies
    /// every subscriber of the target.
    pub(crate) fn subscribers_for(
        &self,
        target: TargetId,
        keys: &[TrackKey],
        kind: TriggerKind,
    ) -> Vec<Rc<EffectNode>> {
        let mut out = Vec::new();
        let Some(entry) = self.targets.get(&target) else {
            return out;
        };
        if kind == TriggerKind::Clear {
            for dep in &entry.order {
                dep.collect_into(&mut out);
            }
            return out;
        }
        for key in keys {
            if let Some(dep) = entry.keys.get(key) {
                dep.collect_into(&mut out);
            }
        }
        if kind.is_structural()
            && !keys.contains(&TrackKey::Iterate)
            && let Some(dep) = entry.keys.get(&TrackKey::Iterate)
        {
            dep.collect_into(&mut out);
        }
        out
    }

    /// Drops entries whose target is gone. Returns how many were removed.
    pub(crate) fn sweep(&mut self) -> usize {
        let before = self.targets.len();
        self.targets.retain(|_, entry| {
            let alive = entry.target.is_alive();
            if !alive {
                for dep in &entry.order {
                    dep.clear();
                }
            }
            alive
        });
        before - self.targets.len()
    }

    pub(crate) fn target_count(&self) -> usize {
        self.targets.len()
    }

    pub(crate) fn dep_count(&self) -> usize {
        self.targets.values().map(|e| e.order.len()).sum()
    }

    pub(crate) fn subscription_count(&self) -> usize {
        self.targets
            .values()
            .flat_map(|e| e.order.iter())
            .map(|dep| dep.len())
            .sum()
    }

    /// Empties every dep. Breaks the effect ↔ dep cycles on teardown.
    pub(crate) fn clear_all(&mut self) {
        for entry in self.targets.values() {
            for dep in &entry.order {
                dep.clear();
            }
        }
        self.targets.clear();
    }
}
