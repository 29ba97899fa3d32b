//! Masking overlay map.
//!
//! [`OverlayMap`] presents the logical union of a private `own` layer and a
//! wrapped, read-only `target` map without ever touching the target and
//! without copying it up front.  Deletions of target entries are recorded in
//! a lazily-allocated tombstone set instead of being applied, so an
//! arbitrarily deep chain of scopes shares one copy of every ancestor layer.
//!
//! The wrapped target is itself an `OverlayMap` behind an [`Arc`], which is
//! what allows chains: every scope layer wraps the previous one and the root
//! layer wraps nothing.  Once a map has been wrapped it is frozen (there is
//! no interior mutability), so a layer's bookkeeping can never be
//! invalidated from below.
//!
//! ## Lookup precedence
//!
//! For any key: `own` wins; otherwise a tombstone means absent; otherwise
//! the target (recursively) decides.  Tombstones only ever suppress the
//! target, never `own`.
//!
//! ## View semantics
//!
//! When there is no wrapped target, [`iter`](OverlayMap::iter),
//! [`keys`](OverlayMap::keys) and [`values`](OverlayMap::values) borrow the
//! private layer directly and allocate nothing.  When a target is present
//! they yield a merged sequence computed up front by a single fold over the
//! ancestor chain (linear in chain depth × layer size).  Callers that need a
//! detached copy of the merged view use [`snapshot`](OverlayMap::snapshot).
//! This is deliberately weaker than a fully live view of a plain map:
//! defensively copying the target at every scope boundary would be far more
//! expensive for deep, branching traversals with many small scopes.

use std::borrow::Borrow;
use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;

use indexmap::IndexMap;

// ── OverlayMap ────────────────────────────────────────────────────────────────

/// A mutable key/value layer over a frozen, shared target map.
///
/// `Clone` shallow-copies the private layer and the tombstone set and shares
/// the target by reference (copy-on-write).
#[derive(Debug, Clone, Default)]
pub struct OverlayMap<K, V> {
    /// Private additions/overrides.  Insertion order is preserved so that
    /// iteration over views is deterministic.
    own: IndexMap<K, V>,
    /// The wrapped map, frozen once shared.  `None` at the root of a chain.
    target: Option<Arc<OverlayMap<K, V>>>,
    /// Keys logically deleted from the target's visible surface.
    ///
    /// Invariant: always a subset of the target's visible keys, and a key is
    /// tombstoned at most once.  A key present in both `own` and the target
    /// is always tombstoned, so `len()` never double-counts.
    removed: Option<HashSet<K>>,
}

impl<K, V> OverlayMap<K, V>
where
    K: Hash + Eq,
{
    /// An empty root map wrapping nothing.
    pub fn new() -> Self {
        OverlayMap {
            own: IndexMap::new(),
            target: None,
            removed: None,
        }
    }

    /// An empty layer over `target`.
    pub fn wrap(target: Arc<OverlayMap<K, V>>) -> Self {
        OverlayMap {
            own: IndexMap::new(),
            target: Some(target),
            removed: None,
        }
    }

    /// A layer over `target` pre-populated with `own`.
    ///
    /// Entries are applied through [`insert`](Self::insert) so that keys
    /// shadowing target entries are tombstoned as usual.
    pub fn wrap_with(target: Arc<OverlayMap<K, V>>, own: IndexMap<K, V>) -> Self
    where
        K: Clone,
        V: Clone,
    {
        let mut map = Self::wrap(target);
        for (key, value) in own {
            map.insert(key, value);
        }
        map
    }

    /// Number of visible entries: own entries plus non-tombstoned target
    /// entries.
    pub fn len(&self) -> usize {
        let target_len = self.target.as_ref().map_or(0, |t| t.len());
        let removed_len = self.removed.as_ref().map_or(0, HashSet::len);
        self.own.len() + target_len - removed_len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` is visible through this layer.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Whether `value` is visible through this layer.
    pub fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.iter().any(|(_, v)| v == value)
    }

    /// Look `key` up: `own` wins, a tombstone means absent, otherwise the
    /// target chain decides.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut layer = self;
        loop {
            if let Some(value) = layer.own.get(key) {
                return Some(value);
            }
            if layer.is_tombstoned(key) {
                return None;
            }
            layer = layer.target.as_deref()?;
        }
    }

    /// Insert into the private layer, returning the previously *visible*
    /// value: `own`'s prior value if any, the target's value if this insert
    /// shadows it for the first time, `None` otherwise.
    ///
    /// The first insert that shadows a visible target entry also tombstones
    /// the key so that `len()` accounting stays correct.  A key that is
    /// already tombstoned is never tombstoned twice, and re-inserting it
    /// reports `None` (the target's entry was not visible).
    pub fn insert(&mut self, key: K, value: V) -> Option<V>
    where
        K: Clone,
        V: Clone,
    {
        let shadows_target = !self.own.contains_key(&key)
            && !self.is_tombstoned(&key)
            && self.target.as_ref().is_some_and(|t| t.contains_key(&key));
        if shadows_target {
            let previous = self.target.as_ref().and_then(|t| t.get(&key)).cloned();
            self.removed
                .get_or_insert_with(HashSet::new)
                .insert(key.clone());
            self.own.insert(key, value);
            return previous;
        }
        self.own.insert(key, value)
    }

    /// Remove `key` from the visible surface, returning the value that was
    /// visible.  Removing an absent or already-removed key is a `None`
    /// no-op.
    ///
    /// A key held in `own` is removed from `own` directly; any tombstone for
    /// it is left in place (own-removal and target-masking are independent
    /// layers).  A key visible only through the target is tombstoned and its
    /// target value returned, without touching the target.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
        V: Clone,
    {
        if let Some(value) = self.own.shift_remove(key) {
            return Some(value);
        }
        if self.is_tombstoned(key) {
            return None;
        }
        let previous = self.target.as_deref()?.get(key).cloned()?;
        self.removed
            .get_or_insert_with(HashSet::new)
            .insert(key.to_owned());
        Some(previous)
    }

    /// Empty the visible surface: every visible target key is tombstoned in
    /// one pass and the private layer is cleared.  The target itself is
    /// untouched; `is_empty()` is true afterwards.
    pub fn clear(&mut self)
    where
        K: Clone,
    {
        if let Some(target) = self.target.as_deref() {
            let mask: HashSet<K> = target.keys().cloned().collect();
            self.removed = if mask.is_empty() { None } else { Some(mask) };
        }
        self.own.clear();
    }

    /// Iterate over the visible entries.
    ///
    /// Without a wrapped target this borrows the private layer directly;
    /// with one it yields a merged sequence precomputed by a single fold
    /// over the ancestor chain.  Order: deepest layer's entries first in
    /// their insertion order, with shadowing or new entries appearing at the
    /// shadowing layer's insertion position.
    pub fn iter(&self) -> Iter<'_, K, V> {
        match &self.target {
            None => Iter(IterInner::Live(self.own.iter())),
            Some(_) => Iter(IterInner::Merged(self.merged().into_iter())),
        }
    }

    /// Iterate over the visible keys.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(key, _)| key)
    }

    /// Iterate over the visible values.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, value)| value)
    }

    /// An owned copy of the merged visible view.  The returned map is
    /// detached: later mutation of this overlay does not affect it.
    pub fn snapshot(&self) -> IndexMap<K, V>
    where
        K: Clone,
        V: Clone,
    {
        self.iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    fn is_tombstoned<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.removed.as_ref().is_some_and(|r| r.contains(key))
    }

    /// Fold the ancestor chain root-first: each layer drops its tombstoned
    /// keys from the accumulated view, then applies its own entries.  One
    /// pass per layer, no recursive merging.
    fn merged(&self) -> Vec<(&K, &V)> {
        let mut chain = Vec::new();
        let mut layer = self;
        loop {
            chain.push(layer);
            match layer.target.as_deref() {
                Some(target) => layer = target,
                None => break,
            }
        }
        let mut merged: IndexMap<&K, &V> = IndexMap::new();
        for layer in chain.into_iter().rev() {
            if let Some(removed) = &layer.removed {
                for key in removed {
                    merged.shift_remove(key);
                }
            }
            for (key, value) in &layer.own {
                merged.insert(key, value);
            }
        }
        merged.into_iter().collect()
    }
}

impl<K, V> From<IndexMap<K, V>> for OverlayMap<K, V>
where
    K: Hash + Eq,
{
    /// A root map whose private layer holds `base`.
    fn from(base: IndexMap<K, V>) -> Self {
        OverlayMap {
            own: base,
            target: None,
            removed: None,
        }
    }
}

// ── Iter ──────────────────────────────────────────────────────────────────────

/// Iterator over the visible entries of an [`OverlayMap`].
pub struct Iter<'a, K, V>(IterInner<'a, K, V>);

enum IterInner<'a, K, V> {
    /// No wrapped target: borrows the private layer.
    Live(indexmap::map::Iter<'a, K, V>),
    /// Wrapped target present: merged sequence computed up front.
    Merged(std::vec::IntoIter<(&'a K, &'a V)>),
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.0 {
            IterInner::Live(it) => it.next(),
            IterInner::Merged(it) => it.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.0 {
            IterInner::Live(it) => it.size_hint(),
            IterInner::Merged(it) => it.size_hint(),
        }
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

// ── Tests ─────────────────────────────────────────────────────────────────────
