//! Insertion-ordered keyed store.

use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;

/// Outcome of [`KeyedStore::upsert`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Upsert {
    Added,
    Updated,
}

/// Outcome of [`KeyedStore::remove`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Removal<V> {
    /// The entry existed; carries its last value.
    Removed(V),
    NoOp,
}

impl<V> Removal<V> {
    pub fn is_removed(&self) -> bool {
        matches!(self, Removal::Removed(_))
    }
}

/// Map from a derived key to the entity's latest value, enumerated in
/// first-insertion order.
///
/// Not synchronized: the store is owned by a single mutator.
#[derive(Clone, Debug)]
pub struct KeyedStore<K, V> {
    /// key -> (insertion slot, value).
    entries: HashMap<K, (u64, V)>,

    /// Insertion slot -> key, for ordered enumeration.
    order: BTreeMap<u64, K>,

    /// Next insertion slot.
    next_slot: u64,
}

impl<K, V> KeyedStore<K, V>
where
    K: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_slot: 0,
        }
    }

    /// Insert if absent, otherwise replace in place keeping the position.
    pub fn upsert(&mut self, key: K, value: V) -> Upsert {
        if let Some((_, existing)) = self.entries.get_mut(&key) {
            *existing = value;
            return Upsert::Updated;
        }

        let slot = self.next_slot;
        self.next_slot += 1;
        self.order.insert(slot, key.clone());
        self.entries.insert(key, (slot, value));
        Upsert::Added
    }

    /// Delete the entry if present.
    pub fn remove(&mut self, key: &K) -> Removal<V> {
        match self.entries.remove(key) {
            Some((slot, value)) => {
                self.order.remove(&slot);
                Removal::Removed(value)
            }
            None => Removal::NoOp,
        }
    }

    /// Remove every stored key not in `live_keys`; keys present are untouched.
    ///
    /// Returns the removed entries in enumeration order.
    pub fn reconcile_full_set(&mut self, live_keys: &HashSet<K>) -> Vec<(K, V)> {
        let stale: Vec<(u64, K)> = self
            .order
            .iter()
            .filter(|(_, key)| !live_keys.contains(*key))
            .map(|(slot, key)| (*slot, key.clone()))
            .collect();

        let mut removed = Vec::with_capacity(stale.len());
        for (slot, key) in stale {
            self.order.remove(&slot);
            if let Some((_, value)) = self.entries.remove(&key) {
                removed.push((key, value));
            }
        }
        removed
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key).map(|(_, value)| value)
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get_mut(key).map(|(_, value)| value)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in first-insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.order.values().filter_map(move |key| {
            self.entries.get(key).map(|(_, value)| (key, value))
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.order.values()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

impl<K, V> Default for KeyedStore<K, V>
where
    K: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}
