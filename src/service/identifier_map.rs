//! Waiter bookkeeping for in-flight identifiers.

use crate::identifier::Identifier;
use std::collections::HashMap;

/// Multimap from an in-flight identifier to the parties awaiting it.
///
/// An identifier is present exactly while a request for it is in flight.
/// Values are kept in insertion order so results fan out to waiters in the
/// order they subscribed.
pub struct IdentifierMap<V> {
    entries: HashMap<Identifier, Vec<V>>,
}

impl<V> IdentifierMap<V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Appends a waiter for `identifier`, creating the entry on first use.
    ///
    /// Returns true when this was the first waiter, meaning the caller is
    /// responsible for starting the underlying request.
    pub fn add(&mut self, identifier: Identifier, value: V) -> bool {
        match self.entries.entry(identifier) {
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                entry.get_mut().push(value);
                false
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(vec![value]);
                true
            }
        }
    }

    /// Removes the entry for `identifier`, returning its waiters in
    /// subscription order. Returns an empty list when nothing was waiting.
    pub fn remove(&mut self, identifier: &Identifier) -> Vec<V> {
        self.entries.remove(identifier).unwrap_or_default()
    }

    /// True while a request for `identifier` is in flight.
    pub fn contains(&self, identifier: &Identifier) -> bool {
        self.entries.contains_key(identifier)
    }

    /// Number of waiters recorded for `identifier`.
    pub fn waiter_count(&self, identifier: &Identifier) -> usize {
        self.entries.get(identifier).map_or(0, Vec::len)
    }

    /// Number of in-flight identifiers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no identifier is in flight.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every entry, returning the waiters of each.
    pub fn drain(&mut self) -> Vec<(Identifier, Vec<V>)> {
        self.entries.drain().collect()
    }
}

impl<V> Default for IdentifierMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_add_signals_new_entry() {
        let mut map = IdentifierMap::new();
        assert!(map.add(Identifier::from("a"), 1));
        assert!(!map.add(Identifier::from("a"), 2));
        assert!(map.add(Identifier::from("b"), 3));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_remove_returns_waiters_in_order() {
        let mut map = IdentifierMap::new();
        map.add(Identifier::from("a"), "first");
        map.add(Identifier::from("a"), "second");
        map.add(Identifier::from("a"), "third");

        assert_eq!(map.remove(&Identifier::from("a")), vec![
            "first", "second", "third"
        ]);
        assert!(!map.contains(&Identifier::from("a")));
    }

    #[test]
    fn test_remove_absent_is_empty() {
        let mut map: IdentifierMap<u32> = IdentifierMap::new();
        assert!(map.remove(&Identifier::from("missing")).is_empty());
    }

    #[test]
    fn test_waiter_count() {
        let mut map = IdentifierMap::new();
        assert_eq!(map.waiter_count(&Identifier::from("a")), 0);
        map.add(Identifier::from("a"), ());
        map.add(Identifier::from("a"), ());
        assert_eq!(map.waiter_count(&Identifier::from("a")), 2);
    }

    #[test]
    fn test_drain_empties_map() {
        let mut map = IdentifierMap::new();
        map.add(Identifier::from("a"), 1);
        map.add(Identifier::from("b"), 2);
        let drained = map.drain();
        assert_eq!(drained.len(), 2);
        assert!(map.is_empty());
    }
}
