//! Key-indexed stack with O(1) membership operations.
//!
//! A [`KeyedStack`] is the ordered container behind each priority tier:
//! last-in-first-out order over entries that can also be addressed, replaced
//! and removed by key in constant time. Pushing a key that is already
//! present overwrites its value and moves it to the top, which is how a
//! repeated submission "bumps" a pending request ahead of staler work.
//!
//! Nodes live in a slot arena (a `Vec` with a free list) and are linked as a
//! doubly-linked list, with a `HashMap` from key to slot for direct access.

use std::collections::HashMap;
use std::hash::Hash;

struct Node<K, V> {
    key: K,
    value: V,
    /// Slot of the entry pushed after this one (toward the top).
    newer: Option<usize>,
    /// Slot of the entry pushed before this one (toward the bottom).
    older: Option<usize>,
}

/// LIFO container with constant-time keyed access.
pub struct KeyedStack<K, V> {
    slots: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    index: HashMap<K, usize>,
    top: Option<usize>,
    bottom: Option<usize>,
}

impl<K, V> KeyedStack<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Creates an empty stack.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            top: None,
            bottom: None,
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True when no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// True when `key` has a live entry.
    pub fn contains_key(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Pushes an entry on top of the stack.
    ///
    /// If `key` is already present its entry is replaced and moved to the
    /// top; the displaced value is returned.
    pub fn push(&mut self, key: K, value: V) -> Option<V> {
        let displaced = self.remove(&key);
        let node = Node {
            key: key.clone(),
            value,
            newer: None,
            older: self.top,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                slot
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        match self.top {
            Some(top) => {
                if let Some(prev) = self.node_mut(top) {
                    prev.newer = Some(slot);
                }
            }
            None => self.bottom = Some(slot),
        }
        self.top = Some(slot);
        self.index.insert(key, slot);
        displaced
    }

    /// Removes and returns the most recently pushed entry.
    pub fn pop(&mut self) -> Option<(K, V)> {
        let top = self.top?;
        let node = self.detach(top)?;
        self.index.remove(&node.key);
        Some((node.key, node.value))
    }

    /// Removes the entry for `key`, wherever it sits in the stack.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let slot = self.index.remove(key)?;
        let node = self.detach(slot)?;
        Some(node.value)
    }

    /// Borrows the most recently pushed entry.
    pub fn peek(&self) -> Option<(&K, &V)> {
        let node = self.node(self.top?)?;
        Some((&node.key, &node.value))
    }

    /// Borrows the value for `key`.
    pub fn get(&self, key: &K) -> Option<&V> {
        let node = self.node(*self.index.get(key)?)?;
        Some(&node.value)
    }

    /// Mutably borrows the value for `key`.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let slot = *self.index.get(key)?;
        let node = self.node_mut(slot)?;
        Some(&mut node.value)
    }

    /// Visits every entry from newest to oldest, allowing value mutation.
    pub fn for_each_value_mut(&mut self, mut f: impl FnMut(&K, &mut V)) {
        let mut cursor = self.top;
        while let Some(slot) = cursor {
            match self.slots.get_mut(slot).and_then(|s| s.as_mut()) {
                Some(node) => {
                    f(&node.key, &mut node.value);
                    cursor = node.older;
                }
                None => break,
            }
        }
    }

    /// Iterates entries from newest to oldest.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            stack: self,
            cursor: self.top,
        }
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.index.clear();
        self.top = None;
        self.bottom = None;
    }

    fn node(&self, slot: usize) -> Option<&Node<K, V>> {
        self.slots.get(slot).and_then(|s| s.as_ref())
    }

    fn node_mut(&mut self, slot: usize) -> Option<&mut Node<K, V>> {
        self.slots.get_mut(slot).and_then(|s| s.as_mut())
    }

    /// Unlinks and returns the node in `slot`, recycling the slot.
    fn detach(&mut self, slot: usize) -> Option<Node<K, V>> {
        let node = self.slots.get_mut(slot)?.take()?;
        match node.newer {
            Some(newer) => {
                if let Some(n) = self.node_mut(newer) {
                    n.older = node.older;
                }
            }
            None => self.top = node.older,
        }
        match node.older {
            Some(older) => {
                if let Some(n) = self.node_mut(older) {
                    n.newer = node.newer;
                }
            }
            None => self.bottom = node.newer,
        }
        self.free.push(slot);
        Some(node)
    }
}

impl<K, V> Default for KeyedStack<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Newest-to-oldest iterator over a [`KeyedStack`].
pub struct Iter<'a, K, V> {
    stack: &'a KeyedStack<K, V>,
    cursor: Option<usize>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V>
where
    K: Eq + Hash + Clone,
{
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.node(self.cursor?)?;
        self.cursor = node.older;
        Some((&node.key, &node.value))
    }
}
