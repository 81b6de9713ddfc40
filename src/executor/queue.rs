//! Tiered pending-request store.
//!
//! A [`PriorityQueue`] holds the requests an executor has accepted but not
//! yet run, split into [`PriorityAccessor`] tiers. Tier 0 is served first;
//! within a tier the most recently added request is served first, and
//! re-adding an identifier bumps it to the top of its tier. The queue is a
//! plain data structure: its owner serializes access under a single lock
//! and decides what to do with the cancelled entries a dequeue discards.

use crate::executor::keyed_stack::KeyedStack;
use crate::executor::request::{Prioritizable, PrioritizableRequest};
use crate::identifier::Identifier;
use std::collections::HashSet;

/// One priority tier: pending requests in last-requested-first-served order.
pub struct PriorityAccessor<P> {
    stack: KeyedStack<Identifier, PrioritizableRequest<P>>,
}

impl<P: Prioritizable> PriorityAccessor<P> {
    fn new() -> Self {
        Self {
            stack: KeyedStack::new(),
        }
    }

    /// Adds a request, replacing and bumping any entry with the same
    /// identifier. Returns the displaced request, if any.
    pub fn attach(
        &mut self,
        request: PrioritizableRequest<P>,
    ) -> Option<PrioritizableRequest<P>> {
        let id = request.identifier().clone();
        self.stack.push(id, request)
    }

    /// Removes the entry for `identifier`.
    pub fn detach(&mut self, identifier: &Identifier) -> Option<PrioritizableRequest<P>> {
        self.stack.remove(identifier)
    }

    /// Removes the most recently added entry.
    pub fn detach_most_recent(&mut self) -> Option<PrioritizableRequest<P>> {
        self.stack.pop().map(|(_, request)| request)
    }

    /// Borrows the most recently added entry.
    pub fn peek(&self) -> Option<&PrioritizableRequest<P>> {
        self.stack.peek().map(|(_, request)| request)
    }

    /// Iterates entries from most to least recently added.
    pub fn iter(&self) -> impl Iterator<Item = (&Identifier, &PrioritizableRequest<P>)> {
        self.stack.iter()
    }

    /// True when `identifier` is pending in this tier.
    pub fn contains(&self, identifier: &Identifier) -> bool {
        self.stack.contains_key(identifier)
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// True when no entries are pending.
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.stack.clear();
    }

    fn mark_all_cancelled(&mut self) {
        self.stack
            .for_each_value_mut(|_, request| request.set_cancelled());
    }
}

/// Result of a dequeue scan: the chosen request plus every cancelled entry
/// discarded while looking for it. The caller reports the discards.
pub struct Dequeue<P> {
    /// Highest-priority runnable request, if any.
    pub request: Option<PrioritizableRequest<P>>,
    /// Cancelled entries removed during the scan.
    pub cancelled: Vec<PrioritizableRequest<P>>,
}

/// Pending requests across all priority tiers.
///
/// Uniqueness is queue-wide: adding an identifier that is already pending
/// replaces the old entry, even when the new submission targets a different
/// tier (the entry migrates).
pub struct PriorityQueue<P> {
    accessors: Vec<PriorityAccessor<P>>,
}

impl<P: Prioritizable> PriorityQueue<P> {
    /// Creates a queue with `levels` priority tiers.
    ///
    /// # Panics
    ///
    /// Panics when `levels` is zero.
    pub fn new(levels: usize) -> Self {
        assert!(levels > 0, "priority queue needs at least one level");
        let mut accessors = Vec::with_capacity(levels);
        for _ in 0..levels {
            accessors.push(PriorityAccessor::new());
        }
        Self { accessors }
    }

    /// Number of priority tiers.
    pub fn levels(&self) -> usize {
        self.accessors.len()
    }

    /// Adds a request at its accessor index, bumping or migrating any
    /// pending entry with the same identifier.
    ///
    /// # Panics
    ///
    /// Panics when the request's accessor index is out of range, which is a
    /// construction bug in the caller.
    pub fn add(&mut self, request: PrioritizableRequest<P>) {
        let index = request.accessor_index();
        assert!(
            index < self.accessors.len(),
            "accessor index {} out of range for {} priority levels",
            index,
            self.accessors.len()
        );
        let id = request.identifier().clone();
        for (i, accessor) in self.accessors.iter_mut().enumerate() {
            if i != index {
                accessor.detach(&id);
            }
        }
        self.accessors[index].attach(request);
    }

    /// Removes the highest-priority runnable request.
    ///
    /// Scans tiers in index order and entries within a tier from most to
    /// least recent. Cancelled entries encountered during the scan are
    /// removed and returned for reporting; entries whose identifier is in
    /// `blocked` are left queued and skipped.
    pub fn remove_highest_priority(&mut self, blocked: &HashSet<Identifier>) -> Dequeue<P> {
        let mut cancelled = Vec::new();
        for accessor in &mut self.accessors {
            let mut chosen: Option<Identifier> = None;
            let mut discard: Vec<Identifier> = Vec::new();
            for (id, request) in accessor.iter() {
                if request.is_cancelled() {
                    discard.push(id.clone());
                } else if !blocked.contains(id) {
                    chosen = Some(id.clone());
                    break;
                }
            }
            for id in &discard {
                if let Some(request) = accessor.detach(id) {
                    cancelled.push(request);
                }
            }
            if let Some(id) = chosen {
                return Dequeue {
                    request: accessor.detach(&id),
                    cancelled,
                };
            }
        }
        Dequeue {
            request: None,
            cancelled,
        }
    }

    /// Removes the entry for `identifier` from whichever tier holds it.
    pub fn remove(&mut self, identifier: &Identifier) -> Option<PrioritizableRequest<P>> {
        self.accessors
            .iter_mut()
            .find_map(|accessor| accessor.detach(identifier))
    }

    /// True when `identifier` is pending anywhere in the queue.
    pub fn contains(&self, identifier: &Identifier) -> bool {
        self.accessors
            .iter()
            .any(|accessor| accessor.contains(identifier))
    }

    /// Total number of pending requests.
    pub fn size(&self) -> usize {
        self.accessors.iter().map(PriorityAccessor::len).sum()
    }

    /// True when no requests are pending.
    pub fn is_empty(&self) -> bool {
        self.accessors.iter().all(PriorityAccessor::is_empty)
    }

    /// Borrows the entry a dequeue would consider first.
    pub fn peek(&self) -> Option<&PrioritizableRequest<P>> {
        self.accessors.iter().find_map(PriorityAccessor::peek)
    }

    /// Marks every pending request cancelled; they will be discarded and
    /// reported at dequeue time.
    pub fn mark_all_cancelled(&mut self) {
        for accessor in &mut self.accessors {
            accessor.mark_all_cancelled();
        }
    }

    /// Drops every pending request.
    pub fn clear(&mut self) {
        for accessor in &mut self.accessors {
            accessor.clear();
        }
    }
}
