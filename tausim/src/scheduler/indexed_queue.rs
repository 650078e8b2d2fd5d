use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;

use slab::Slab;

use crate::model::{ReactionHandle, ReactionId};
use crate::time::Time;

use super::{Scheduler, SchedulerError};

/// Ordering key: time stamp, then insertion sequence number.
type Key = (Time, u64);

struct Entry<E> {
    reaction: ReactionHandle<E>,
    /// `tau` as of the last insertion or update.
    tau: Time,
    seq: u64,
    /// Position in the heap.
    pos: usize,
}

/// A binary min-heap of reactions with `O(log n)` removal and update by
/// identity.
///
/// Entries live in a slab; the heap stores slab keys and each entry records
/// its own position in the heap, so that a reaction can be located from its
/// identifier in `O(1)`.
///
/// The queue caches the `tau` of each reaction when it is added or updated:
/// a reaction whose `tau` changed without a subsequent call to
/// [`update`](Scheduler::update) keeps its former position.
pub struct IndexedPriorityQueue<E> {
    entries: Slab<Entry<E>>,
    heap: Vec<usize>,
    index: HashMap<ReactionId, usize>,
    next_seq: u64,
}

impl<E> IndexedPriorityQueue<E> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            entries: Slab::new(),
            heap: Vec::new(),
            index: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Returns the time stamp at which the reaction was last positioned.
    pub fn scheduled_tau(&self, id: ReactionId) -> Option<Time> {
        self.index.get(&id).map(|&key| self.entries[key].tau)
    }

    /// Returns, in execution order, the scheduled reactions for which
    /// `accept` returns `true`.
    ///
    /// The scan stops at the first rejected reaction; `accept` receives the
    /// number of reactions accepted so far and the time stamp of the
    /// candidate. Only the explored part of the heap is visited, so
    /// collecting `k` reactions costs `O(k log k)`.
    pub(crate) fn scan_ordered(
        &self,
        mut accept: impl FnMut(usize, Time) -> bool,
    ) -> Vec<ReactionHandle<E>> {
        let mut batch = Vec::new();
        let mut frontier = BinaryHeap::new();
        if !self.heap.is_empty() {
            frontier.push(Reverse((self.key(0), 0)));
        }

        while let Some(Reverse(((tau, _), pos))) = frontier.pop() {
            if !accept(batch.len(), tau) {
                break;
            }
            batch.push(self.entries[self.heap[pos]].reaction.clone());

            for child in [2 * pos + 1, 2 * pos + 2] {
                if child < self.heap.len() {
                    frontier.push(Reverse((self.key(child), child)));
                }
            }
        }

        batch
    }

    fn key(&self, pos: usize) -> Key {
        let entry = &self.entries[self.heap[pos]];

        (entry.tau, entry.seq)
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.entries[self.heap[a]].pos = a;
        self.entries[self.heap[b]].pos = b;
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.key(pos) >= self.key(parent) {
                break;
            }
            self.swap(pos, parent);
            pos = parent;
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * pos + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let child = if right < len && self.key(right) < self.key(left) {
                right
            } else {
                left
            };
            if self.key(child) >= self.key(pos) {
                break;
            }
            self.swap(pos, child);
            pos = child;
        }
    }
}

impl<E> Scheduler<E> for IndexedPriorityQueue<E> {
    fn add(&mut self, reaction: ReactionHandle<E>) -> Result<(), SchedulerError> {
        let id = reaction.id();
        if self.index.contains_key(&id) {
            return Err(SchedulerError::AlreadyScheduled(id));
        }

        let pos = self.heap.len();
        let key = self.entries.insert(Entry {
            tau: reaction.tau(),
            reaction,
            seq: self.next_seq,
            pos,
        });
        self.next_seq += 1;
        self.index.insert(id, key);
        self.heap.push(key);
        self.sift_up(pos);

        Ok(())
    }

    fn remove(&mut self, id: ReactionId) -> Result<ReactionHandle<E>, SchedulerError> {
        let key = self
            .index
            .remove(&id)
            .ok_or(SchedulerError::NotScheduled(id))?;

        let pos = self.entries[key].pos;
        let last = self.heap.len() - 1;
        self.swap(pos, last);
        self.heap.pop();
        let entry = self.entries.remove(key);

        if pos < self.heap.len() {
            self.sift_down(pos);
            self.sift_up(pos);
        }

        Ok(entry.reaction)
    }

    fn update(&mut self, id: ReactionId) -> Result<(), SchedulerError> {
        let key = *self.index.get(&id).ok_or(SchedulerError::NotScheduled(id))?;

        let entry = &mut self.entries[key];
        let old_tau = entry.tau;
        let new_tau = entry.reaction.tau();
        if new_tau == old_tau {
            return Ok(());
        }
        entry.tau = new_tau;
        let pos = entry.pos;

        if new_tau < old_tau {
            self.sift_up(pos);
        } else {
            self.sift_down(pos);
        }

        Ok(())
    }

    fn peek_next(&self) -> Option<ReactionHandle<E>> {
        self.heap
            .first()
            .map(|&key| self.entries[key].reaction.clone())
    }

    fn get(&self, id: ReactionId) -> Option<&ReactionHandle<E>> {
        self.index.get(&id).map(|&key| &self.entries[key].reaction)
    }

    fn len(&self) -> usize {
        self.heap.len()
    }
}

impl<E> Default for IndexedPriorityQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for IndexedPriorityQueue<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexedPriorityQueue")
            .field("len", &self.heap.len())
            .field(
                "next",
                &self.heap.first().map(|&key| self.entries[key].tau),
            )
            .finish_non_exhaustive()
    }
}
