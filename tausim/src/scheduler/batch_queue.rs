use crate::model::{ReactionHandle, ReactionId};
use crate::time::Time;

use super::{BatchScheduler, IndexedPriorityQueue, Scheduler, SchedulerError};

/// A batch scheduler returning the `k` earliest reactions.
#[derive(Debug)]
pub struct FixedBatchQueue<E> {
    inner: IndexedPriorityQueue<E>,
    batch_size: usize,
}

impl<E> FixedBatchQueue<E> {
    /// Creates an empty queue returning batches of at most `batch_size`
    /// reactions.
    ///
    /// # Panics
    ///
    /// Panics if `batch_size` is zero.
    pub fn new(batch_size: usize) -> Self {
        assert!(batch_size > 0, "the batch size must be non-zero");

        Self {
            inner: IndexedPriorityQueue::new(),
            batch_size,
        }
    }

    /// Maximum number of reactions in a batch.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl<E> Scheduler<E> for FixedBatchQueue<E> {
    fn add(&mut self, reaction: ReactionHandle<E>) -> Result<(), SchedulerError> {
        self.inner.add(reaction)
    }
    fn remove(&mut self, id: ReactionId) -> Result<ReactionHandle<E>, SchedulerError> {
        self.inner.remove(id)
    }
    fn update(&mut self, id: ReactionId) -> Result<(), SchedulerError> {
        self.inner.update(id)
    }
    fn peek_next(&self) -> Option<ReactionHandle<E>> {
        self.inner.peek_next()
    }
    fn get(&self, id: ReactionId) -> Option<&ReactionHandle<E>> {
        self.inner.get(id)
    }
    fn len(&self) -> usize {
        self.inner.len()
    }
}

impl<E> BatchScheduler<E> for FixedBatchQueue<E> {
    fn peek_next_batch(&self) -> Vec<ReactionHandle<E>> {
        let batch_size = self.batch_size;

        self.inner.scan_ordered(|count, _| count < batch_size)
    }
}

/// A batch scheduler returning every reaction scheduled within `epsilon` of
/// the earliest one.
///
/// With `epsilon == 0` a batch contains all reactions sharing the earliest
/// time stamp. If the earliest reaction is never going to fire (its `tau` is
/// infinite), the batch contains that reaction only.
#[derive(Debug)]
pub struct EpsilonBatchQueue<E> {
    inner: IndexedPriorityQueue<E>,
    epsilon: f64,
}

impl<E> EpsilonBatchQueue<E> {
    /// Creates an empty queue with the specified window width.
    ///
    /// # Panics
    ///
    /// Panics if `epsilon` is negative or NaN.
    pub fn new(epsilon: f64) -> Self {
        assert!(epsilon >= 0.0, "the batch window must be non-negative");

        Self {
            inner: IndexedPriorityQueue::new(),
            epsilon,
        }
    }

    /// Width of the batch window.
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }
}

impl<E> Scheduler<E> for EpsilonBatchQueue<E> {
    fn add(&mut self, reaction: ReactionHandle<E>) -> Result<(), SchedulerError> {
        self.inner.add(reaction)
    }
    fn remove(&mut self, id: ReactionId) -> Result<ReactionHandle<E>, SchedulerError> {
        self.inner.remove(id)
    }
    fn update(&mut self, id: ReactionId) -> Result<(), SchedulerError> {
        self.inner.update(id)
    }
    fn peek_next(&self) -> Option<ReactionHandle<E>> {
        self.inner.peek_next()
    }
    fn get(&self, id: ReactionId) -> Option<&ReactionHandle<E>> {
        self.inner.get(id)
    }
    fn len(&self) -> usize {
        self.inner.len()
    }
}

impl<E> BatchScheduler<E> for EpsilonBatchQueue<E> {
    fn peek_next_batch(&self) -> Vec<ReactionHandle<E>> {
        let epsilon = self.epsilon;
        let mut upper: Option<Time> = None;

        self.inner.scan_ordered(|count, tau| {
            let upper = *upper.get_or_insert(tau + epsilon);

            // Never-firing reactions are not batched together.
            count == 0 || (tau.is_finite() && tau <= upper)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::test_util::{Probe, ProbeEnv};

    fn ids(batch: &[ReactionHandle<ProbeEnv>]) -> Vec<ReactionId> {
        batch.iter().map(|r| r.id()).collect()
    }

    #[test]
    fn fixed_batch_returns_k_earliest_in_order() {
        let mut queue = FixedBatchQueue::<ProbeEnv>::new(3);
        let probes: Vec<_> = [4.0, 2.0, 5.0, 1.0, 3.0]
            .into_iter()
            .map(Probe::at)
            .collect();
        for p in &probes {
            queue.add(p.clone()).unwrap();
        }

        let batch = queue.peek_next_batch();
        assert_eq!(ids(&batch), vec![probes[3].id, probes[1].id, probes[4].id]);
        assert_eq!(queue.len(), 5);
    }

    #[test]
    fn fixed_batch_is_bounded_by_queue_length() {
        let mut queue = FixedBatchQueue::<ProbeEnv>::new(10);
        assert!(queue.peek_next_batch().is_empty());

        let p = Probe::at(1.0);
        queue.add(p.clone()).unwrap();
        assert_eq!(ids(&queue.peek_next_batch()), vec![p.id]);
    }

    #[test]
    fn epsilon_batch_spans_window() {
        let mut queue = EpsilonBatchQueue::<ProbeEnv>::new(0.5);
        let probes: Vec<_> = [1.0, 1.6, 1.5, 1.2, 3.0]
            .into_iter()
            .map(Probe::at)
            .collect();
        for p in &probes {
            queue.add(p.clone()).unwrap();
        }

        let batch = queue.peek_next_batch();
        assert_eq!(ids(&batch), vec![probes[0].id, probes[3].id, probes[2].id]);
    }

    #[test]
    fn zero_epsilon_groups_simultaneous_reactions() {
        let mut queue = EpsilonBatchQueue::<ProbeEnv>::new(0.0);
        let a = Probe::at(2.0);
        let b = Probe::at(1.0);
        let c = Probe::at(2.0);
        let d = Probe::at(1.0);
        for p in [&a, &b, &c, &d] {
            queue.add(p.clone()).unwrap();
        }

        assert_eq!(ids(&queue.peek_next_batch()), vec![b.id, d.id]);

        b.set_tau(2.0);
        queue.update(b.id).unwrap();
        d.set_tau(2.0);
        queue.update(d.id).unwrap();
        assert_eq!(
            ids(&queue.peek_next_batch()),
            vec![a.id, b.id, c.id, d.id]
        );
    }

    #[test]
    fn infinite_head_yields_single_reaction() {
        let mut queue = EpsilonBatchQueue::<ProbeEnv>::new(1.0);
        let a = Probe::at(f64::INFINITY);
        let b = Probe::at(f64::INFINITY);
        queue.add(a.clone()).unwrap();
        queue.add(b.clone()).unwrap();

        assert_eq!(ids(&queue.peek_next_batch()), vec![a.id]);
    }
}
