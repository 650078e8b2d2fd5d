//! Reaction scheduling.
//!
//! A scheduler keeps track of every scheduled reaction, ordered by its next
//! execution time. Reactions are identified by their
//! [`ReactionId`](crate::model::ReactionId), which makes it possible to
//! remove or reposition a reaction in `O(log n)` without scanning the queue.
//!
//! Reactions sharing the same `tau` are ordered by insertion, so that two
//! engines fed with the same model always pick reactions in the same order.
//!
//! The [`BatchScheduler`] extension trait is used by the
//! [`BatchEngine`](crate::simulation::BatchEngine) to retrieve several
//! reactions at once; it is implemented by [`FixedBatchQueue`], which returns
//! the `k` earliest reactions, and by [`EpsilonBatchQueue`], which returns
//! all reactions scheduled within `epsilon` of the earliest one.
mod batch_queue;
mod indexed_queue;

pub use batch_queue::{EpsilonBatchQueue, FixedBatchQueue};
pub use indexed_queue::IndexedPriorityQueue;

use std::error::Error;
use std::fmt;

use crate::model::{ReactionHandle, ReactionId};

/// A priority queue of reactions keyed by their next execution time.
pub trait Scheduler<E> {
    /// Schedules a reaction at its current `tau`.
    ///
    /// Fails if a reaction with the same identifier is already scheduled.
    fn add(&mut self, reaction: ReactionHandle<E>) -> Result<(), SchedulerError>;

    /// Removes a reaction and returns its handle.
    fn remove(&mut self, id: ReactionId) -> Result<ReactionHandle<E>, SchedulerError>;

    /// Repositions a reaction after its `tau` has changed.
    ///
    /// Calling this method when `tau` did not change is harmless.
    fn update(&mut self, id: ReactionId) -> Result<(), SchedulerError>;

    /// Returns the reaction with the earliest `tau`, if any.
    fn peek_next(&self) -> Option<ReactionHandle<E>>;

    /// Returns the handle of a scheduled reaction.
    fn get(&self, id: ReactionId) -> Option<&ReactionHandle<E>>;

    /// Returns `true` if the reaction is scheduled.
    fn contains(&self, id: ReactionId) -> bool {
        self.get(id).is_some()
    }

    /// Number of scheduled reactions.
    fn len(&self) -> usize;

    /// Returns `true` if no reaction is scheduled.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A scheduler able to return several reactions at once.
pub trait BatchScheduler<E>: Scheduler<E> {
    /// Returns the next batch of reactions in execution order, without
    /// removing them from the queue.
    fn peek_next_batch(&self) -> Vec<ReactionHandle<E>>;
}

impl<E, S: Scheduler<E> + ?Sized> Scheduler<E> for Box<S> {
    fn add(&mut self, reaction: ReactionHandle<E>) -> Result<(), SchedulerError> {
        (**self).add(reaction)
    }
    fn remove(&mut self, id: ReactionId) -> Result<ReactionHandle<E>, SchedulerError> {
        (**self).remove(id)
    }
    fn update(&mut self, id: ReactionId) -> Result<(), SchedulerError> {
        (**self).update(id)
    }
    fn peek_next(&self) -> Option<ReactionHandle<E>> {
        (**self).peek_next()
    }
    fn get(&self, id: ReactionId) -> Option<&ReactionHandle<E>> {
        (**self).get(id)
    }
    fn len(&self) -> usize {
        (**self).len()
    }
}

impl<E, S: BatchScheduler<E> + ?Sized> BatchScheduler<E> for Box<S> {
    fn peek_next_batch(&self) -> Vec<ReactionHandle<E>> {
        (**self).peek_next_batch()
    }
}

/// An error returned when the scheduler and its callers disagree about which
/// reactions are scheduled.
///
/// This always denotes a bug in the bookkeeping of the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum SchedulerError {
    /// The reaction is already scheduled.
    AlreadyScheduled(ReactionId),
    /// The reaction is not scheduled.
    NotScheduled(ReactionId),
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyScheduled(id) => write!(f, "{id} is already scheduled"),
            Self::NotScheduled(id) => write!(f, "{id} is not scheduled"),
        }
    }
}

impl Error for SchedulerError {}
