use std::error::Error;
use std::fmt;
use std::sync::{Mutex, MutexGuard, OnceLock};

use crate::simulation::SimulationHandle;

use super::{NodeId, ReactionHandle};

/// The simulated system, as seen by the kernel.
///
/// The environment is a single large shared resource: only the simulation
/// thread may mutate it, and code running on other threads that needs a
/// consistent view of it must hold the lock returned by
/// [`SimulationSlot::lock`], which the simulation thread holds while it
/// performs a step.
pub trait Environment: Sized + Send + Sync + 'static {
    /// Reactions that are not attached to any node.
    fn global_reactions(&self) -> Vec<ReactionHandle<Self>>;

    /// All nodes currently in the environment.
    fn nodes(&self) -> Vec<NodeId>;

    /// Reactions attached to the specified node.
    fn node_reactions(&self, node: NodeId) -> Vec<ReactionHandle<Self>>;

    /// Neighbors of the specified node.
    fn neighbors(&self, _node: NodeId) -> Vec<NodeId> {
        Vec::new()
    }

    /// Returns `true` once the environment's global termination predicate
    /// holds.
    fn is_terminated(&self) -> bool {
        false
    }

    /// Returns the slot binding the environment to its engine.
    fn simulation_slot(&self) -> &SimulationSlot<Self>;
}

/// Set-once binding between an environment and the engine driving it.
///
/// Environments embed a `SimulationSlot` and return it from
/// [`Environment::simulation_slot`].
pub struct SimulationSlot<E: Environment> {
    handle: OnceLock<SimulationHandle<E>>,
    lock: Mutex<()>,
}

impl<E: Environment> SimulationSlot<E> {
    /// Creates an unbound slot.
    pub fn new() -> Self {
        Self {
            handle: OnceLock::new(),
            lock: Mutex::new(()),
        }
    }

    /// Returns the handle of the engine bound to the environment, if any.
    pub fn simulation(&self) -> Option<&SimulationHandle<E>> {
        self.handle.get()
    }

    /// Acquires the environment lock.
    ///
    /// The lock is not poisoned by a panic in model code: the kernel recovers
    /// from such panics by terminating the simulation.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Binds the slot to an engine.
    ///
    /// Binding the engine the slot is already bound to is a no-op.
    pub(crate) fn bind(&self, handle: SimulationHandle<E>) -> Result<(), BindError> {
        let bound = self.handle.get_or_init(|| handle.clone());
        if bound.same_engine(&handle) {
            Ok(())
        } else {
            Err(BindError::AlreadyBound)
        }
    }
}

impl<E: Environment> Default for SimulationSlot<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Environment> fmt::Debug for SimulationSlot<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationSlot")
            .field("bound", &self.handle.get().is_some())
            .finish_non_exhaustive()
    }
}

/// An error returned when an environment is handed to a second engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum BindError {
    /// The environment is already driven by another engine.
    AlreadyBound,
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyBound => f.write_str("the environment is already bound to another engine"),
        }
    }
}

impl Error for BindError {}
