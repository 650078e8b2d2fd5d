//! Model-side contracts.
//!
//! The kernel does not know what a reaction computes. It only interacts with
//! the simulated system through two narrow interfaces:
//!
//! * [`Reaction`], a timed, conditionally executable unit of behavior with a
//!   next execution time (its *tau*) and a declared read/write context used
//!   to build the [dependency graph](crate::dependency::DependencyGraph),
//! * [`Environment`], the simulated system itself, which enumerates the
//!   reactions to schedule at start-up and reports global termination.
//!
//! # Identity
//!
//! Reactions and nodes are identified by [`ReactionId`] and [`NodeId`]. The
//! kernel never compares reactions by address: a reaction must return the
//! same identifier for its whole life, and two live reactions must never
//! share one. [`ReactionId::fresh`] mints process-unique identifiers.
//!
//! # Read/write contexts
//!
//! Each reaction declares which [`Dependency`]s it reads (its *inbound*
//! dependencies) and writes (its *outbound* dependencies), together with the
//! [`Context`] in which it reads and writes them:
//!
//! * a [`Context::Local`] reaction only touches its own node,
//! * a [`Context::Neighborhood`] reaction touches its node and the node's
//!   neighbors,
//! * a [`Context::Global`] reaction may touch anything.
//!
//! Executing reaction `A` may invalidate reaction `B` if something `A` writes
//! is read by `B` and their contexts overlap.
//!
//! # Two-phase binding
//!
//! An environment is built first, then handed over to an engine. The engine
//! binds itself into the environment's [`SimulationSlot`] during
//! construction, which lets model code reach the
//! [`SimulationHandle`](crate::simulation::SimulationHandle) that drives it,
//! for instance to schedule structural changes.

mod environment;
mod reaction;

pub use environment::{BindError, Environment, SimulationSlot};
pub use reaction::{
    Context, Dependency, NodeId, Reaction, ReactionError, ReactionHandle, ReactionId,
    RescheduleSignal,
};
