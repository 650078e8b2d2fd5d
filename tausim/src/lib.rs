//! A discrete-event simulation kernel for reaction-based models.
//!
//! Tausim advances a simulated system through time by repeatedly selecting,
//! executing and rescheduling timed events called *reactions*. It is meant to
//! drive stochastic or deterministic models in the vein of the Gillespie
//! algorithm, where executing a reaction changes the state of the system and
//! thereby invalidates the time stamps of the reactions that depend on it.
//!
//! The kernel is made of four parts:
//!
//! * an indexed priority queue, the [`Scheduler`](scheduler::Scheduler),
//!   which keeps reactions sorted by their next execution time and supports
//!   in-place updates,
//! * a [`DependencyGraph`](dependency::DependencyGraph), which tells which
//!   reactions must be re-evaluated after a reaction has been executed,
//! * a lifecycle core exposing a thread-safe play/pause/terminate surface,
//!   the [`SimulationHandle`](simulation::SimulationHandle),
//! * two engines built on top of these: the sequential
//!   [`Engine`](simulation::Engine) and the parallel
//!   [`BatchEngine`](simulation::BatchEngine), which executes batches of
//!   simultaneous reactions on worker threads while producing the same trace.
//!
//! # A practical overview
//!
//! ## Authoring models
//!
//! The kernel knows nothing about what is simulated. Models implement two
//! traits:
//!
//! * [`Reaction`](model::Reaction), a conditionally executable event with a
//!   next execution time, its *tau*, and a declaration of what it reads and
//!   writes,
//! * [`Environment`](model::Environment), the simulated system, which lists
//!   the reactions to schedule and embeds a
//!   [`SimulationSlot`](model::SimulationSlot) binding it to its engine.
//!
//! Reactions are shared between the engine and the environment, so they use
//! interior mutability for their state.
//!
//! ## Running a simulation
//!
//! An engine is created from an environment and driven by calling its `run`
//! method, usually on a dedicated thread. The engine first schedules every
//! reaction and then waits for commands sent through its
//! [`SimulationHandle`](simulation::SimulationHandle):
//!
//! * [`play`](simulation::SimulationHandle::play),
//!   [`pause`](simulation::SimulationHandle::pause) and
//!   [`terminate`](simulation::SimulationHandle::terminate) change the
//!   status of the engine,
//! * [`go_to_step`](simulation::SimulationHandle::go_to_step) and
//!   [`go_to_time`](simulation::SimulationHandle::go_to_time) pause it once
//!   a given point is reached,
//! * [`wait_for`](simulation::SimulationHandle::wait_for) blocks the calling
//!   thread until a given status is reached.
//!
//! The engine terminates on its own when no reaction is left to schedule,
//! when the environment reports termination, or when an error occurs.
//!
//! Progress can be observed by attaching
//! [`OutputMonitor`](monitor::OutputMonitor)s, which the engine notifies
//! after each step.
//!
//! ## Example
//!
//! A clock ticking once per time unit, stopped by the environment after ten
//! ticks:
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use std::thread;
//!
//! use tausim::model::{
//!     Context, Dependency, Environment, NodeId, Reaction, ReactionError, ReactionHandle,
//!     ReactionId, SimulationSlot,
//! };
//! use tausim::simulation::Engine;
//! use tausim::time::Time;
//!
//! struct Tick {
//!     id: ReactionId,
//!     tau: Mutex<Time>,
//! }
//!
//! impl Reaction<Clock> for Tick {
//!     fn id(&self) -> ReactionId {
//!         self.id
//!     }
//!     fn node(&self) -> Option<NodeId> {
//!         None
//!     }
//!     fn tau(&self) -> Time {
//!         *self.tau.lock().unwrap()
//!     }
//!     fn can_execute(&self) -> bool {
//!         true
//!     }
//!     fn execute(&self, env: &Clock) -> Result<(), ReactionError> {
//!         *env.ticks.lock().unwrap() += 1;
//!         Ok(())
//!     }
//!     fn update(&self, current_time: Time, was_executed: bool, _env: &Clock) {
//!         if was_executed {
//!             *self.tau.lock().unwrap() = current_time + 1.0;
//!         }
//!     }
//!     fn input_context(&self) -> Context {
//!         Context::Global
//!     }
//!     fn output_context(&self) -> Context {
//!         Context::Global
//!     }
//!     fn inbound_dependencies(&self) -> &[Dependency] {
//!         &[]
//!     }
//!     fn outbound_dependencies(&self) -> &[Dependency] {
//!         &[]
//!     }
//! }
//!
//! struct Clock {
//!     tick: Arc<Tick>,
//!     ticks: Mutex<u64>,
//!     slot: SimulationSlot<Clock>,
//! }
//!
//! impl Environment for Clock {
//!     fn global_reactions(&self) -> Vec<ReactionHandle<Self>> {
//!         vec![self.tick.clone() as ReactionHandle<Self>]
//!     }
//!     fn nodes(&self) -> Vec<NodeId> {
//!         Vec::new()
//!     }
//!     fn node_reactions(&self, _node: NodeId) -> Vec<ReactionHandle<Self>> {
//!         Vec::new()
//!     }
//!     fn is_terminated(&self) -> bool {
//!         *self.ticks.lock().unwrap() >= 10
//!     }
//!     fn simulation_slot(&self) -> &SimulationSlot<Self> {
//!         &self.slot
//!     }
//! }
//!
//! let env = Arc::new(Clock {
//!     tick: Arc::new(Tick {
//!         id: ReactionId::fresh(),
//!         tau: Mutex::new(Time::ZERO),
//!     }),
//!     ticks: Mutex::new(0),
//!     slot: SimulationSlot::new(),
//! });
//!
//! let mut engine = Engine::new(env.clone())?;
//! let handle = engine.handle();
//! let simulation = thread::spawn(move || engine.run());
//!
//! handle.play().wait()?;
//! simulation.join().unwrap()?;
//!
//! assert_eq!(*env.ticks.lock().unwrap(), 10);
//! assert_eq!(handle.time(), Time::from_secs(9.0));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Other resources
//!
//! The `tausim-util` crate provides a single-compartment chemistry
//! environment, rate-based chemical reactions and a trace-recording monitor,
//! which are handy to get started and to test engines against each other.
//!
//! # Feature flags
//!
//! * `serde`: derives `Serialize` and `Deserialize` for [`Time`](time::Time),
//!   [`Status`](simulation::Status) and the batch engine configuration.
#![warn(missing_docs, missing_debug_implementations, unreachable_pub)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod dependency;
pub mod model;
pub mod monitor;
pub mod scheduler;
pub mod simulation;
pub mod time;

#[cfg(test)]
mod test_util;
