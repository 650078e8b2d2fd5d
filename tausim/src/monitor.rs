//! Output monitors.
//!
//! An [`OutputMonitor`] observes a running simulation. Monitors are attached
//! to an engine with
//! [`SimulationHandle::add_output_monitor`](crate::simulation::SimulationHandle::add_output_monitor)
//! and are called from the simulation thread only, in this order:
//!
//! 1. [`initialized`](OutputMonitor::initialized), once, after all reactions
//!    have been scheduled,
//! 2. [`step_done`](OutputMonitor::step_done) after each completed step; the
//!    [`BatchEngine`](crate::simulation::BatchEngine) calls it either once
//!    per executed reaction or once per batch, depending on its
//!    [`OutputReplayStrategy`](crate::simulation::OutputReplayStrategy),
//! 3. [`finished`](OutputMonitor::finished), exactly once when the engine
//!    stops, including when it stops because of an error.
//!
//! Monitors receive a shared reference to the environment and must not
//! mutate it.
//!
//! A failing monitor terminates the simulation: its error becomes the
//! stored error of the engine, or is attached to it as a suppressed error if
//! the engine had already failed.
//!
//! # Example
//!
//! A monitor counting steps:
//!
//! ```
//! use std::sync::atomic::{AtomicU64, Ordering};
//!
//! use tausim::model::ReactionHandle;
//! use tausim::monitor::{MonitorError, OutputMonitor};
//! use tausim::time::Time;
//!
//! #[derive(Default)]
//! struct StepCounter {
//!     steps: AtomicU64,
//! }
//!
//! impl<E> OutputMonitor<E> for StepCounter {
//!     fn step_done(
//!         &self,
//!         _env: &E,
//!         _reaction: Option<&ReactionHandle<E>>,
//!         _time: Time,
//!         _step: u64,
//!     ) -> Result<(), MonitorError> {
//!         self.steps.fetch_add(1, Ordering::Relaxed);
//!         Ok(())
//!     }
//! }
//! ```

mod registry;

pub use registry::MonitorId;
pub(crate) use registry::MonitorRegistry;

use std::error::Error;

use crate::model::ReactionHandle;
use crate::time::Time;

/// Error returned by a failing monitor.
pub type MonitorError = Box<dyn Error + Send + Sync + 'static>;

/// An observer of the simulation.
///
/// All methods have a default no-op implementation.
pub trait OutputMonitor<E>: Send + Sync {
    /// Called once after the simulation has been initialized.
    fn initialized(&self, _env: &E) -> Result<(), MonitorError> {
        Ok(())
    }

    /// Called after a step, with the reaction that was picked (if any), the
    /// current simulation time and the number of completed steps.
    fn step_done(
        &self,
        _env: &E,
        _reaction: Option<&ReactionHandle<E>>,
        _time: Time,
        _step: u64,
    ) -> Result<(), MonitorError> {
        Ok(())
    }

    /// Called once when the simulation stops.
    fn finished(&self, _env: &E, _time: Time, _step: u64) -> Result<(), MonitorError> {
        Ok(())
    }
}
