//! Engines and their lifecycle.
//!
//! This module contains the two engines driving a simulation, the
//! [`Engine`], which executes one reaction per step, and the
//! [`BatchEngine`], which executes batches of reactions concurrently on a
//! pool of worker threads. Both are built on the same lifecycle core and
//! expose the same control surface, the [`SimulationHandle`].
//!
//! # Lifecycle
//!
//! An engine goes through the following [`Status`]es:
//!
//! ```text
//!                          ┌──────────────┐
//!                          ▼              │
//!  Init ──► Ready ──┬──► Running ──► Paused
//!                   │                  ▲
//!                   └──────────────────┘
//!
//!  (any status) ──► Terminated
//! ```
//!
//! The engine leaves `Init` on its own when [`Engine::run`] is called, after
//! it has scheduled every reaction declared by the environment. All other
//! transitions are requested through a [`SimulationHandle`], except for
//! termination, which also happens when no reaction is left, when the
//! environment reports that it is terminated, or when an error occurs.
//!
//! # Threading model
//!
//! The thread calling `run` becomes the *simulation thread*. It is the only
//! thread that mutates the scheduler, the dependency graph, the simulation
//! time and the status. Other threads interact with the engine by:
//!
//! * enqueuing commands, which the simulation thread executes in FIFO order
//!   between two steps,
//! * blocking until a given status is reached with
//!   [`SimulationHandle::wait_for`].
//!
//! The simulation thread only blocks when it waits for a command while the
//! engine is `Ready` or `Paused`.
//!
//! # Examples
//!
//! Running an environment to completion on a dedicated thread while the main
//! thread controls it:
//!
//! ```ignore
//! let env = Arc::new(MyEnvironment::new());
//! let mut engine = Engine::new(env.clone())?;
//! let handle = engine.handle();
//!
//! let simulation = thread::spawn(move || engine.run());
//!
//! handle.go_to_time(Time::from_secs(10.0));
//! handle.play().wait()?;
//! assert_eq!(handle.wait_for(Status::Paused, Duration::MAX), Status::Paused);
//!
//! handle.terminate().wait()?;
//! simulation.join().unwrap()?;
//! ```
//!
//! # Errors
//!
//! Failures on the simulation thread never propagate as panics. They are
//! converted into an [`ExecutionError`], stored as the engine's
//! [`EngineError`] and terminate the engine. The stored error can be
//! retrieved with [`SimulationHandle::error`] and is also returned by
//! `run`.
//!
//! Misuse of the control surface, such as scheduling a command after
//! termination, is reported synchronously with a [`SchedulingError`].
mod batch_engine;
mod command_queue;
mod engine;
mod handle;
mod kernel;
mod status;

pub use batch_engine::{
    BatchConfig, BatchEngine, BatchMode, OutputReplayStrategy, ParseReplayStrategyError,
};
pub use command_queue::Command;
pub use engine::Engine;
pub use handle::{CommandFuture, SimulationHandle};
pub use kernel::KernelOps;
pub use status::Status;

use std::any::Any;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use crate::model::{ReactionError, ReactionId};
use crate::monitor::MonitorError;
use crate::scheduler::SchedulerError;
use crate::time::Time;

/// An error that terminated an engine.
#[derive(Debug)]
#[non_exhaustive]
pub enum ExecutionError {
    /// An internal invariant was broken.
    ///
    /// This denotes a bug, either in the kernel or in a model breaking its
    /// contract with the kernel.
    InvariantViolation(String),
    /// A reaction was picked with a time stamp earlier than the current
    /// simulation time.
    TimeTravel {
        /// The offending reaction.
        reaction: ReactionId,
        /// Time stamp of the reaction.
        tau: Time,
        /// Simulation time when the reaction was picked.
        now: Time,
    },
    /// The execution of a reaction failed.
    Reaction {
        /// The failing reaction.
        reaction: ReactionId,
        /// The error returned by the reaction.
        cause: ReactionError,
    },
    /// An output monitor failed.
    Monitor {
        /// The error returned by the monitor.
        cause: MonitorError,
    },
    /// A panic was caught on the simulation thread or on a worker thread.
    Panic {
        /// Message associated with the panic, when the payload is a string.
        payload: String,
    },
    /// The scheduler and the engine disagree about which reactions are
    /// scheduled.
    Scheduler(SchedulerError),
}

impl ExecutionError {
    pub(crate) fn from_panic(payload: Box<dyn Any + Send + 'static>) -> Self {
        let payload = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            String::from("<non-string payload>")
        };

        Self::Panic { payload }
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvariantViolation(msg) => write!(f, "kernel invariant violated: {msg}"),
            Self::TimeTravel { reaction, tau, now } => write!(
                f,
                "{reaction} was scheduled at {tau}, before the current simulation time {now}"
            ),
            Self::Reaction { reaction, cause } => {
                write!(f, "the execution of {reaction} failed: {cause}")
            }
            Self::Monitor { cause } => write!(f, "an output monitor failed: {cause}"),
            Self::Panic { payload } => write!(f, "a panic was caught: {payload}"),
            Self::Scheduler(e) => write!(f, "scheduler out of sync: {e}"),
        }
    }
}

impl Error for ExecutionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Reaction { cause, .. } | Self::Monitor { cause } => Some(cause.as_ref()),
            Self::Scheduler(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SchedulerError> for ExecutionError {
    fn from(e: SchedulerError) -> Self {
        Self::Scheduler(e)
    }
}

/// The error stored by a terminated engine.
///
/// It holds the error that terminated the engine together with the errors
/// raised afterwards, while output monitors were being notified of the
/// termination.
#[derive(Clone, Debug)]
pub struct EngineError {
    error: Arc<ExecutionError>,
    suppressed: Vec<Arc<ExecutionError>>,
}

impl EngineError {
    pub(crate) fn new(error: ExecutionError) -> Self {
        Self {
            error: Arc::new(error),
            suppressed: Vec::new(),
        }
    }

    pub(crate) fn with_suppressed(&self, error: ExecutionError) -> Self {
        let mut suppressed = self.suppressed.clone();
        suppressed.push(Arc::new(error));

        Self {
            error: self.error.clone(),
            suppressed,
        }
    }

    /// The error that terminated the engine.
    pub fn error(&self) -> &ExecutionError {
        &self.error
    }

    /// Errors raised after the engine had already failed.
    pub fn suppressed(&self) -> impl Iterator<Item = &ExecutionError> {
        self.suppressed.iter().map(|e| e.as_ref())
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        if !self.suppressed.is_empty() {
            write!(f, " ({} suppressed error", self.suppressed.len())?;
            if self.suppressed.len() > 1 {
                f.write_str("s")?;
            }
            f.write_str(")")?;
        }

        Ok(())
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.error.as_ref())
    }
}

/// An error returned when a command cannot be scheduled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum SchedulingError {
    /// The engine is terminated.
    Terminated,
    /// The requested status cannot be reached from the current one.
    Unreachable {
        /// Status when the transition was attempted.
        from: Status,
        /// Requested status.
        to: Status,
    },
}

impl fmt::Display for SchedulingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terminated => f.write_str("the simulation is terminated"),
            Self::Unreachable { from, to } => {
                write!(f, "status '{to}' cannot be reached from status '{from}'")
            }
        }
    }
}

impl Error for SchedulingError {}
