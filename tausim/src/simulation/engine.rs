use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::model::{BindError, Environment};
use crate::scheduler::{IndexedPriorityQueue, Scheduler};

use super::kernel::Kernel;
use super::{EngineError, ExecutionError, KernelOps, SimulationHandle};

/// A sequential engine executing one reaction per step.
///
/// At each step, the engine picks the reaction with the earliest time stamp,
/// advances the simulation time to that time stamp and, if the reaction can
/// execute, executes it and re-evaluates the reactions that depend on it.
///
/// The engine is driven by [`Engine::run`] on the calling thread, and
/// controlled from other threads through its [`SimulationHandle`].
///
/// # Examples
///
/// ```ignore
/// let mut engine = Engine::new(env)?;
/// let handle = engine.handle();
/// let simulation = thread::spawn(move || engine.run());
///
/// handle.go_to_step(1000);
/// handle.play().wait()?;
/// ```
pub struct Engine<E: Environment, S = IndexedPriorityQueue<E>> {
    kernel: Kernel<E, S>,
}

impl<E: Environment> Engine<E> {
    /// Creates an engine driving the specified environment.
    ///
    /// Fails if the environment is already driven by another engine.
    pub fn new(env: Arc<E>) -> Result<Self, BindError> {
        Self::with_scheduler(env, IndexedPriorityQueue::new())
    }
}

impl<E: Environment, S: Scheduler<E>> Engine<E, S> {
    /// Creates an engine with a custom scheduler.
    ///
    /// The scheduler must be empty.
    pub fn with_scheduler(env: Arc<E>, scheduler: S) -> Result<Self, BindError> {
        Ok(Self {
            kernel: Kernel::new(env, scheduler)?,
        })
    }

    /// Returns a handle controlling this engine.
    pub fn handle(&self) -> SimulationHandle<E> {
        self.kernel.handle()
    }

    /// Runs the simulation on the current thread until it is terminated.
    ///
    /// The engine initializes the environment and then waits for commands.
    /// Returns the error that terminated the engine, if any.
    pub fn run(&mut self) -> Result<(), Arc<EngineError>> {
        self.kernel.run(step)
    }
}

impl<E: Environment, S> fmt::Debug for Engine<E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("kernel", &self.kernel)
            .finish()
    }
}

/// Executes the next reaction.
fn step<E: Environment, S: Scheduler<E>>(kernel: &mut Kernel<E, S>) -> Result<(), ExecutionError> {
    let Some(next) = kernel.scheduler.peek_next() else {
        kernel.terminate("no more reactions");
        return Ok(());
    };

    let tau = next.tau();
    let now = kernel.time();
    if tau < now {
        return Err(ExecutionError::TimeTravel {
            reaction: next.id(),
            tau,
            now,
        });
    }
    kernel.set_time(tau);

    let env = kernel.env().clone();
    let mut executed = false;
    if tau.is_finite() && next.can_execute() {
        next.on_ready();
        next.execute(&env)
            .map_err(|cause| ExecutionError::Reaction {
                reaction: next.id(),
                cause,
            })?;
        executed = true;

        for dependent in kernel.graph.outbound_dependencies(next.id()) {
            kernel.refresh(&dependent)?;
        }
    }
    next.update(tau, executed, &env);
    kernel.scheduler.update(next.id())?;
    kernel.apply_reschedule_requests()?;

    kernel.advance_steps(1);
    let step = kernel.step();
    trace!(reaction = %next.id(), %tau, step, executed, "step done");

    kernel.notify_step_done(Some(&next), tau, step)?;
    kernel.check_termination();

    Ok(())
}
