use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, trace, warn};

use crate::dependency::DependencyGraph;
use crate::model::{BindError, Environment, NodeId, ReactionHandle, ReactionId};
use crate::monitor::{MonitorRegistry, OutputMonitor};
use crate::scheduler::Scheduler;
use crate::time::Time;

use super::command_queue::{Command, CommandQueue, CommandQueueWriter};
use super::status::StatusBoard;
use super::{EngineError, ExecutionError, SchedulingError, SimulationHandle, Status};

/// Operations available to commands executed on the simulation thread.
///
/// A [`Command`] receives a `&mut dyn KernelOps` when it is executed. Through
/// it, a command can change the engine status or apply structural changes
/// to the scheduled reactions. Structural methods keep the scheduler and the
/// dependency graph in sync; they fail if asked to schedule a reaction twice
/// or to remove a reaction that is not scheduled.
pub trait KernelOps<E> {
    /// Returns the environment.
    fn environment(&self) -> &E;

    /// Returns the current simulation time.
    fn time(&self) -> Time;

    /// Returns the number of completed steps.
    fn step(&self) -> u64;

    /// Returns the current status.
    fn status(&self) -> Status;

    /// Performs a guarded status transition.
    ///
    /// Requesting the current status is a no-op. Requesting a status that is
    /// not reachable from the current one fails and leaves the status
    /// unchanged.
    fn set_status(&mut self, status: Status) -> Result<Status, SchedulingError>;

    /// Schedules a reaction and registers it in the dependency graph.
    fn add_reaction(&mut self, reaction: ReactionHandle<E>) -> Result<(), ExecutionError>;

    /// Unschedules a reaction and removes it from the dependency graph.
    fn remove_reaction(&mut self, id: ReactionId) -> Result<(), ExecutionError>;

    /// Schedules all reactions the environment declares for a node.
    fn add_node(&mut self, node: NodeId) -> Result<(), ExecutionError>;

    /// Unschedules all reactions of a node that are still scheduled.
    fn remove_node(&mut self, node: NodeId) -> Result<(), ExecutionError>;

    /// Recomputes the dependencies of the neighborhood-scoped reactions of a
    /// node.
    fn neighbors_changed(&mut self, node: NodeId);

    /// Returns `true` if the reaction is scheduled.
    fn is_scheduled(&self, id: ReactionId) -> bool;
}

/// State shared between the simulation thread and the handles.
pub(crate) struct Shared<E> {
    pub(crate) status: StatusBoard,
    time: AtomicU64,
    step: AtomicU64,
    error: Mutex<Option<Arc<EngineError>>>,
    pub(crate) monitors: Mutex<MonitorRegistry<E>>,
    pub(crate) commands: CommandQueueWriter<E>,
}

impl<E> Shared<E> {
    pub(crate) fn new(commands: CommandQueueWriter<E>) -> Self {
        Self {
            status: StatusBoard::new(),
            time: AtomicU64::new(Time::ZERO.as_secs().to_bits()),
            step: AtomicU64::new(0),
            error: Mutex::new(None),
            monitors: Mutex::new(MonitorRegistry::new()),
            commands,
        }
    }

    pub(crate) fn time(&self) -> Time {
        Time::new(f64::from_bits(self.time.load(Ordering::Acquire))).unwrap_or_default()
    }

    pub(crate) fn step(&self) -> u64 {
        self.step.load(Ordering::Acquire)
    }

    pub(crate) fn error(&self) -> Option<Arc<EngineError>> {
        self.error.lock().unwrap().clone()
    }

    /// Stores an error, as the primary error if none was stored yet and as a
    /// suppressed error otherwise.
    fn record_error(&self, error: ExecutionError) {
        let mut slot = self.error.lock().unwrap();
        let stored = match slot.as_deref() {
            None => EngineError::new(error),
            Some(existing) => existing.with_suppressed(error),
        };
        *slot = Some(Arc::new(stored));
    }
}

/// The state and the run loop shared by all engines.
pub(crate) struct Kernel<E: Environment, S> {
    env: Arc<E>,
    shared: Arc<Shared<E>>,
    pub(crate) scheduler: S,
    pub(crate) graph: DependencyGraph<E>,
    /// Scheduled reactions of each node.
    node_reactions: HashMap<NodeId, Vec<ReactionId>>,
    /// Reactions that requested a reschedule through their signal.
    reschedule: Arc<Mutex<Vec<ReactionId>>>,
    commands: CommandQueue<E>,
    time: Time,
    step: u64,
}

impl<E: Environment, S: Scheduler<E>> Kernel<E, S> {
    /// Creates a kernel and binds it to the environment.
    pub(crate) fn new(env: Arc<E>, scheduler: S) -> Result<Self, BindError> {
        let commands = CommandQueue::new();
        let shared = Arc::new(Shared::new(commands.writer()));
        env.simulation_slot()
            .bind(SimulationHandle::new(shared.clone()))?;

        Ok(Self {
            env,
            shared,
            scheduler,
            graph: DependencyGraph::new(),
            node_reactions: HashMap::new(),
            reschedule: Arc::new(Mutex::new(Vec::new())),
            commands,
            time: Time::ZERO,
            step: 0,
        })
    }

    pub(crate) fn handle(&self) -> SimulationHandle<E> {
        SimulationHandle::new(self.shared.clone())
    }

    pub(crate) fn env(&self) -> &Arc<E> {
        &self.env
    }

    pub(crate) fn set_time(&mut self, time: Time) {
        self.time = time;
        self.shared
            .time
            .store(time.as_secs().to_bits(), Ordering::Release);
    }

    pub(crate) fn advance_steps(&mut self, count: u64) {
        self.step += count;
        self.shared.step.store(self.step, Ordering::Release);
    }

    /// Recomputes the time stamp of a reaction whose preconditions may have
    /// changed, and repositions it if the time stamp changed.
    ///
    /// `update` is always called since it may have side effects, even when
    /// the time stamp ends up unchanged.
    pub(crate) fn refresh(&mut self, reaction: &ReactionHandle<E>) -> Result<(), ExecutionError> {
        let before = reaction.tau();
        reaction.update(self.time, false, &self.env);
        if reaction.tau() != before {
            self.scheduler.update(reaction.id())?;
        }

        Ok(())
    }

    /// Takes the identifiers of the reactions that requested a reschedule.
    pub(crate) fn take_reschedule_requests(&mut self) -> Vec<ReactionId> {
        std::mem::take(&mut *self.reschedule.lock().unwrap())
    }

    /// Repositions the reactions that requested a reschedule.
    ///
    /// Requests from reactions that were removed in the meantime are ignored.
    pub(crate) fn apply_reschedule_requests(&mut self) -> Result<(), ExecutionError> {
        for id in self.take_reschedule_requests() {
            if self.scheduler.contains(id) {
                self.scheduler.update(id)?;
            }
        }

        Ok(())
    }

    /// Terminates the engine, e.g. when no reaction is left.
    pub(crate) fn terminate(&mut self, reason: &str) {
        if self.shared.status.get() != Status::Terminated {
            info!(reason, "terminating the simulation");
            self.shared.status.set(Status::Terminated);
        }
    }

    /// Terminates the engine if the environment says so.
    pub(crate) fn check_termination(&mut self) {
        if self.env.is_terminated() {
            self.terminate("the environment reported termination");
        }
    }

    pub(crate) fn notify_step_done(
        &self,
        reaction: Option<&ReactionHandle<E>>,
        time: Time,
        step: u64,
    ) -> Result<(), ExecutionError> {
        for monitor in self.monitors() {
            monitor
                .step_done(&self.env, reaction, time, step)
                .map_err(|cause| ExecutionError::Monitor { cause })?;
        }

        Ok(())
    }

    /// Drives the engine on the current thread until it terminates.
    ///
    /// `step` performs one step of the engine; it is called with the
    /// environment lock held.
    pub(crate) fn run(
        &mut self,
        mut step: impl FnMut(&mut Self) -> Result<(), ExecutionError>,
    ) -> Result<(), Arc<EngineError>> {
        if self.shared.status.get() != Status::Init {
            warn!("the simulation has already run");
            return self.shared.error().map_or(Ok(()), Err);
        }

        info!("simulation started");
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_loop(&mut step)))
            .unwrap_or_else(|payload| Err(ExecutionError::from_panic(payload)));
        if let Err(e) = outcome {
            self.fail(e);
        }
        self.finish();

        self.shared.error().map_or(Ok(()), Err)
    }

    fn run_loop(
        &mut self,
        step: &mut impl FnMut(&mut Self) -> Result<(), ExecutionError>,
    ) -> Result<(), ExecutionError> {
        self.initialize()?;
        self.set_status(Status::Ready)
            .map_err(|e| ExecutionError::InvariantViolation(e.to_string()))?;
        self.notify_initialized()?;
        self.drain_commands_while(Status::Ready)?;

        while self.shared.status.get() != Status::Terminated && self.time.is_finite() {
            self.drain_pending_commands()?;
            if self.shared.status.get() == Status::Running {
                let env = self.env.clone();
                let _guard = env.simulation_slot().lock();
                // Reschedules requested from outside a step.
                self.apply_reschedule_requests()?;
                step(self)?;
            }
            self.drain_commands_while(Status::Paused)?;
        }

        Ok(())
    }

    /// Schedules every reaction declared by the environment.
    fn initialize(&mut self) -> Result<(), ExecutionError> {
        let env = self.env.clone();
        let _guard = env.simulation_slot().lock();

        for reaction in env.global_reactions() {
            self.add_reaction(reaction)?;
        }
        for node in env.nodes() {
            for reaction in env.node_reactions(node) {
                self.add_reaction(reaction)?;
            }
        }
        info!(reactions = self.scheduler.len(), "reactions scheduled");

        Ok(())
    }

    fn notify_initialized(&self) -> Result<(), ExecutionError> {
        let _guard = self.env.simulation_slot().lock();
        for monitor in self.monitors() {
            monitor
                .initialized(&self.env)
                .map_err(|cause| ExecutionError::Monitor { cause })?;
        }

        Ok(())
    }

    /// Executes commands as long as the engine stays in the given status,
    /// blocking while the queue is empty.
    fn drain_commands_while(&mut self, status: Status) -> Result<(), ExecutionError> {
        while self.shared.status.get() == status {
            match self.commands.take() {
                Some(command) => self.execute(command)?,
                None => break,
            }
        }

        Ok(())
    }

    /// Executes the commands already in the queue.
    fn drain_pending_commands(&mut self) -> Result<(), ExecutionError> {
        while self.shared.status.get() != Status::Terminated {
            match self.commands.try_take() {
                Some(command) => self.execute(command)?,
                None => break,
            }
        }

        Ok(())
    }

    fn execute(&mut self, command: Command<E>) -> Result<(), ExecutionError> {
        let env = self.env.clone();
        let _guard = env.simulation_slot().lock();
        let ops: &mut dyn KernelOps<E> = self;

        command(ops)
    }

    fn monitors(&self) -> Vec<Arc<dyn OutputMonitor<E>>> {
        self.shared.monitors.lock().unwrap().snapshot()
    }

    fn fail(&mut self, error: ExecutionError) {
        error!(%error, "simulation failed");
        self.shared.record_error(error);
        if self.shared.status.get() != Status::Terminated {
            self.shared.status.set(Status::Terminated);
        }
    }

    fn finish(&mut self) {
        self.terminate("the run loop has ended");

        let env = self.env.clone();
        {
            let _guard = env.simulation_slot().lock();
            for monitor in self.monitors() {
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    monitor.finished(&env, self.time, self.step)
                }));
                let error = match result {
                    Ok(Ok(())) => continue,
                    Ok(Err(cause)) => ExecutionError::Monitor { cause },
                    Err(payload) => ExecutionError::from_panic(payload),
                };
                warn!(%error, "output monitor failed on termination");
                self.shared.record_error(error);
            }
        }

        self.shared.monitors.lock().unwrap().close();
        let cancelled = self.commands.close();
        if cancelled > 0 {
            debug!(cancelled, "pending commands cancelled");
        }

        info!(time = %self.time, step = self.step, "simulation finished");
    }
}

impl<E: Environment, S: Scheduler<E>> KernelOps<E> for Kernel<E, S> {
    fn environment(&self) -> &E {
        &self.env
    }

    fn time(&self) -> Time {
        self.time
    }

    fn step(&self) -> u64 {
        self.step
    }

    fn status(&self) -> Status {
        self.shared.status.get()
    }

    fn set_status(&mut self, status: Status) -> Result<Status, SchedulingError> {
        let current = self.shared.status.get();
        if current == status {
            return Ok(status);
        }
        if !status.is_reachable_from(current) {
            return Err(SchedulingError::Unreachable {
                from: current,
                to: status,
            });
        }

        info!(from = %current, to = %status, "status changed");
        self.shared.status.set(status);

        Ok(status)
    }

    fn add_reaction(&mut self, reaction: ReactionHandle<E>) -> Result<(), ExecutionError> {
        let id = reaction.id();
        self.scheduler.add(reaction.clone())?;
        if !self.graph.register(reaction.clone(), &self.env) {
            return Err(ExecutionError::InvariantViolation(format!(
                "{id} is already in the dependency graph"
            )));
        }
        if let Some(node) = reaction.node() {
            self.node_reactions.entry(node).or_default().push(id);
        }
        if let Some(signal) = reaction.reschedule_signal() {
            let requests = self.reschedule.clone();
            signal.subscribe(move || requests.lock().unwrap().push(id));
        }
        trace!(%id, tau = %reaction.tau(), "reaction added");

        Ok(())
    }

    fn remove_reaction(&mut self, id: ReactionId) -> Result<(), ExecutionError> {
        let reaction = self.scheduler.remove(id)?;
        if let Some(signal) = reaction.reschedule_signal() {
            signal.unsubscribe();
        }
        self.graph.unregister(id);
        if let Some(node) = reaction.node() {
            if let Some(ids) = self.node_reactions.get_mut(&node) {
                ids.retain(|&other| other != id);
                if ids.is_empty() {
                    self.node_reactions.remove(&node);
                }
            }
        }
        trace!(%id, "reaction removed");

        Ok(())
    }

    fn add_node(&mut self, node: NodeId) -> Result<(), ExecutionError> {
        debug!(%node, "node added");
        for reaction in self.env.node_reactions(node) {
            self.add_reaction(reaction)?;
        }

        Ok(())
    }

    fn remove_node(&mut self, node: NodeId) -> Result<(), ExecutionError> {
        debug!(%node, "node removed");
        for id in self.node_reactions.remove(&node).unwrap_or_default() {
            self.remove_reaction(id)?;
        }

        Ok(())
    }

    fn neighbors_changed(&mut self, node: NodeId) {
        debug!(%node, "neighborhood changed");
        self.graph.neighbors_changed(node, &self.env);
    }

    fn is_scheduled(&self, id: ReactionId) -> bool {
        self.scheduler.contains(id)
    }
}

impl<E: Environment, S> fmt::Debug for Kernel<E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("time", &self.time)
            .field("step", &self.step)
            .field("status", &self.shared.status.get())
            .finish_non_exhaustive()
    }
}
