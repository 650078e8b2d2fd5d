use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll, Wake, Waker};
use std::time::Duration;

use futures_channel::oneshot;
use parking::{Parker, Unparker};
use tracing::debug;

use crate::model::{NodeId, ReactionHandle, ReactionId};
use crate::monitor::{MonitorError, MonitorId, OutputMonitor};
use crate::time::Time;

use super::kernel::Shared;
use super::{EngineError, ExecutionError, KernelOps, SchedulingError, Status};

type Reply = Result<Status, SchedulingError>;

/// A cheap, cloneable handle controlling an engine from any thread.
///
/// Handles are obtained from [`Engine::handle`](super::Engine::handle),
/// [`BatchEngine::handle`](super::BatchEngine::handle), or from the
/// environment through
/// [`SimulationSlot::simulation`](crate::model::SimulationSlot::simulation).
///
/// Status changes and structural changes are not applied immediately: they
/// are enqueued as commands and applied by the simulation thread between two
/// steps. Methods requesting a status change return a [`CommandFuture`] that
/// resolves once the change has been applied.
pub struct SimulationHandle<E> {
    shared: Arc<Shared<E>>,
}

impl<E: 'static> SimulationHandle<E> {
    pub(crate) fn new(shared: Arc<Shared<E>>) -> Self {
        Self { shared }
    }

    /// Returns `true` if both handles control the same engine.
    pub fn same_engine(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Returns the current status.
    pub fn status(&self) -> Status {
        self.shared.status.get()
    }

    /// Returns the simulation time reached by the last completed step.
    pub fn time(&self) -> Time {
        self.shared.time()
    }

    /// Returns the number of completed steps.
    pub fn step(&self) -> u64 {
        self.shared.step()
    }

    /// Returns the error that terminated the engine, if any.
    pub fn error(&self) -> Option<Arc<EngineError>> {
        self.shared.error()
    }

    /// Blocks the calling thread until the engine reaches the specified
    /// status or the timeout elapses, and returns the status observed on
    /// wake-up.
    ///
    /// The call returns immediately if the status is already reached or if
    /// it can no longer be reached, for instance when waiting for `Running`
    /// on a terminated engine.
    ///
    /// This must not be called from the simulation thread.
    pub fn wait_for(&self, status: Status, timeout: Duration) -> Status {
        self.shared.status.wait_for(status, timeout)
    }

    /// Enqueues a command for execution on the simulation thread.
    ///
    /// Fails immediately if the engine is terminated.
    pub fn schedule<F>(&self, command: F) -> Result<(), SchedulingError>
    where
        F: FnOnce(&mut dyn KernelOps<E>) -> Result<(), ExecutionError> + Send + 'static,
    {
        if self.status() == Status::Terminated {
            return Err(SchedulingError::Terminated);
        }

        self.shared
            .commands
            .write(Box::new(command))
            .map_err(|_| SchedulingError::Terminated)
    }

    /// Requests the engine to run.
    pub fn play(&self) -> CommandFuture {
        self.transition(Status::Running)
    }

    /// Requests the engine to pause.
    pub fn pause(&self) -> CommandFuture {
        self.transition(Status::Paused)
    }

    /// Requests the engine to terminate.
    ///
    /// Termination is cooperative: a step that is being executed completes
    /// before the request is applied.
    pub fn terminate(&self) -> CommandFuture {
        self.transition(Status::Terminated)
    }

    /// Requests the engine to pause once the specified number of steps have
    /// completed.
    ///
    /// This does not resume a paused engine. The returned future resolves
    /// once the engine is paused.
    pub fn go_to_step(&self, step: u64) -> CommandFuture {
        self.pause_when(move |_, current| current >= step)
    }

    /// Requests the engine to pause after the first step reaching the
    /// specified simulation time.
    ///
    /// This does not resume a paused engine. The returned future resolves
    /// once the engine is paused.
    pub fn go_to_time(&self, time: Time) -> CommandFuture {
        self.pause_when(move |current, _| current >= time)
    }

    /// Attaches an output monitor.
    ///
    /// Monitors attached once the engine has stopped are never called.
    pub fn add_output_monitor(&self, monitor: Arc<dyn OutputMonitor<E>>) -> MonitorId {
        self.shared.monitors.lock().unwrap().add(monitor)
    }

    /// Detaches an output monitor, returning `true` if it was attached.
    pub fn remove_output_monitor(&self, id: MonitorId) -> bool {
        self.shared.monitors.lock().unwrap().remove(id)
    }

    /// Schedules a reaction that was added to the environment.
    pub fn reaction_added(&self, reaction: ReactionHandle<E>) -> Result<(), SchedulingError> {
        self.schedule(move |kernel| kernel.add_reaction(reaction))
    }

    /// Unschedules a reaction that was removed from the environment.
    pub fn reaction_removed(&self, id: ReactionId) -> Result<(), SchedulingError> {
        self.schedule(move |kernel| kernel.remove_reaction(id))
    }

    /// Schedules the reactions of a node that was added to the environment.
    pub fn node_added(&self, node: NodeId) -> Result<(), SchedulingError> {
        self.schedule(move |kernel| kernel.add_node(node))
    }

    /// Unschedules the reactions of a node that was removed from the
    /// environment.
    pub fn node_removed(&self, node: NodeId) -> Result<(), SchedulingError> {
        self.schedule(move |kernel| kernel.remove_node(node))
    }

    /// Updates dependencies after two nodes became neighbors.
    pub fn neighbor_added(&self, node: NodeId, neighbor: NodeId) -> Result<(), SchedulingError> {
        self.schedule(move |kernel| {
            kernel.neighbors_changed(node);
            kernel.neighbors_changed(neighbor);
            Ok(())
        })
    }

    /// Updates dependencies after two nodes stopped being neighbors.
    pub fn neighbor_removed(
        &self,
        node: NodeId,
        neighbor: NodeId,
    ) -> Result<(), SchedulingError> {
        self.neighbor_added(node, neighbor)
    }

    fn transition(&self, target: Status) -> CommandFuture {
        if self.status() == Status::Terminated {
            return CommandFuture::ready(if target == Status::Terminated {
                Ok(Status::Terminated)
            } else {
                Err(SchedulingError::Terminated)
            });
        }

        let (reply, future) = CommandFuture::channel();
        // A rejected command is dropped with its reply sender, which resolves
        // the future with `SchedulingError::Terminated`.
        let _ = self.shared.transition(target, reply);

        future
    }

    fn pause_when<F>(&self, condition: F) -> CommandFuture
    where
        F: Fn(Time, u64) -> bool + Send + Sync + 'static,
    {
        if self.status() == Status::Terminated {
            return CommandFuture::ready(Err(SchedulingError::Terminated));
        }

        let (reply, future) = CommandFuture::channel();
        let shared = Arc::downgrade(&self.shared);
        let mut registry = self.shared.monitors.lock().unwrap();
        // The monitor is dropped along with the reply sender if the engine
        // has already stopped.
        registry.add_with(|id| {
            let monitor: Arc<dyn OutputMonitor<E>> = Arc::new(PauseWhen {
                id,
                condition,
                shared,
                reply: Mutex::new(Some(reply)),
            });

            monitor
        });

        future
    }
}

impl<E> Clone for SimulationHandle<E> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<E> fmt::Debug for SimulationHandle<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationHandle")
            .field("status", &self.shared.status.get())
            .field("time", &self.shared.time())
            .field("step", &self.shared.step())
            .finish_non_exhaustive()
    }
}

impl<E: 'static> Shared<E> {
    /// Enqueues a guarded status transition whose outcome is sent to
    /// `reply`.
    fn transition(
        &self,
        target: Status,
        reply: oneshot::Sender<Reply>,
    ) -> Result<(), SchedulingError> {
        self.commands
            .write(Box::new(move |kernel: &mut dyn KernelOps<E>| {
                let _ = reply.send(kernel.set_status(target));
                Ok(())
            }))
            .map_err(|_| SchedulingError::Terminated)
    }
}

/// A temporary monitor pausing the engine once a condition on the time and
/// step count holds.
struct PauseWhen<E, F> {
    id: MonitorId,
    condition: F,
    shared: Weak<Shared<E>>,
    reply: Mutex<Option<oneshot::Sender<Reply>>>,
}

impl<E, F> OutputMonitor<E> for PauseWhen<E, F>
where
    E: 'static,
    F: Fn(Time, u64) -> bool + Send + Sync + 'static,
{
    fn step_done(
        &self,
        _env: &E,
        _reaction: Option<&ReactionHandle<E>>,
        time: Time,
        step: u64,
    ) -> Result<(), MonitorError> {
        if !(self.condition)(time, step) {
            return Ok(());
        }

        if let Some(reply) = self.reply.lock().unwrap().take() {
            if let Some(shared) = self.shared.upgrade() {
                debug!(%time, step, "pause condition reached");
                shared.monitors.lock().unwrap().remove(self.id);
                let _ = shared.transition(Status::Paused, reply);
            }
        }

        Ok(())
    }

    fn finished(&self, _env: &E, _time: Time, _step: u64) -> Result<(), MonitorError> {
        // Cancels the pending future.
        self.reply.lock().unwrap().take();

        Ok(())
    }
}

enum FutureState {
    Ready(Reply),
    Pending(oneshot::Receiver<Reply>),
}

/// A future resolving once a status change requested through a
/// [`SimulationHandle`] has been applied.
///
/// It resolves to the status after the change, or to an error if the change
/// could not be applied. A request that was still pending when the engine
/// stopped resolves to [`SchedulingError::Terminated`].
///
/// The future can be awaited, or waited for synchronously with
/// [`CommandFuture::wait`].
#[must_use = "futures do nothing unless polled or waited for"]
pub struct CommandFuture {
    state: FutureState,
}

impl CommandFuture {
    fn channel() -> (oneshot::Sender<Reply>, Self) {
        let (sender, receiver) = oneshot::channel();

        (
            sender,
            Self {
                state: FutureState::Pending(receiver),
            },
        )
    }

    fn ready(reply: Reply) -> Self {
        Self {
            state: FutureState::Ready(reply),
        }
    }

    /// Blocks the calling thread until the future resolves.
    ///
    /// This must not be called from the simulation thread.
    pub fn wait(mut self) -> Result<Status, SchedulingError> {
        let parker = Parker::new();
        let waker = Waker::from(Arc::new(UnparkWaker(parker.unparker())));
        let mut cx = Context::from_waker(&waker);

        loop {
            if let Poll::Ready(reply) = Pin::new(&mut self).poll(&mut cx) {
                return reply;
            }
            parker.park();
        }
    }
}

impl Future for CommandFuture {
    type Output = Result<Status, SchedulingError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            FutureState::Ready(reply) => Poll::Ready(*reply),
            FutureState::Pending(receiver) => Pin::new(receiver)
                .poll(cx)
                .map(|reply| reply.unwrap_or(Err(SchedulingError::Terminated))),
        }
    }
}

impl fmt::Debug for CommandFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandFuture").finish_non_exhaustive()
    }
}

struct UnparkWaker(Unparker);

impl Wake for UnparkWaker {
    fn wake(self: Arc<Self>) {
        self.0.unpark();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.0.unpark();
    }
}
