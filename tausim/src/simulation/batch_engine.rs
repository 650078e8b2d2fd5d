use std::collections::HashSet;
use std::error::Error;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_utils::thread;
use tracing::trace;

use crate::model::{BindError, Environment, ReactionHandle};
use crate::scheduler::{BatchScheduler, EpsilonBatchQueue, FixedBatchQueue};
use crate::time::Time;

use super::kernel::Kernel;
use super::{EngineError, ExecutionError, KernelOps, SimulationHandle};

/// Policy governing how many output monitor notifications a batch produces.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OutputReplayStrategy {
    /// Monitors are notified once per batch, with the latest reaction of the
    /// batch.
    Aggregate,
    /// Monitors are notified once per reaction of the batch, in time order.
    #[default]
    Reply,
}

impl fmt::Display for OutputReplayStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aggregate => f.write_str("aggregate"),
            Self::Reply => f.write_str("reply"),
        }
    }
}

impl FromStr for OutputReplayStrategy {
    type Err = ParseReplayStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("aggregate") {
            Ok(Self::Aggregate)
        } else if s.eq_ignore_ascii_case("reply") {
            Ok(Self::Reply)
        } else {
            Err(ParseReplayStrategyError(s.to_owned()))
        }
    }
}

/// An error returned when parsing an unknown [`OutputReplayStrategy`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseReplayStrategyError(String);

impl fmt::Display for ParseReplayStrategyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown output replay strategy '{}', expected 'aggregate' or 'reply'",
            self.0
        )
    }
}

impl Error for ParseReplayStrategyError {}

/// Selection rule for the reactions executed together.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BatchMode {
    /// The specified number of earliest reactions.
    Fixed(usize),
    /// The earliest reaction and all finite-time reactions scheduled at most
    /// the specified duration after it.
    Epsilon(f64),
}

/// Configuration of a [`BatchEngine`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BatchConfig {
    /// Maximum number of worker threads executing a batch.
    pub workers: usize,
    /// Selection rule for batches.
    pub batch: BatchMode,
    /// Monitor notification policy.
    pub output_replay: OutputReplayStrategy,
}

impl BatchConfig {
    /// Sets the maximum number of worker threads.
    ///
    /// A value of 0 is treated as 1.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the batch selection rule.
    pub fn with_batch_mode(mut self, batch: BatchMode) -> Self {
        self.batch = batch;
        self
    }

    /// Sets the monitor notification policy.
    pub fn with_output_replay(mut self, output_replay: OutputReplayStrategy) -> Self {
        self.output_replay = output_replay;
        self
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            batch: BatchMode::Epsilon(0.0),
            output_replay: OutputReplayStrategy::default(),
        }
    }
}

type BoxedScheduler<E> = Box<dyn BatchScheduler<E> + Send>;

/// A parallel engine executing batches of reactions on worker threads.
///
/// At each step, the engine selects a batch of the earliest reactions
/// according to its [`BatchMode`] and executes them concurrently. Once all
/// reactions of the batch have been executed, the reactions depending on any
/// of them are re-evaluated and the simulation time is advanced to the
/// latest time stamp of the batch.
///
/// For deterministic models whose simultaneous reactions commute, this
/// produces the same trace as the sequential [`Engine`](super::Engine) when
/// the batch mode is `Epsilon(0.0)`.
///
/// Executions within a batch are serialized by a global execution lock, so
/// that a reaction checking whether it can execute never observes another
/// reaction halfway through its execution. Only the computation of the next
/// time stamps is fully concurrent.
pub struct BatchEngine<E: Environment> {
    kernel: Kernel<E, BoxedScheduler<E>>,
    executor: BatchExecutor,
    config: BatchConfig,
}

impl<E: Environment> BatchEngine<E> {
    /// Creates a batch engine driving the specified environment.
    ///
    /// Fails if the environment is already driven by another engine.
    ///
    /// # Panics
    ///
    /// Panics if the batch mode is `Fixed(0)` or `Epsilon` with a negative or
    /// NaN duration.
    pub fn new(env: Arc<E>, config: BatchConfig) -> Result<Self, BindError> {
        let scheduler: BoxedScheduler<E> = match config.batch {
            BatchMode::Fixed(size) => Box::new(FixedBatchQueue::new(size)),
            BatchMode::Epsilon(epsilon) => Box::new(EpsilonBatchQueue::new(epsilon)),
        };

        Ok(Self {
            kernel: Kernel::new(env, scheduler)?,
            executor: BatchExecutor {
                workers: config.workers.max(1),
                output_replay: config.output_replay,
                execution_lock: Mutex::new(()),
                dependency_lock: Mutex::new(()),
            },
            config,
        })
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Returns a handle controlling this engine.
    pub fn handle(&self) -> SimulationHandle<E> {
        self.kernel.handle()
    }

    /// Runs the simulation on the current thread until it is terminated.
    ///
    /// Worker threads are only alive while a batch is being executed.
    pub fn run(&mut self) -> Result<(), Arc<EngineError>> {
        let executor = &self.executor;

        self.kernel.run(|kernel| executor.step(kernel))
    }
}

impl<E: Environment> fmt::Debug for BatchEngine<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchEngine")
            .field("kernel", &self.kernel)
            .field("config", &self.config)
            .finish()
    }
}

struct BatchExecutor {
    workers: usize,
    output_replay: OutputReplayStrategy,
    /// Serializes executions and their preconditions.
    execution_lock: Mutex<()>,
    /// Guards the dependency propagation phase.
    dependency_lock: Mutex<()>,
}

impl BatchExecutor {
    /// Executes the next batch.
    fn step<E, S>(&self, kernel: &mut Kernel<E, S>) -> Result<(), ExecutionError>
    where
        E: Environment,
        S: BatchScheduler<E>,
    {
        let batch = kernel.scheduler.peek_next_batch();
        if batch.is_empty() {
            kernel.terminate("no more reactions");
            return Ok(());
        }

        let taus: Vec<Time> = batch.iter().map(|reaction| reaction.tau()).collect();
        let mut order: Vec<usize> = (0..batch.len()).collect();
        order.sort_by_key(|&i| taus[i]);
        let (first, last) = (order[0], order[order.len() - 1]);
        let (min_tau, max_tau) = (taus[first], taus[last]);

        let now = kernel.time();
        if min_tau < now && min_tau != Time::ZERO {
            return Err(ExecutionError::TimeTravel {
                reaction: batch[first].id(),
                tau: min_tau,
                now,
            });
        }

        let env = kernel.env().clone();
        let executed = self.execute_all(&*env, &batch, min_tau)?;

        for reaction in &batch {
            kernel.scheduler.update(reaction.id())?;
        }
        let time = now.max(max_tau);
        kernel.set_time(time);
        self.propagate(kernel, &batch, &executed)?;

        let first_step = kernel.step();
        kernel.advance_steps(batch.len() as u64);
        trace!(size = batch.len(), %min_tau, %max_tau, step = kernel.step(), "batch done");

        match self.output_replay {
            OutputReplayStrategy::Reply => {
                for (i, &index) in order.iter().enumerate() {
                    kernel.notify_step_done(
                        Some(&batch[index]),
                        now.max(taus[index]),
                        first_step + i as u64 + 1,
                    )?;
                }
            }
            OutputReplayStrategy::Aggregate => {
                kernel.notify_step_done(Some(&batch[last]), time, kernel.step())?;
            }
        }
        kernel.check_termination();

        Ok(())
    }

    /// Executes the batch on worker threads and reports which reactions
    /// were executed.
    ///
    /// The first error in batch order is returned if any execution failed.
    fn execute_all<E: Environment>(
        &self,
        env: &E,
        batch: &[ReactionHandle<E>],
        min_tau: Time,
    ) -> Result<Vec<bool>, ExecutionError> {
        let cursor = AtomicUsize::new(0);
        let failed = AtomicBool::new(false);
        let (cursor, failed) = (&cursor, &failed);
        let workers = self.workers.min(batch.len());

        let joined = thread::scope(|s| {
            let workers: Vec<_> = (0..workers)
                .map(|_| {
                    s.spawn(move |_| {
                        let mut outcomes = Vec::new();
                        while !failed.load(Ordering::Relaxed) {
                            let index = cursor.fetch_add(1, Ordering::Relaxed);
                            let Some(reaction) = batch.get(index) else {
                                break;
                            };
                            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                                self.execute_one(env, reaction, min_tau)
                            }))
                            .unwrap_or_else(|payload| Err(ExecutionError::from_panic(payload)));
                            if outcome.is_err() {
                                failed.store(true, Ordering::Relaxed);
                            }
                            outcomes.push((index, outcome));
                        }

                        outcomes
                    })
                })
                .collect();

            workers
                .into_iter()
                .map(|worker| worker.join())
                .collect::<Vec<_>>()
        })
        .map_err(ExecutionError::from_panic)?;

        let mut slots: Vec<Option<Result<bool, ExecutionError>>> =
            (0..batch.len()).map(|_| None).collect();
        for outcomes in joined {
            for (index, outcome) in outcomes.map_err(ExecutionError::from_panic)? {
                slots[index] = Some(outcome);
            }
        }

        let mut executed = Vec::with_capacity(batch.len());
        let mut error = None;
        for slot in slots {
            match slot {
                Some(Ok(was_executed)) => executed.push(was_executed),
                Some(Err(e)) => {
                    error.get_or_insert(e);
                }
                None => {}
            }
        }
        if let Some(e) = error {
            return Err(e);
        }
        if executed.len() != batch.len() {
            return Err(ExecutionError::InvariantViolation(format!(
                "{} out of {} reactions of the batch were processed",
                executed.len(),
                batch.len()
            )));
        }

        Ok(executed)
    }

    fn execute_one<E: Environment>(
        &self,
        env: &E,
        reaction: &ReactionHandle<E>,
        min_tau: Time,
    ) -> Result<bool, ExecutionError> {
        let tau = reaction.tau();
        // The first batch may start at zero regardless of the window.
        if tau < min_tau && tau != Time::ZERO {
            return Err(ExecutionError::TimeTravel {
                reaction: reaction.id(),
                tau,
                now: min_tau,
            });
        }

        let executed = {
            let _guard = self
                .execution_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if tau.is_finite() && reaction.can_execute() {
                reaction.on_ready();
                reaction
                    .execute(env)
                    .map_err(|cause| ExecutionError::Reaction {
                        reaction: reaction.id(),
                        cause,
                    })?;
                true
            } else {
                false
            }
        };
        reaction.update(tau, executed, env);

        Ok(executed)
    }

    /// Re-evaluates the reactions depending on the executed reactions of the
    /// batch, then applies the pending reschedule requests.
    fn propagate<E, S>(
        &self,
        kernel: &mut Kernel<E, S>,
        batch: &[ReactionHandle<E>],
        executed: &[bool],
    ) -> Result<(), ExecutionError>
    where
        E: Environment,
        S: BatchScheduler<E>,
    {
        let _guard = self
            .dependency_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut seen = HashSet::new();
        let mut dependents = Vec::new();
        for (reaction, &was_executed) in batch.iter().zip(executed) {
            if !was_executed {
                continue;
            }
            for dependent in kernel.graph.outbound_dependencies(reaction.id()) {
                if seen.insert(dependent.id()) {
                    dependents.push(dependent);
                }
            }
        }
        for dependent in &dependents {
            kernel.refresh(dependent)?;
        }

        kernel.apply_reschedule_requests()
    }
}

impl fmt::Debug for BatchExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchExecutor")
            .field("workers", &self.workers)
            .field("output_replay", &self.output_replay)
            .finish_non_exhaustive()
    }
}
