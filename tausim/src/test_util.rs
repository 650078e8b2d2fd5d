//! Minimal reactions and environment for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::model::{
    Context, Dependency, Environment, NodeId, Reaction, ReactionError, ReactionHandle, ReactionId,
    SimulationSlot,
};
use crate::time::Time;

/// A reaction that fires every time unit and counts calls.
pub(crate) struct Probe {
    pub(crate) id: ReactionId,
    node: Option<NodeId>,
    tau: Mutex<Time>,
    input: Context,
    output: Context,
    reads: Vec<Dependency>,
    writes: Vec<Dependency>,
    pub(crate) updates: AtomicUsize,
    pub(crate) executions: AtomicUsize,
    fails: AtomicBool,
}

impl Probe {
    pub(crate) fn at(tau: f64) -> Arc<Self> {
        Arc::new(Self::build(tau, None, Context::Global, Context::Global, &[], &[]))
    }

    pub(crate) fn local(node: u64, reads: &[&str], writes: &[&str]) -> Arc<Self> {
        Arc::new(Self::build(
            1.0,
            Some(NodeId(node)),
            Context::Local,
            Context::Local,
            reads,
            writes,
        ))
    }

    pub(crate) fn global(reads: &[&str], writes: &[&str]) -> Arc<Self> {
        Arc::new(Self::build(
            1.0,
            None,
            Context::Global,
            Context::Global,
            reads,
            writes,
        ))
    }

    pub(crate) fn with_contexts(
        node: u64,
        input: Context,
        output: Context,
        reads: &[&str],
        writes: &[&str],
    ) -> Arc<Self> {
        Arc::new(Self::build(1.0, Some(NodeId(node)), input, output, reads, writes))
    }

    fn build(
        tau: f64,
        node: Option<NodeId>,
        input: Context,
        output: Context,
        reads: &[&str],
        writes: &[&str],
    ) -> Self {
        Self {
            id: ReactionId::fresh(),
            node,
            tau: Mutex::new(Time::from_secs(tau)),
            input,
            output,
            reads: reads.iter().map(|&m| Dependency::molecule(m)).collect(),
            writes: writes.iter().map(|&m| Dependency::molecule(m)).collect(),
            updates: AtomicUsize::new(0),
            executions: AtomicUsize::new(0),
            fails: AtomicBool::new(false),
        }
    }

    /// Makes subsequent executions fail.
    pub(crate) fn fail_on_execute(&self) {
        self.fails.store(true, Ordering::Relaxed);
    }

    pub(crate) fn set_tau(&self, tau: f64) {
        *self.tau.lock().unwrap() = Time::from_secs(tau);
    }
}

impl<E> Reaction<E> for Probe {
    fn id(&self) -> ReactionId {
        self.id
    }
    fn node(&self) -> Option<NodeId> {
        self.node
    }
    fn tau(&self) -> Time {
        *self.tau.lock().unwrap()
    }
    fn can_execute(&self) -> bool {
        true
    }
    fn execute(&self, _env: &E) -> Result<(), ReactionError> {
        if self.fails.load(Ordering::Relaxed) {
            return Err("probe failure".into());
        }
        self.executions.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
    fn update(&self, current_time: Time, was_executed: bool, _env: &E) {
        self.updates.fetch_add(1, Ordering::Relaxed);
        if was_executed {
            *self.tau.lock().unwrap() = current_time + 1.0;
        }
    }
    fn input_context(&self) -> Context {
        self.input
    }
    fn output_context(&self) -> Context {
        self.output
    }
    fn inbound_dependencies(&self) -> &[Dependency] {
        &self.reads
    }
    fn outbound_dependencies(&self) -> &[Dependency] {
        &self.writes
    }
}

/// An environment made of probes and a static neighborhood relation.
#[derive(Default)]
pub(crate) struct ProbeEnv {
    pub(crate) reactions: Vec<Arc<Probe>>,
    pub(crate) neighbors: HashMap<NodeId, Vec<NodeId>>,
    slot: SimulationSlot<ProbeEnv>,
}

impl ProbeEnv {
    pub(crate) fn with_reactions(reactions: Vec<Arc<Probe>>) -> Self {
        Self {
            reactions,
            ..Self::default()
        }
    }

    pub(crate) fn link(&mut self, a: u64, b: u64) {
        self.neighbors.entry(NodeId(a)).or_default().push(NodeId(b));
        self.neighbors.entry(NodeId(b)).or_default().push(NodeId(a));
    }
}

impl Environment for ProbeEnv {
    fn global_reactions(&self) -> Vec<ReactionHandle<Self>> {
        self.reactions
            .iter()
            .filter(|r| r.node.is_none())
            .map(|r| r.clone() as ReactionHandle<Self>)
            .collect()
    }

    fn nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<_> = self.reactions.iter().filter_map(|r| r.node).collect();
        nodes.sort();
        nodes.dedup();
        nodes
    }

    fn node_reactions(&self, node: NodeId) -> Vec<ReactionHandle<Self>> {
        self.reactions
            .iter()
            .filter(|r| r.node == Some(node))
            .map(|r| r.clone() as ReactionHandle<Self>)
            .collect()
    }

    fn neighbors(&self, node: NodeId) -> Vec<NodeId> {
        self.neighbors.get(&node).cloned().unwrap_or_default()
    }

    fn simulation_slot(&self) -> &SimulationSlot<Self> {
        &self.slot
    }
}
