//! Helper models.
//!
//! This module contains a deterministic chemistry model: a single
//! well-stirred [`Compartment`] holding molecule counts, and
//! [`ChemicalReaction`]s firing at a fixed rate as long as their reactants
//! are available. It is useful to exercise engines and compare their traces.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::debug;

use tausim::model::{
    Context, Dependency, Environment, NodeId, Reaction, ReactionError, ReactionHandle, ReactionId,
    RescheduleSignal, SimulationSlot,
};
use tausim::simulation::SchedulingError;
use tausim::time::Time;

type Counts = Arc<Mutex<BTreeMap<Arc<str>, u64>>>;

/// A single compartment holding molecule counts.
///
/// All reactions of the compartment are attached to its node. Reactions can
/// be added or removed while the simulation runs; the engine bound to the
/// compartment is notified through commands.
pub struct Compartment {
    node: NodeId,
    counts: Counts,
    reactions: Mutex<Vec<ReactionHandle<Compartment>>>,
    slot: SimulationSlot<Compartment>,
}

impl Compartment {
    /// Creates an empty compartment.
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            counts: Arc::new(Mutex::new(BTreeMap::new())),
            reactions: Mutex::new(Vec::new()),
            slot: SimulationSlot::new(),
        }
    }

    /// Sets the initial count of a molecule.
    pub fn with_molecule(self, molecule: &str, count: u64) -> Self {
        self.counts.lock().unwrap().insert(molecule.into(), count);
        self
    }

    /// Node of the compartment.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Current count of a molecule.
    pub fn count(&self, molecule: &str) -> u64 {
        self.counts
            .lock()
            .unwrap()
            .get(molecule)
            .copied()
            .unwrap_or(0)
    }

    /// Current count of every molecule, sorted by molecule name.
    pub fn snapshot(&self) -> Vec<(Arc<str>, u64)> {
        self.counts
            .lock()
            .unwrap()
            .iter()
            .map(|(molecule, &count)| (molecule.clone(), count))
            .collect()
    }

    /// Adds a chemical reaction described by an equation.
    ///
    /// If the compartment is driven by an engine, the first execution is
    /// scheduled relative to the current simulation time.
    pub fn add_reaction(
        &self,
        equation: ChemicalEquation,
    ) -> Result<Arc<ChemicalReaction>, SchedulingError> {
        let now = self
            .slot
            .simulation()
            .map_or(Time::ZERO, |simulation| simulation.time());
        let reaction = Arc::new(ChemicalReaction::new(
            self.node,
            self.counts.clone(),
            equation,
            now,
        ));
        self.insert_reaction(reaction.clone())?;

        Ok(reaction)
    }

    /// Adds an arbitrary reaction.
    ///
    /// Fails if the compartment is driven by a terminated engine.
    pub fn insert_reaction(&self, reaction: ReactionHandle<Self>) -> Result<(), SchedulingError> {
        self.reactions.lock().unwrap().push(reaction.clone());

        if let Some(simulation) = self.slot.simulation() {
            let id = reaction.id();
            // The reaction may have been picked up by the initialization of
            // the engine already.
            simulation.schedule(move |kernel| {
                if kernel.is_scheduled(id) {
                    Ok(())
                } else {
                    kernel.add_reaction(reaction)
                }
            })?;
            debug!(%id, "reaction inserted");
        }

        Ok(())
    }

    /// Removes a reaction, returning `true` if it was in the compartment.
    ///
    /// Fails if the compartment is driven by a terminated engine.
    pub fn remove_reaction(&self, id: ReactionId) -> Result<bool, SchedulingError> {
        let removed = {
            let mut reactions = self.reactions.lock().unwrap();
            match reactions.iter().position(|reaction| reaction.id() == id) {
                Some(pos) => {
                    reactions.remove(pos);
                    true
                }
                None => false,
            }
        };

        if removed {
            if let Some(simulation) = self.slot.simulation() {
                simulation.schedule(move |kernel| {
                    if kernel.is_scheduled(id) {
                        kernel.remove_reaction(id)
                    } else {
                        Ok(())
                    }
                })?;
                debug!(%id, "reaction removed");
            }
        }

        Ok(removed)
    }
}

impl Environment for Compartment {
    fn global_reactions(&self) -> Vec<ReactionHandle<Self>> {
        Vec::new()
    }

    fn nodes(&self) -> Vec<NodeId> {
        vec![self.node]
    }

    fn node_reactions(&self, node: NodeId) -> Vec<ReactionHandle<Self>> {
        if node == self.node {
            self.reactions.lock().unwrap().clone()
        } else {
            Vec::new()
        }
    }

    fn simulation_slot(&self) -> &SimulationSlot<Self> {
        &self.slot
    }
}

impl fmt::Debug for Compartment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compartment")
            .field("node", &self.node)
            .field("counts", &self.counts.lock().unwrap())
            .finish_non_exhaustive()
    }
}

/// Stoichiometry, rate and contexts of a chemical reaction.
#[derive(Clone, Debug)]
pub struct ChemicalEquation {
    rate: f64,
    reactants: Vec<(Arc<str>, u64)>,
    products: Vec<(Arc<str>, u64)>,
    input: Context,
    output: Context,
}

impl ChemicalEquation {
    /// Creates an equation without reactants nor products, firing `rate`
    /// times per time unit.
    ///
    /// # Panics
    ///
    /// Panics if the rate is not strictly positive and finite.
    pub fn new(rate: f64) -> Self {
        assert!(
            rate > 0.0 && rate.is_finite(),
            "the reaction rate must be strictly positive and finite"
        );

        Self {
            rate,
            reactants: Vec::new(),
            products: Vec::new(),
            input: Context::Local,
            output: Context::Local,
        }
    }

    /// Adds a reactant.
    pub fn consumes(mut self, molecule: &str, count: u64) -> Self {
        self.reactants.push((molecule.into(), count));
        self
    }

    /// Adds a product.
    pub fn produces(mut self, molecule: &str, count: u64) -> Self {
        self.products.push((molecule.into(), count));
        self
    }

    /// Sets the input and output contexts, which are local by default.
    pub fn with_contexts(mut self, input: Context, output: Context) -> Self {
        self.input = input;
        self.output = output;
        self
    }
}

/// A chemical reaction firing at a fixed rate.
///
/// The reaction can execute as long as its reactants are available in the
/// compartment. Its first execution is scheduled one period after its
/// creation; after each execution, the next one is scheduled one period
/// later. While its reactants are missing, it is scheduled at infinity.
pub struct ChemicalReaction {
    id: ReactionId,
    node: NodeId,
    period: f64,
    reactants: Vec<(Arc<str>, u64)>,
    products: Vec<(Arc<str>, u64)>,
    input: Context,
    output: Context,
    reads: Vec<Dependency>,
    writes: Vec<Dependency>,
    counts: Counts,
    tau: Mutex<Time>,
    signal: RescheduleSignal,
}

impl ChemicalReaction {
    fn new(node: NodeId, counts: Counts, equation: ChemicalEquation, now: Time) -> Self {
        let reads = equation
            .reactants
            .iter()
            .map(|(molecule, _)| Dependency::Molecule(molecule.clone()))
            .collect();
        let mut writes: Vec<Dependency> = Vec::new();
        for (molecule, _) in equation.reactants.iter().chain(&equation.products) {
            let dependency = Dependency::Molecule(molecule.clone());
            if !writes.contains(&dependency) {
                writes.push(dependency);
            }
        }

        let reaction = Self {
            id: ReactionId::fresh(),
            node,
            period: 1.0 / equation.rate,
            reactants: equation.reactants,
            products: equation.products,
            input: equation.input,
            output: equation.output,
            reads,
            writes,
            counts,
            tau: Mutex::new(Time::INFINITY),
            signal: RescheduleSignal::new(),
        };
        if reaction.can_execute() {
            *reaction.tau.lock().unwrap() = now + reaction.period;
        }

        reaction
    }

    /// Moves the next execution to the specified time.
    ///
    /// The engine driving the reaction is notified through the reaction's
    /// reschedule signal.
    pub fn reschedule(&self, tau: Time) {
        *self.tau.lock().unwrap() = tau;
        self.signal.notify();
    }

    fn has_reactants(&self, counts: &BTreeMap<Arc<str>, u64>) -> bool {
        self.reactants
            .iter()
            .all(|(molecule, needed)| counts.get(molecule).copied().unwrap_or(0) >= *needed)
    }
}

impl Reaction<Compartment> for ChemicalReaction {
    fn id(&self) -> ReactionId {
        self.id
    }

    fn node(&self) -> Option<NodeId> {
        Some(self.node)
    }

    fn tau(&self) -> Time {
        *self.tau.lock().unwrap()
    }

    fn can_execute(&self) -> bool {
        self.has_reactants(&self.counts.lock().unwrap())
    }

    fn execute(&self, _env: &Compartment) -> Result<(), ReactionError> {
        let mut counts = self.counts.lock().unwrap();
        if !self.has_reactants(&counts) {
            return Err(format!("{} was executed without its reactants", self.id).into());
        }
        for (molecule, count) in &self.reactants {
            *counts.entry(molecule.clone()).or_default() -= count;
        }
        for (molecule, count) in &self.products {
            *counts.entry(molecule.clone()).or_default() += count;
        }

        Ok(())
    }

    fn update(&self, current_time: Time, was_executed: bool, _env: &Compartment) {
        let can_execute = self.can_execute();
        let mut tau = self.tau.lock().unwrap();
        if !can_execute {
            *tau = Time::INFINITY;
        } else if was_executed || !tau.is_finite() {
            *tau = current_time + self.period;
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

    fn reschedule_signal(&self) -> Option<&RescheduleSignal> {
        Some(&self.signal)
    }
}

impl fmt::Debug for ChemicalReaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChemicalReaction")
            .field("id", &self.id)
            .field("node", &self.node)
            .field("tau", &self.tau())
            .finish_non_exhaustive()
    }
}
