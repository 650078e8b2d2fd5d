//! Dependency graph between reactions.
//!
//! The graph answers one question, asked once per executed reaction: which
//! scheduled reactions may have had their preconditions invalidated by the
//! execution of a given reaction?
//!
//! An edge `A → B` exists when something `A` writes is read by `B`, and the
//! scope in which `A` writes overlaps the scope in which `B` reads. Scopes are
//! derived from each reaction's [`Context`]:
//!
//! * a global context covers every node,
//! * a local context covers the reaction's own node,
//! * a neighborhood context covers the reaction's node and its neighbors, as
//!   reported by [`Environment::neighbors`].
//!
//! A reaction depends on itself only if it reads something it writes.
//!
//! Edges are computed when a reaction is registered and are only recomputed
//! on structural changes, so lookups never touch the environment.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use crate::model::{Context, Environment, NodeId, Reaction, ReactionHandle, ReactionId};

/// Set of nodes touched by a reaction.
#[derive(Clone, Debug, PartialEq)]
enum Scope {
    Everywhere,
    Nodes(Vec<NodeId>),
}

impl Scope {
    fn of<E: Environment>(reaction: &dyn Reaction<E>, context: Context, env: &E) -> Self {
        match (context, reaction.node()) {
            (Context::Global, _) | (_, None) => Self::Everywhere,
            (Context::Local, Some(node)) => Self::Nodes(vec![node]),
            (Context::Neighborhood, Some(node)) => {
                let mut nodes = env.neighbors(node);
                nodes.push(node);

                Self::Nodes(nodes)
            }
        }
    }

    fn intersects(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Everywhere, _) | (_, Self::Everywhere) => true,
            (Self::Nodes(a), Self::Nodes(b)) => a.iter().any(|node| b.contains(node)),
        }
    }
}

struct Registered<E> {
    reaction: ReactionHandle<E>,
    /// Registration rank, used to order outbound dependencies.
    seq: u64,
    input: Scope,
    output: Scope,
}

impl<E: Environment> Registered<E> {
    fn new(reaction: ReactionHandle<E>, seq: u64, env: &E) -> Self {
        let input = Scope::of(&*reaction, reaction.input_context(), env);
        let output = Scope::of(&*reaction, reaction.output_context(), env);

        Self {
            reaction,
            seq,
            input,
            output,
        }
    }

    fn refresh_scopes(&mut self, env: &E) {
        self.input = Scope::of(&*self.reaction, self.reaction.input_context(), env);
        self.output = Scope::of(&*self.reaction, self.reaction.output_context(), env);
    }

    fn has_neighborhood_context(&self) -> bool {
        self.reaction.input_context() == Context::Neighborhood
            || self.reaction.output_context() == Context::Neighborhood
    }

    /// Returns `true` if executing `self` may invalidate `other`.
    fn affects(&self, other: &Self) -> bool {
        let reads = other.reaction.inbound_dependencies();
        let overlap = self
            .reaction
            .outbound_dependencies()
            .iter()
            .any(|write| reads.iter().any(|read| write.overlaps(read)));

        overlap && self.output.intersects(&other.input)
    }
}

/// Directed graph of "may invalidate" relations between reactions.
pub struct DependencyGraph<E> {
    reactions: HashMap<ReactionId, Registered<E>>,
    /// Targets of each reaction, keyed by their registration rank.
    outbound: HashMap<ReactionId, BTreeMap<u64, ReactionId>>,
    /// Sources of each reaction.
    inbound: HashMap<ReactionId, HashSet<ReactionId>>,
    next_seq: u64,
}

impl<E: Environment> DependencyGraph<E> {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self {
            reactions: HashMap::new(),
            outbound: HashMap::new(),
            inbound: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Registers a reaction and computes its edges to and from every
    /// registered reaction.
    ///
    /// Returns `false` if the reaction was already registered, in which case
    /// the graph is left unchanged.
    pub fn register(&mut self, reaction: ReactionHandle<E>, env: &E) -> bool {
        let id = reaction.id();
        if self.reactions.contains_key(&id) {
            return false;
        }

        let entry = Registered::new(reaction, self.next_seq, env);
        self.next_seq += 1;
        self.reactions.insert(id, entry);
        self.outbound.insert(id, BTreeMap::new());
        self.inbound.insert(id, HashSet::new());
        self.connect(id);

        true
    }

    /// Removes a reaction and all edges touching it, returning its handle if
    /// it was registered.
    pub fn unregister(&mut self, id: ReactionId) -> Option<ReactionHandle<E>> {
        if !self.reactions.contains_key(&id) {
            return None;
        }

        self.disconnect(id);
        self.outbound.remove(&id);
        self.inbound.remove(&id);

        self.reactions.remove(&id).map(|entry| entry.reaction)
    }

    /// Returns the reactions that may be invalidated by the execution of the
    /// specified reaction, in registration order.
    ///
    /// The result is empty if the reaction is not registered.
    pub fn outbound_dependencies(&self, id: ReactionId) -> Vec<ReactionHandle<E>> {
        self.outbound
            .get(&id)
            .map(|targets| {
                targets
                    .values()
                    .map(|target| self.reactions[target].reaction.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Recomputes the edges of the neighborhood-scoped reactions of a node
    /// after its set of neighbors changed.
    pub fn neighbors_changed(&mut self, node: NodeId, env: &E) {
        let mut affected: Vec<(u64, ReactionId)> = self
            .reactions
            .iter()
            .filter(|(_, entry)| {
                entry.reaction.node() == Some(node) && entry.has_neighborhood_context()
            })
            .map(|(&id, entry)| (entry.seq, id))
            .collect();
        affected.sort_unstable();

        for (_, id) in affected {
            self.disconnect(id);
            if let Some(entry) = self.reactions.get_mut(&id) {
                entry.refresh_scopes(env);
            }
            self.connect(id);
        }
    }

    /// Returns `true` if the reaction is registered.
    pub fn contains(&self, id: ReactionId) -> bool {
        self.reactions.contains_key(&id)
    }

    /// Number of registered reactions.
    pub fn len(&self) -> usize {
        self.reactions.len()
    }

    /// Returns `true` if no reaction is registered.
    pub fn is_empty(&self) -> bool {
        self.reactions.is_empty()
    }

    fn connect(&mut self, id: ReactionId) {
        let entry = &self.reactions[&id];
        let mut edges = Vec::new();
        for (&other_id, other) in &self.reactions {
            if entry.affects(other) {
                edges.push((id, other_id));
            }
            if other_id != id && other.affects(entry) {
                edges.push((other_id, id));
            }
        }

        for (source, target) in edges {
            let seq = self.reactions[&target].seq;
            self.outbound.entry(source).or_default().insert(seq, target);
            self.inbound.entry(target).or_default().insert(source);
        }
    }

    fn disconnect(&mut self, id: ReactionId) {
        if let Some(targets) = self.outbound.get_mut(&id) {
            for target in std::mem::take(targets).into_values() {
                if let Some(sources) = self.inbound.get_mut(&target) {
                    sources.remove(&id);
                }
            }
        }

        let seq = self.reactions[&id].seq;
        if let Some(sources) = self.inbound.get_mut(&id) {
            for source in std::mem::take(sources) {
                if let Some(targets) = self.outbound.get_mut(&source) {
                    targets.remove(&seq);
                }
            }
        }
    }
}

impl<E: Environment> Default for DependencyGraph<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for DependencyGraph<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("reactions", &self.reactions.len())
            .field(
                "edges",
                &self.outbound.values().map(BTreeMap::len).sum::<usize>(),
            )
            .finish_non_exhaustive()
    }
}
