use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::time::Time;

/// Error returned by a failed reaction execution.
pub type ReactionError = Box<dyn Error + Send + Sync + 'static>;

/// A shared handle to a reaction.
pub type ReactionHandle<E> = Arc<dyn Reaction<E>>;

static NEXT_REACTION_ID: AtomicU64 = AtomicU64::new(0);

/// Unique identifier of a reaction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReactionId(pub u64);

impl ReactionId {
    /// Returns an identifier never returned before by this function in the
    /// current process.
    pub fn fresh() -> Self {
        Self(NEXT_REACTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ReactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reaction#{}", self.0)
    }
}

/// Unique identifier of a node of the environment.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Scope in which a reaction reads or writes its dependencies.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Context {
    /// Anywhere in the environment.
    Global,
    /// The reaction's own node only.
    Local,
    /// The reaction's node and its neighbors.
    Neighborhood,
}

/// Something a reaction reads or writes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Dependency {
    /// A named molecule (or any named piece of node state).
    Molecule(Arc<str>),
    /// Matches every dependency.
    Everything,
}

impl Dependency {
    /// Creates a molecule dependency.
    pub fn molecule(name: impl Into<Arc<str>>) -> Self {
        Self::Molecule(name.into())
    }

    /// Returns `true` if the two dependencies may refer to the same state.
    pub fn overlaps(&self, other: &Dependency) -> bool {
        match (self, other) {
            (Self::Everything, _) | (_, Self::Everything) => true,
            (Self::Molecule(a), Self::Molecule(b)) => a == b,
        }
    }
}

/// A timed, conditionally executable unit of simulated behavior.
///
/// Reactions are shared between the simulation thread and, for the
/// [`BatchEngine`](crate::simulation::BatchEngine), its worker threads, so all
/// methods take `&self` and implementors are expected to rely on interior
/// mutability.
///
/// Once a reaction has been scheduled, its [`tau`](Reaction::tau) may only
/// change during a call to [`update`](Reaction::update) or, out-of-band,
/// followed by a call to [`RescheduleSignal::notify`] on the signal returned
/// by [`reschedule_signal`](Reaction::reschedule_signal). Any other change
/// desynchronizes the scheduler.
pub trait Reaction<E>: Send + Sync {
    /// Returns the identifier of the reaction.
    fn id(&self) -> ReactionId;

    /// Returns the node owning the reaction, or `None` for a global reaction.
    fn node(&self) -> Option<NodeId>;

    /// Returns the absolute time at which the reaction is next scheduled.
    fn tau(&self) -> Time;

    /// Returns `true` if the reaction may fire now.
    fn can_execute(&self) -> bool;

    /// Called right before [`execute`](Reaction::execute) so that trigger
    /// conditions can commit any state cached during evaluation.
    fn on_ready(&self) {}

    /// Executes the reaction.
    fn execute(&self, env: &E) -> Result<(), ReactionError>;

    /// Recomputes the next execution time.
    ///
    /// `was_executed` is `true` when called right after the reaction itself
    /// fired, and `false` when called because a dependency fired.
    fn update(&self, current_time: Time, was_executed: bool, env: &E);

    /// Scope of the dependencies read by the reaction.
    fn input_context(&self) -> Context;

    /// Scope of the dependencies written by the reaction.
    fn output_context(&self) -> Context;

    /// Dependencies read by the reaction.
    fn inbound_dependencies(&self) -> &[Dependency];

    /// Dependencies written by the reaction.
    fn outbound_dependencies(&self) -> &[Dependency];

    /// Returns the signal used to report out-of-band changes of `tau`, if
    /// the reaction has one.
    fn reschedule_signal(&self) -> Option<&RescheduleSignal> {
        None
    }
}

type Listener = Box<dyn Fn() + Send + Sync>;

/// A slot through which a reaction reports that its `tau` changed outside of
/// a call to [`Reaction::update`].
///
/// The engine subscribes to the signal when the reaction is scheduled and
/// unsubscribes when it is removed. Notifying an unsubscribed signal is a
/// no-op.
#[derive(Default)]
pub struct RescheduleSignal {
    listener: Mutex<Option<Listener>>,
}

impl RescheduleSignal {
    /// Creates a signal without subscriber.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests the reaction to be repositioned in the scheduler.
    pub fn notify(&self) {
        if let Some(listener) = &*self.listener.lock().unwrap() {
            listener();
        }
    }

    /// Returns `true` if an engine listens to the signal.
    pub fn is_subscribed(&self) -> bool {
        self.listener.lock().unwrap().is_some()
    }

    pub(crate) fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) {
        *self.listener.lock().unwrap() = Some(Box::new(listener));
    }

    pub(crate) fn unsubscribe(&self) {
        *self.listener.lock().unwrap() = None;
    }
}

impl fmt::Debug for RescheduleSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RescheduleSignal")
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    #[test]
    fn everything_overlaps_any_molecule() {
        let a = Dependency::molecule("A");
        assert!(a.overlaps(&Dependency::Everything));
        assert!(Dependency::Everything.overlaps(&a));
        assert!(a.overlaps(&Dependency::molecule("A")));
        assert!(!a.overlaps(&Dependency::molecule("B")));
    }

    #[test]
    fn fresh_ids_are_distinct() {
        let a = ReactionId::fresh();
        let b = ReactionId::fresh();
        assert_ne!(a, b);
    }

    #[test]
    fn signal_reaches_subscriber_until_unsubscribed() {
        let hits = Arc::new(AtomicUsize::new(0));
        let signal = RescheduleSignal::new();

        signal.notify();
        let counter = hits.clone();
        signal.subscribe(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        });
        signal.notify();
        signal.unsubscribe();
        signal.notify();

        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }
}
