//! Trace recording.

use std::fmt;
use std::sync::{Arc, Mutex};

use tausim::model::{NodeId, ReactionHandle};
use tausim::monitor::{MonitorError, OutputMonitor};
use tausim::time::Time;

use crate::helper_models::Compartment;

/// A molecule count observed at a given simulation time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceEntry {
    /// Simulation time of the observation.
    pub time: Time,
    /// Node of the compartment.
    pub node: NodeId,
    /// Observed molecule.
    pub molecule: Arc<str>,
    /// Count of the molecule.
    pub count: u64,
}

/// An output monitor recording the molecule counts of a compartment.
///
/// Only the last observation of each simulation time instant is kept, so
/// that engines notifying monitors at different granularities within the
/// same instant produce the same trace.
#[derive(Default)]
pub struct TraceRecorder {
    snapshots: Mutex<Vec<(Time, NodeId, Vec<(Arc<str>, u64)>)>>,
}

impl TraceRecorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded trace in time order, then molecule order.
    pub fn trace(&self) -> Vec<TraceEntry> {
        let snapshots = self.snapshots.lock().unwrap();

        snapshots
            .iter()
            .flat_map(|(time, node, counts)| {
                counts.iter().map(|(molecule, count)| TraceEntry {
                    time: *time,
                    node: *node,
                    molecule: molecule.clone(),
                    count: *count,
                })
            })
            .collect()
    }

    fn record(&self, env: &Compartment, time: Time) {
        let snapshot = env.snapshot();
        let mut snapshots = self.snapshots.lock().unwrap();
        match snapshots.last_mut() {
            Some((last_time, _, counts)) if *last_time == time => *counts = snapshot,
            _ => snapshots.push((time, env.node(), snapshot)),
        }
    }
}

impl OutputMonitor<Compartment> for TraceRecorder {
    fn initialized(&self, env: &Compartment) -> Result<(), MonitorError> {
        self.record(env, Time::ZERO);

        Ok(())
    }

    fn step_done(
        &self,
        env: &Compartment,
        _reaction: Option<&ReactionHandle<Compartment>>,
        time: Time,
        _step: u64,
    ) -> Result<(), MonitorError> {
        self.record(env, time);

        Ok(())
    }
}

impl fmt::Debug for TraceRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TraceRecorder ({} instants)",
            self.snapshots.lock().unwrap().len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_observation_of_an_instant_wins() {
        let compartment = Compartment::new(NodeId(3)).with_molecule("A", 1);
        let recorder = TraceRecorder::new();

        recorder.initialized(&compartment).unwrap();
        recorder.record(&compartment, Time::from_secs(1.0));
        let compartment = compartment.with_molecule("A", 2);
        recorder.record(&compartment, Time::from_secs(1.0));

        let trace = recorder.trace();
        assert_eq!(trace.len(), 2);
        assert_eq!(trace[1].time, Time::from_secs(1.0));
        assert_eq!(trace[1].count, 2);
        assert_eq!(trace[1].node, NodeId(3));
    }
}
