//! Sequential and batch engines must produce the same trace.

use std::sync::Arc;

use tausim::simulation::{BatchConfig, OutputReplayStrategy};
use tausim::time::Time;
use tausim_util::helper_models::{ChemicalEquation, Compartment};
use tausim_util::trace::{TraceEntry, TraceRecorder};

use super::{compartment, spawn_with, Flavor, FLAVORS};

const END_TIME: f64 = 20.0;

fn molecules(names: &[&str]) -> Compartment {
    names.iter().fold(compartment(), |c, &name| {
        c.with_molecule(name, if name == "A" { 100 } else { 0 })
    })
}

fn conversion(from: &str, to: &str) -> ChemicalEquation {
    ChemicalEquation::new(1.0).consumes(from, 1).produces(to, 1)
}

fn chain() -> Compartment {
    let c = molecules(&["A", "B", "C"]);
    c.add_reaction(conversion("A", "B")).unwrap();
    c.add_reaction(conversion("B", "C")).unwrap();
    c
}

fn branching() -> Compartment {
    let c = molecules(&["A", "B", "C"]);
    c.add_reaction(conversion("A", "B")).unwrap();
    c.add_reaction(conversion("A", "C")).unwrap();
    c
}

fn feedback_loop() -> Compartment {
    let c = molecules(&["A", "B"]);
    c.add_reaction(conversion("A", "B")).unwrap();
    c.add_reaction(conversion("B", "A")).unwrap();
    c
}

/// Runs the model up to `END_TIME` and returns the trace strictly before
/// that time, which both engines have fully processed.
fn trace(model: fn() -> Compartment, flavor: Flavor, config: BatchConfig) -> Vec<TraceEntry> {
    let recorder = Arc::new(TraceRecorder::new());
    let (handle, simulation) = spawn_with(Arc::new(model()), flavor, config, |handle| {
        handle.add_output_monitor(recorder.clone());
    });

    let paused = handle.go_to_time(Time::from_secs(END_TIME));
    handle.play().wait().unwrap();
    paused.wait().unwrap();
    handle.terminate().wait().unwrap();
    simulation.join().unwrap().unwrap();

    recorder
        .trace()
        .into_iter()
        .filter(|entry| entry.time < Time::from_secs(END_TIME))
        .collect()
}

fn assert_equivalent(model: fn() -> Compartment) {
    let reference = trace(model, Flavor::Sequential, BatchConfig::default());
    // One entry per molecule and per instant, starting at zero.
    assert_eq!(reference.len() % END_TIME as usize, 0);
    assert!(reference.len() >= 2 * END_TIME as usize);

    for output_replay in [OutputReplayStrategy::Reply, OutputReplayStrategy::Aggregate] {
        let config = BatchConfig::default()
            .with_workers(4)
            .with_output_replay(output_replay);
        assert_eq!(trace(model, Flavor::Batch, config), reference);
    }
}

#[test]
fn chain_traces_match() {
    assert_equivalent(chain);
}

#[test]
fn branching_traces_match() {
    assert_equivalent(branching);
}

#[test]
fn feedback_loop_traces_match() {
    assert_equivalent(feedback_loop);
}

#[test]
fn chain_trace_is_as_expected() {
    let trace = trace(chain, Flavor::Sequential, BatchConfig::default());
    let at = |time: f64, molecule: &str| {
        trace
            .iter()
            .find(|e| e.time == Time::from_secs(time) && &*e.molecule == molecule)
            .map(|e| e.count)
    };

    assert_eq!(at(0.0, "A"), Some(100));
    assert_eq!(at(1.0, "A"), Some(99));
    assert_eq!(at(1.0, "B"), Some(1));
    assert_eq!(at(1.0, "C"), Some(0));
    assert_eq!(at(5.0, "A"), Some(95));
    assert_eq!(at(5.0, "B"), Some(1));
    assert_eq!(at(5.0, "C"), Some(4));
}

#[test]
fn initial_state_is_recorded() {
    for flavor in FLAVORS {
        let trace = trace(chain, flavor, BatchConfig::default());
        let initial: Vec<_> = trace
            .iter()
            .take_while(|e| e.time == Time::ZERO)
            .map(|e| (&*e.molecule, e.count))
            .collect();

        assert_eq!(initial, [("A", 100), ("B", 0), ("C", 0)], "{flavor:?}");
    }
}
