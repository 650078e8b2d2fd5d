//! Example: a chain of chemical reactions driven from a controller thread.
//!
//! This example demonstrates in particular:
//!
//! * the sequential and batch engines,
//! * pausing at a given simulation time,
//! * output monitors,
//! * structural changes while the simulation is paused.
//!
//! ```text
//! ┏━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━┓
//! ┃ Compartment                       ┃
//! ┃                                   ┃
//! ┃   A ──────► B ──────► C ──────► D ┃
//! ┃      1/s       1/s       0.5/s    ┃
//! ┗━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━┛
//! ```

use std::error::Error;
use std::sync::Arc;
use std::thread;

use tausim::model::NodeId;
use tausim::simulation::{
    BatchConfig, BatchEngine, Engine, OutputReplayStrategy, SimulationHandle,
};
use tausim::time::Time;
use tausim_util::helper_models::{ChemicalEquation, Compartment};
use tausim_util::trace::TraceRecorder;

const HALFWAY: f64 = 25.0;
const END: f64 = 50.0;

fn compartment() -> Result<Compartment, Box<dyn Error>> {
    let env = Compartment::new(NodeId(0))
        .with_molecule("A", 100)
        .with_molecule("B", 0)
        .with_molecule("C", 0)
        .with_molecule("D", 0);
    env.add_reaction(ChemicalEquation::new(1.0).consumes("A", 1).produces("B", 1))?;
    env.add_reaction(ChemicalEquation::new(1.0).consumes("B", 1).produces("C", 1))?;

    Ok(env)
}

/// Runs the scenario and returns the final count of `D`.
fn control(
    env: &Compartment,
    handle: &SimulationHandle<Compartment>,
    recorder: &TraceRecorder,
) -> Result<u64, Box<dyn Error>> {
    let halfway = handle.go_to_time(Time::from_secs(HALFWAY));
    handle.play().wait()?;
    halfway.wait()?;
    println!(
        "t={}: A={} B={} C={}",
        handle.time(),
        env.count("A"),
        env.count("B"),
        env.count("C")
    );

    // Extends the chain while paused.
    env.add_reaction(ChemicalEquation::new(0.5).consumes("C", 1).produces("D", 1))?;

    let end = handle.go_to_time(Time::from_secs(END));
    handle.play().wait()?;
    end.wait()?;
    handle.terminate().wait()?;

    println!(
        "t={}: D={} ({} trace entries)",
        handle.time(),
        env.count("D"),
        recorder.trace().len()
    );

    Ok(env.count("D"))
}

fn main() -> Result<(), Box<dyn Error>> {
    // Sequential engine.
    let env = Arc::new(compartment()?);
    let mut engine = Engine::new(env.clone())?;
    let handle = engine.handle();
    let recorder = Arc::new(TraceRecorder::new());
    handle.add_output_monitor(recorder.clone());
    let simulation = thread::spawn(move || engine.run());
    let sequential = control(&env, &handle, &recorder)?;
    simulation.join().map_err(|_| "the simulation thread panicked")??;

    // Batch engine.
    let env = Arc::new(compartment()?);
    let config = BatchConfig::default().with_output_replay(OutputReplayStrategy::Aggregate);
    let mut engine = BatchEngine::new(env.clone(), config)?;
    let handle = engine.handle();
    let recorder = Arc::new(TraceRecorder::new());
    handle.add_output_monitor(recorder.clone());
    let simulation = thread::spawn(move || engine.run());
    let batch = control(&env, &handle, &recorder)?;
    simulation.join().map_err(|_| "the simulation thread panicked")??;

    assert_eq!(sequential, batch);

    Ok(())
}
