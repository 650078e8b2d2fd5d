// Integration tests driving engines on their own thread.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tausim::model::NodeId;
use tausim::simulation::{BatchConfig, BatchEngine, Engine, EngineError, SimulationHandle};
use tausim_util::helper_models::Compartment;

mod removal;
mod status;
mod trace_equivalence;

/// Engine flavors under test.
#[derive(Copy, Clone, Debug)]
enum Flavor {
    Sequential,
    Batch,
}

const FLAVORS: [Flavor; 2] = [Flavor::Sequential, Flavor::Batch];

type Simulation = JoinHandle<Result<(), Arc<EngineError>>>;

/// Installs a log subscriber when `RUST_LOG` is set.
fn init_logging() {
    if std::env::var_os("RUST_LOG").is_some() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}

/// Starts an engine on a dedicated thread.
fn spawn(
    env: Arc<Compartment>,
    flavor: Flavor,
    config: BatchConfig,
) -> (SimulationHandle<Compartment>, Simulation) {
    spawn_with(env, flavor, config, |_| {})
}

/// Starts an engine on a dedicated thread after `setup` has been called
/// with its handle, so that monitors attached there observe initialization.
fn spawn_with(
    env: Arc<Compartment>,
    flavor: Flavor,
    config: BatchConfig,
    setup: impl FnOnce(&SimulationHandle<Compartment>),
) -> (SimulationHandle<Compartment>, Simulation) {
    init_logging();

    match flavor {
        Flavor::Sequential => {
            let mut engine = Engine::new(env).unwrap();
            let handle = engine.handle();
            setup(&handle);
            (handle, thread::spawn(move || engine.run()))
        }
        Flavor::Batch => {
            let mut engine = BatchEngine::new(env, config).unwrap();
            let handle = engine.handle();
            setup(&handle);
            (handle, thread::spawn(move || engine.run()))
        }
    }
}

fn compartment() -> Compartment {
    Compartment::new(NodeId(0))
}
