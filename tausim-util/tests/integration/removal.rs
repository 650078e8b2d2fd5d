//! Structural changes of a running simulation.

use std::sync::{Arc, Mutex};

use tausim::model::{Context, Dependency, NodeId, Reaction, ReactionError, ReactionId};
use tausim::simulation::{BatchConfig, Status};
use tausim::time::Time;
use tausim_util::helper_models::{ChemicalEquation, Compartment};

use super::{compartment, spawn, FLAVORS};

/// A reaction removing another reaction on its first execution.
struct Remover {
    id: ReactionId,
    node: NodeId,
    target: ReactionId,
    tau: Mutex<Time>,
}

impl Reaction<Compartment> for Remover {
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
        true
    }
    fn execute(&self, env: &Compartment) -> Result<(), ReactionError> {
        env.remove_reaction(self.target)?;
        Ok(())
    }
    fn update(&self, _current_time: Time, was_executed: bool, _env: &Compartment) {
        if was_executed {
            *self.tau.lock().unwrap() = Time::INFINITY;
        }
    }
    fn input_context(&self) -> Context {
        Context::Local
    }
    fn output_context(&self) -> Context {
        Context::Local
    }
    fn inbound_dependencies(&self) -> &[Dependency] {
        &[]
    }
    fn outbound_dependencies(&self) -> &[Dependency] {
        &[]
    }
}

/// A compartment whose A/B exchange never stops.
fn endless() -> Compartment {
    let env = compartment()
        .with_molecule("A", 10)
        .with_molecule("X", 1_000_000);
    env.add_reaction(ChemicalEquation::new(1.0).consumes("A", 1).produces("B", 1))
        .unwrap();
    env.add_reaction(ChemicalEquation::new(1.0).consumes("B", 1).produces("A", 1))
        .unwrap();
    env
}

#[test]
fn reactions_can_be_removed_while_running() {
    let contexts = [
        (Context::Local, Context::Local),
        (Context::Local, Context::Global),
        (Context::Global, Context::Local),
        (Context::Global, Context::Global),
    ];

    for flavor in FLAVORS {
        for (input, output) in contexts {
            let env = endless();
            let removed = env
                .add_reaction(
                    ChemicalEquation::new(2.0)
                        .consumes("X", 1)
                        .produces("Y", 1)
                        .with_contexts(input, output),
                )
                .unwrap();
            let env = Arc::new(env);
            let (handle, simulation) = spawn(env.clone(), flavor, BatchConfig::default());

            let paused = handle.go_to_time(Time::from_secs(5.0));
            handle.play().wait().unwrap();
            paused.wait().unwrap();
            assert!(env.count("Y") > 0);

            handle.play().wait().unwrap();
            assert_eq!(env.remove_reaction(removed.id()), Ok(true));
            let paused = handle.go_to_step(handle.step() + 1);
            assert_eq!(paused.wait(), Ok(Status::Paused));

            let y = env.count("Y");
            let paused = handle.go_to_time(handle.time() + 10.0);
            handle.play().wait().unwrap();
            paused.wait().unwrap();
            assert_eq!(env.count("Y"), y, "{flavor:?} {input:?}/{output:?}");

            handle.terminate().wait().unwrap();
            assert!(simulation.join().unwrap().is_ok());
            assert!(handle.error().is_none());
        }
    }
}

#[test]
fn co_batched_reaction_is_removed_after_the_batch() {
    for flavor in FLAVORS {
        let env = endless().with_molecule("C", 100);
        let victim = env
            .add_reaction(ChemicalEquation::new(1.0).consumes("C", 1).produces("D", 1))
            .unwrap();
        env.insert_reaction(Arc::new(Remover {
            id: ReactionId::fresh(),
            node: env.node(),
            target: victim.id(),
            tau: Mutex::new(Time::from_secs(1.0)),
        }))
        .unwrap();
        let env = Arc::new(env);
        let (handle, simulation) = spawn(env.clone(), flavor, BatchConfig::default());

        let paused = handle.go_to_time(Time::from_secs(5.0));
        handle.play().wait().unwrap();
        paused.wait().unwrap();

        // Executed once, alongside the remover.
        assert_eq!(env.count("C"), 99, "{flavor:?}");
        assert_eq!(env.count("D"), 1, "{flavor:?}");

        handle.terminate().wait().unwrap();
        assert!(simulation.join().unwrap().is_ok());
        assert!(handle.error().is_none());
    }
}

#[test]
fn out_of_band_reschedule_is_applied() {
    for flavor in FLAVORS {
        let env = compartment().with_molecule("A", 100);
        let reaction = env
            .add_reaction(ChemicalEquation::new(1.0).consumes("A", 1).produces("B", 1))
            .unwrap();
        let env = Arc::new(env);
        let (handle, simulation) = spawn(env.clone(), flavor, BatchConfig::default());

        let paused = handle.go_to_time(Time::from_secs(2.0));
        handle.play().wait().unwrap();
        paused.wait().unwrap();
        assert_eq!(env.count("B"), 2);

        reaction.reschedule(Time::from_secs(10.0));
        let paused = handle.go_to_time(Time::from_secs(5.0));
        handle.play().wait().unwrap();
        paused.wait().unwrap();

        assert_eq!(handle.time(), Time::from_secs(10.0));
        assert_eq!(env.count("B"), 3);

        handle.terminate().wait().unwrap();
        assert!(simulation.join().unwrap().is_ok());
    }
}
