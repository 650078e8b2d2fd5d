//! Lifecycle of a running engine.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use tausim::simulation::{BatchConfig, SchedulingError, Status};
use tausim_util::helper_models::ChemicalEquation;

use super::{compartment, spawn, FLAVORS};

const LONG_TIMEOUT: Duration = Duration::from_secs(30);
const WAITERS: usize = 100;

#[test]
fn all_waiters_are_released() {
    for flavor in FLAVORS {
        let env = compartment().with_molecule("A", 10);
        env.add_reaction(ChemicalEquation::new(1.0).consumes("A", 1).produces("B", 1))
            .unwrap();
        let env = Arc::new(env);
        let (handle, simulation) = spawn(env.clone(), flavor, BatchConfig::default());

        let paused = handle.go_to_step(1);
        handle.play().wait().unwrap();
        assert_eq!(paused.wait(), Ok(Status::Paused));

        let barrier = Arc::new(Barrier::new(WAITERS + 1));
        let waiters: Vec<_> = (0..WAITERS)
            .map(|_| {
                let handle = handle.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    handle.wait_for(Status::Running, LONG_TIMEOUT)
                })
            })
            .collect();
        barrier.wait();
        // Lets the waiters block.
        thread::sleep(Duration::from_millis(100));

        // The remaining steps run to completion right away.
        handle.play().wait().unwrap();
        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), Status::Running, "{flavor:?}");
        }

        simulation.join().unwrap().unwrap();
        assert_eq!(handle.status(), Status::Terminated);
        assert_eq!(env.count("A"), 0);
        assert_eq!(env.count("B"), 10);
    }
}

#[test]
fn unreachable_status_is_not_awaited() {
    for flavor in FLAVORS {
        let (handle, simulation) = spawn(Arc::new(compartment()), flavor, BatchConfig::default());

        handle.play().wait().unwrap();
        simulation.join().unwrap().unwrap();

        let start = Instant::now();
        assert_eq!(handle.wait_for(Status::Running, LONG_TIMEOUT), Status::Terminated);
        assert_eq!(handle.wait_for(Status::Paused, LONG_TIMEOUT), Status::Terminated);
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}

#[test]
fn repeated_transitions_are_no_ops() {
    for flavor in FLAVORS {
        let env = compartment().with_molecule("A", 10);
        env.add_reaction(ChemicalEquation::new(1.0).consumes("A", 1).produces("B", 1))
            .unwrap();
        env.add_reaction(ChemicalEquation::new(1.0).consumes("B", 1).produces("A", 1))
            .unwrap();
        let (handle, simulation) = spawn(Arc::new(env), flavor, BatchConfig::default());

        let paused = handle.go_to_step(10);
        handle.play().wait().unwrap();
        assert_eq!(paused.wait(), Ok(Status::Paused));

        let step = handle.step();
        assert_eq!(handle.pause().wait(), Ok(Status::Paused));
        assert_eq!(handle.pause().wait(), Ok(Status::Paused));
        assert_eq!(handle.status(), Status::Paused);
        assert_eq!(handle.step(), step);

        assert_eq!(handle.play().wait(), Ok(Status::Running));
        assert_eq!(handle.play().wait(), Ok(Status::Running));
        assert_eq!(handle.status(), Status::Running);

        assert_eq!(handle.terminate().wait(), Ok(Status::Terminated));
        assert_eq!(handle.terminate().wait(), Ok(Status::Terminated));
        simulation.join().unwrap().unwrap();

        assert_eq!(handle.play().wait(), Err(SchedulingError::Terminated));
        assert_eq!(handle.go_to_step(1000).wait(), Err(SchedulingError::Terminated));
        assert!(handle.error().is_none());
    }
}
