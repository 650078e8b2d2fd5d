use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Lifecycle status of an engine.
///
/// The status progresses monotonically from `Init` to `Terminated`, except
/// for the `Running ⇄ Paused` cycle. `Terminated` is absorbing.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Status {
    /// The engine has been created but its run loop has not started.
    Init,
    /// All reactions are scheduled; the engine waits for a command.
    Ready,
    /// The engine is executing reactions.
    Running,
    /// The engine is waiting for a command.
    Paused,
    /// The engine has stopped and cannot be restarted.
    Terminated,
}

impl Status {
    const ALL: [Status; 5] = [
        Status::Init,
        Status::Ready,
        Status::Running,
        Status::Paused,
        Status::Terminated,
    ];

    /// Returns `true` if an engine currently in status `current` may later
    /// reach this status.
    ///
    /// `Terminated` can be reached from any status, `Running` and `Paused`
    /// from any status but `Terminated`, and `Ready` from `Init`. A
    /// status is considered reachable from itself only where the
    /// corresponding transition is idempotent, which excludes `Init` and
    /// `Ready`.
    pub fn is_reachable_from(self, current: Status) -> bool {
        match (self, current) {
            (Status::Terminated, _) => true,
            (_, Status::Terminated) => false,
            (Status::Running | Status::Paused, _) => true,
            (Status::Ready, Status::Init) => true,
            _ => false,
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    fn from_index(index: u8) -> Self {
        Self::ALL[index as usize]
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Init => "init",
            Status::Ready => "ready",
            Status::Running => "running",
            Status::Paused => "paused",
            Status::Terminated => "terminated",
        };

        f.write_str(name)
    }
}

#[derive(Default)]
struct BoxState {
    /// Number of threads blocked on `reached`.
    waiting: usize,
    /// Incremented each time the waiters are released.
    generation: u64,
}

/// Wait condition for one target status.
#[derive(Default)]
struct StatusBox {
    state: Mutex<BoxState>,
    reached: Condvar,
    all_released: Condvar,
}

impl StatusBox {
    /// Wakes up all current waiters and blocks until each of them has
    /// deregistered.
    fn release_all(&self) {
        let mut state = self.state.lock().unwrap();
        state.generation = state.generation.wrapping_add(1);
        self.reached.notify_all();

        while state.waiting > 0 {
            state = self.all_released.wait(state).unwrap();
        }
    }
}

/// The authoritative engine status together with one wait condition per
/// status.
///
/// The status is only written by the simulation thread; any thread may read
/// it or wait for a specific status.
pub(crate) struct StatusBoard {
    status: AtomicU8,
    boxes: [StatusBox; 5],
}

impl StatusBoard {
    pub(crate) fn new() -> Self {
        Self {
            status: AtomicU8::new(Status::Init.index() as u8),
            boxes: Default::default(),
        }
    }

    pub(crate) fn get(&self) -> Status {
        Status::from_index(self.status.load(Ordering::SeqCst))
    }

    /// Sets the status and returns once every thread waiting for the new
    /// status, or for a status that is no longer reachable, has been
    /// released.
    ///
    /// This is not a guarded transition: callers check reachability.
    pub(crate) fn set(&self, status: Status) {
        // The status is published before the boxes are locked so that a
        // waiter either sees the new status or is registered in time to be
        // released.
        self.status.store(status.index() as u8, Ordering::SeqCst);

        for target in Status::ALL {
            if target == status || !target.is_reachable_from(status) {
                self.boxes[target.index()].release_all();
            }
        }
    }

    /// Blocks until the specified status is set, the status becomes
    /// unreachable, or the timeout elapses, and returns the status observed
    /// on wake-up.
    pub(crate) fn wait_for(&self, target: Status, timeout: Duration) -> Status {
        let status_box = &self.boxes[target.index()];
        let deadline = Instant::now().checked_add(timeout);

        let mut state = status_box.state.lock().unwrap();
        let current = self.get();
        if current == target || !target.is_reachable_from(current) {
            return current;
        }

        state.waiting += 1;
        let generation = state.generation;
        while state.generation == generation {
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    state = status_box
                        .reached
                        .wait_timeout(state, deadline - now)
                        .unwrap()
                        .0;
                }
                None => state = status_box.reached.wait(state).unwrap(),
            }
        }

        let observed = self.get();
        state.waiting -= 1;
        if state.waiting == 0 {
            status_box.all_released.notify_all();
        }

        observed
    }

    /// Number of threads currently waiting for the specified status.
    #[cfg(test)]
    pub(crate) fn waiting(&self, target: Status) -> usize {
        self.boxes[target.index()].state.lock().unwrap().waiting
    }
}

impl fmt::Debug for StatusBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusBoard")
            .field("status", &self.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::thread;

    const LONG: Duration = Duration::from_secs(30);

    fn wait_until_registered(board: &StatusBoard, target: Status, count: usize) {
        while board.waiting(target) < count {
            thread::yield_now();
        }
    }

    #[test]
    fn reachability() {
        use Status::*;

        for s in Status::ALL {
            assert!(Terminated.is_reachable_from(s));
        }
        for s in [Init, Ready, Running, Paused] {
            assert!(!s.is_reachable_from(Terminated));
        }
        for from in [Init, Ready, Running, Paused] {
            assert!(Running.is_reachable_from(from));
            assert!(Paused.is_reachable_from(from));
        }
        assert!(Ready.is_reachable_from(Init));
        assert!(!Ready.is_reachable_from(Running));
        assert!(!Init.is_reachable_from(Init));
    }

    #[test]
    fn wait_returns_immediately_when_reached_or_unreachable() {
        let board = StatusBoard::new();
        assert_eq!(board.wait_for(Status::Init, LONG), Status::Init);

        board.set(Status::Ready);
        board.set(Status::Terminated);
        let start = Instant::now();
        assert_eq!(board.wait_for(Status::Running, LONG), Status::Terminated);
        assert!(start.elapsed() < LONG);
    }

    #[test]
    fn wait_times_out_with_current_status() {
        let board = StatusBoard::new();
        board.set(Status::Ready);

        let status = board.wait_for(Status::Running, Duration::from_millis(20));
        assert_eq!(status, Status::Ready);
        assert_eq!(board.waiting(Status::Running), 0);
    }

    #[test]
    fn all_waiters_are_released() {
        const WAITERS: usize = 64;

        let board = Arc::new(StatusBoard::new());
        board.set(Status::Ready);
        board.set(Status::Paused);

        let handles: Vec<_> = (0..WAITERS)
            .map(|_| {
                let board = board.clone();
                thread::spawn(move || board.wait_for(Status::Running, LONG))
            })
            .collect();
        wait_until_registered(&board, Status::Running, WAITERS);

        board.set(Status::Running);
        // `set` only returns once every waiter has deregistered, so a fast
        // transition cannot be missed.
        assert_eq!(board.waiting(Status::Running), 0);
        board.set(Status::Terminated);

        for handle in handles {
            assert_eq!(handle.join().unwrap(), Status::Running);
        }
    }

    #[test]
    fn waiters_registered_before_start_are_kept_until_reached() {
        let board = Arc::new(StatusBoard::new());

        let waiter = {
            let board = board.clone();
            thread::spawn(move || board.wait_for(Status::Running, LONG))
        };
        wait_until_registered(&board, Status::Running, 1);

        board.set(Status::Ready);
        assert_eq!(board.waiting(Status::Running), 1);
        board.set(Status::Running);

        assert_eq!(waiter.join().unwrap(), Status::Running);
    }

    #[test]
    fn termination_releases_waiters_of_unreachable_status() {
        let board = Arc::new(StatusBoard::new());
        board.set(Status::Ready);

        let waiter = {
            let board = board.clone();
            thread::spawn(move || board.wait_for(Status::Paused, LONG))
        };
        wait_until_registered(&board, Status::Paused, 1);
        board.set(Status::Terminated);

        assert_eq!(waiter.join().unwrap(), Status::Terminated);
    }
}
