use std::fmt;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};

use super::{ExecutionError, KernelOps};

/// A deferred action executed by the simulation thread between two steps.
///
/// Returning an error terminates the engine.
pub type Command<E> =
    Box<dyn FnOnce(&mut dyn KernelOps<E>) -> Result<(), ExecutionError> + Send + 'static>;

type SharedSender<E> = Arc<Mutex<Option<Sender<Command<E>>>>>;

/// An unbounded FIFO of commands with a single consumer, the simulation
/// thread.
///
/// Producers push commands through [`CommandQueueWriter`]s. Once the queue is
/// closed, writers reject new commands and the commands still in the queue
/// are dropped, which cancels any future waiting for their completion.
pub(crate) struct CommandQueue<E> {
    sender: SharedSender<E>,
    receiver: Receiver<Command<E>>,
}

impl<E> CommandQueue<E> {
    /// Creates an open queue.
    pub(crate) fn new() -> Self {
        let (sender, receiver) = channel();

        Self {
            sender: Arc::new(Mutex::new(Some(sender))),
            receiver,
        }
    }

    /// Returns a producer handle.
    pub(crate) fn writer(&self) -> CommandQueueWriter<E> {
        CommandQueueWriter {
            sender: self.sender.clone(),
        }
    }

    /// Blocks until a command is available.
    ///
    /// Returns `None` if the queue is closed and empty.
    pub(crate) fn take(&self) -> Option<Command<E>> {
        self.receiver.recv().ok()
    }

    /// Returns the next command if one is available.
    pub(crate) fn try_take(&self) -> Option<Command<E>> {
        self.receiver.try_recv().ok()
    }

    /// Closes the queue and drops all pending commands, returning their
    /// number.
    pub(crate) fn close(&self) -> usize {
        // No command can be pushed once the sender is gone, so draining after
        // this point is exhaustive.
        self.sender.lock().unwrap().take();

        self.receiver.try_iter().count()
    }
}

impl<E> fmt::Debug for CommandQueue<E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CommandQueue").finish_non_exhaustive()
    }
}

/// A producer handle of a `CommandQueue`.
pub(crate) struct CommandQueueWriter<E> {
    sender: SharedSender<E>,
}

impl<E> CommandQueueWriter<E> {
    /// Pushes a command onto the queue.
    ///
    /// The command is handed back if the queue is closed.
    pub(crate) fn write(&self, command: Command<E>) -> Result<(), Command<E>> {
        match &*self.sender.lock().unwrap() {
            Some(sender) => sender.send(command).map_err(|e| e.0),
            None => Err(command),
        }
    }
}

impl<E> Clone for CommandQueueWriter<E> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<E> fmt::Debug for CommandQueueWriter<E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CommandQueueWriter")
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn counting_command(counter: &Arc<AtomicUsize>) -> Command<()> {
        let counter = counter.clone();
        Box::new(move |_: &mut dyn KernelOps<()>| {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
    }

    #[test]
    fn pending_commands_can_be_drained_without_blocking() {
        let queue = CommandQueue::<()>::new();
        let writer = queue.writer();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            assert!(writer.write(counting_command(&counter)).is_ok());
        }

        let mut taken = 0;
        while queue.try_take().is_some() {
            taken += 1;
        }
        assert_eq!(taken, 3);
        assert!(queue.try_take().is_none());
    }

    #[test]
    fn take_blocks_until_a_command_is_pushed() {
        let queue = CommandQueue::<()>::new();
        let writer = queue.writer();
        let counter = Arc::new(AtomicUsize::new(0));

        let producer = {
            let command = counting_command(&counter);
            thread::spawn(move || writer.write(command).is_ok())
        };

        assert!(queue.take().is_some());
        assert!(producer.join().unwrap());
    }

    #[test]
    fn closing_drops_pending_commands_and_rejects_new_ones() {
        let queue = CommandQueue::<()>::new();
        let writer = queue.writer();
        let counter = Arc::new(AtomicUsize::new(0));
        assert!(writer.write(counting_command(&counter)).is_ok());
        assert!(writer.write(counting_command(&counter)).is_ok());

        assert_eq!(queue.close(), 2);
        assert!(writer.write(counting_command(&counter)).is_err());
        assert!(queue.take().is_none());
        assert_eq!(counter.load(Ordering::Relaxed), 0);
    }
}
