use std::fmt;
use std::sync::Arc;

use super::OutputMonitor;

/// Identifier of an output monitor attached to an engine.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MonitorId(u64);

/// The output monitors attached to an engine, in attachment order.
///
/// The registry is closed when the engine stops; monitors added afterwards
/// are dropped right away.
pub(crate) struct MonitorRegistry<E> {
    monitors: Vec<(MonitorId, Arc<dyn OutputMonitor<E>>)>,
    next_id: u64,
    is_closed: bool,
}

impl<E> MonitorRegistry<E> {
    pub(crate) fn new() -> Self {
        Self {
            monitors: Vec::new(),
            next_id: 0,
            is_closed: false,
        }
    }

    /// Adds a monitor to the registry and returns its identifier.
    pub(crate) fn add(&mut self, monitor: Arc<dyn OutputMonitor<E>>) -> MonitorId {
        self.add_with(|_| monitor)
            .unwrap_or_else(|| self.fresh_id())
    }

    /// Adds the monitor built by `make_monitor` from its identifier.
    ///
    /// Returns `None` without calling `make_monitor` if the registry is
    /// closed.
    pub(crate) fn add_with(
        &mut self,
        make_monitor: impl FnOnce(MonitorId) -> Arc<dyn OutputMonitor<E>>,
    ) -> Option<MonitorId> {
        if self.is_closed {
            return None;
        }
        let id = self.fresh_id();
        self.monitors.push((id, make_monitor(id)));

        Some(id)
    }

    /// Removes a monitor, returning `true` if it was in the registry.
    pub(crate) fn remove(&mut self, id: MonitorId) -> bool {
        match self.monitors.iter().position(|(monitor_id, _)| *monitor_id == id) {
            Some(pos) => {
                self.monitors.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Returns the monitors currently in the registry.
    ///
    /// Monitors are notified from a snapshot so that they can add or remove
    /// monitors, including themselves, while being notified.
    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn OutputMonitor<E>>> {
        self.monitors
            .iter()
            .map(|(_, monitor)| monitor.clone())
            .collect()
    }

    /// Drops all monitors and rejects further additions.
    pub(crate) fn close(&mut self) {
        self.is_closed = true;
        self.monitors.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.monitors.len()
    }

    fn fresh_id(&mut self) -> MonitorId {
        let id = MonitorId(self.next_id);
        self.next_id += 1;

        id
    }
}

impl<E> fmt::Debug for MonitorRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "MonitorRegistry ({} monitors)", self.monitors.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Silent;

    impl OutputMonitor<()> for Silent {}

    #[test]
    fn monitors_are_kept_in_attachment_order() {
        let mut registry = MonitorRegistry::<()>::new();
        let a: Arc<dyn OutputMonitor<()>> = Arc::new(Silent);
        let b: Arc<dyn OutputMonitor<()>> = Arc::new(Silent);
        let id_a = registry.add(a.clone());
        let id_b = registry.add(b.clone());
        assert_ne!(id_a, id_b);

        let snapshot = registry.snapshot();
        assert!(Arc::ptr_eq(&snapshot[0], &a));
        assert!(Arc::ptr_eq(&snapshot[1], &b));

        assert!(registry.remove(id_a));
        assert!(!registry.remove(id_a));
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&registry.snapshot()[0], &b));
    }

    #[test]
    fn closed_registry_rejects_monitors() {
        let mut registry = MonitorRegistry::<()>::new();
        registry.add(Arc::new(Silent));
        registry.close();
        assert_eq!(registry.len(), 0);

        let id = registry.add(Arc::new(Silent));
        assert_eq!(registry.len(), 0);
        assert!(!registry.remove(id));
        assert!(registry.add_with(|_| Arc::new(Silent)).is_none());
    }
}
