//! Breakpoint management
//!
//! Keeps one breakpoint set per type and enforces the type hierarchy:
//! a regular breakpoint replaces step and echo breakpoints at the same
//! address, a step breakpoint replaces echo breakpoints and yields to regular
//! ones, and an echo breakpoint yields to everything.

use super::types::{Breakpoint, BreakpointAddress, BreakpointType};
use crate::core::listeners::ListenerRegistry;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Notified about changes in a breakpoint manager.
///
/// Notifications are delivered on the thread that changed the manager, after
/// the manager released its internal lock.
pub trait BreakpointManagerListener: Send + Sync {
    fn breakpoints_added(&self, _breakpoints: &[Breakpoint]) {}

    fn breakpoints_removed(&self, _breakpoints: &[Breakpoint]) {}
}

/// Breakpoint manager shared by every consumer of a debug connection
pub trait BreakpointManager: Send + Sync {
    /// Add breakpoints of the given type.
    ///
    /// Returns the addresses that were actually set. Addresses suppressed by
    /// the type hierarchy or already present are left out.
    fn add_breakpoints(
        &self,
        kind: BreakpointType,
        addresses: &BTreeSet<BreakpointAddress>,
    ) -> BTreeSet<BreakpointAddress>;

    /// Remove breakpoints of the given type. Unknown addresses are ignored.
    fn remove_breakpoints(&self, kind: BreakpointType, addresses: &BTreeSet<BreakpointAddress>);

    fn has_breakpoint(&self, kind: BreakpointType, address: &BreakpointAddress) -> bool;

    /// Check if an echo breakpoint can not be set at the address
    fn is_blocked(&self, address: &BreakpointAddress) -> bool {
        [
            BreakpointType::Regular,
            BreakpointType::Step,
            BreakpointType::Echo,
        ]
        .into_iter()
        .any(|kind| self.has_breakpoint(kind, address))
    }

    fn add_listener(&self, listener: Arc<dyn BreakpointManagerListener>);

    fn remove_listener(&self, listener: &Arc<dyn BreakpointManagerListener>);
}

#[derive(Debug, Default)]
struct Storage {
    regular: BTreeSet<BreakpointAddress>,
    step: BTreeSet<BreakpointAddress>,
    echo: BTreeSet<BreakpointAddress>,
}

impl Storage {
    fn set(&self, kind: BreakpointType) -> &BTreeSet<BreakpointAddress> {
        match kind {
            BreakpointType::Regular => &self.regular,
            BreakpointType::Step => &self.step,
            BreakpointType::Echo => &self.echo,
        }
    }

    fn set_mut(&mut self, kind: BreakpointType) -> &mut BTreeSet<BreakpointAddress> {
        match kind {
            BreakpointType::Regular => &mut self.regular,
            BreakpointType::Step => &mut self.step,
            BreakpointType::Echo => &mut self.echo,
        }
    }

    /// Remove the given addresses from one set, returning what was present
    fn take(
        &mut self,
        kind: BreakpointType,
        addresses: &BTreeSet<BreakpointAddress>,
    ) -> Vec<Breakpoint> {
        let set = self.set_mut(kind);
        addresses
            .iter()
            .filter(|address| set.remove(*address))
            .map(|address| Breakpoint::new(kind, address.clone()))
            .collect()
    }
}

/// In-process breakpoint manager
pub struct BreakpointStore {
    storage: Mutex<Storage>,
    listeners: ListenerRegistry<dyn BreakpointManagerListener>,
}

impl BreakpointStore {
    pub fn new() -> Self {
        Self {
            storage: Mutex::new(Storage::default()),
            listeners: ListenerRegistry::new(),
        }
    }

    /// Number of breakpoints of the given type
    pub fn count(&self, kind: BreakpointType) -> usize {
        self.storage.lock().set(kind).len()
    }

    /// Addresses of all breakpoints of the given type
    pub fn addresses(&self, kind: BreakpointType) -> Vec<BreakpointAddress> {
        self.storage.lock().set(kind).iter().cloned().collect()
    }

    /// Drop all breakpoints of a type without notifying listeners.
    ///
    /// Used when the target is gone and the breakpoints vanished with it.
    pub fn clear_passive(&self, kind: BreakpointType) -> usize {
        let mut storage = self.storage.lock();
        let set = storage.set_mut(kind);
        let count = set.len();
        set.clear();
        count
    }

    fn notify_removed(&self, removed: &[Breakpoint]) {
        if removed.is_empty() {
            return;
        }
        log::debug!("Removed {} breakpoints", removed.len());
        self.listeners.notify(|l| l.breakpoints_removed(removed));
    }
}

impl BreakpointManager for BreakpointStore {
    fn add_breakpoints(
        &self,
        kind: BreakpointType,
        addresses: &BTreeSet<BreakpointAddress>,
    ) -> BTreeSet<BreakpointAddress> {
        if addresses.is_empty() {
            return BTreeSet::new();
        }

        let (displaced, added) = {
            let mut storage = self.storage.lock();
            let candidates: BTreeSet<BreakpointAddress> =
                addresses.difference(storage.set(kind)).cloned().collect();

            let mut displaced = Vec::new();
            let added: BTreeSet<BreakpointAddress> = match kind {
                BreakpointType::Regular => {
                    displaced.extend(storage.take(BreakpointType::Step, addresses));
                    displaced.extend(storage.take(BreakpointType::Echo, addresses));
                    candidates
                }
                BreakpointType::Step => {
                    displaced.extend(storage.take(BreakpointType::Echo, addresses));
                    candidates
                        .into_iter()
                        .filter(|a| !storage.regular.contains(a))
                        .collect()
                }
                BreakpointType::Echo => candidates
                    .into_iter()
                    .filter(|a| !storage.regular.contains(a) && !storage.step.contains(a))
                    .collect(),
            };

            storage.set_mut(kind).extend(added.iter().cloned());
            (displaced, added)
        };

        self.notify_removed(&displaced);

        if !added.is_empty() {
            log::debug!("Added {} {} breakpoints", added.len(), kind);
            let breakpoints: Vec<Breakpoint> = added
                .iter()
                .map(|address| Breakpoint::new(kind, address.clone()))
                .collect();
            self.listeners.notify(|l| l.breakpoints_added(&breakpoints));
        }

        added
    }

    fn remove_breakpoints(&self, kind: BreakpointType, addresses: &BTreeSet<BreakpointAddress>) {
        if addresses.is_empty() {
            return;
        }
        let removed = self.storage.lock().take(kind, addresses);
        self.notify_removed(&removed);
    }

    fn has_breakpoint(&self, kind: BreakpointType, address: &BreakpointAddress) -> bool {
        self.storage.lock().set(kind).contains(address)
    }

    fn add_listener(&self, listener: Arc<dyn BreakpointManagerListener>) {
        self.listeners.add(listener);
    }

    fn remove_listener(&self, listener: &Arc<dyn BreakpointManagerListener>) {
        self.listeners.remove(listener);
    }
}

impl Default for BreakpointStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs(values: &[u64]) -> BTreeSet<BreakpointAddress> {
        values
            .iter()
            .map(|v| BreakpointAddress::new("target", *v))
            .collect()
    }

    #[derive(Default)]
    struct Recorder {
        removed: Mutex<Vec<Breakpoint>>,
    }

    impl BreakpointManagerListener for Recorder {
        fn breakpoints_removed(&self, breakpoints: &[Breakpoint]) {
            self.removed.lock().extend_from_slice(breakpoints);
        }
    }

    #[test]
    fn test_regular_replaces_echo() {
        let store = BreakpointStore::new();
        let recorder = Arc::new(Recorder::default());
        store.add_listener(recorder.clone());

        store.add_breakpoints(BreakpointType::Echo, &addrs(&[0x100, 0x200]));
        store.add_breakpoints(BreakpointType::Regular, &addrs(&[0x100]));

        assert_eq!(store.count(BreakpointType::Echo), 1);
        assert_eq!(store.count(BreakpointType::Regular), 1);
        let removed = recorder.removed.lock();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].kind(), BreakpointType::Echo);
        assert_eq!(removed[0].address().address(), 0x100);
    }

    #[test]
    fn test_echo_suppressed_by_existing_breakpoints() {
        let store = BreakpointStore::new();
        store.add_breakpoints(BreakpointType::Regular, &addrs(&[0x100]));
        store.add_breakpoints(BreakpointType::Echo, &addrs(&[0x200]));

        let added = store.add_breakpoints(BreakpointType::Echo, &addrs(&[0x100, 0x200, 0x300]));

        assert_eq!(added, addrs(&[0x300]));
        assert!(store.is_blocked(&BreakpointAddress::new("target", 0x100)));
        assert!(store.is_blocked(&BreakpointAddress::new("target", 0x200)));
        assert!(!store.is_blocked(&BreakpointAddress::new("target", 0x400)));
    }

    #[test]
    fn test_remove_unknown_is_silent() {
        let store = BreakpointStore::new();
        let recorder = Arc::new(Recorder::default());
        store.add_listener(recorder.clone());

        store.remove_breakpoints(BreakpointType::Echo, &addrs(&[0x100]));

        assert!(recorder.removed.lock().is_empty());
    }
}
