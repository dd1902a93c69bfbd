//! Listener registry - synchronous observer dispatch
//!
//! Notifications are delivered inline on the calling thread. Every listener
//! call is wrapped with catch_unwind so a faulty listener neither stops
//! delivery to the remaining listeners nor unwinds into the notifier.

use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Set of registered listeners of type `L`
pub struct ListenerRegistry<L: ?Sized> {
    listeners: Mutex<Vec<Arc<L>>>,
}

impl<L: ?Sized> ListenerRegistry<L> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Register a listener. Registering the same listener twice is a no-op.
    pub fn add(&self, listener: Arc<L>) {
        let mut listeners = self.listeners.lock();
        if !listeners.iter().any(|l| same_listener(l, &listener)) {
            listeners.push(listener);
        }
    }

    /// Remove a listener, returns false if it was not registered
    pub fn remove(&self, listener: &Arc<L>) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|l| !same_listener(l, listener));
        listeners.len() != before
    }

    pub fn contains(&self, listener: &Arc<L>) -> bool {
        self.listeners
            .lock()
            .iter()
            .any(|l| same_listener(l, listener))
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    /// Deliver a notification to every listener.
    ///
    /// Works on a snapshot, so listeners may (de)register during delivery.
    pub fn notify<F>(&self, mut f: F)
    where
        F: FnMut(&L),
    {
        let snapshot: Vec<Arc<L>> = self.listeners.lock().clone();
        for listener in snapshot {
            let result = catch_unwind(AssertUnwindSafe(|| f(&listener)));
            if result.is_err() {
                log::error!("Listener panicked while handling a notification");
            }
        }
    }
}

impl<L: ?Sized> Default for ListenerRegistry<L> {
    fn default() -> Self {
        Self::new()
    }
}

fn same_listener<L: ?Sized>(a: &Arc<L>, b: &Arc<L>) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    trait Counter: Send + Sync {
        fn bump(&self);
    }

    struct Good(AtomicUsize);

    impl Counter for Good {
        fn bump(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Faulty;

    impl Counter for Faulty {
        fn bump(&self) {
            panic!("faulty listener");
        }
    }

    #[test]
    fn test_duplicate_registration_ignored() {
        let registry: ListenerRegistry<dyn Counter> = ListenerRegistry::new();
        let good: Arc<dyn Counter> = Arc::new(Good(AtomicUsize::new(0)));
        registry.add(good.clone());
        registry.add(good.clone());
        assert_eq!(registry.len(), 1);
        assert!(registry.remove(&good));
        assert!(!registry.remove(&good));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_faulty_listener_is_isolated() {
        let registry: ListenerRegistry<dyn Counter> = ListenerRegistry::new();
        let good = Arc::new(Good(AtomicUsize::new(0)));
        registry.add(Arc::new(Faulty));
        registry.add(good.clone());

        registry.notify(|l| l.bump());
        registry.notify(|l| l.bump());

        assert_eq!(good.0.load(Ordering::SeqCst), 2);
    }
}
