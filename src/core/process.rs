//! Process lifecycle of the debugged target

use crate::core::listeners::ListenerRegistry;
use crate::debug::{ProcessListener, ProcessManager};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Tracks whether the debugger is attached to the target process
pub struct TargetProcess {
    attached: AtomicBool,
    listeners: ListenerRegistry<dyn ProcessListener>,
}

impl TargetProcess {
    pub fn new() -> Self {
        Self {
            attached: AtomicBool::new(false),
            listeners: ListenerRegistry::new(),
        }
    }

    /// Update the attach state, notifying listeners on a change
    pub fn set_attached(&self, attached: bool) {
        if self.attached.swap(attached, Ordering::SeqCst) == attached {
            return;
        }

        if attached {
            log::info!("Attached to target process");
            self.listeners.notify(|l| l.attached());
        } else {
            log::info!("Detached from target process");
            self.listeners.notify(|l| l.detached());
        }
    }
}

impl ProcessManager for TargetProcess {
    fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    fn add_listener(&self, listener: Arc<dyn ProcessListener>) {
        self.listeners.add(listener);
    }

    fn remove_listener(&self, listener: &Arc<dyn ProcessListener>) {
        self.listeners.remove(listener);
    }
}

impl Default for TargetProcess {
    fn default() -> Self {
        Self::new()
    }
}
