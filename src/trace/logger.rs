//! Trace logger - records echo breakpoint hits into trace lists
//!
//! A session arms echo breakpoints at a set of addresses and appends one
//! trace event per hit to the current target list. Breakpoints leave the
//! session through three independent channels: hit exhaustion, removal by
//! another consumer of the breakpoint manager, and detaching from the target.
//! All of them, the hit path and the public calls run under one session lock.
//!
//! Removals the logger issues itself are sent to the breakpoint manager after
//! the session lock is released. The manager notifies every consumer on the
//! calling thread, and another logger may be waiting for its own lock while
//! it holds the manager's attention. The table entry is dropped under the
//! lock first, so the manager's report of that removal finds nothing to do.
//!
//! The lock is re-entrant so listeners notified under it may query the
//! logger. Session state is never borrowed across calls into collaborators
//! or listeners.

use super::error::TraceError;
use super::event::{TraceEvent, TraceEventType, TraceRegister};
use super::list::TraceList;
use super::provider::TraceListProvider;
use super::table::{EchoBreakpointTable, HitOutcome};
use crate::core::listeners::ListenerRegistry;
use crate::debug::types::{Breakpoint, BreakpointAddress, BreakpointType, EchoBreakpointHit};
use crate::debug::{
    BreakpointManager, BreakpointManagerListener, DebugConnection, DebugEventListener,
    ProcessListener, ProcessManager,
};
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

/// Notified about the progress of a trace session.
///
/// Callbacks run inline on the thread that changed the session, while the
/// session lock is held. They must not block.
pub trait TraceLoggerListener: Send + Sync {
    /// An echo breakpoint was armed
    fn added_breakpoint(&self) {}

    /// An echo breakpoint left the session
    fn removed_breakpoint(&self) {}

    /// The last echo breakpoint left the session
    fn finished(&self, _trace: &Arc<TraceList>) {}
}

#[derive(Default)]
struct Session {
    /// List that receives new events
    target: Option<Arc<TraceList>>,
    table: EchoBreakpointTable,
    /// Registered with the event sources
    active: bool,
}

struct LoggerCore {
    provider: Arc<TraceListProvider>,
    debugger: Arc<dyn DebugConnection>,
    breakpoints: Arc<dyn BreakpointManager>,
    process: Arc<dyn ProcessManager>,
    session: ReentrantMutex<RefCell<Session>>,
    listeners: ListenerRegistry<dyn TraceLoggerListener>,
    hit_listener: Arc<dyn DebugEventListener>,
    breakpoint_listener: Arc<dyn BreakpointManagerListener>,
    process_listener: Arc<dyn ProcessListener>,
}

/// Records the echo breakpoint hits of a debug session into trace lists
pub struct TraceLogger {
    core: Arc<LoggerCore>,
}

impl TraceLogger {
    /// Create a trace logger for a debug connection
    pub fn new(provider: Arc<TraceListProvider>, debugger: Arc<dyn DebugConnection>) -> Self {
        let breakpoints = debugger.breakpoint_manager();
        let process = debugger.process_manager();

        let core = Arc::new_cyclic(|weak: &Weak<LoggerCore>| LoggerCore {
            provider,
            debugger,
            breakpoints,
            process,
            session: ReentrantMutex::new(RefCell::new(Session::default())),
            listeners: ListenerRegistry::new(),
            hit_listener: Arc::new(HitReceiver(weak.clone())),
            breakpoint_listener: Arc::new(BreakpointWatcher(weak.clone())),
            process_listener: Arc::new(ProcessWatcher(weak.clone())),
        });

        Self { core }
    }

    /// Start recording hits of the given addresses into `trace`.
    ///
    /// Addresses already occupied by another breakpoint are skipped. If the
    /// debug connection drops while the addresses are collected, nothing is
    /// armed and the call still succeeds; check `has_echo_breakpoints`.
    /// Unless a session is already active, `trace` becomes the target list
    /// even when nothing ends up armed.
    pub fn start(
        &self,
        trace: Arc<TraceList>,
        addresses: &BTreeSet<BreakpointAddress>,
        max_hits: u32,
    ) -> Result<(), TraceError> {
        self.core.start(trace, addresses, max_hits)
    }

    /// Stop the session.
    ///
    /// Returns the echo breakpoints that were still armed and had to be
    /// removed. Calling it again returns an empty set.
    pub fn stop(&self) -> BTreeSet<BreakpointAddress> {
        self.core.stop()
    }

    /// Direct new events to another list, returning the previous target
    pub fn switch_target_list(&self, trace: Arc<TraceList>) -> Option<Arc<TraceList>> {
        let guard = self.core.session.lock();
        let previous = guard.borrow_mut().target.replace(trace);
        previous
    }

    /// Number of echo breakpoints that are armed and not yet exhausted
    pub fn active_echo_breakpoint_count(&self) -> usize {
        let guard = self.core.session.lock();
        let count = guard.borrow().table.len();
        count
    }

    pub fn has_echo_breakpoints(&self) -> bool {
        self.active_echo_breakpoint_count() > 0
    }

    /// Hits left before the echo breakpoint at `address` is removed
    pub fn remaining_hits(&self, address: &BreakpointAddress) -> Option<u32> {
        let guard = self.core.session.lock();
        let remaining = guard.borrow().table.remaining(address);
        remaining
    }

    /// Current target list
    pub fn trace(&self) -> Option<Arc<TraceList>> {
        let guard = self.core.session.lock();
        let target = guard.borrow().target.clone();
        target
    }

    pub fn trace_provider(&self) -> &Arc<TraceListProvider> {
        &self.core.provider
    }

    pub fn add_listener(&self, listener: Arc<dyn TraceLoggerListener>) {
        self.core.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn TraceLoggerListener>) {
        self.core.listeners.remove(listener);
    }
}

impl Drop for TraceLogger {
    fn drop(&mut self) {
        let removed = self.core.stop();
        if !removed.is_empty() {
            log::debug!("Removed {} echo breakpoints of a dropped trace logger", removed.len());
        }
    }
}

impl LoggerCore {
    fn register(&self) {
        self.debugger.add_listener(self.hit_listener.clone());
        self.breakpoints.add_listener(self.breakpoint_listener.clone());
        self.process.add_listener(self.process_listener.clone());
    }

    fn deregister(&self) {
        self.debugger.remove_listener(&self.hit_listener);
        self.breakpoints.remove_listener(&self.breakpoint_listener);
        self.process.remove_listener(&self.process_listener);
    }

    fn start(
        &self,
        trace: Arc<TraceList>,
        addresses: &BTreeSet<BreakpointAddress>,
        max_hits: u32,
    ) -> Result<(), TraceError> {
        if addresses.is_empty() {
            return Err(TraceError::InvalidArgument("address list can not be empty"));
        }
        if max_hits == 0 {
            return Err(TraceError::InvalidArgument("maximum hits must be positive"));
        }

        let guard = self.session.lock();
        {
            let mut session = guard.borrow_mut();
            if session.active {
                let list = session.target.as_ref().map_or(0, |t| t.id());
                return Err(TraceError::SessionActive { list });
            }
            session.target = Some(trace.clone());
        }

        log::info!("Starting new trace list with name {}", trace.name());

        let mut collected = BTreeSet::new();
        for address in addresses {
            if self.breakpoints.is_blocked(address) {
                log::debug!("Address {} is blocked by another breakpoint", address);
                continue;
            }
            if !self.debugger.is_connected() {
                log::warn!(
                    "Debug connection lost while starting trace list {}",
                    trace.name()
                );
                return Ok(());
            }
            collected.insert(address.clone());
        }

        if collected.is_empty() {
            log::info!("All {} trace addresses are blocked", addresses.len());
            return Ok(());
        }

        // Listen before arming so no hit or removal of a fresh breakpoint is
        // lost. Notifications from other threads wait on the session lock.
        self.register();

        let armed = self
            .breakpoints
            .add_breakpoints(BreakpointType::Echo, &collected);
        for address in collected.difference(&armed) {
            log::warn!("Echo breakpoint at {} was taken by another consumer", address);
        }

        {
            let mut session = guard.borrow_mut();
            for address in &armed {
                session.table.arm(address.clone(), max_hits);
            }
            session.active = !armed.is_empty();
        }

        if armed.is_empty() {
            self.deregister();
            return Ok(());
        }

        log::debug!("Armed {} echo breakpoints", armed.len());
        for _ in &armed {
            self.listeners.notify(|l| l.added_breakpoint());
        }
        Ok(())
    }

    fn stop(&self) -> BTreeSet<BreakpointAddress> {
        let armed = {
            let guard = self.session.lock();
            let (armed, target) = {
                let mut session = guard.borrow_mut();
                if session.table.is_empty() {
                    return BTreeSet::new();
                }
                session.active = false;
                (session.table.drain(), session.target.clone())
            };

            // No more events please
            self.deregister();

            for _ in &armed {
                self.listeners.notify(|l| l.removed_breakpoint());
            }
            if let Some(target) = target {
                log::info!(
                    "Finalizing trace list {} with {} events",
                    target.name(),
                    target.event_count()
                );
                self.listeners.notify(|l| l.finished(&target));
            }
            armed
        };

        self.breakpoints
            .remove_breakpoints(BreakpointType::Echo, &armed);
        armed
    }

    fn handle_hit(&self, reply: &EchoBreakpointHit) {
        let exhausted = {
            let guard = self.session.lock();

            let Some((thread, pc)) = reply.program_counter() else {
                log::warn!(
                    "Echo breakpoint reply from thread {} carries no program counter",
                    reply.thread_id
                );
                return;
            };
            let address = self.debugger.breakpoint_address(pc);

            let target = {
                let session = guard.borrow();
                if !session.table.contains(&address) {
                    // Raced with a removal that was already processed
                    log::info!("Unknown echo breakpoint event for address {}", address);
                    return;
                }
                session.target.clone()
            };

            if let Some(target) = target {
                log::info!(
                    "Adding echo breakpoint event {} to trace list {}",
                    address,
                    target.name()
                );
                let registers = thread
                    .registers
                    .iter()
                    .map(|r| TraceRegister::new(&r.name, r.value, &r.memory))
                    .collect();
                let event = TraceEvent::new(
                    reply.thread_id,
                    address.clone(),
                    TraceEventType::Echo,
                    registers,
                );
                if let Err(e) = target.add_event(Arc::new(event)) {
                    log::error!("Failed to record trace event: {}", e);
                }
            }

            let outcome = guard.borrow_mut().table.record_hit(&address);
            match outcome {
                HitOutcome::Remaining(left) => {
                    log::trace!("Echo breakpoint at {} has {} hits left", address, left);
                    return;
                }
                HitOutcome::Untracked => return,
                HitOutcome::Exhausted => {}
            }

            log::debug!("Echo breakpoint at {} exhausted", address);
            self.listeners.notify(|l| l.removed_breakpoint());
            self.finish_if_drained(&guard);
            address
        };

        self.breakpoints
            .remove_breakpoints(BreakpointType::Echo, &BTreeSet::from([exhausted]));
    }

    fn handle_removed(&self, breakpoints: &[Breakpoint]) {
        let guard = self.session.lock();
        let removed = {
            let mut session = guard.borrow_mut();
            breakpoints
                .iter()
                .filter(|bp| bp.kind() == BreakpointType::Echo)
                .filter(|bp| session.table.remove(bp.address()))
                .count()
        };

        if removed == 0 {
            return;
        }

        log::info!(
            "Removed {} echo breakpoints from the breakpoint manager",
            removed
        );
        for _ in 0..removed {
            self.listeners.notify(|l| l.removed_breakpoint());
        }
        self.finish_if_drained(&guard);
    }

    fn handle_detached(&self) {
        let guard = self.session.lock();
        let target = {
            let mut session = guard.borrow_mut();
            if !session.active {
                return;
            }
            session.active = false;
            let dropped = session.table.drain();
            log::info!(
                "Target detached, dropping {} echo breakpoints",
                dropped.len()
            );
            session.target.clone()
        };

        // No more events please
        self.deregister();
        if let Some(target) = target {
            self.listeners.notify(|l| l.finished(&target));
        }
    }

    /// End the session once its last echo breakpoint is gone
    fn finish_if_drained(&self, session: &RefCell<Session>) {
        let target = {
            let mut session = session.borrow_mut();
            if !session.active || !session.table.is_empty() {
                return;
            }
            session.active = false;
            session.target.clone()
        };

        self.deregister();
        if let Some(target) = target {
            log::info!(
                "Trace list {} finished with {} events",
                target.name(),
                target.event_count()
            );
            self.listeners.notify(|l| l.finished(&target));
        }
    }
}

struct HitReceiver(Weak<LoggerCore>);

impl DebugEventListener for HitReceiver {
    fn echo_breakpoint_hit(&self, reply: &EchoBreakpointHit) {
        if let Some(core) = self.0.upgrade() {
            core.handle_hit(reply);
        }
    }
}

struct BreakpointWatcher(Weak<LoggerCore>);

impl BreakpointManagerListener for BreakpointWatcher {
    fn breakpoints_removed(&self, breakpoints: &[Breakpoint]) {
        if let Some(core) = self.0.upgrade() {
            core.handle_removed(breakpoints);
        }
    }
}

struct ProcessWatcher(Weak<LoggerCore>);

impl ProcessListener for ProcessWatcher {
    fn detached(&self) {
        if let Some(core) = self.0.upgrade() {
            core.handle_detached();
        }
    }
}

#[cfg(test)]
mod tests;
