//! Debugger - client side of a remote debug connection
//!
//! Owns the breakpoint manager, process state and address translation of one
//! debug session and dispatches replies from the debug client to listeners.
//! Packet framing is handled by the transport; replies arrive here already
//! decoded.

use crate::core::listeners::ListenerRegistry;
use crate::core::process::TargetProcess;
use crate::core::translator::AddressTranslator;
use crate::debug::types::{BreakpointAddress, BreakpointType, EchoBreakpointHit, RelocatedAddress};
use crate::debug::{
    BreakpointManager, BreakpointStore, DebugConnection, DebugEventListener, ProcessManager,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Debugger-specific errors
#[derive(Error, Debug)]
pub enum DebugError {
    #[error("Debug client is not connected")]
    NotConnected,

    #[error("Not attached to a target process")]
    NotAttached,

    #[error("Module {name} is not loaded")]
    UnknownModule { name: String },

    #[error("Address {address} lies outside the target address space")]
    AddressOutOfRange { address: BreakpointAddress },
}

/// Main debugger interface
pub struct Debugger {
    /// Whether the debug client is reachable
    connected: AtomicBool,

    /// Module layout of the target
    translator: RwLock<AddressTranslator>,

    breakpoints: Arc<BreakpointStore>,

    process: Arc<TargetProcess>,

    /// Receivers of debug client replies
    listeners: ListenerRegistry<dyn DebugEventListener>,
}

impl Debugger {
    /// Create a new debugger instance
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            translator: RwLock::new(AddressTranslator::new()),
            breakpoints: Arc::new(BreakpointStore::new()),
            process: Arc::new(TargetProcess::new()),
            listeners: ListenerRegistry::new(),
        }
    }

    /// Mark the debug client as reachable
    pub fn connect(&self) {
        if !self.connected.swap(true, Ordering::SeqCst) {
            log::info!("Debug client connected");
        }
    }

    /// Shut down the connection, detaching from the target first
    pub fn close(&self) {
        if self.process.is_attached() {
            self.release_target();
        }
        if self.connected.swap(false, Ordering::SeqCst) {
            log::info!("Debug client disconnected");
        }
    }

    /// Attach to the target process
    pub fn attach(&self) -> Result<(), DebugError> {
        if !self.is_connected() {
            return Err(DebugError::NotConnected);
        }
        self.process.set_attached(true);
        Ok(())
    }

    /// Detach from the target process
    pub fn detach(&self) -> Result<(), DebugError> {
        if !self.process.is_attached() {
            return Err(DebugError::NotAttached);
        }
        self.release_target();
        Ok(())
    }

    fn release_target(&self) {
        self.process.set_attached(false);

        // Breakpoints that only live in the target disappear with it
        let echo = self.breakpoints.clear_passive(BreakpointType::Echo);
        let step = self.breakpoints.clear_passive(BreakpointType::Step);
        log::debug!("Dropped {} echo and {} step breakpoints", echo, step);
    }

    /// Register a module of the target
    pub fn add_module(&self, name: impl Into<String>, base_address: u64, size: u64) {
        self.translator.write().add_module(name, base_address, size);
    }

    /// Target address of a breakpoint address
    pub fn relocate(&self, address: &BreakpointAddress) -> Result<RelocatedAddress, DebugError> {
        let translator = self.translator.read();
        translator.relocate(address).ok_or_else(|| {
            let name = address.module().unwrap_or_default();
            if translator.modules().iter().any(|m| m.name == name) {
                DebugError::AddressOutOfRange {
                    address: address.clone(),
                }
            } else {
                DebugError::UnknownModule {
                    name: name.to_string(),
                }
            }
        })
    }

    pub fn breakpoints(&self) -> &Arc<BreakpointStore> {
        &self.breakpoints
    }

    pub fn process(&self) -> &Arc<TargetProcess> {
        &self.process
    }

    /// Dispatch an echo breakpoint reply received from the debug client
    pub fn receive_hit(&self, reply: &EchoBreakpointHit) -> Result<(), DebugError> {
        if !self.is_connected() {
            return Err(DebugError::NotConnected);
        }
        log::trace!("Echo breakpoint reply from thread {}", reply.thread_id);
        self.listeners.notify(|l| l.echo_breakpoint_hit(reply));
        Ok(())
    }
}

impl DebugConnection for Debugger {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn breakpoint_address(&self, address: RelocatedAddress) -> BreakpointAddress {
        self.translator.read().unrelocate(address)
    }

    fn breakpoint_manager(&self) -> Arc<dyn BreakpointManager> {
        self.breakpoints.clone()
    }

    fn process_manager(&self) -> Arc<dyn ProcessManager> {
        self.process.clone()
    }

    fn add_listener(&self, listener: Arc<dyn DebugEventListener>) {
        self.listeners.add(listener);
    }

    fn remove_listener(&self, listener: &Arc<dyn DebugEventListener>) {
        self.listeners.remove(listener);
    }
}

impl Default for Debugger {
    fn default() -> Self {
        Self::new()
    }
}
