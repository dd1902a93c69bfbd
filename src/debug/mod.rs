//! Debug module - collaborator interfaces of a remote debug session.
//!
//! Provides the seams the trace engine talks to:
//! - Debug connection (hit replies, connectivity, address translation)
//! - Breakpoint management
//! - Process lifecycle

pub mod breakpoints;
pub mod types;

pub use breakpoints::{BreakpointManager, BreakpointManagerListener, BreakpointStore};

use std::sync::Arc;
use types::{BreakpointAddress, EchoBreakpointHit, RelocatedAddress};

/// Receives replies sent by the debug client
pub trait DebugEventListener: Send + Sync {
    /// An echo breakpoint was reached in the target
    fn echo_breakpoint_hit(&self, reply: &EchoBreakpointHit);
}

/// Receives process lifecycle notifications
pub trait ProcessListener: Send + Sync {
    fn attached(&self) {}

    fn detached(&self) {}
}

/// Lifecycle of the debugged process
pub trait ProcessManager: Send + Sync {
    /// Check if currently attached
    fn is_attached(&self) -> bool;

    fn add_listener(&self, listener: Arc<dyn ProcessListener>);

    fn remove_listener(&self, listener: &Arc<dyn ProcessListener>);
}

/// Platform-agnostic view of a remote debug connection
pub trait DebugConnection: Send + Sync {
    /// Check if the debug client is still reachable
    fn is_connected(&self) -> bool;

    /// Translate a target address into a module-relative breakpoint address
    fn breakpoint_address(&self, address: RelocatedAddress) -> BreakpointAddress;

    /// Breakpoint manager of this connection
    fn breakpoint_manager(&self) -> Arc<dyn BreakpointManager>;

    /// Process manager of this connection
    fn process_manager(&self) -> Arc<dyn ProcessManager>;

    fn add_listener(&self, listener: Arc<dyn DebugEventListener>);

    fn remove_listener(&self, listener: &Arc<dyn DebugEventListener>);
}
