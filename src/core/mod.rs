//! Core module - in-process debugger backend
//!
//! A simulated debug target with module relocation, a process manager and
//! the listener plumbing shared by every component.

pub mod debugger;
pub mod listeners;
pub mod process;
pub mod translator;

pub use debugger::{DebugError, Debugger};
pub use listeners::ListenerRegistry;
