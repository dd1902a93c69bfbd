//! Common types for debugging functionality.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of a breakpoint, expressed relative to the module that owns it.
///
/// Addresses outside of any known module carry no module name and keep the
/// absolute value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BreakpointAddress {
    /// Owning module (None for absolute addresses)
    module: Option<String>,
    /// Unrelocated address inside the module
    address: u64,
}

impl BreakpointAddress {
    /// Create a module-relative breakpoint address
    pub fn new(module: impl Into<String>, address: u64) -> Self {
        Self {
            module: Some(module.into()),
            address,
        }
    }

    /// Create an address that does not belong to any module
    pub fn absolute(address: u64) -> Self {
        Self {
            module: None,
            address,
        }
    }

    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    pub fn address(&self) -> u64 {
        self.address
    }
}

impl fmt::Display for BreakpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.module {
            Some(module) => write!(f, "{}!{:#x}", module, self.address),
            None => write!(f, "{:#x}", self.address),
        }
    }
}

/// Address as seen by the running target (module base applied)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelocatedAddress(pub u64);

impl fmt::Display for RelocatedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Breakpoint kinds, in decreasing order of precedence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BreakpointType {
    /// User breakpoint that suspends the target
    Regular,
    /// Temporary breakpoint used for stepping
    Step,
    /// Non-halting breakpoint that only reports that it was reached
    Echo,
}

impl fmt::Display for BreakpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BreakpointType::Regular => "regular",
            BreakpointType::Step => "step",
            BreakpointType::Echo => "echo",
        };
        f.write_str(name)
    }
}

/// Breakpoint info
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Breakpoint {
    kind: BreakpointType,
    address: BreakpointAddress,
}

impl Breakpoint {
    pub fn new(kind: BreakpointType, address: BreakpointAddress) -> Self {
        Self { kind, address }
    }

    pub fn kind(&self) -> BreakpointType {
        self.kind
    }

    pub fn address(&self) -> &BreakpointAddress {
        &self.address
    }
}

/// A single register as reported by the debug client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterValue {
    /// Register name (e.g. "rip")
    pub name: String,
    /// Register contents
    pub value: u64,
    /// Memory the register points to, if the client sent any
    pub memory: Vec<u8>,
    /// Is this the program counter?
    pub is_pc: bool,
}

impl RegisterValue {
    pub fn new(name: impl Into<String>, value: u64) -> Self {
        Self {
            name: name.into(),
            value,
            memory: Vec::new(),
            is_pc: false,
        }
    }

    /// Program counter register
    pub fn pc(name: impl Into<String>, value: u64) -> Self {
        Self {
            is_pc: true,
            ..Self::new(name, value)
        }
    }

    pub fn with_memory(mut self, memory: &[u8]) -> Self {
        self.memory = memory.to_vec();
        self
    }
}

/// Register state of one thread
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadRegisters {
    pub thread_id: u64,
    pub registers: Vec<RegisterValue>,
}

impl ThreadRegisters {
    pub fn new(thread_id: u64, registers: Vec<RegisterValue>) -> Self {
        Self {
            thread_id,
            registers,
        }
    }

    /// Value of the program counter, if the thread reported one
    pub fn program_counter(&self) -> Option<u64> {
        self.registers.iter().find(|r| r.is_pc).map(|r| r.value)
    }
}

/// Reply sent by the debug client when an echo breakpoint was reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoBreakpointHit {
    /// Thread that reached the breakpoint
    pub thread_id: u64,
    /// Register snapshots of the target threads
    pub threads: Vec<ThreadRegisters>,
}

impl EchoBreakpointHit {
    pub fn new(thread_id: u64, threads: Vec<ThreadRegisters>) -> Self {
        Self { thread_id, threads }
    }

    /// Registers of the reporting thread together with its program counter
    pub fn program_counter(&self) -> Option<(&ThreadRegisters, RelocatedAddress)> {
        self.threads
            .iter()
            .filter(|t| t.thread_id == self.thread_id)
            .find_map(|t| t.program_counter().map(|pc| (t, RelocatedAddress(pc))))
    }
}
