//! Trace events - immutable records of observed breakpoint hits

use crate::debug::types::BreakpointAddress;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of breakpoint that produced a trace event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceEventType {
    Echo,
    Regular,
}

impl fmt::Display for TraceEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEventType::Echo => f.write_str("echo"),
            TraceEventType::Regular => f.write_str("regular"),
        }
    }
}

/// Register snapshot taken when a trace event was recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRegister {
    name: String,
    value: u64,
    #[serde(with = "hex_bytes")]
    memory: Vec<u8>,
}

impl TraceRegister {
    /// The memory slice is copied; later changes by the caller are not seen.
    pub fn new(name: impl Into<String>, value: u64, memory: &[u8]) -> Self {
        Self {
            name: name.into(),
            value,
            memory: memory.to_vec(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    /// Copy of the memory the register pointed to
    pub fn memory(&self) -> Vec<u8> {
        self.memory.clone()
    }

    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }
}

/// One recorded occurrence of an instrumented address being reached.
///
/// Events have no value equality. Trace lists hold them behind `Arc` and
/// treat two handles as the same event only if they point to the same
/// allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    thread_id: u64,
    address: BreakpointAddress,
    kind: TraceEventType,
    registers: Vec<TraceRegister>,
}

impl TraceEvent {
    pub fn new(
        thread_id: u64,
        address: BreakpointAddress,
        kind: TraceEventType,
        registers: Vec<TraceRegister>,
    ) -> Self {
        Self {
            thread_id,
            address,
            kind,
            registers,
        }
    }

    pub fn thread_id(&self) -> u64 {
        self.thread_id
    }

    pub fn address(&self) -> &BreakpointAddress {
        &self.address
    }

    pub fn kind(&self) -> TraceEventType {
        self.kind
    }

    pub fn registers(&self) -> &[TraceRegister] {
        &self.registers
    }
}

/// Register memory is stored as a hex string
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(text).map_err(serde::de::Error::custom)
    }
}
