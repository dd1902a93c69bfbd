//! Echo breakpoint table - remaining hit budget per armed address

use crate::debug::types::BreakpointAddress;
use std::collections::{BTreeMap, BTreeSet};

/// Result of recording a hit against the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitOutcome {
    /// Address is not armed by this session
    Untracked,
    /// Address stays armed with this many hits left
    Remaining(u32),
    /// Last allowed hit; the address left the table
    Exhausted,
}

/// Addresses armed by one trace session and their remaining hits.
///
/// Every count stored in the table is positive.
#[derive(Debug, Default)]
pub struct EchoBreakpointTable {
    entries: BTreeMap<BreakpointAddress, u32>,
}

impl EchoBreakpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track an armed address with its hit budget
    pub fn arm(&mut self, address: BreakpointAddress, max_hits: u32) {
        debug_assert!(max_hits > 0);
        self.entries.insert(address, max_hits);
    }

    pub fn contains(&self, address: &BreakpointAddress) -> bool {
        self.entries.contains_key(address)
    }

    pub fn remaining(&self, address: &BreakpointAddress) -> Option<u32> {
        self.entries.get(address).copied()
    }

    pub fn record_hit(&mut self, address: &BreakpointAddress) -> HitOutcome {
        let Some(count) = self.entries.get_mut(address) else {
            return HitOutcome::Untracked;
        };
        if *count > 1 {
            *count -= 1;
            return HitOutcome::Remaining(*count);
        }
        self.entries.remove(address);
        HitOutcome::Exhausted
    }

    /// Forget an address, returns false if it was not tracked
    pub fn remove(&mut self, address: &BreakpointAddress) -> bool {
        self.entries.remove(address).is_some()
    }

    /// Remove and return every tracked address
    pub fn drain(&mut self) -> BTreeSet<BreakpointAddress> {
        std::mem::take(&mut self.entries).into_keys().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
