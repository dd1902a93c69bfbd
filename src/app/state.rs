//! Shared application state
//!
//! The workbench wires a simulated debug target, the trace lists of its main
//! module and one trace logger together, and drives them on behalf of the
//! console.

use crate::config::Config;
use crate::core::{DebugError, Debugger};
use crate::debug::types::{
    BreakpointAddress, BreakpointType, EchoBreakpointHit, RegisterValue, ThreadRegisters,
};
use crate::debug::BreakpointManager;
use crate::trace::{TraceError, TraceList, TraceListProvider, TraceLogger, TraceLoggerListener, TraceStore};
use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Progress of the current trace session as seen by the console
#[derive(Default)]
pub struct SessionStatus {
    armed: AtomicUsize,
    removed: AtomicUsize,
    finished: Mutex<Vec<u64>>,
}

impl SessionStatus {
    pub fn armed(&self) -> usize {
        self.armed.load(Ordering::SeqCst)
    }

    pub fn removed(&self) -> usize {
        self.removed.load(Ordering::SeqCst)
    }

    /// Ids of trace lists whose session ended since the last call
    pub fn take_finished(&self) -> Vec<u64> {
        std::mem::take(&mut *self.finished.lock())
    }
}

impl TraceLoggerListener for SessionStatus {
    fn added_breakpoint(&self) {
        self.armed.fetch_add(1, Ordering::SeqCst);
    }

    fn removed_breakpoint(&self) {
        self.removed.fetch_add(1, Ordering::SeqCst);
    }

    fn finished(&self, trace: &Arc<TraceList>) {
        self.finished.lock().push(trace.id());
    }
}

/// Shared application state
pub struct Workbench {
    debugger: Arc<Debugger>,
    provider: Arc<TraceListProvider>,
    logger: TraceLogger,
    status: Arc<SessionStatus>,
    /// Module that trace addresses are relative to
    module: String,
    /// Trace list new sessions record into
    selected: Option<Arc<TraceList>>,
    pub max_hits: u32,
}

impl Workbench {
    /// Connect to the simulated target and load its trace lists
    pub fn new(config: &Config, store: Arc<dyn TraceStore>) -> Result<Self> {
        let debugger = Arc::new(Debugger::new());
        debugger.add_module(&config.module.name, config.module.base, config.module.size);
        debugger.connect();
        debugger.attach()?;

        let provider = Arc::new(
            TraceListProvider::open(&config.module.name, store)
                .context("Failed to load trace lists")?,
        );
        let logger = TraceLogger::new(provider.clone(), debugger.clone());
        let status = Arc::new(SessionStatus::default());
        logger.add_listener(status.clone());

        let selected = provider.traces().last().cloned();

        Ok(Self {
            debugger,
            provider,
            logger,
            status,
            module: config.module.name.clone(),
            selected,
            max_hits: config.max_hits,
        })
    }

    pub fn debugger(&self) -> &Arc<Debugger> {
        &self.debugger
    }

    pub fn provider(&self) -> &Arc<TraceListProvider> {
        &self.provider
    }

    pub fn logger(&self) -> &TraceLogger {
        &self.logger
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn selected(&self) -> Option<&Arc<TraceList>> {
        self.selected.as_ref()
    }

    fn selected_or_err(&self) -> Result<Arc<TraceList>> {
        self.selected
            .clone()
            .ok_or_else(|| anyhow!("No trace list selected"))
    }

    /// Module-relative address of the main module
    pub fn address(&self, offset: u64) -> BreakpointAddress {
        BreakpointAddress::new(&self.module, offset)
    }

    /// Create a trace list and select it
    pub fn create_trace(&mut self, name: &str) -> Result<Arc<TraceList>> {
        let trace = self.provider.create_trace(name, "")?;
        self.select_trace(trace.id())?;
        Ok(trace)
    }

    /// Select the list new sessions record into.
    ///
    /// A running session follows the selection.
    pub fn select_trace(&mut self, id: u64) -> Result<Arc<TraceList>> {
        let trace = self
            .provider
            .trace(id)
            .ok_or(TraceError::UnknownTrace { id })?;
        if self.logger.has_echo_breakpoints() {
            self.logger.switch_target_list(trace.clone());
        }
        self.selected = Some(trace.clone());
        Ok(trace)
    }

    /// Delete a trace list; the running session keeps recording into it
    pub fn delete_trace(&mut self, id: u64) -> Result<()> {
        let trace = self
            .provider
            .trace(id)
            .ok_or(TraceError::UnknownTrace { id })?;
        self.provider.remove_trace(&trace)?;
        if self.selected.as_ref().is_some_and(|t| Arc::ptr_eq(t, &trace)) {
            self.selected = None;
        }
        Ok(())
    }

    /// Start tracing the given module offsets into the selected list.
    ///
    /// Returns the number of echo breakpoints that were armed.
    pub fn start_trace(&self, offsets: &[u64]) -> Result<usize> {
        let trace = self.selected_or_err()?;
        let addresses: BTreeSet<BreakpointAddress> =
            offsets.iter().map(|&offset| self.address(offset)).collect();
        self.logger.start(trace, &addresses, self.max_hits)?;
        Ok(self.logger.active_echo_breakpoint_count())
    }

    pub fn stop_trace(&self) -> BTreeSet<BreakpointAddress> {
        self.logger.stop()
    }

    /// Make the target report an echo breakpoint hit at a module offset
    pub fn simulate_hit(&self, offset: u64, thread_id: u64) -> Result<()> {
        let pc = self.debugger.relocate(&self.address(offset))?;
        // One stack page per thread below the top of the stack region
        let sp = 0x7ff0_0000u64.wrapping_sub(thread_id.wrapping_mul(0x1000));
        let registers = vec![
            RegisterValue::new("rax", offset).with_memory(&offset.to_le_bytes()),
            RegisterValue::new("rsp", sp).with_memory(&sp.to_le_bytes()[..4]),
            RegisterValue::pc("rip", pc.0),
        ];
        let reply = EchoBreakpointHit::new(
            thread_id,
            vec![ThreadRegisters::new(thread_id, registers)],
        );
        self.debugger.receive_hit(&reply)?;
        Ok(())
    }

    /// Set a regular breakpoint, replacing any weaker one at that offset
    pub fn set_breakpoint(&self, offset: u64) -> bool {
        let added = self
            .debugger
            .breakpoints()
            .add_breakpoints(BreakpointType::Regular, &BTreeSet::from([self.address(offset)]));
        !added.is_empty()
    }

    pub fn delete_breakpoint(&self, offset: u64) {
        self.debugger
            .breakpoints()
            .remove_breakpoints(BreakpointType::Regular, &BTreeSet::from([self.address(offset)]));
    }

    pub fn attach(&self) -> Result<(), DebugError> {
        self.debugger.attach()
    }

    pub fn detach(&self) -> Result<(), DebugError> {
        self.debugger.detach()
    }

    pub fn rename(&self, name: &str) -> Result<()> {
        self.selected_or_err()?.set_name(name)?;
        Ok(())
    }

    pub fn describe(&self, description: &str) -> Result<()> {
        self.selected_or_err()?.set_description(description)?;
        Ok(())
    }

    /// Persist the events of the selected list
    pub fn save(&self) -> Result<usize> {
        let trace = self.selected_or_err()?;
        self.provider.save(&trace)?;
        Ok(trace.event_count())
    }

    pub fn is_debugging(&self) -> bool {
        self.logger.has_echo_breakpoints()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::MemoryTraceStore;

    fn workbench() -> Workbench {
        let config = Config {
            max_hits: 2,
            ..Config::default()
        };
        Workbench::new(&config, Arc::new(MemoryTraceStore::new())).unwrap()
    }

    #[test]
    fn test_start_requires_selection() {
        let bench = workbench();
        assert!(bench.start_trace(&[0x100]).is_err());
    }

    #[test]
    fn test_trace_session() {
        let mut bench = workbench();
        let trace = bench.create_trace("calls").unwrap();

        assert_eq!(bench.start_trace(&[0x100, 0x200]).unwrap(), 2);
        assert!(bench.is_debugging());

        bench.simulate_hit(0x100, 1).unwrap();
        bench.simulate_hit(0x100, 2).unwrap();
        bench.simulate_hit(0x100, 3).unwrap();
        assert_eq!(trace.event_count(), 2);

        let remaining = bench.stop_trace();
        assert_eq!(remaining, BTreeSet::from([bench.address(0x200)]));
        assert_eq!(bench.status().armed(), 2);
        assert_eq!(bench.status().removed(), 2);
        assert_eq!(bench.status().take_finished(), vec![trace.id()]);
        assert!(bench.status().take_finished().is_empty());
    }

    #[test]
    fn test_regular_breakpoint_blocks_trace() {
        let mut bench = workbench();
        bench.create_trace("calls").unwrap();

        assert!(bench.set_breakpoint(0x100));
        assert_eq!(bench.start_trace(&[0x100]).unwrap(), 0);

        bench.delete_breakpoint(0x100);
        assert_eq!(bench.start_trace(&[0x100]).unwrap(), 1);
    }

    #[test]
    fn test_switching_selection_redirects_session() {
        let mut bench = workbench();
        let first = bench.create_trace("first").unwrap();
        bench.start_trace(&[0x100]).unwrap();
        let second = bench.create_trace("second").unwrap();

        bench.simulate_hit(0x100, 1).unwrap();

        assert!(first.is_empty());
        assert_eq!(second.event_count(), 1);
    }

    #[test]
    fn test_hit_outside_module_is_ignored() {
        let mut bench = workbench();
        let trace = bench.create_trace("calls").unwrap();
        bench.start_trace(&[0x100]).unwrap();

        bench.simulate_hit(0x20_0000, 1).unwrap();

        assert!(trace.is_empty());
        assert_eq!(bench.logger().remaining_hits(&bench.address(0x100)), Some(2));
    }

    #[test]
    fn test_detach_ends_session() {
        let mut bench = workbench();
        let trace = bench.create_trace("calls").unwrap();
        bench.start_trace(&[0x100]).unwrap();

        bench.detach().unwrap();

        assert!(!bench.is_debugging());
        assert_eq!(bench.status().take_finished(), vec![trace.id()]);
        assert!(bench.detach().is_err());
        assert!(bench.simulate_hit(0x100, 1).is_ok());
        assert!(trace.is_empty());
    }

    #[test]
    fn test_hit_with_large_thread_id() {
        let mut bench = workbench();
        let trace = bench.create_trace("calls").unwrap();
        bench.start_trace(&[0x100]).unwrap();

        bench.simulate_hit(0x100, 600_000).unwrap();
        bench.simulate_hit(0x100, u64::MAX).unwrap();

        assert_eq!(trace.event_count(), 2);
        assert_eq!(trace.events()[1].thread_id(), u64::MAX);
    }

    #[test]
    fn test_hit_past_address_space_is_an_error() {
        let mut bench = workbench();
        let trace = bench.create_trace("calls").unwrap();
        bench.start_trace(&[0x100]).unwrap();

        let result = bench.simulate_hit(u64::MAX, 1);

        assert!(matches!(
            result.unwrap_err().downcast_ref::<DebugError>(),
            Some(DebugError::AddressOutOfRange { .. })
        ));
        assert!(trace.is_empty());
    }
}
