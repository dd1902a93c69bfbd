//! Trace logger tests

use super::*;
use crate::core::debugger::Debugger;
use crate::debug::types::{RegisterValue, ThreadRegisters};
use crate::trace::store::MemoryTraceStore;
use parking_lot::Mutex;

const MODULE: &str = "target";
const BASE: u64 = 0x1000;

struct Fixture {
    debugger: Arc<Debugger>,
    provider: Arc<TraceListProvider>,
    logger: TraceLogger,
    listener: Arc<RecordingListener>,
}

impl Fixture {
    fn new() -> Self {
        let debugger = Arc::new(Debugger::new());
        debugger.add_module(MODULE, BASE, 0x1000);
        debugger.connect();
        debugger.attach().unwrap();

        let store = Arc::new(MemoryTraceStore::new());
        let provider = Arc::new(TraceListProvider::open(MODULE, store).unwrap());
        let logger = TraceLogger::new(provider.clone(), debugger.clone());
        let listener = Arc::new(RecordingListener::default());
        logger.add_listener(listener.clone());

        Self {
            debugger,
            provider,
            logger,
            listener,
        }
    }

    fn trace(&self, name: &str) -> Arc<TraceList> {
        self.provider.create_trace(name, "Bar").unwrap()
    }

    /// Deliver an echo breakpoint reply for a relocated address
    fn hit(&self, relocated: u64) {
        let reply = EchoBreakpointHit::new(
            1,
            vec![ThreadRegisters::new(
                1,
                vec![
                    RegisterValue::new("rax", 0x2a).with_memory(&[0xde, 0xad]),
                    RegisterValue::pc("rip", relocated),
                ],
            )],
        );
        self.debugger.receive_hit(&reply).unwrap();
    }

    fn add_regular(&self, offset: u64) {
        self.debugger
            .breakpoints()
            .add_breakpoints(BreakpointType::Regular, &addresses(&[offset]));
    }

    fn echo_count(&self) -> usize {
        self.debugger.breakpoints().count(BreakpointType::Echo)
    }
}

fn addresses(offsets: &[u64]) -> BTreeSet<BreakpointAddress> {
    offsets
        .iter()
        .map(|offset| BreakpointAddress::new(MODULE, *offset))
        .collect()
}

/// Records '+' for added, '-' for removed and '!' for finished
#[derive(Default)]
struct RecordingListener {
    events: Mutex<String>,
}

impl RecordingListener {
    fn events(&self) -> String {
        self.events.lock().clone()
    }
}

impl TraceLoggerListener for RecordingListener {
    fn added_breakpoint(&self) {
        self.events.lock().push('+');
    }

    fn removed_breakpoint(&self) {
        self.events.lock().push('-');
    }

    fn finished(&self, _trace: &Arc<TraceList>) {
        self.events.lock().push('!');
    }
}

struct PanickingListener;

impl TraceLoggerListener for PanickingListener {
    fn added_breakpoint(&self) {
        panic!("listener failure");
    }
}

#[test]
fn test_all_breakpoints_blocked() {
    let fixture = Fixture::new();
    fixture.add_regular(0x100);
    let trace = fixture.trace("Foo");

    fixture
        .logger
        .start(trace.clone(), &addresses(&[0x100]), 1)
        .unwrap();

    assert!(!fixture.logger.has_echo_breakpoints());
    assert!(fixture.logger.stop().is_empty());
    assert_eq!(fixture.listener.events(), "");

    // Resources of the previous run were released
    fixture
        .logger
        .start(trace, &addresses(&[0x100]), 1)
        .unwrap();
    fixture.logger.stop();
    assert_eq!(fixture.echo_count(), 0);
}

#[test]
fn test_blocked_start_still_replaces_target() {
    let fixture = Fixture::new();
    fixture.add_regular(0x100);
    let first = fixture.trace("Foo");
    let second = fixture.trace("Bar");

    fixture
        .logger
        .start(first, &addresses(&[0x100]), 1)
        .unwrap();
    fixture
        .logger
        .start(second.clone(), &addresses(&[0x100]), 1)
        .unwrap();

    assert!(!fixture.logger.has_echo_breakpoints());
    let target = fixture.logger.trace().unwrap();
    assert!(Arc::ptr_eq(&target, &second));
}

#[test]
fn test_hit_echo_breakpoints() {
    let fixture = Fixture::new();
    let trace = fixture.trace("Foo");

    fixture
        .logger
        .start(trace.clone(), &addresses(&[0x100, 0x200]), 3)
        .unwrap();

    fixture.hit(0x1100);
    fixture.hit(0x1200);
    assert_eq!(trace.event_count(), 2);
    assert_eq!(fixture.listener.events(), "++");

    fixture.hit(0x1100);
    fixture.hit(0x1200);
    assert_eq!(trace.event_count(), 4);
    assert_eq!(fixture.listener.events(), "++");

    fixture.hit(0x1100);
    fixture.hit(0x1200);
    assert_eq!(trace.event_count(), 6);
    assert_eq!(fixture.listener.events(), "++--!");
    assert_eq!(fixture.echo_count(), 0);

    // Exhausted breakpoints record nothing
    fixture.hit(0x1100);
    fixture.hit(0x1200);
    assert_eq!(trace.event_count(), 6);

    assert!(fixture.logger.stop().is_empty());
    assert_eq!(fixture.listener.events(), "++--!");

    fixture
        .logger
        .start(trace.clone(), &addresses(&[0x100, 0x200]), 1)
        .unwrap();
    fixture.hit(0x1100);
    fixture.hit(0x1200);
    fixture.logger.stop();

    assert_eq!(trace.event_count(), 8);
}

#[test]
fn test_event_contents() {
    let fixture = Fixture::new();
    let trace = fixture.trace("Foo");
    fixture
        .logger
        .start(trace.clone(), &addresses(&[0x100]), 2)
        .unwrap();

    fixture.hit(0x1100);

    let events = trace.events();
    let event = &events[0];
    assert_eq!(event.thread_id(), 1);
    assert_eq!(event.kind(), TraceEventType::Echo);
    assert_eq!(event.address(), &BreakpointAddress::new(MODULE, 0x100));
    assert_eq!(event.registers().len(), 2);
    assert_eq!(event.registers()[0].name(), "rax");
    assert_eq!(event.registers()[0].memory(), vec![0xde, 0xad]);
    assert_eq!(event.registers()[1].value(), 0x1100);
    assert_eq!(fixture.logger.remaining_hits(event.address()), Some(1));
}

#[test]
fn test_overwritten_echo_breakpoint() {
    let fixture = Fixture::new();
    let trace = fixture.trace("Foo");
    fixture
        .logger
        .start(trace, &addresses(&[0x100, 0x200]), 1)
        .unwrap();

    fixture.add_regular(0x100);
    assert_eq!(fixture.listener.events(), "++-");
    assert_eq!(fixture.logger.active_echo_breakpoint_count(), 1);

    let removed = fixture.logger.stop();
    assert_eq!(removed, addresses(&[0x200]));
    assert_eq!(fixture.listener.events(), "++--!");
    assert_eq!(fixture.echo_count(), 0);
}

#[test]
fn test_overwritten_all_echo_breakpoints() {
    let fixture = Fixture::new();
    let trace = fixture.trace("Foo");
    fixture
        .logger
        .start(trace.clone(), &addresses(&[0x100, 0x200]), 1)
        .unwrap();

    fixture.add_regular(0x100);
    fixture.add_regular(0x200);

    assert!(fixture.logger.stop().is_empty());
    assert_eq!(fixture.listener.events(), "++--!");

    // Both addresses now carry regular breakpoints
    fixture
        .logger
        .start(trace, &addresses(&[0x100, 0x200]), 1)
        .unwrap();
    assert!(!fixture.logger.has_echo_breakpoints());
}

#[test]
fn test_target_detached() {
    let fixture = Fixture::new();
    let trace = fixture.trace("Foo");
    fixture
        .logger
        .start(trace.clone(), &addresses(&[0x100]), 1)
        .unwrap();

    fixture.debugger.detach().unwrap();

    assert_eq!(fixture.listener.events(), "+!");
    assert!(!fixture.logger.has_echo_breakpoints());
    assert!(fixture.logger.stop().is_empty());

    fixture.debugger.attach().unwrap();
    fixture
        .logger
        .start(trace, &addresses(&[0x100]), 1)
        .unwrap();
    assert_eq!(fixture.logger.active_echo_breakpoint_count(), 1);
    fixture.logger.stop();
    assert_eq!(fixture.listener.events(), "+!+-!");
}

#[test]
fn test_without_hits() {
    let fixture = Fixture::new();
    let trace = fixture.trace("Foo");
    fixture
        .logger
        .start(trace, &addresses(&[0x100]), 1)
        .unwrap();
    assert_eq!(fixture.listener.events(), "+");

    let removed = fixture.logger.stop();

    assert_eq!(removed, addresses(&[0x100]));
    assert_eq!(fixture.listener.events(), "+-!");
    assert_eq!(fixture.echo_count(), 0);
}

#[test]
fn test_disconnected_start_arms_nothing() {
    let fixture = Fixture::new();
    let trace = fixture.trace("Foo");
    fixture.debugger.close();

    fixture
        .logger
        .start(trace.clone(), &addresses(&[0x100, 0x200]), 1)
        .unwrap();

    assert!(!fixture.logger.has_echo_breakpoints());
    assert_eq!(fixture.echo_count(), 0);
    assert_eq!(fixture.listener.events(), "");

    // Nothing is listening for hits after reconnecting
    fixture.debugger.connect();
    fixture.hit(0x1100);
    assert!(trace.is_empty());
}

#[test]
fn test_unknown_hit_is_ignored() {
    let fixture = Fixture::new();
    let trace = fixture.trace("Foo");
    fixture
        .logger
        .start(trace.clone(), &addresses(&[0x100]), 1)
        .unwrap();

    fixture.hit(0x1300);
    fixture.hit(0x9000);

    assert!(trace.is_empty());
    assert_eq!(fixture.logger.active_echo_breakpoint_count(), 1);
}

#[test]
fn test_hit_without_program_counter() {
    let fixture = Fixture::new();
    let trace = fixture.trace("Foo");
    fixture
        .logger
        .start(trace.clone(), &addresses(&[0x100]), 1)
        .unwrap();

    let reply = EchoBreakpointHit::new(
        1,
        vec![ThreadRegisters::new(1, vec![RegisterValue::new("rax", 0x1100)])],
    );
    fixture.debugger.receive_hit(&reply).unwrap();

    assert!(trace.is_empty());
    assert!(fixture.logger.has_echo_breakpoints());
}

#[test]
fn test_switch_target_list() {
    let fixture = Fixture::new();
    let first = fixture.trace("First");
    let second = fixture.trace("Second");
    fixture
        .logger
        .start(first.clone(), &addresses(&[0x100]), 3)
        .unwrap();

    fixture.hit(0x1100);
    let previous = fixture.logger.switch_target_list(second.clone()).unwrap();
    fixture.hit(0x1100);

    assert!(Arc::ptr_eq(&previous, &first));
    assert_eq!(first.event_count(), 1);
    assert_eq!(second.event_count(), 1);
    assert_eq!(fixture.logger.active_echo_breakpoint_count(), 1);
    assert!(Arc::ptr_eq(&fixture.logger.trace().unwrap(), &second));
}

#[test]
fn test_start_preconditions() {
    let fixture = Fixture::new();
    let trace = fixture.trace("Foo");

    assert!(matches!(
        fixture.logger.start(trace.clone(), &BTreeSet::new(), 1),
        Err(TraceError::InvalidArgument(_))
    ));
    assert!(matches!(
        fixture.logger.start(trace.clone(), &addresses(&[0x100]), 0),
        Err(TraceError::InvalidArgument(_))
    ));

    fixture
        .logger
        .start(trace.clone(), &addresses(&[0x100]), 1)
        .unwrap();
    assert!(matches!(
        fixture.logger.start(trace, &addresses(&[0x200]), 1),
        Err(TraceError::SessionActive { .. })
    ));
    assert_eq!(fixture.logger.active_echo_breakpoint_count(), 1);
}

#[test]
fn test_panicking_listener_is_isolated() {
    let fixture = Fixture::new();
    let panicking: Arc<dyn TraceLoggerListener> = Arc::new(PanickingListener);
    fixture.logger.add_listener(panicking.clone());
    let trace = fixture.trace("Foo");

    fixture
        .logger
        .start(trace, &addresses(&[0x100, 0x200]), 1)
        .unwrap();

    assert_eq!(fixture.listener.events(), "++");
    assert_eq!(fixture.logger.active_echo_breakpoint_count(), 2);

    fixture.logger.remove_listener(&panicking);
    fixture.logger.stop();
    assert_eq!(fixture.listener.events(), "++--!");
}

#[test]
fn test_drop_releases_breakpoints() {
    let fixture = Fixture::new();
    let trace = fixture.trace("Foo");
    {
        let logger = TraceLogger::new(fixture.provider.clone(), fixture.debugger.clone());
        logger
            .start(trace, &addresses(&[0x300, 0x400]), 5)
            .unwrap();
        assert_eq!(fixture.echo_count(), 2);
    }
    assert_eq!(fixture.echo_count(), 0);
}

#[test]
fn test_sessions_do_not_share_breakpoints() {
    let fixture = Fixture::new();
    let other = TraceLogger::new(fixture.provider.clone(), fixture.debugger.clone());
    let first = fixture.trace("First");
    let second = fixture.trace("Second");

    fixture
        .logger
        .start(first.clone(), &addresses(&[0x100, 0x200]), 1)
        .unwrap();
    other
        .start(second.clone(), &addresses(&[0x200, 0x300]), 1)
        .unwrap();

    // First session wins at 0x200
    assert_eq!(other.active_echo_breakpoint_count(), 1);

    fixture.hit(0x1200);
    assert_eq!(first.event_count(), 1);
    assert!(second.is_empty());

    let removed = other.stop();
    assert_eq!(removed, addresses(&[0x300]));
    assert_eq!(fixture.logger.active_echo_breakpoint_count(), 1);
    assert!(fixture
        .debugger
        .breakpoints()
        .has_breakpoint(BreakpointType::Echo, &BreakpointAddress::new(MODULE, 0x100)));
}
