//! Trace module - echo breakpoint trace recording
//!
//! Trace lists, their persistence and the logger that fills them from
//! echo breakpoint hits.

pub mod error;
pub mod event;
pub mod list;
pub mod logger;
pub mod provider;
pub mod store;
pub mod table;

pub use error::{StoreError, TraceError};
pub use event::{TraceEvent, TraceEventType, TraceRegister};
pub use list::{TraceList, TraceListListener};
pub use logger::{TraceLogger, TraceLoggerListener};
pub use provider::{TraceListProvider, TraceListProviderListener};
pub use store::{JsonTraceStore, MemoryTraceStore, TraceRecord, TraceStore};
pub use table::{EchoBreakpointTable, HitOutcome};
