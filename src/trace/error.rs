//! Trace engine errors

use crate::debug::types::BreakpointAddress;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a trace store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode trace list: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Id counter {path} is corrupt")]
    Corrupt { path: PathBuf },

    #[error("Trace list {id} does not exist in the store")]
    NotFound { id: u64 },

    #[error("Store rejected the change: {0}")]
    Rejected(String),
}

/// Errors raised by trace lists, providers and the trace logger
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("Event at {address} is already part of trace list {list}")]
    DuplicateEvent { list: u64, address: BreakpointAddress },

    #[error("Trace logger is already recording into trace list {list}")]
    SessionActive { list: u64 },

    #[error("Trace list {id} is not managed by this provider")]
    UnknownTrace { id: u64 },

    #[error("Trace store failure: {0}")]
    Store(#[from] StoreError),
}
