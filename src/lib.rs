//! echotrace - echo breakpoint trace recording
//!
//! Arms self-removing echo breakpoints on a debug target and records the
//! register state of every hit into persistent trace lists.

pub mod app;
pub mod config;
pub mod core;
pub mod debug;
pub mod trace;
pub mod ui;
