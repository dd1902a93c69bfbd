//! UI module - Command Line Interface
//!
//! reedline-based REPL over the trace workbench.

pub mod cli;
