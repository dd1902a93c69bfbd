//! App module - workbench state and console commands
//!
//! Drives the trace engine against the simulated target for the console.

mod commands;
mod state;

pub use commands::*;
pub use state::*;
