//! Command line front end for power balance sessions
//!
//! This crate wires `powerbalance_core` to a real Modelica toolchain:
//! - `omc` - An OpenModelica backed simulation engine
//! - `commands` - The `models`, `parameters`, `plan` and `run` subcommands
//! - `logging` - Per-invocation log files with pruning

#![warn(clippy::all)]

pub mod commands;
pub mod logging;
pub mod omc;

#[cfg(test)]
mod tests;

pub use logging::init_logging;
pub use omc::OmcSession;
