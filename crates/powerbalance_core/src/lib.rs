//! Power balance modelling library
//!
//! This crate drives power balance simulations of a tokamak plant modelled in
//! Modelica. It supports:
//! - Per-model TOML parameter files flattened into one case-insensitive namespace
//! - Translation between parameter names and engine variables, with consistency checks
//! - Structural (compile-time) parameter substitution into Modelica sources
//! - Extension of the Magnets model with additional PF magnets
//! - Parameter sweeps in `set` (zipped) or `combinations` (cartesian) mode
//! - Profile sweeps driven by tagged `.mat` files
//!
//! The Modelica compiler and solver sit behind the [`SimulationEngine`] trait.
//!
//! # Example
//!
//! ```ignore
//! use powerbalance_core::{PowerBalance, SessionConfig};
//!
//! let config = SessionConfig::load("configuration.yaml".as_ref())?;
//! let mut session = PowerBalance::new(config, engine)?;
//! let output = session.run_simulation("results".as_ref(), None)?;
//! ```

#![warn(clippy::all)]

// ============================================================================
// Core modules
// ============================================================================

pub mod engine;
pub mod environment;
pub mod error;
pub mod models;
pub mod parameters;
pub mod results;
pub mod session;
pub mod sweep;
pub mod templating;
pub mod utilities;

// ============================================================================
// Type definition modules
// ============================================================================

pub mod config;
pub mod value;

// ============================================================================
// Test modules
// ============================================================================

#[cfg(test)]
mod tests;

// ============================================================================
// Public re-exports for convenience
// ============================================================================

pub use config::{PlasmaScenario, SessionConfig, SimulationOptions, Solver};
pub use engine::{BuildRequest, EngineVariable, SimulationEngine, SolutionTable};
pub use error::{
    ConfigError, EngineError, ModelError, ParameterError, SessionError, SessionResult, SweepError,
};
pub use models::Model;
pub use parameters::ParameterSet;
pub use results::ResultTable;
pub use session::PowerBalance;
pub use sweep::{SweepMode, SweepPlan, SweepSpec};
pub use value::{ParamNode, ParamTable, ParamValue};
