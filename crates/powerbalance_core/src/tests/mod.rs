//! Unit tests for powerbalance_core
//!
//! Tests are organized by topic:
//! - `fake_engine` - In-memory simulation engine used across the suite
//! - `fixtures` - On-disk session directories
//! - `parameters` - Parameter set loading, resolution and persistence
//! - `models` - Model discovery and compilation
//! - `sweep` - Sweep specifications and run plans
//! - `templating` - PF magnet extension of the Magnets model
//! - `session` - End-to-end sessions against the fake engine
//! - `properties` - Property-based tests

mod fixtures;
mod parameters;
mod sweep;
