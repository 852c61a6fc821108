//! Unit tests for the powerbalance front end
//!
//! Tests are organized by topic:
//! - `omc` - Build scripts, overrides and parsing of omc build products
//! - `commands` - Sweep arguments, model listing and plan reports
//! - `logging` - Log file rotation

mod commands;
