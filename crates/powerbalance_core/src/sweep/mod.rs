//! Sweep planning
//!
//! - `plan` - Sweep specifications, combination assembly and run plans
//! - `profiles` - Tagged profile discovery and swapping

mod plan;
mod profiles;

pub use plan::{
    CartesianIndices, Combination, SweepMode, SweepPlan, SweepSpec, assemble_combinations,
};
pub use profiles::{PROFILE_EXTENSION, ProfileSweep, ProfileVariant, parse_variant, profile_files};
