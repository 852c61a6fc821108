//! Tests for sweep planning
//!
//! These tests verify:
//! - Set mode zips equal length lists and rejects unequal ones
//! - Combinations mode covers the cartesian product once, last name fastest
//! - Plans combine parameter and profile sweeps consistently

use std::fs;

use rustc_hash::FxHashSet;

use crate::error::SweepError;
use crate::sweep::{ProfileSweep, SweepMode, SweepPlan, SweepSpec, assemble_combinations};
use crate::value::{ParamNode, ParamTable, ParamValue};

fn ints(values: &[i64]) -> Vec<ParamValue> {
    values.iter().copied().map(ParamValue::Int).collect()
}

fn spec(entries: &[(&str, Vec<ParamValue>)]) -> SweepSpec {
    let mut spec = SweepSpec::new();
    for (name, values) in entries {
        spec.insert(*name, values.clone()).unwrap();
    }
    spec
}

fn profiles(values: &[&str]) -> (tempfile::TempDir, ProfileSweep) {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("load.mat"), b"canonical").unwrap();
    for value in values {
        fs::write(dir.path().join(format!("load_sweep_peak_{value}.mat")), value.as_bytes()).unwrap();
    }
    let sweep = ProfileSweep::discover(dir.path()).unwrap();
    (dir, sweep)
}

/// Combination i takes element i of every list
#[test]
fn test_set_mode_zips_lists() {
    let spec = spec(&[("a", ints(&[1, 2, 3])), ("b", ints(&[10, 20, 30]))]);
    let combinations = assemble_combinations(&spec, SweepMode::Set).unwrap();

    assert_eq!(combinations.len(), 3);
    for (i, combination) in combinations.iter().enumerate() {
        assert_eq!(combination["a"], ParamValue::Int(i as i64 + 1));
        assert_eq!(combination["b"], ParamValue::Int((i as i64 + 1) * 10));
    }
}

/// Unequal lists in set mode fail before anything runs
#[test]
fn test_set_mode_rejects_unequal_lengths() {
    let spec = spec(&[("a", ints(&[1, 2, 3])), ("b", ints(&[10, 20]))]);

    match assemble_combinations(&spec, SweepMode::Set) {
        Err(SweepError::LengthMismatch { name, expected, found }) => {
            assert_eq!(name, "b");
            assert_eq!(expected, 3);
            assert_eq!(found, 2);
        }
        other => panic!("expected LengthMismatch, got {other:?}"),
    }
}

/// The product of the list lengths, each point exactly once
#[test]
fn test_combinations_mode_covers_product() {
    let spec = spec(&[
        ("a", ints(&[1, 2])),
        ("b", ints(&[1, 2, 3])),
        ("c", ints(&[1, 2, 3, 4])),
    ]);
    let combinations = assemble_combinations(&spec, SweepMode::Combinations).unwrap();

    assert_eq!(combinations.len(), 2 * 3 * 4);
    let unique: FxHashSet<String> = combinations
        .iter()
        .map(|c| format!("{}-{}-{}", c["a"], c["b"], c["c"]))
        .collect();
    assert_eq!(unique.len(), combinations.len());

    assert_eq!(combinations[0]["c"], ParamValue::Int(1));
    assert_eq!(combinations[1]["c"], ParamValue::Int(2));
    assert_eq!(combinations[1]["a"], ParamValue::Int(1));
    assert_eq!(combinations[23]["a"], ParamValue::Int(2));
}

/// An empty specification cannot be assembled
#[test]
fn test_empty_spec_fails() {
    assert!(matches!(
        assemble_combinations(&SweepSpec::new(), SweepMode::Set),
        Err(SweepError::EmptySweep)
    ));
}

/// Nested sweep documents are flattened and scalars rejected
#[test]
fn test_spec_from_nested_table() {
    let mut inner = ParamTable::new();
    inner.insert("power".to_string(), ParamNode::Value(ParamValue::List(ints(&[1, 2]))));
    let mut table = ParamTable::new();
    table.insert("heater".to_string(), ParamNode::Table(inner));

    let spec = SweepSpec::from_table(&table).unwrap();
    assert_eq!(spec.get("heater.power"), Some(ints(&[1, 2]).as_slice()));

    let mut scalar = ParamTable::new();
    scalar.insert("x".to_string(), ParamNode::Value(ParamValue::Int(1)));
    assert!(matches!(
        SweepSpec::from_table(&scalar),
        Err(SweepError::InvalidSweepValue { .. })
    ));
}

/// Mixed value types within one list are rejected
#[test]
fn test_spec_rejects_mixed_types() {
    let mut spec = SweepSpec::new();
    let result = spec.insert("x", vec![ParamValue::Int(1), ParamValue::from("two")]);
    assert!(matches!(result, Err(SweepError::InvalidSweepValue { .. })));
}

/// No sweep and no profiles means a single run
#[test]
fn test_plan_without_sweep_is_single() {
    let plan = SweepPlan::build(None, SweepMode::Set, &ProfileSweep::default()).unwrap();
    assert_eq!(plan, SweepPlan::Single);
    assert_eq!(plan.iterations(), 1);
}

/// Tagged profiles alone give a profile-only sweep
#[test]
fn test_plan_profile_only() {
    let (_dir, sweep) = profiles(&["1", "2", "3"]);
    let plan = SweepPlan::build(None, SweepMode::Set, &sweep).unwrap();
    assert_eq!(plan, SweepPlan::ProfileOnly { iterations: 3 });
}

/// Parameter and profile sweeps must have the same length
#[test]
fn test_plan_profile_length_must_match() {
    let (_dir, sweep) = profiles(&["1", "2"]);

    let matching = spec(&[("a", ints(&[1, 2]))]);
    let plan = SweepPlan::build(Some(&matching), SweepMode::Set, &sweep).unwrap();
    assert!(matches!(plan, SweepPlan::Parameter { swap_profiles: true, .. }));
    assert_eq!(plan.iterations(), 2);

    let longer = spec(&[("a", ints(&[1, 2, 3]))]);
    assert!(matches!(
        SweepPlan::build(Some(&longer), SweepMode::Set, &sweep),
        Err(SweepError::LengthMismatch { .. })
    ));
}

/// Profile sweeps are not combined with cartesian sweeps
#[test]
fn test_plan_rejects_profiles_in_combinations_mode() {
    let (_dir, sweep) = profiles(&["1", "2"]);
    let spec = spec(&[("a", ints(&[1, 2]))]);

    assert!(matches!(
        SweepPlan::build(Some(&spec), SweepMode::Combinations, &sweep),
        Err(SweepError::ProfileSweepInCombinations)
    ));
}

/// Merging specs keeps the incoming values on clashes
#[test]
fn test_extend_replaces_existing() {
    let mut base = spec(&[("a", ints(&[1])), ("b", ints(&[2]))]);
    base.extend(spec(&[("b", ints(&[3, 4]))]));

    assert_eq!(base.get("b"), Some(ints(&[3, 4]).as_slice()));
    assert_eq!(base.last_values()["b"], ParamValue::Int(4));
}
