//! Tests for the subcommands
//!
//! These tests verify:
//! - Sweep arguments are parsed and coerced
//! - Model listings include submodels
//! - Plans are reported without an engine
//! - Reported plans are the plans a run executes
//! - An empty profiles directory is pointed out

use std::fs;

use powerbalance_core::session::plan_run;
use powerbalance_core::sweep::{ProfileSweep, SweepMode, SweepPlan};
use powerbalance_core::{ParamNode, ParamTable, ParamValue, SessionConfig};

use crate::commands::{
    list_models, parse_sweep_argument, show_plan, sweep_from_arguments, warn_missing_profiles,
};

fn output(buffer: Vec<u8>) -> String {
    String::from_utf8(buffer).unwrap()
}

/// Values are split on commas and coerced
#[test]
fn test_parse_sweep_argument() {
    let (name, values) = parse_sweep_argument("heater.power = 1, 2.5,true").unwrap();
    assert_eq!(name, "heater.power");
    assert_eq!(
        values,
        vec![ParamValue::Int(1), ParamValue::Float(2.5), ParamValue::Bool(true)]
    );

    assert!(parse_sweep_argument("heater.power").is_err());
    assert!(parse_sweep_argument("=1,2").is_err());
    assert!(parse_sweep_argument("x=").is_err());
}

/// Mixed value types within one argument are rejected
#[test]
fn test_sweep_from_arguments() {
    assert!(sweep_from_arguments(&[]).unwrap().is_none());

    let spec = sweep_from_arguments(&["a=1,2".to_string(), "b=3,4".to_string()])
        .unwrap()
        .unwrap();
    assert_eq!(spec.len(), 2);

    assert!(sweep_from_arguments(&["a=1,x".to_string()]).is_err());
}

/// Every model is listed with its submodels
#[test]
fn test_list_models() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("Plant.mo"),
        "package Plant\n  model Heater\n  end Heater;\n  model System\n    Plant.Heater heater;\n  end System;\nend Plant;\n",
    )
    .unwrap();

    let mut buffer = Vec::new();
    list_models(dir.path(), &mut buffer).unwrap();
    let text = output(buffer);

    assert!(text.contains("Plant.Heater\n"));
    assert!(text.contains("Plant.System\n    heater: Plant.Heater\n"));
}

/// A combinations sweep prints every point
#[test]
fn test_show_plan_combinations() {
    let dir = tempfile::tempdir().unwrap();
    let mut heater = ParamTable::new();
    heater.insert(
        "power".to_string(),
        ParamNode::Value(ParamValue::List(vec![ParamValue::Int(1), ParamValue::Int(2)])),
    );
    let mut sweep = ParamTable::new();
    sweep.insert("heater".to_string(), ParamNode::Table(heater));

    let mut config = SessionConfig::in_directory(dir.path());
    config.sweep = Some(sweep);
    config.sweep_mode = SweepMode::Combinations;

    let extra = sweep_from_arguments(&["pump.flow=5,6".to_string()]).unwrap();
    let mut buffer = Vec::new();
    let plan = show_plan(&config, extra, &mut buffer).unwrap();
    let text = output(buffer);

    assert_eq!(plan.iterations(), 4);
    assert!(text.starts_with("parameter sweep: 4 iterations\n"));
    assert!(text.contains("  0: heater.power=1, pump.flow=5\n"));
    assert!(text.contains("  3: heater.power=2, pump.flow=6\n"));
}

/// Without any sweep a single run is planned
#[test]
fn test_show_plan_single() {
    let dir = tempfile::tempdir().unwrap();
    let config = SessionConfig::in_directory(dir.path());

    let mut buffer = Vec::new();
    let plan = show_plan(&config, None, &mut buffer).unwrap();

    assert_eq!(plan, SweepPlan::Single);
    let text = output(buffer);
    assert!(text.starts_with("single run\nwarning: no .mat profiles in "));
}

/// The missing profile hint is only written for an empty profiles directory
#[test]
fn test_warn_missing_profiles() {
    let dir = tempfile::tempdir().unwrap();
    let config = SessionConfig::in_directory(dir.path());

    let mut buffer = Vec::new();
    assert!(warn_missing_profiles(&config, &mut buffer).unwrap());
    assert!(output(buffer).contains("models reading input profiles will fail"));

    fs::create_dir_all(&config.profiles_directory).unwrap();
    fs::write(config.profiles_directory.join("power.mat"), "data").unwrap();
    let mut buffer = Vec::new();
    assert!(!warn_missing_profiles(&config, &mut buffer).unwrap());
    assert!(buffer.is_empty());
}

/// A sweep argument replaces the configured values of the same name
#[test]
fn test_show_plan_matches_run_plan() {
    let dir = tempfile::tempdir().unwrap();
    let mut heater = ParamTable::new();
    heater.insert(
        "power".to_string(),
        ParamNode::Value(ParamValue::List(vec![ParamValue::Int(1), ParamValue::Int(2)])),
    );
    let mut sweep = ParamTable::new();
    sweep.insert("heater".to_string(), ParamNode::Table(heater));

    let mut config = SessionConfig::in_directory(dir.path());
    config.sweep = Some(sweep);

    let extra = sweep_from_arguments(&["heater.power=7,8,9".to_string()]).unwrap();
    let mut buffer = Vec::new();
    let plan = show_plan(&config, extra.clone(), &mut buffer).unwrap();
    let text = output(buffer);

    let profiles = ProfileSweep::discover(&config.profiles_directory).unwrap();
    assert_eq!(plan, plan_run(&config, extra, &profiles).unwrap());
    assert_eq!(plan.iterations(), 3);
    assert!(text.contains("  0: heater.power=7\n"));
    assert!(text.contains("  2: heater.power=9\n"));
    assert!(!text.contains("heater.power=1\n"));
}
