//! Tests for the parameter set
//!
//! These tests verify:
//! - Loading model parameter files and the distinguished files
//! - Name resolution, including the PF magnet fallback
//! - Validation of the plasma scenario
//! - Saving and reloading a parameter set
//! - Structural substitution into Modelica sources

use std::fs;

use crate::config::SessionConfig;
use crate::environment::Environment;
use crate::error::ParameterError;
use crate::parameters::{InputFile, ParameterSet};
use crate::value::ParamValue;

use super::fixtures::{PLANT_MODEL, parameter_dir, write};

fn load(dir: &tempfile::TempDir) -> Result<ParameterSet, ParameterError> {
    ParameterSet::from_config(&SessionConfig::in_directory(dir.path()))
}

/// Model files are flattened and prefixed with the model name
#[test]
fn test_loads_demo_parameters() {
    let dir = parameter_dir(&[("demo.toml", "alpha = 1.5\n")]);
    let set = load(&dir).unwrap();

    assert_eq!(set.get_parameter("demo.alpha").unwrap(), &ParamValue::Float(1.5));
    assert_eq!(set.get_parameter("DEMO.Alpha").unwrap(), &ParamValue::Float(1.5));
    assert_eq!(set.get_simulation_options("stopTime").unwrap(), ParamValue::Int(10));
    assert_eq!(set.get_plasma_scenario("plasma_flat_top_end").unwrap(), 6);
    assert_eq!(set.len(), 1);
}

/// Nested tables become dotted keys and underscores in file names become dots
#[test]
fn test_nested_tables_are_flattened() {
    let dir = parameter_dir(&[(
        "tokamak_interdependencies.toml",
        "[magnetpower.magnetpf1]\nmaxcurrent = 5\n[heating]\nNBIPower = 2.5\n",
    )]);
    let set = load(&dir).unwrap();

    let mut keys: Vec<&str> = set.keys().collect();
    keys.sort();
    assert_eq!(
        keys,
        vec![
            "tokamak.interdependencies.heating.nbipower",
            "tokamak.interdependencies.magnetpower.magnetpf1.maxcurrent",
        ]
    );
}

/// A later file silently overwrites a parameter defined by an earlier one
#[test]
fn test_collisions_keep_last_file() {
    let dir = parameter_dir(&[("a.toml", "[b]\nx = 1\n"), ("a_b.toml", "x = 2\n")]);
    let set = load(&dir).unwrap();

    assert_eq!(set.get_parameter("a.b.x").unwrap(), &ParamValue::Int(2));
    assert_eq!(set.len(), 1);
}

/// Unknown PF magnets read the values of magnet 1
#[test]
fn test_magnet_fallback_resolution() {
    let dir = parameter_dir(&[("tokamak.toml", "[magnetpf1]\nmaxcurrent = 5\n")]);
    let mut set = load(&dir).unwrap();

    assert_eq!(
        set.get_parameter("tokamak.magnetpf9.maxcurrent").unwrap(),
        &ParamValue::Int(5)
    );
    assert!(matches!(
        set.get_parameter("tokamak.heating.power"),
        Err(ParameterError::UnidentifiedParameter { .. })
    ));

    set.set_parameter("tokamak.magnetpf9.maxcurrent", ParamValue::Int(7))
        .unwrap();
    assert_eq!(
        set.get_parameter("tokamak.magnetpf9.maxcurrent").unwrap(),
        &ParamValue::Int(7)
    );
    assert_eq!(
        set.get_parameter("tokamak.magnetpf1.maxcurrent").unwrap(),
        &ParamValue::Int(5)
    );
}

/// Setting an unknown parameter fails and lists the known ones
#[test]
fn test_unknown_parameter_lists_alternatives() {
    let dir = parameter_dir(&[("demo.toml", "alpha = 1.5\n")]);
    let mut set = load(&dir).unwrap();

    match set.set_parameter("demo.beta", ParamValue::Int(1)) {
        Err(ParameterError::UnidentifiedParameter { name, available }) => {
            assert_eq!(name, "demo.beta");
            assert_eq!(available, vec!["demo.alpha".to_string()]);
        }
        other => panic!("expected UnidentifiedParameter, got {other:?}"),
    }
}

/// Non-Modelica parameters bypass name resolution
#[test]
fn test_non_modelica_parameters() {
    let dir = parameter_dir(&[("demo.toml", "alpha = 1.5\n")]);
    let mut set = load(&dir).unwrap();

    set.add_non_modelica_parameter("demo.Template", ParamValue::Int(2));
    assert!(set.is_valid_non_modelica_param("demo.template"));
    set.set_parameter("demo.template", ParamValue::Int(3)).unwrap();
    assert_eq!(set.get_parameter("demo.template").unwrap(), &ParamValue::Int(3));

    set.remove("demo.template");
    assert!(!set.is_valid_non_modelica_param("demo.template"));
}

/// Out of order plasma phases are rejected when loading
#[test]
fn test_rejects_unordered_plasma_scenario() {
    let dir = parameter_dir(&[("demo.toml", "alpha = 1.5\n")]);
    write(
        &dir.path().join("parameters").join("plasma.toml"),
        "plasma_ramp_up_start = 2\nplasma_flat_top_start = 4\nplasma_flat_top_end = 8\nplasma_ramp_down_end = 6\n",
    );

    assert!(matches!(load(&dir), Err(ParameterError::Validation { .. })));
}

/// Unknown simulation options are a validation failure
#[test]
fn test_rejects_unknown_simulation_option() {
    let dir = parameter_dir(&[]);
    write(
        &dir.path().join("parameters").join("simulation_options.toml"),
        "startTime = 0\nstopTime = 10\nstepSize = 1\nsolver = \"dassl\"\ntolerance = 1e-6\nfoo = 1\n",
    );

    assert!(matches!(load(&dir), Err(ParameterError::Validation { .. })));
}

/// A missing parameters directory is reported with its path
#[test]
fn test_missing_directory_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    match load(&dir) {
        Err(ParameterError::NotFound(path)) => assert!(path.ends_with("parameters")),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

/// Saving and loading a set reproduces its values
#[test]
fn test_save_and_reload() {
    let dir = parameter_dir(&[(
        "tokamak_interdependencies.toml",
        "[magnetpower]\nmaxcurrent = 5\nenabled = true\nname = \"pf\"\n",
    )]);
    let mut set = load(&dir).unwrap();
    set.set_parameter(
        "tokamak.interdependencies.magnetpower.maxcurrent",
        ParamValue::Float(6.5),
    )
    .unwrap();

    let out = tempfile::tempdir().unwrap();
    set.save_to_directory(out.path()).unwrap();
    assert!(out.path().join("simulation_options.toml").is_file());
    assert!(out.path().join("plasma.toml").is_file());

    let mut reloaded = set.clone();
    reloaded.load_from_directory(out.path()).unwrap();
    assert_eq!(reloaded.len(), set.len());
    for (name, value) in set.iter() {
        assert_eq!(reloaded.get_parameter(name).unwrap(), value, "{name}");
    }
    assert_eq!(reloaded.simulation_options(), set.simulation_options());
    assert_eq!(reloaded.parameters_directory(), out.path());
}

/// File locations resolve inside the parameters directory
#[test]
fn test_file_locations() {
    let dir = parameter_dir(&[]);
    let set = load(&dir).unwrap();

    assert_eq!(
        set.get_file_location(InputFile::PlasmaScenario).unwrap(),
        dir.path().join("parameters").join("plasma.toml")
    );
    assert_eq!(set.get_file_location(InputFile::StructuralParameters), None);
}

/// Without a structural parameters file nothing is written
#[test]
fn test_structural_without_file_creates_nothing() {
    let dir = parameter_dir(&[]);
    write(&dir.path().join("Modelica").join("Plant.mo"), PLANT_MODEL);
    let set = load(&dir).unwrap();
    let mut environment = Environment::new();

    let rewritten = set
        .set_struct_parameters(&mut environment, &dir.path().join("Modelica").join("Plant.mo"), &[])
        .unwrap();

    assert_eq!(rewritten, None);
    assert_eq!(environment.scratch_count(), 0);
}

/// Structural values for other models leave the sources in place
#[test]
fn test_structural_for_other_model_creates_nothing() {
    let dir = parameter_dir(&[]);
    write(
        &dir.path().join("parameters").join("structural.toml"),
        "[magnets]
nPF = 8
",
    );
    let source = dir.path().join("Modelica").join("Plant.mo");
    write(&source, PLANT_MODEL);

    let mut config = SessionConfig::in_directory(dir.path());
    config.structural_params_file = Some("structural.toml".to_string());
    let set = ParameterSet::from_config(&config).unwrap();
    let mut environment = Environment::new();

    let rewritten = set.set_struct_parameters(&mut environment, &source, &[]).unwrap();

    assert_eq!(rewritten, None);
    assert_eq!(environment.scratch_count(), 0);
}

/// Structural values are written into a scratch copy of the source
#[test]
fn test_structural_substitution_into_copy() {
    let dir = parameter_dir(&[]);
    write(
        &dir.path().join("parameters").join("structural.toml"),
        "[plant]\nnHeaters = 3\n",
    );
    let source = dir.path().join("Modelica").join("Plant.mo");
    write(
        &source,
        "model Plant\n  parameter Integer nHeaters = 1 \"STRUCTURAL_PARAMETER\";\nend Plant;\n",
    );
    let dependency = dir.path().join("Modelica").join("Other.mo");
    write(&dependency, "model Other\nend Other;\n");

    let mut config = SessionConfig::in_directory(dir.path());
    config.structural_params_file = Some("structural.toml".to_string());
    let set = ParameterSet::from_config(&config).unwrap();
    let mut environment = Environment::new();

    let rewritten = set
        .set_struct_parameters(&mut environment, &source, std::slice::from_ref(&dependency))
        .unwrap()
        .unwrap();

    let text = fs::read_to_string(&rewritten).unwrap();
    assert!(text.contains("parameter Integer nHeaters = 3;"));
    assert!(rewritten.with_file_name("Other.mo").is_file());
    assert!(fs::read_to_string(&source).unwrap().contains("nHeaters = 1"));
    assert_eq!(environment.scratch_count(), 1);
}

/// A configured but missing structural parameters file is reported
#[test]
fn test_missing_structural_file() {
    let dir = parameter_dir(&[]);
    let mut config = SessionConfig::in_directory(dir.path());
    config.structural_params_file = Some("structural.toml".to_string());

    assert!(matches!(
        ParameterSet::from_config(&config),
        Err(ParameterError::NotFound(_))
    ));
}

/// Input files must be distinct TOML files
#[test]
fn test_rejects_clashing_input_files() {
    let dir = parameter_dir(&[]);
    let mut config = SessionConfig::in_directory(dir.path());
    config.structural_params_file = Some(config.plasma_scenario_file.clone());
    assert!(matches!(
        ParameterSet::from_config(&config),
        Err(ParameterError::InvalidConfiguration(_))
    ));

    let mut config = SessionConfig::in_directory(dir.path());
    config.simulation_options_file = "simulation_options.yaml".to_string();
    assert!(matches!(
        ParameterSet::from_config(&config),
        Err(ParameterError::InvalidConfiguration(_))
    ));
}
