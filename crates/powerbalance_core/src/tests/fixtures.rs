//! On-disk session fixtures
//!
//! Every fixture lives in its own temporary directory laid out the way
//! [`SessionConfig::in_directory`] expects.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use crate::config::SessionConfig;
use crate::value::ParamValue;

use super::fake_engine::FakeEngine;

pub const PLANT_MODEL: &str = "\
package Plant
  model Heater
    parameter Real __power = 1.0;
    parameter Real __efficiency = 0.5;
  end Heater;
  model System
    Plant.Heater heater;
  end System;
end Plant;
";

pub const SIMULATION_OPTIONS: &str = "\
startTime = 0
stopTime = 10
stepSize = 1
solver = \"dassl\"
tolerance = 1e-6
";

pub const PLASMA_SCENARIO: &str = "\
plasma_ramp_up_start = 2
plasma_flat_top_start = 4
plasma_flat_top_end = 6
plasma_ramp_down_end = 8
";

pub fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// A parameters directory holding the two distinguished files and the
/// given model parameter files
pub fn parameter_dir(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let params = dir.path().join("parameters");
    write(&params.join("simulation_options.toml"), SIMULATION_OPTIONS);
    write(&params.join("plasma.toml"), PLASMA_SCENARIO);
    for (name, content) in files {
        write(&params.join(name), content);
    }
    dir
}

/// A complete session directory for the `Plant.System` model
pub fn plant_session() -> (TempDir, SessionConfig) {
    let dir = parameter_dir(&[(
        "plant_system.toml",
        "[heater]\npower = 2.0\nghost = 3\n",
    )]);
    write(&dir.path().join("Modelica").join("Plant.mo"), PLANT_MODEL);
    write(&dir.path().join("profiles").join("power.mat"), "canonical");

    let mut config = SessionConfig::in_directory(dir.path());
    config.models = vec!["Plant.System".to_string()];
    (dir, config)
}

/// Engine declaring the variables of `Plant.System`
pub fn plant_engine() -> FakeEngine {
    FakeEngine::new().with_model(
        "Plant.System",
        &[
            ("heater.__power", ParamValue::Float(1.0)),
            ("heater.__efficiency", ParamValue::Float(0.5)),
            ("heater.powerDataPath", ParamValue::from("power.mat")),
        ],
    )
}
