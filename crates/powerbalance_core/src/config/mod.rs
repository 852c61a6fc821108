//! Session configuration
//!
//! A session is described by a YAML document naming the models to run, the
//! input directories and the optional sweep. Relative paths are resolved
//! against the directory holding the configuration file.

mod options;

pub use options::{MIN_POSITIVE_FLOAT, PlasmaScenario, SimulationOptions, Solver, StepSize};

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::sweep::{SweepMode, SweepSpec};
use crate::value::ParamTable;

/// Default name of the simulation options file
pub const DEFAULT_SIMULATION_OPTIONS_FILE: &str = "simulation_options.toml";
/// Default name of the plasma scenario file
pub const DEFAULT_PLASMA_SCENARIO_FILE: &str = "plasma.toml";

fn default_simulation_options_file() -> String {
    DEFAULT_SIMULATION_OPTIONS_FILE.to_string()
}

fn default_plasma_scenario_file() -> String {
    DEFAULT_PLASMA_SCENARIO_FILE.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Root models to simulate. Empty means every compiled model.
    #[serde(default)]
    pub models: Vec<String>,
    pub modelica_file_directory: PathBuf,
    pub parameters_directory: PathBuf,
    pub profiles_directory: PathBuf,
    #[serde(default = "default_simulation_options_file")]
    pub simulation_options_file: String,
    #[serde(default = "default_plasma_scenario_file")]
    pub plasma_scenario_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structural_params_file: Option<String>,
    #[serde(default)]
    pub sweep_mode: SweepMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sweep: Option<ParamTable>,
}

impl SessionConfig {
    /// Configuration rooted at a single directory using the conventional
    /// `Modelica`, `parameters` and `profiles` sub-directories
    pub fn in_directory(root: &Path) -> Self {
        Self {
            models: Vec::new(),
            modelica_file_directory: root.join("Modelica"),
            parameters_directory: root.join("parameters"),
            profiles_directory: root.join("profiles"),
            simulation_options_file: default_simulation_options_file(),
            plasma_scenario_file: default_plasma_scenario_file(),
            structural_params_file: None,
            sweep_mode: SweepMode::Set,
            sweep: None,
        }
    }

    pub fn from_yaml_str(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        serde_saphyr::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let mut config = Self::from_yaml_str(&content, path)?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded session configuration");
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_saphyr::to_string(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let yaml = self.to_yaml()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp_path = path.with_extension("yaml.tmp");
        fs::write(&temp_path, yaml)?;
        fs::rename(&temp_path, path)?;
        Ok(())
    }

    pub fn resolve_relative_to(&mut self, base: &Path) {
        for dir in [
            &mut self.modelica_file_directory,
            &mut self.parameters_directory,
            &mut self.profiles_directory,
        ] {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
    }

    /// Check structural constraints that do not need the filesystem
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut issues = Vec::new();

        for (label, file) in [
            ("simulation_options_file", Some(&self.simulation_options_file)),
            ("plasma_scenario_file", Some(&self.plasma_scenario_file)),
            ("structural_params_file", self.structural_params_file.as_ref()),
        ] {
            match file {
                Some(file) if !file.ends_with(".toml") => {
                    issues.push(format!("{label} '{file}' must be a TOML file"));
                }
                _ => {}
            }
        }
        let files = self.distinguished_files();
        for (i, file) in files.iter().enumerate() {
            if files[..i].contains(file) {
                issues.push(format!("input file '{file}' is named more than once"));
            }
        }
        if self.models.iter().any(|m| m.trim().is_empty()) {
            issues.push("model names must not be empty".to_string());
        }
        if let Err(e) = self.sweep_spec() {
            issues.push(e.to_string());
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid {
                label: "session configuration".to_string(),
                issues,
            })
        }
    }

    /// The flattened sweep, if one is configured and non-empty
    pub fn sweep_spec(&self) -> Result<Option<SweepSpec>, ConfigError> {
        match &self.sweep {
            Some(table) => {
                let spec = SweepSpec::from_table(table)?;
                Ok((!spec.is_empty()).then_some(spec))
            }
            None => Ok(None),
        }
    }

    /// The configured sweep merged with `extra`, which wins on name clashes
    pub fn effective_sweep(&self, extra: Option<SweepSpec>) -> Result<Option<SweepSpec>, ConfigError> {
        Ok(match (self.sweep_spec()?, extra) {
            (Some(mut spec), Some(extra)) => {
                spec.extend(extra);
                Some(spec)
            }
            (configured, extra) => configured.or(extra),
        })
    }

    /// Names of the files in the parameters directory that are not model
    /// parameter files
    pub fn distinguished_files(&self) -> Vec<&str> {
        let mut files = vec![
            self.simulation_options_file.as_str(),
            self.plasma_scenario_file.as_str(),
        ];
        if let Some(structural) = &self.structural_params_file {
            files.push(structural);
        }
        files
    }
}
