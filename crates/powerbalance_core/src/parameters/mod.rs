//! The parameter set: every modifiable parameter of a session.
//!
//! Parameters are loaded from one TOML file per root model. A file named
//! `tokamak_interdependencies.toml` holds the parameters of
//! `Tokamak.Interdependencies`, and each of its flattened keys is stored as
//! `tokamak.interdependencies.<key>`, lower-cased. Three distinguished files
//! in the same directory hold the simulation options, the plasma scenario and
//! optionally the structural parameters.
//!
//! Sub-modules:
//! - `translate` - Mapping between parameter names and engine variables
//! - `structural` - Compile-time substitution of structural parameters

mod structural;
mod translate;

pub use structural::{STRUCTURAL_MARKER, substitute_structural_parameters};
pub use translate::{TUNABLE_MARKER, engine_candidate_name, find_engine_variable};

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;

use crate::config::{PlasmaScenario, SessionConfig, SimulationOptions};
use crate::error::ParameterError;
use crate::utilities::{expand_dictionary, flatten_dictionary};
use crate::value::{ParamTable, ParamValue};

/// Extension of parameter files
pub const PARAMETER_EXTENSION: &str = "toml";

lazy_static! {
    static ref MAGNET_RE: Regex = Regex::new(r"magnetpf([0-9]+)").unwrap();
}

/// Structural parameters keyed by Modelica file stem, then parameter name
pub type StructuralParameters = IndexMap<String, IndexMap<String, ParamValue>>;

/// The distinguished input files of a parameters directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFile {
    SimulationOptions,
    PlasmaScenario,
    StructuralParameters,
}

#[derive(Debug, Clone)]
pub struct ParameterSet {
    parameters_directory: PathBuf,
    simulation_options_file: String,
    plasma_scenario_file: String,
    structural_params_file: Option<String>,
    model_param_files: Vec<PathBuf>,
    simulation_options: SimulationOptions,
    plasma_scenario: PlasmaScenario,
    structural_parameters: StructuralParameters,
    parameters: IndexMap<String, ParamValue>,
    non_modelica: Vec<String>,
}

impl ParameterSet {
    /// Load every input file named by a session configuration
    pub fn from_config(config: &SessionConfig) -> Result<Self, ParameterError> {
        check_distinguished_files(&config.distinguished_files())?;
        let mut set = Self {
            parameters_directory: config.parameters_directory.clone(),
            simulation_options_file: config.simulation_options_file.clone(),
            plasma_scenario_file: config.plasma_scenario_file.clone(),
            structural_params_file: config.structural_params_file.clone(),
            model_param_files: Vec::new(),
            simulation_options: SimulationOptions::default(),
            plasma_scenario: PlasmaScenario {
                plasma_ramp_up_start: 0,
                plasma_flat_top_start: 0,
                plasma_flat_top_end: 0,
                plasma_ramp_down_end: 0,
            },
            structural_parameters: StructuralParameters::new(),
            parameters: IndexMap::new(),
            non_modelica: Vec::new(),
        };
        set.reload()?;
        Ok(set)
    }

    /// Replace the contents of the set with the files of another directory
    pub fn load_from_directory(&mut self, dir: &Path) -> Result<(), ParameterError> {
        self.parameters_directory = dir.to_path_buf();
        self.reload()
    }

    fn reload(&mut self) -> Result<(), ParameterError> {
        if !self.parameters_directory.is_dir() {
            return Err(ParameterError::NotFound(self.parameters_directory.clone()));
        }

        self.simulation_options = self.load_simulation_options()?;
        self.plasma_scenario = self.load_plasma_scenario()?;
        self.structural_parameters = self.load_structural_parameters()?;
        self.load_modelica_parameters()?;

        tracing::info!(
            parameters = self.parameters.len(),
            files = self.model_param_files.len(),
            "loaded parameter set from {}",
            self.parameters_directory.display()
        );
        Ok(())
    }

    fn load_simulation_options(&self) -> Result<SimulationOptions, ParameterError> {
        let path = self.required_file(&self.simulation_options_file)?;
        let options: SimulationOptions = read_toml(&path, "simulation options")?;
        options.validate()?;
        Ok(options)
    }

    fn load_plasma_scenario(&self) -> Result<PlasmaScenario, ParameterError> {
        let path = self.required_file(&self.plasma_scenario_file)?;
        let scenario: PlasmaScenario = read_toml(&path, "plasma scenario")?;
        scenario.validate()?;
        scenario.validate_within(&self.simulation_options)?;
        Ok(scenario)
    }

    fn load_structural_parameters(&self) -> Result<StructuralParameters, ParameterError> {
        match &self.structural_params_file {
            Some(file) => {
                let path = self.required_file(file)?;
                read_toml(&path, "structural parameters")
            }
            None => Ok(StructuralParameters::new()),
        }
    }

    fn load_modelica_parameters(&mut self) -> Result<(), ParameterError> {
        let distinguished: Vec<&str> = [
            Some(self.simulation_options_file.as_str()),
            Some(self.plasma_scenario_file.as_str()),
            self.structural_params_file.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect();

        let mut files: Vec<PathBuf> = fs::read_dir(&self.parameters_directory)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path.extension().is_some_and(|ext| ext == PARAMETER_EXTENSION)
                    && path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| !distinguished.contains(&n))
            })
            .collect();
        files.sort();

        let mut parameters = IndexMap::new();
        for file in &files {
            let prefix = model_prefix(file);
            let content = fs::read_to_string(file)?;
            let table: ParamTable =
                toml::from_str(&content).map_err(|e| ParameterError::Parse {
                    path: file.clone(),
                    message: e.to_string(),
                })?;
            for (key, value) in flatten_dictionary(&table) {
                let label = format!("{prefix}.{}", key.to_lowercase());
                if parameters.insert(label.clone(), value).is_some() {
                    tracing::debug!("parameter '{label}' redefined by {}", file.display());
                }
            }
        }

        self.model_param_files = files;
        self.parameters = parameters;
        self.non_modelica.clear();
        Ok(())
    }

    fn required_file(&self, file: &str) -> Result<PathBuf, ParameterError> {
        let path = self.parameters_directory.join(file);
        if path.is_file() {
            Ok(path)
        } else {
            Err(ParameterError::NotFound(path))
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn parameters_directory(&self) -> &Path {
        &self.parameters_directory
    }

    /// Path of a distinguished input file, `None` for an unconfigured
    /// structural parameters file
    pub fn get_file_location(&self, file: InputFile) -> Option<PathBuf> {
        let name = match file {
            InputFile::SimulationOptions => Some(&self.simulation_options_file),
            InputFile::PlasmaScenario => Some(&self.plasma_scenario_file),
            InputFile::StructuralParameters => self.structural_params_file.as_ref(),
        };
        name.map(|n| self.parameters_directory.join(n))
    }

    pub fn model_parameter_files(&self) -> &[PathBuf] {
        &self.model_param_files
    }

    pub fn simulation_options(&self) -> &SimulationOptions {
        &self.simulation_options
    }

    pub fn get_simulation_options(&self, name: &str) -> Result<ParamValue, ParameterError> {
        let mut values = self.simulation_options.as_values();
        let available: Vec<String> = values.keys().cloned().collect();
        values
            .shift_remove(name)
            .ok_or_else(|| ParameterError::UnidentifiedParameter {
                name: name.to_string(),
                available,
            })
    }

    pub fn plasma_scenario(&self) -> &PlasmaScenario {
        &self.plasma_scenario
    }

    pub fn get_plasma_scenario(&self, name: &str) -> Result<i64, ParameterError> {
        self.plasma_scenario
            .get(name)
            .ok_or_else(|| ParameterError::UnidentifiedParameter {
                name: name.to_string(),
                available: PlasmaScenario::NAMES.iter().map(|n| n.to_string()).collect(),
            })
    }

    pub fn structural_parameters(&self) -> &StructuralParameters {
        &self.structural_parameters
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.parameters.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.parameters.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parameters.contains_key(&name.to_lowercase())
    }

    /// Names containing `term`, ignoring case
    pub fn search(&self, term: &str) -> Vec<String> {
        let term = term.to_lowercase();
        self.parameters
            .keys()
            .filter(|k| k.contains(&term))
            .cloned()
            .collect()
    }

    // ========================================================================
    // Lookup and assignment
    // ========================================================================

    /// Key under which `name` is stored, trying the PF magnet fallback when
    /// the exact name is unknown
    fn resolve(&self, name: &str) -> Option<String> {
        let lower = name.to_lowercase();
        if self.parameters.contains_key(&lower) {
            return Some(lower);
        }
        magnet_fallback(&lower).filter(|fallback| self.parameters.contains_key(fallback))
    }

    fn unidentified(&self, name: &str) -> ParameterError {
        ParameterError::UnidentifiedParameter {
            name: name.to_string(),
            available: self.parameters.keys().cloned().collect(),
        }
    }

    /// Value of a parameter.
    ///
    /// Names are case-insensitive. A PF magnet without its own entry reads the
    /// value of `magnetpf1`.
    pub fn get_parameter(&self, name: &str) -> Result<&ParamValue, ParameterError> {
        self.resolve(name)
            .and_then(|key| self.parameters.get(&key))
            .ok_or_else(|| self.unidentified(name))
    }

    /// Assign a parameter.
    ///
    /// Unknown PF magnets are accepted when `magnetpf1` exists and are stored
    /// under the requested name. Non-Modelica parameters are stored as given.
    pub fn set_parameter(&mut self, name: &str, value: ParamValue) -> Result<(), ParameterError> {
        let lower = name.to_lowercase();
        if self.is_valid_non_modelica_param(&lower) || self.resolve(&lower).is_some() {
            tracing::debug!("setting parameter '{lower}' to {value}");
            self.parameters.insert(lower, value);
            Ok(())
        } else {
            Err(self.unidentified(name))
        }
    }

    /// Add a parameter without any name resolution
    pub fn append(&mut self, name: &str, value: ParamValue) {
        self.parameters.insert(name.to_lowercase(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<ParamValue> {
        let lower = name.to_lowercase();
        self.non_modelica.retain(|n| n != &lower);
        self.parameters.shift_remove(&lower)
    }

    /// Track a parameter that has no counterpart in the engine
    pub fn add_non_modelica_parameter(&mut self, name: &str, value: ParamValue) {
        let lower = name.to_lowercase();
        if !self.non_modelica.contains(&lower) {
            self.non_modelica.push(lower.clone());
        }
        self.parameters.insert(lower, value);
    }

    pub fn is_valid_non_modelica_param(&self, name: &str) -> bool {
        self.non_modelica.contains(&name.to_lowercase())
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Write the set back out as one TOML file per model plus the
    /// distinguished files
    pub fn save_to_directory(&self, dir: &Path) -> Result<(), ParameterError> {
        fs::create_dir_all(dir)?;

        let prefixes: Vec<(String, &PathBuf)> = self
            .model_param_files
            .iter()
            .map(|f| (model_prefix(f), f))
            .collect();
        let mut per_file: IndexMap<&PathBuf, IndexMap<String, ParamValue>> =
            prefixes.iter().map(|(_, f)| (*f, IndexMap::new())).collect();

        for (name, value) in &self.parameters {
            match prefixes.iter().find(|(prefix, _)| name.contains(prefix.as_str())) {
                Some((prefix, file)) => {
                    let stripped = name.replace(&format!("{prefix}."), "");
                    if let Some(entries) = per_file.get_mut(file) {
                        entries.insert(stripped, value.coerce());
                    }
                }
                None => tracing::debug!("parameter '{name}' has no owning file, not saved"),
            }
        }

        for (file, entries) in per_file {
            let Some(file_name) = file.file_name() else {
                continue;
            };
            write_toml(&dir.join(file_name), &expand_dictionary(&entries))?;
        }

        write_toml(&dir.join(&self.simulation_options_file), &self.simulation_options)?;
        write_toml(&dir.join(&self.plasma_scenario_file), &self.plasma_scenario)?;
        if let Some(file) = &self.structural_params_file {
            write_toml(&dir.join(file), &self.structural_parameters)?;
        }

        tracing::info!("saved parameter set to {}", dir.display());
        Ok(())
    }
}

/// Lower-cased model name a parameter file belongs to,
/// `tokamak_interdependencies.toml` giving `tokamak.interdependencies`
pub fn model_prefix(file: &Path) -> String {
    let stem = file
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.split('.').next())
        .unwrap_or_default();
    stem.replace('_', ".").to_lowercase()
}

/// `…magnetpfN…` rewritten to `…magnetpf1…`
/// The distinguished files must be distinct `.toml` files
fn check_distinguished_files(files: &[&str]) -> Result<(), ParameterError> {
    for (i, file) in files.iter().enumerate() {
        if Path::new(file).extension().is_none_or(|ext| ext != PARAMETER_EXTENSION) {
            return Err(ParameterError::InvalidConfiguration(format!(
                "input file '{file}' is not a .{PARAMETER_EXTENSION} file"
            )));
        }
        if files[..i].contains(file) {
            return Err(ParameterError::InvalidConfiguration(format!(
                "input file '{file}' is named more than once"
            )));
        }
    }
    Ok(())
}

fn magnet_fallback(name: &str) -> Option<String> {
    let found = MAGNET_RE.find(name)?;
    Some(format!(
        "{}magnetpf1{}",
        &name[..found.start()],
        &name[found.end()..]
    ))
}

fn read_toml<T: serde::de::DeserializeOwned>(path: &Path, label: &str) -> Result<T, ParameterError> {
    let content = fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| ParameterError::Validation {
        label: format!("{label} ({})", path.display()),
        issues: vec![e.to_string()],
    })
}

fn write_toml<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), ParameterError> {
    let content = toml::to_string(value).map_err(|e| ParameterError::Serialize(e.to_string()))?;
    fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_prefix_from_file_name() {
        assert_eq!(
            model_prefix(Path::new("/p/Tokamak_Interdependencies.toml")),
            "tokamak.interdependencies"
        );
    }

    #[test]
    fn magnet_fallback_rewrites_index() {
        assert_eq!(
            magnet_fallback("m.magnetpf9.maxcurrent").as_deref(),
            Some("m.magnetpf1.maxcurrent")
        );
        assert_eq!(magnet_fallback("m.heater.power"), None);
    }
}
