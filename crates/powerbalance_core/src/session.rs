//! The power balance session.
//!
//! [`PowerBalance`] ties the pieces together: it loads the parameter set,
//! extends the Magnets model when more PF magnets are requested, compiles the
//! models through a [`SimulationEngine`], pushes parameters and simulation
//! options into them and finally runs single simulations or sweeps, collecting
//! one [`ResultTable`] per model.
//!
//! Runs are strictly sequential. Profile swapping mutates the canonical
//! profile files and the engine holds a single parameter state, so each
//! iteration depends on the one before it.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use indexmap::map::Entry;
use serde::Serialize;

use crate::config::SessionConfig;
use crate::engine::SimulationEngine;
use crate::environment::Environment;
use crate::error::{ModelError, ParameterError, SessionError, SessionResult};
use crate::models::{CompileContext, Model, extract_models_from_file, get_local_models, modelica_files};
use crate::parameters::{ParameterSet, TUNABLE_MARKER, find_engine_variable};
use crate::results::ResultTable;
use crate::sweep::{Combination, PROFILE_EXTENSION, ProfileSweep, SweepPlan, SweepSpec, profile_files};
use crate::templating::{generate_pf_magnets, requires_model_extension};
use crate::value::ParamValue;

/// Name of the Modelica file holding the Magnets model and its template block
pub const MAGNETS_MODEL_FILE: &str = "Magnets.mo";

/// Engine variables holding input file paths contain `path` and one of these
const INPUT_PATH_KINDS: [&str; 2] = ["currentdata", "powerdata"];

/// The plan a run of `configuration` executes when given `extra`.
///
/// `extra` is merged over the configured sweep before the plan is built.
pub fn plan_run(
    configuration: &SessionConfig,
    extra: Option<SweepSpec>,
    profiles: &ProfileSweep,
) -> SessionResult<SweepPlan> {
    let spec = configuration.effective_sweep(extra)?;
    Ok(SweepPlan::build(spec.as_ref(), configuration.sweep_mode, profiles)?)
}

/// Metadata stored alongside the results of a run
#[derive(Debug, Serialize)]
struct RunMetadata<'a> {
    version: &'static str,
    time: &'a str,
    models: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SessionData<'a> {
    metadata: RunMetadata<'a>,
    results: IndexMap<String, &'a ResultTable>,
}

/// A configured session bound to one simulation engine
pub struct PowerBalance<E: SimulationEngine> {
    configuration: SessionConfig,
    engine: E,
    environment: Environment,
    parameter_set: ParameterSet,
    models: IndexMap<String, Model>,
    profile_sweep: ProfileSweep,
    power_data: IndexMap<String, ResultTable>,
    time_stamp: String,
    time_now: String,
}

impl<E: SimulationEngine> PowerBalance<E> {
    /// Load every input, compile the models and apply the parameter set.
    ///
    /// Fails before any model is compiled when the configuration, the
    /// parameter files or the profile names are invalid.
    pub fn new(configuration: SessionConfig, engine: E) -> SessionResult<Self> {
        configuration.validate()?;

        let now = jiff::Zoned::now();
        let time_stamp = now.strftime("%Y_%m_%d_%H_%M_%S").to_string();
        let time_now = now.strftime("%d/%m/%Y %H:%M:%S").to_string();

        let profiles_directory = &configuration.profiles_directory;
        if !profiles_directory.exists() {
            tracing::info!("creating profiles directory {}", profiles_directory.display());
            fs::create_dir_all(profiles_directory)?;
        }
        let profile_sweep = ProfileSweep::discover(profiles_directory)?;
        if profile_files(profiles_directory)?.is_empty() {
            tracing::warn!(
                "no .{PROFILE_EXTENSION} profiles found in {}, models reading profiles will fail",
                profiles_directory.display()
            );
        }

        let parameter_set = ParameterSet::from_config(&configuration)?;

        let mut session = Self {
            configuration,
            engine,
            environment: Environment::new(),
            parameter_set,
            models: IndexMap::new(),
            profile_sweep,
            power_data: IndexMap::new(),
            time_stamp,
            time_now,
        };

        session.check_for_model_mods()?;
        session.read_models_from_directory()?;
        Ok(session)
    }

    // ========================================================================
    // Setup
    // ========================================================================

    /// Replace the model directory with an extended copy when the parameter
    /// set declares more PF magnets than the stock Magnets model.
    ///
    /// Returns whether the model directory was replaced.
    fn check_for_model_mods(&mut self) -> SessionResult<bool> {
        if !requires_model_extension(&self.parameter_set) {
            return Ok(false);
        }
        tracing::debug!("additional PF magnets specified, extending the Magnets model");

        let source_dir = self.configuration.modelica_file_directory.clone();
        let template_path = source_dir.join(MAGNETS_MODEL_FILE);
        if !template_path.is_file() {
            return Err(ModelError::NotFound(template_path).into());
        }

        let model_dir = self.environment.scratch_dir("pbm_models_")?;
        for file in modelica_files(&source_dir)? {
            if let Some(name) = file.file_name() {
                fs::copy(&file, model_dir.join(name))?;
            }
        }
        let resources = source_dir.join("Resources").join("Include");
        if resources.is_dir() {
            copy_dir_all(&resources, &model_dir.join("Resources").join("Include"))?;
        }

        let template = fs::read_to_string(&template_path)?;
        let rendered = generate_pf_magnets(&mut self.parameter_set, &template)?;
        fs::write(model_dir.join(MAGNETS_MODEL_FILE), rendered)?;

        tracing::debug!("updated model input directory to {}", model_dir.display());
        self.configuration.modelica_file_directory = model_dir;
        Ok(true)
    }

    /// Compile the models of the model directory, then confirm the engine
    /// holds the values of the parameter set and the configured models exist
    pub fn read_models_from_directory(&mut self) -> SessionResult<()> {
        let model_dir = self.configuration.modelica_file_directory.clone();
        self.models = self.prepare_local_models(&model_dir)?;

        let tracked: Vec<String> = self
            .parameter_set
            .keys()
            .filter(|name| !self.parameter_set.is_valid_non_modelica_param(name))
            .map(str::to_string)
            .collect();
        for name in tracked {
            self.verify_parameter(&name)?;
        }

        self.check_model_names()
    }

    fn prepare_local_models(&mut self, model_dir: &Path) -> SessionResult<IndexMap<String, Model>> {
        if !model_dir.exists() {
            return Err(ModelError::NotFound(model_dir.to_path_buf()).into());
        }

        let models = {
            let mut ctx = CompileContext {
                engine: &mut self.engine,
                parameters: Some(&self.parameter_set),
                environment: &mut self.environment,
                allow_list: &self.configuration.models,
                profile_dir: Some(self.configuration.profiles_directory.as_path()),
            };
            get_local_models(model_dir, Some(&mut ctx))?
        };

        let roots: Vec<String> = models
            .values()
            .filter(|m| m.is_root())
            .map(|m| m.name.clone())
            .collect();
        if !roots.is_empty() {
            self.update_model_input_paths()?;
        }

        for model in &roots {
            tracing::info!(model = %model, "applying parameter values");
            // Parameters the model does not declare are dropped from the set
            self.parameter_set
                .set_model_parameters(&mut self.engine, model, true)?;
            self.apply_model_configuration(model)?;
            self.parameter_set.update_from_model(&self.engine, model)?;
        }

        Ok(models)
    }

    /// Point every input file variable of the built models at the profiles
    /// directory
    pub fn update_model_input_paths(&mut self) -> SessionResult<()> {
        let profiles_dir = self.configuration.profiles_directory.clone();

        for (name, variable) in self.engine.get_parameters(None)? {
            let lower = name.to_lowercase();
            if !lower.contains("path") || !INPUT_PATH_KINDS.iter().any(|kind| lower.contains(kind)) {
                continue;
            }
            let Some(ParamValue::Str(value)) = variable.value else {
                continue;
            };
            if Path::new(&value).starts_with(&profiles_dir) {
                continue;
            }
            let location = profiles_dir.join(&value);
            tracing::debug!(parameter = %name, "input path set to {}", location.display());
            self.engine
                .set_parameter(&name, &ParamValue::Str(location.display().to_string()))?;
        }
        Ok(())
    }

    /// Push the simulation options into a compiled model
    pub fn apply_model_configuration(&mut self, model: &str) -> SessionResult<()> {
        let options = self.parameter_set.simulation_options().as_values();
        tracing::debug!(
            model = %model,
            "applying simulation options: {}",
            options
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        for (option, value) in &options {
            self.engine.set_simulation_option(model, option, value)?;
        }
        Ok(())
    }

    fn check_model_names(&self) -> SessionResult<()> {
        if self.configuration.models.is_empty() {
            tracing::info!("no models selected in the configuration, all compiled models will run");
            return Ok(());
        }
        for name in &self.configuration.models {
            if !self.models.contains_key(name) {
                return Err(self.unknown_model(name));
            }
        }
        Ok(())
    }

    fn unknown_model(&self, name: &str) -> SessionError {
        SessionError::UnknownModel {
            name: name.to_string(),
            available: self.models.keys().cloned().collect(),
        }
    }

    // ========================================================================
    // Consistency checks
    // ========================================================================

    /// Check that the engine holds the value the parameter set has for a
    /// parameter.
    ///
    /// The check runs against the first compiled model whose name the
    /// parameter contains. Names the set does not know are retried with each
    /// compiled model name prepended. Returns the verified value, or `None`
    /// when no compiled model owns the parameter.
    pub fn verify_parameter(&self, name: &str) -> SessionResult<Option<ParamValue>> {
        let lower = name.to_lowercase();
        match self.parameter_set.get_parameter(&lower) {
            Ok(value) => {
                for model in self.compiled_models() {
                    if lower.contains(&model.to_lowercase()) {
                        self.check_against_engine(&model, &lower, value)?;
                        return Ok(Some(value.clone()));
                    }
                }
                Ok(None)
            }
            Err(ParameterError::UnidentifiedParameter { .. }) => self.fuzzy_verify(&lower),
            Err(e) => Err(e.into()),
        }
    }

    fn fuzzy_verify(&self, name: &str) -> SessionResult<Option<ParamValue>> {
        for model in self.compiled_models() {
            let qualified = format!("{}.{name}", model.to_lowercase());
            match self.parameter_set.get_parameter(&qualified) {
                Ok(value) => {
                    self.check_against_engine(&model, &qualified, value)?;
                    return Ok(Some(value.clone()));
                }
                Err(ParameterError::UnidentifiedParameter { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }

    fn check_against_engine(&self, model: &str, parameter: &str, value: &ParamValue) -> SessionResult<()> {
        let variable = find_engine_variable(&self.engine, model, parameter)?;
        let variables = self.engine.get_parameters(Some(model))?;
        let engine_value = variables.get(&variable).and_then(|v| v.value.as_ref());

        match engine_value {
            Some(engine_value) if engine_value.loosely_eq(value) => {
                tracing::debug!(parameter = %parameter, "engine and parameter set agree: {engine_value} == {value}");
                Ok(())
            }
            other => Err(ParameterError::Translation {
                name: parameter.to_string(),
                engine: other.map_or_else(|| "<unset>".to_string(), ToString::to_string),
                api: value.to_string(),
            }
            .into()),
        }
    }

    // ========================================================================
    // Models
    // ========================================================================

    /// Names of the models the engine produced a binary for
    pub fn compiled_models(&self) -> Vec<String> {
        self.models
            .values()
            .filter(|m| m.is_root())
            .map(|m| m.name.clone())
            .collect()
    }

    /// Models a run simulates: the configured list, or every compiled model
    /// when none are configured
    pub fn configured_models(&self) -> Vec<String> {
        if self.configuration.models.is_empty() {
            self.compiled_models()
        } else {
            self.configuration.models.clone()
        }
    }

    /// Read and compile models from another Modelica file.
    ///
    /// With an empty `names` every model in the file is compiled. Returns the
    /// names of the models added.
    pub fn add_models(&mut self, path: &Path, names: &[String]) -> SessionResult<Vec<String>> {
        if !path.exists() {
            return Err(ModelError::NotFound(path.to_path_buf()).into());
        }

        let found = {
            let mut ctx = CompileContext {
                engine: &mut self.engine,
                parameters: Some(&self.parameter_set),
                environment: &mut self.environment,
                allow_list: names,
                profile_dir: Some(self.configuration.profiles_directory.as_path()),
            };
            extract_models_from_file(path, Some(&mut ctx))?
        };
        if found.is_empty() {
            return Err(ModelError::InvalidArgument(format!(
                "file '{}' does not contain a recognised Modelica model",
                path.display()
            ))
            .into());
        }

        let added: Vec<String> = found.keys().cloned().collect();
        let compiled: Vec<String> = found
            .values()
            .filter(|m| m.is_root())
            .map(|m| m.name.clone())
            .collect();
        self.models.extend(found);

        for model in &compiled {
            self.parameter_set.update_from_model(&self.engine, model)?;
        }
        tracing::info!("added {} models from {}", added.len(), path.display());
        Ok(added)
    }

    /// Stop simulating models and forget their parameters
    pub fn remove_models(&mut self, names: &[String]) -> SessionResult<()> {
        for model in names {
            if !self.models.contains_key(model) {
                return Err(self.unknown_model(model));
            }
            self.configuration.models.retain(|m| m != model);

            let lower = model.to_lowercase();
            let owned: Vec<String> = self
                .parameter_set
                .keys()
                .filter(|name| name.contains(&lower))
                .map(str::to_string)
                .collect();
            for name in owned {
                self.parameter_set.remove(&name);
            }

            self.models.shift_remove(model);
            tracing::debug!(model = %model, "removed model");
        }
        Ok(())
    }

    // ========================================================================
    // Parameters
    // ========================================================================

    /// Every variable the engine declares for a model, keyed
    /// `<model>.<name>` with the tunable marker removed.
    ///
    /// Defaults to the first compiled model. Variables without a value are
    /// skipped unless `include_undefined` is set.
    pub fn get_parameters(
        &self,
        model: Option<&str>,
        include_undefined: bool,
    ) -> SessionResult<IndexMap<String, Option<ParamValue>>> {
        let model = match model {
            Some(model) => model.to_string(),
            None => self
                .models
                .values()
                .find(|m| m.compiled)
                .map(|m| m.name.clone())
                .ok_or_else(|| ModelError::Internal("no compiled models available".to_string()))?,
        };

        Ok(self
            .engine
            .get_parameters(Some(&model))?
            .into_iter()
            .filter(|(_, variable)| include_undefined || variable.has_value())
            .map(|(name, variable)| {
                (
                    format!("{model}.{}", name.replace(TUNABLE_MARKER, "")),
                    variable.value,
                )
            })
            .collect())
    }

    /// Names of every parameter a user may modify
    pub fn modifiable_parameters(&self) -> Vec<String> {
        self.parameter_set.keys().map(str::to_string).collect()
    }

    pub fn set_parameter_value(&mut self, name: &str, value: ParamValue) -> SessionResult<()> {
        self.parameter_set.set_parameter(name, value)?;
        Ok(())
    }

    /// Replace the parameter set with the files of another directory and
    /// apply them to the compiled models
    pub fn load_parameters(&mut self, dir: &Path) -> SessionResult<()> {
        if !dir.exists() {
            return Err(ParameterError::NotFound(dir.to_path_buf()).into());
        }
        self.parameter_set.load_from_directory(dir)?;
        self.configuration.parameters_directory = dir.to_path_buf();

        for model in self.compiled_models() {
            self.parameter_set
                .set_model_parameters(&mut self.engine, &model, true)?;
            self.apply_model_configuration(&model)?;
        }
        Ok(())
    }

    // ========================================================================
    // Running
    // ========================================================================

    /// Power table of a model from its latest solution
    pub fn get_power(&self, model: &str) -> SessionResult<ResultTable> {
        let record = self.models.get(model).ok_or_else(|| self.unknown_model(model))?;
        let solutions = self.engine.get_solutions()?;
        let solution = solutions.get(model).ok_or_else(|| SessionError::MissingSolution {
            model: model.to_string(),
        })?;
        let step_size = self.parameter_set.simulation_options().step_size.as_f64();
        ResultTable::from_solution(solution, record, step_size)
    }

    /// Simulate every configured model once, tagging the rows with `tags`
    fn run_models(&mut self, tags: Option<&Combination>) -> SessionResult<IndexMap<String, ResultTable>> {
        let mut tables = IndexMap::new();
        for model in self.configured_models() {
            tracing::info!(model = %model, "running simulation");
            self.engine.simulate(&model)?;
            let mut table = self.get_power(&model)?;
            if let Some(tags) = tags {
                for (name, value) in tags {
                    table.tag(name, value.clone());
                }
            }
            tables.insert(model, table);
        }
        Ok(tables)
    }

    fn absorb(&mut self, tables: IndexMap<String, ResultTable>) {
        for (model, table) in tables {
            match self.power_data.entry(model) {
                Entry::Occupied(mut existing) => existing.get_mut().append(table),
                Entry::Vacant(slot) => {
                    slot.insert(table);
                }
            }
        }
    }

    /// The plan a run with `extra` would execute
    pub fn plan(&self, extra: Option<SweepSpec>) -> SessionResult<SweepPlan> {
        plan_run(&self.configuration, extra, &self.profile_sweep)
    }

    /// Run the configured models, sweeping when a sweep is configured, given
    /// or implied by tagged profiles, then write the outputs under
    /// `output_dir`.
    ///
    /// Any failure aborts the run. Returns the output directory.
    pub fn run_simulation(&mut self, output_dir: &Path, sweep: Option<SweepSpec>) -> SessionResult<PathBuf> {
        let plan = self.plan(sweep)?;
        tracing::info!(iterations = plan.iterations(), "starting run");
        self.power_data.clear();

        match plan {
            SweepPlan::Single => {
                let tables = self.run_models(None)?;
                self.absorb(tables);
            }
            SweepPlan::ProfileOnly { iterations } => {
                for index in 0..iterations {
                    let tags = self.swap_profiles(index)?;
                    tracing::info!(iteration = index + 1, iterations, "profile sweep");
                    let tables = self.run_models(Some(&tags))?;
                    self.absorb(tables);
                }
            }
            SweepPlan::Parameter {
                combinations,
                swap_profiles,
            } => {
                let iterations = combinations.len();
                for (index, combination) in combinations.iter().enumerate() {
                    tracing::info!(iteration = index + 1, iterations, "parameter sweep");
                    for (name, value) in combination {
                        self.set_parameter_value(name, value.clone())?;
                    }
                    for model in self.compiled_models() {
                        self.parameter_set
                            .set_model_parameters(&mut self.engine, &model, false)?;
                    }

                    let mut tags = combination.clone();
                    if swap_profiles {
                        tags.extend(self.swap_profiles(index)?);
                    }

                    let tables = self.run_models(Some(&tags))?;
                    for name in combination.keys() {
                        self.verify_parameter(name)?;
                    }
                    self.absorb(tables);
                }
            }
        }

        if self.power_data.is_empty() {
            return Err(SessionError::NoPowerData);
        }
        self.write_outputs(output_dir)
    }

    fn swap_profiles(&self, index: usize) -> SessionResult<Combination> {
        Ok(self
            .profile_sweep
            .swap(index)?
            .into_iter()
            .map(|(name, value)| (name, ParamValue::Float(value)))
            .collect())
    }

    // ========================================================================
    // Outputs
    // ========================================================================

    /// Write the results, parameter set, configuration and profiles of the
    /// last run into `<output_dir>/pbm_results_<timestamp>`
    pub fn write_outputs(&self, output_dir: &Path) -> SessionResult<PathBuf> {
        if self.power_data.is_empty() {
            return Err(SessionError::NoPowerData);
        }

        let root = output_dir.join(format!("pbm_results_{}", self.time_stamp));
        let data_dir = root.join("data");
        fs::create_dir_all(&data_dir)?;

        let document = SessionData {
            metadata: RunMetadata {
                version: env!("CARGO_PKG_VERSION"),
                time: &self.time_now,
                models: self.power_data.keys().cloned().collect(),
            },
            results: self
                .power_data
                .iter()
                .map(|(model, table)| (output_key(model), table))
                .collect(),
        };
        let json = serde_json::to_string_pretty(&document).map_err(|e| SessionError::Serialize(e.to_string()))?;
        let data_file = data_dir.join("session_data.json");
        let temp_path = data_file.with_extension("json.tmp");
        fs::write(&temp_path, json)?;
        fs::rename(&temp_path, &data_file)?;

        self.parameter_set.save_to_directory(&root.join("parameters"))?;
        self.configuration
            .save(&root.join("configs").join("configuration.yaml"))?;

        let profiles_out = root.join("profiles");
        fs::create_dir_all(&profiles_out)?;
        for profile in profile_files(&self.configuration.profiles_directory)? {
            if let Some(name) = profile.file_name() {
                fs::copy(&profile, profiles_out.join(name))?;
            }
        }

        tracing::info!("outputs written to {}", root.display());
        Ok(root)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn configuration(&self) -> &SessionConfig {
        &self.configuration
    }

    pub fn parameter_set(&self) -> &ParameterSet {
        &self.parameter_set
    }

    pub fn models(&self) -> &IndexMap<String, Model> {
        &self.models
    }

    pub fn profile_sweep(&self) -> &ProfileSweep {
        &self.profile_sweep
    }

    /// Result tables of the last run, keyed by model name
    pub fn power_data(&self) -> &IndexMap<String, ResultTable> {
        &self.power_data
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn time_stamp(&self) -> &str {
        &self.time_stamp
    }

    /// Directory the models are read from, a scratch copy once the Magnets
    /// model has been extended
    pub fn model_directory(&self) -> &Path {
        &self.configuration.modelica_file_directory
    }
}

/// `Tokamak.Interdependencies` is stored as `tokamak_interdependencies`
pub fn output_key(model: &str) -> String {
    model.to_lowercase().replace('.', "_")
}

fn copy_dir_all(source: &Path, target: &Path) -> std::io::Result<()> {
    fs::create_dir_all(target)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let path = entry.path();
        let destination = target.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&path, &destination)?;
        } else {
            fs::copy(&path, &destination)?;
        }
    }
    Ok(())
}
