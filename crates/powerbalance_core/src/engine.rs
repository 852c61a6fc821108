//! Seam between the power balance session and a Modelica simulation backend.
//!
//! The session never talks to a compiler or solver directly. Everything it
//! needs (building models, reading and writing variables, running and
//! collecting solutions) goes through [`SimulationEngine`], which lets tests
//! drive the whole pipeline with an in-memory fake.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::error::EngineError;
use crate::value::ParamValue;

/// A variable exposed by a compiled model
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineVariable {
    pub value: Option<ParamValue>,
    pub description: Option<String>,
}

impl EngineVariable {
    pub fn new(value: impl Into<ParamValue>) -> Self {
        Self {
            value: Some(value.into()),
            description: None,
        }
    }

    /// True when the variable carries a non-empty value
    pub fn has_value(&self) -> bool {
        self.value.as_ref().is_some_and(|v| !v.is_empty())
    }
}

/// Everything the engine needs to compile one model
#[derive(Debug, Clone)]
pub struct BuildRequest<'a> {
    pub source_file: &'a Path,
    /// Fully qualified model name, e.g. `Tokamak.Interdependencies`
    pub model_name: &'a str,
    /// Other Modelica sources the model may depend on
    pub extra_sources: &'a [PathBuf],
    /// Directory holding native (C) sources referenced by the models
    pub native_include_dir: &'a Path,
    /// Directory that relative input file paths are resolved against
    pub input_dir: Option<&'a Path>,
}

/// Column-oriented solution of one simulation run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolutionTable {
    columns: IndexMap<String, Vec<f64>>,
}

impl SolutionTable {
    pub const TIME: &'static str = "time";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_column(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.columns.insert(name.into(), values);
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn time(&self) -> Option<&[f64]> {
        self.column(Self::TIME)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.columns.values().map(Vec::len).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Operations a Modelica backend must provide
pub trait SimulationEngine {
    /// Compile a model so it can be simulated
    fn build_model(&mut self, request: &BuildRequest<'_>) -> Result<(), EngineError>;

    /// Assign a variable by its engine-side name
    fn set_parameter(&mut self, name: &str, value: &ParamValue) -> Result<(), EngineError>;

    /// Variables of one model, or of every built model when `model` is `None`
    fn get_parameters(&self, model: Option<&str>) -> Result<IndexMap<String, EngineVariable>, EngineError>;

    fn set_simulation_option(
        &mut self,
        model: &str,
        option: &str,
        value: &ParamValue,
    ) -> Result<(), EngineError>;

    fn simulate(&mut self, model: &str) -> Result<(), EngineError>;

    /// Latest solution of every simulated model, keyed by model name
    fn get_solutions(&self) -> Result<IndexMap<String, SolutionTable>, EngineError>;

    /// Location of the compiled binary. Fails with
    /// [`EngineError::BinaryNotFound`] when the model was not built.
    fn binary_location(&self, model: &str) -> Result<PathBuf, EngineError>;
}
