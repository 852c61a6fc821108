//! OpenModelica backend for the power balance session.
//!
//! Models are built by writing a `.mos` script and running `omc` on it. The
//! generated executable is then run directly for every simulation, with
//! parameter values and simulation options passed as overrides. Variables
//! are discovered from the `<model>_init.xml` file produced by the build and
//! solutions are read back from the CSV result file.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use indexmap::IndexMap;
use powerbalance_core::engine::{BuildRequest, EngineVariable, SimulationEngine, SolutionTable};
use powerbalance_core::error::EngineError;
use powerbalance_core::value::ParamValue;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tempfile::TempDir;

/// Name of the OpenModelica compiler executable looked up on `PATH`
pub const DEFAULT_OMC: &str = "omc";

/// Simulation options passed through `-override`; everything else goes
/// through its own flag
const OVERRIDE_OPTIONS: [&str; 4] = ["startTime", "stopTime", "stepSize", "tolerance"];

/// One model built by `omc`
#[derive(Debug, Clone)]
struct BuiltModel {
    build_dir: PathBuf,
    input_dir: Option<PathBuf>,
    variables: IndexMap<String, EngineVariable>,
    overrides: IndexMap<String, String>,
    options: IndexMap<String, String>,
}

/// [`SimulationEngine`] driving the `omc` compiler and the executables it
/// builds. All build products live in a temporary directory owned by the
/// session.
pub struct OmcSession {
    omc: PathBuf,
    work_dir: TempDir,
    models: IndexMap<String, BuiltModel>,
    solutions: IndexMap<String, SolutionTable>,
}

impl OmcSession {
    pub fn new(omc: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let work_dir = tempfile::Builder::new().prefix("pbm_omc_").tempdir()?;
        tracing::debug!(dir = %work_dir.path().display(), "created omc work directory");
        Ok(Self {
            omc: omc.into(),
            work_dir,
            models: IndexMap::new(),
            solutions: IndexMap::new(),
        })
    }

    pub fn work_dir(&self) -> &Path {
        self.work_dir.path()
    }

    fn model(&self, name: &str) -> Result<&BuiltModel, EngineError> {
        self.models
            .get(name)
            .ok_or_else(|| EngineError::UnknownModel(name.to_string()))
    }

    fn executable(&self, name: &str) -> Result<PathBuf, EngineError> {
        let model = self.model(name)?;
        let executable = model.build_dir.join(executable_name(name));
        if executable.is_file() {
            Ok(executable)
        } else {
            Err(EngineError::BinaryNotFound(name.to_string()))
        }
    }
}

impl SimulationEngine for OmcSession {
    fn build_model(&mut self, request: &BuildRequest<'_>) -> Result<(), EngineError> {
        let build_dir = self.work_dir.path().join(request.model_name);
        fs::create_dir_all(&build_dir)?;

        let script = build_dir.join("build.mos");
        fs::write(&script, build_script(request))?;

        let output = Command::new(&self.omc)
            .arg(&script)
            .current_dir(&build_dir)
            .env("CPATH", request.native_include_dir)
            .output()
            .map_err(|e| EngineError::Backend(format!("failed to run '{}': {e}", self.omc.display())))?;
        if !output.status.success() {
            return Err(EngineError::Build {
                model: request.model_name.to_string(),
                message: process_message(&output),
            });
        }

        let init_file = build_dir.join(format!("{}_init.xml", request.model_name));
        let variables = if init_file.is_file() {
            parse_init_xml(&fs::read_to_string(&init_file)?)?
        } else {
            tracing::warn!(model = %request.model_name, "omc produced no init file");
            IndexMap::new()
        };
        tracing::debug!(
            model = %request.model_name,
            variables = variables.len(),
            "built model"
        );

        self.models.insert(
            request.model_name.to_string(),
            BuiltModel {
                build_dir,
                input_dir: request.input_dir.map(Path::to_path_buf),
                variables,
                overrides: IndexMap::new(),
                options: IndexMap::new(),
            },
        );
        Ok(())
    }

    fn set_parameter(&mut self, name: &str, value: &ParamValue) -> Result<(), EngineError> {
        let literal = override_literal(value)?;
        let mut found = false;
        for model in self.models.values_mut() {
            if let Some(variable) = model.variables.get_mut(name) {
                variable.value = Some(value.clone());
                model.overrides.insert(name.to_string(), literal.clone());
                found = true;
            }
        }
        if found {
            Ok(())
        } else {
            Err(EngineError::UnknownVariable(name.to_string()))
        }
    }

    fn get_parameters(&self, model: Option<&str>) -> Result<IndexMap<String, EngineVariable>, EngineError> {
        match model {
            Some(name) => Ok(self.model(name)?.variables.clone()),
            None => Ok(self
                .models
                .values()
                .flat_map(|m| m.variables.iter().map(|(k, v)| (k.clone(), v.clone())))
                .collect()),
        }
    }

    fn set_simulation_option(
        &mut self,
        model: &str,
        option: &str,
        value: &ParamValue,
    ) -> Result<(), EngineError> {
        let literal = override_literal(value)?;
        let built = self
            .models
            .get_mut(model)
            .ok_or_else(|| EngineError::UnknownModel(model.to_string()))?;
        built.options.insert(option.to_string(), literal);
        Ok(())
    }

    fn simulate(&mut self, model: &str) -> Result<(), EngineError> {
        let executable = self.executable(model)?;
        let built = self.model(model)?;

        let override_file = built.build_dir.join(format!("{model}_overrides.txt"));
        fs::write(&override_file, override_file_content(&built.overrides))?;
        let result_file = built.build_dir.join(format!("{model}_res.csv"));

        let mut command = Command::new(&executable);
        command
            .args(simulation_arguments(&built.options))
            .arg(format!("-overrideFile={}", override_file.display()))
            .arg(format!("-inputPath={}", built.build_dir.display()))
            .arg(format!("-r={}", result_file.display()))
            .current_dir(built.input_dir.as_deref().unwrap_or(&built.build_dir));

        tracing::debug!(model = %model, "running {:?}", command);
        let output = command.output()?;
        if !output.status.success() {
            return Err(EngineError::Simulation {
                model: model.to_string(),
                message: process_message(&output),
            });
        }

        let file = fs::File::open(&result_file).map_err(|e| EngineError::Simulation {
            model: model.to_string(),
            message: format!("no result file '{}': {e}", result_file.display()),
        })?;
        let solution = read_solution(file)?;
        self.solutions.insert(model.to_string(), solution);
        Ok(())
    }

    fn get_solutions(&self) -> Result<IndexMap<String, SolutionTable>, EngineError> {
        Ok(self.solutions.clone())
    }

    fn binary_location(&self, model: &str) -> Result<PathBuf, EngineError> {
        match self.executable(model) {
            Err(EngineError::UnknownModel(name)) => Err(EngineError::BinaryNotFound(name)),
            other => other,
        }
    }
}

// ============================================================================
// Script and argument generation
// ============================================================================

fn executable_name(model: &str) -> String {
    if cfg!(windows) {
        format!("{model}.exe")
    } else {
        model.to_string()
    }
}

fn mos_path(path: &Path) -> String {
    path.display().to_string().replace('\\', "/")
}

/// The `.mos` script loading every source and building `request.model_name`
pub fn build_script(request: &BuildRequest<'_>) -> String {
    let mut lines = vec!["loadModel(Modelica);".to_string()];
    let sources = request
        .extra_sources
        .iter()
        .map(PathBuf::as_path)
        .chain(std::iter::once(request.source_file));
    for source in sources {
        lines.push(format!("loadFile(\"{}\");", mos_path(source)));
    }
    lines.push("getErrorString();".to_string());
    lines.push(format!("buildModel({});", request.model_name));
    lines.push("getErrorString();".to_string());
    lines.join("\n") + "\n"
}

/// Text of a value as the simulation executable expects it
fn override_literal(value: &ParamValue) -> Result<String, EngineError> {
    match value {
        ParamValue::List(_) | ParamValue::Tuple(_) => Err(EngineError::Backend(format!(
            "array value {value} cannot be passed as an override"
        ))),
        other => Ok(other.to_string()),
    }
}

/// One `name=value` line per overridden variable
pub fn override_file_content(overrides: &IndexMap<String, String>) -> String {
    overrides
        .iter()
        .map(|(name, value)| format!("{name}={value}\n"))
        .collect()
}

/// Executable flags for the stored simulation options
pub fn simulation_arguments(options: &IndexMap<String, String>) -> Vec<String> {
    let mut arguments = Vec::new();
    let overrides: Vec<String> = OVERRIDE_OPTIONS
        .iter()
        .filter_map(|name| options.get(*name).map(|value| format!("{name}={value}")))
        .collect();
    if !overrides.is_empty() {
        arguments.push(format!("-override={}", overrides.join(",")));
    }
    if let Some(solver) = options.get("solver") {
        arguments.push(format!("-s={solver}"));
    }
    arguments
}

fn process_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let text = if stderr.trim().is_empty() {
        String::from_utf8_lossy(&output.stdout)
    } else {
        stderr
    };
    text.trim().to_string()
}

// ============================================================================
// Build product parsing
// ============================================================================

fn xml_error(e: impl std::fmt::Display) -> EngineError {
    EngineError::Backend(format!("malformed init file: {e}"))
}

/// Unescaped attributes of an element, in document order
fn attributes(element: &BytesStart<'_>) -> Result<IndexMap<String, String>, EngineError> {
    let mut attributes = IndexMap::new();
    for attribute in element.attributes() {
        let attribute = attribute.map_err(xml_error)?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute.unescape_value().map_err(xml_error)?;
        attributes.insert(key, value.into_owned());
    }
    Ok(attributes)
}

fn typed_value(kind: &[u8], start: String) -> Option<ParamValue> {
    match kind {
        b"Real" => start.parse().ok().map(ParamValue::Float),
        b"Integer" => start.parse().ok().map(ParamValue::Int),
        b"Boolean" => match start.as_str() {
            "true" | "1" => Some(ParamValue::Bool(true)),
            "false" | "0" => Some(ParamValue::Bool(false)),
            _ => None,
        },
        b"String" => Some(ParamValue::Str(start)),
        _ => None,
    }
}

/// `(name, variable)` for a `ScalarVariable` with parameter variability
fn parameter_variable(element: &BytesStart<'_>) -> Result<Option<(String, EngineVariable)>, EngineError> {
    let mut attributes = attributes(element)?;
    if attributes.get("variability").map(String::as_str) != Some("parameter") {
        return Ok(None);
    }
    let Some(name) = attributes.shift_remove("name") else {
        return Ok(None);
    };
    let description = attributes.shift_remove("description").filter(|d| !d.is_empty());
    Ok(Some((name, EngineVariable { value: None, description })))
}

/// Parameters declared in an `_init.xml` file.
///
/// Only variables with parameter variability are kept. Variables without a
/// start value are reported with no value.
pub fn parse_init_xml(content: &str) -> Result<IndexMap<String, EngineVariable>, EngineError> {
    let mut reader = Reader::from_str(content);
    let mut variables = IndexMap::new();
    let mut current: Option<(String, EngineVariable)> = None;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(element) if element.name().as_ref() == b"ScalarVariable" => {
                current = parameter_variable(&element)?;
            }
            Event::Empty(element) if element.name().as_ref() == b"ScalarVariable" => {
                if let Some((name, variable)) = parameter_variable(&element)? {
                    variables.insert(name, variable);
                }
            }
            Event::Start(element) | Event::Empty(element) => {
                if let Some((_, variable)) = current.as_mut() {
                    let kind = element.name();
                    if let Some(start) = attributes(&element)?.shift_remove("start") {
                        variable.value = typed_value(kind.as_ref(), start);
                    }
                }
            }
            Event::End(element) if element.name().as_ref() == b"ScalarVariable" => {
                if let Some((name, variable)) = current.take() {
                    variables.insert(name, variable);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(variables)
}

/// Read a CSV result file into a solution table
pub fn read_solution(reader: impl Read) -> Result<SolutionTable, EngineError> {
    let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers: Vec<String> = csv
        .headers()
        .map_err(|e| EngineError::Backend(format!("malformed result header: {e}")))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); headers.len()];
    for (row, record) in csv.records().enumerate() {
        let record = record.map_err(|e| EngineError::Backend(format!("malformed result row {row}: {e}")))?;
        for (column, field) in columns.iter_mut().zip(record.iter()) {
            let value = field.parse().map_err(|_| {
                EngineError::Backend(format!("non-numeric value '{field}' in result row {row}"))
            })?;
            column.push(value);
        }
    }

    let mut solution = SolutionTable::new();
    for (name, values) in headers.into_iter().zip(columns) {
        solution.insert_column(name, values);
    }
    Ok(solution)
}
