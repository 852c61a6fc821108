use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use rustc_hash::FxHashMap;

use crate::engine::{BuildRequest, SimulationEngine};
use crate::environment::Environment;
use crate::error::{EngineError, ModelError};
use crate::models::Model;
use crate::parameters::ParameterSet;

/// Extension of Modelica source files
pub const MODELICA_EXTENSION: &str = "mo";

lazy_static! {
    static ref PACKAGE_RE: Regex = Regex::new(r#"(?i)^\s*package\s+([0-9a-z_]+)(\s+".*")?\s*$"#).unwrap();
    static ref MODEL_RE: Regex = Regex::new(r"(?i)^\s*model\s+([0-9a-z_]+)").unwrap();
    static ref END_RE: Regex = Regex::new(r"(?i)^\s*end\s+([0-9a-z_]+)\s*;").unwrap();
}

/// What the parser needs to compile the models it finds
pub struct CompileContext<'a> {
    pub engine: &'a mut dyn SimulationEngine,
    /// Source of structural parameter substitutions
    pub parameters: Option<&'a ParameterSet>,
    pub environment: &'a mut Environment,
    /// Fully qualified names to compile; empty compiles every model
    pub allow_list: &'a [String],
    /// Directory passed to the engine for resolving input files
    pub profile_dir: Option<&'a Path>,
}

impl CompileContext<'_> {
    fn allows(&self, model: &str) -> bool {
        self.allow_list.is_empty() || self.allow_list.iter().any(|m| m == model)
    }
}

/// Line scanner for Modelica sources.
///
/// The scanner is deliberately shallow: it tracks `package`/`model`/`end`
/// lines and records component declarations whose type is a model it has
/// already seen, in either qualified or unqualified form.
#[derive(Debug, Default)]
pub struct ModelParser {
    /// Known model names, longest first
    known: Vec<String>,
}

impl ModelParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&mut self, models: &[Model]) {
        for model in models {
            for name in [model.name.as_str(), model.short_name()] {
                if !self.known.iter().any(|k| k == name) {
                    self.known.push(name.to_string());
                }
            }
        }
        self.known.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    }

    /// Component declared on `line` using a known model: `(instance, type)`
    fn match_submodel(&self, line: &str) -> Option<(String, String)> {
        let trimmed = line.trim_start();
        self.known.iter().find_map(|type_name| {
            let head = trimmed.get(..type_name.len())?;
            if !head.eq_ignore_ascii_case(type_name) {
                return None;
            }
            let rest = &trimmed[type_name.len()..];
            let instance_part = rest.trim_start();
            if instance_part.len() == rest.len() {
                return None;
            }
            let end = instance_part
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(instance_part.len());
            (end > 0).then(|| (instance_part[..end].to_string(), type_name.clone()))
        })
    }

    /// Scan one file's text into the models it declares
    fn scan(&self, content: &str, location: &Path) -> Vec<Model> {
        let mut models = Vec::new();
        let mut packages: Vec<String> = Vec::new();
        let mut current: Option<String> = None;
        let mut submodels: FxHashMap<String, String> = FxHashMap::default();

        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }

            if let Some(captures) = PACKAGE_RE.captures(line) {
                packages.push(captures[1].to_string());
                continue;
            }

            if current.is_some() {
                if let Some((instance, type_name)) = self.match_submodel(line) {
                    submodels.insert(instance, type_name);
                    continue;
                }
            }

            if let Some(captures) = MODEL_RE.captures(line) {
                current = Some(captures[1].to_string());
                submodels.clear();
                continue;
            }

            if let Some(captures) = END_RE.captures(line) {
                let name = &captures[1];
                if current.as_deref() == Some(name) {
                    let package = (!packages.is_empty()).then(|| packages.join("."));
                    let qualified = match &package {
                        Some(package) => format!("{package}.{name}"),
                        None => name.to_string(),
                    };
                    models.push(Model {
                        name: qualified,
                        location: location.to_path_buf(),
                        package,
                        submodels: std::mem::take(&mut submodels),
                        binary_folder: None,
                        compiled: false,
                    });
                    current = None;
                } else if packages.last().map(String::as_str) == Some(name) {
                    packages.pop();
                }
            }
        }

        models
    }

    /// Parse one file, compiling its models when a context is given
    pub fn parse_file(
        &mut self,
        path: &Path,
        compile: Option<&mut CompileContext<'_>>,
    ) -> Result<IndexMap<String, Model>, ModelError> {
        let content = fs::read_to_string(path)?;

        // Two passes so components may use models declared later in the file
        let first = self.scan(&content, path);
        self.register(&first);
        let mut models = self.scan(&content, path);

        if let Some(ctx) = compile {
            compile_models(&mut models, path, ctx)?;
        }

        tracing::debug!("found {} models in {}", models.len(), path.display());
        Ok(models.into_iter().map(|m| (m.name.clone(), m)).collect())
    }
}

/// Other Modelica files next to `path`, sorted by name
fn sibling_sources(path: &Path) -> Result<Vec<PathBuf>, ModelError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut siblings: Vec<PathBuf> = modelica_files(dir)?
        .into_iter()
        .filter(|p| p.file_name() != path.file_name())
        .collect();
    siblings.sort();
    Ok(siblings)
}

pub(crate) fn modelica_files(dir: &Path) -> Result<Vec<PathBuf>, ModelError> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == MODELICA_EXTENSION))
        .collect();
    files.sort();
    Ok(files)
}

fn compile_models(models: &mut [Model], path: &Path, ctx: &mut CompileContext<'_>) -> Result<(), ModelError> {
    if !models.iter().any(|m| ctx.allows(&m.name)) {
        return Ok(());
    }

    let model_dir = path.parent().unwrap_or(Path::new("."));
    let siblings = sibling_sources(path)?;

    let mut source = path.to_path_buf();
    let mut extra_sources = siblings.clone();
    if let Some(parameters) = ctx.parameters {
        if let Some(rewritten) = parameters.set_struct_parameters(ctx.environment, path, &siblings)? {
            let rewritten_dir = rewritten.parent().unwrap_or(Path::new(".")).to_path_buf();
            extra_sources = siblings
                .iter()
                .filter_map(|s| s.file_name())
                .map(|name| rewritten_dir.join(name))
                .collect();
            source = rewritten;
        }
    }
    let native_include_dir = model_dir.join("Resources").join("Include");

    for model in models.iter_mut() {
        if !ctx.allows(&model.name) {
            tracing::debug!("skipping compilation of '{}'", model.name);
            continue;
        }
        tracing::info!("compiling model '{}'", model.name);
        ctx.engine.build_model(&BuildRequest {
            source_file: &source,
            model_name: &model.name,
            extra_sources: &extra_sources,
            native_include_dir: &native_include_dir,
            input_dir: ctx.profile_dir,
        })?;

        match ctx.engine.binary_location(&model.name) {
            Ok(binary) => {
                model.binary_folder = Some(binary.parent().map(Path::to_path_buf).unwrap_or_default());
                model.compiled = true;
            }
            Err(EngineError::BinaryNotFound(_)) => {
                tracing::warn!("no binary produced for model '{}', it will not be simulated", model.name);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Extract the models declared in a single `.mo` file
pub fn extract_models_from_file(
    path: &Path,
    compile: Option<&mut CompileContext<'_>>,
) -> Result<IndexMap<String, Model>, ModelError> {
    if !path.exists() {
        return Err(ModelError::NotFound(path.to_path_buf()));
    }
    if path.extension().is_none_or(|ext| ext != MODELICA_EXTENSION) {
        return Err(ModelError::InvalidArgument(format!(
            "'{}' is not a Modelica file",
            path.display()
        )));
    }
    ModelParser::new().parse_file(path, compile)
}

/// Extract the models of every `.mo` file in a directory, or of a single
/// file when `path` is one
pub fn get_local_models(
    path: &Path,
    mut compile: Option<&mut CompileContext<'_>>,
) -> Result<IndexMap<String, Model>, ModelError> {
    if !path.exists() {
        return Err(ModelError::NotFound(path.to_path_buf()));
    }
    if path.is_file() {
        return extract_models_from_file(path, compile);
    }

    let files = modelica_files(path)?;
    let mut parser = ModelParser::new();
    for file in &files {
        let content = fs::read_to_string(file)?;
        let found = parser.scan(&content, file);
        parser.register(&found);
    }

    let mut models = IndexMap::new();
    for file in &files {
        models.extend(parser.parse_file(file, compile.as_deref_mut())?);
    }

    if models.is_empty() {
        return Err(ModelError::Internal(format!(
            "no models found in directory '{}'",
            path.display()
        )));
    }
    Ok(models)
}
