use std::io;
use std::path::PathBuf;

use thiserror::Error;

fn bullet_list(items: &[String]) -> String {
    items.iter().map(|item| format!("\n\t- {item}")).collect()
}

/// Failures reported by a simulation engine backend
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no compiled binary found for model '{0}'")]
    BinaryNotFound(String),
    #[error("failed to build model '{model}': {message}")]
    Build { model: String, message: String },
    #[error("simulation of model '{model}' failed: {message}")]
    Simulation { model: String, message: String },
    #[error("engine has no variable named '{0}'")]
    UnknownVariable(String),
    #[error("engine has no model named '{0}'")]
    UnknownModel(String),
    #[error("engine failure: {0}")]
    Backend(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Errors related to the parameter set and its input files
#[derive(Debug, Error)]
pub enum ParameterError {
    #[error(
        "could not find parameter '{name}' in modifiable parameters set, available parameters are:{}",
        bullet_list(.available)
    )]
    UnidentifiedParameter { name: String, available: Vec<String> },
    #[error("could not find Modelica parameter matching '{0}'")]
    ModelicaParameter(String),
    #[error("could not find a variable in model '{model}' matching '{candidate}'")]
    EngineVariableNotFound { model: String, candidate: String },
    #[error(
        "Modelica internal parameter value does not match that of the parameter set for '{name}': {engine} != {api}"
    )]
    Translation {
        name: String,
        engine: String,
        api: String,
    },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("'{label}' validation failed with:{}", bullet_list(.issues))]
    Validation { label: String, issues: Vec<String> },
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("file or directory '{}' does not exist", .0.display())]
    NotFound(PathBuf),
    #[error("failed to parse '{}': {message}", .path.display())]
    Parse { path: PathBuf, message: String },
    #[error("failed to serialise parameters: {0}")]
    Serialize(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Errors raised while discovering or compiling Modelica models
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("file or directory '{}' does not exist", .0.display())]
    NotFound(PathBuf),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Parameter(#[from] ParameterError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Errors raised while planning or executing a sweep
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("sweep over '{name}' has {found} values, expected {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("sweep specification is empty")]
    EmptySweep,
    #[error("profile sweeps are only supported in 'set' sweep mode")]
    ProfileSweepInCombinations,
    #[error(
        "failed to parse profile name '{}', expected the form '<name>_sweep_<param>_<value>.mat' with '_' as the decimal point",
        .0.display()
    )]
    MalformedProfileName(PathBuf),
    #[error("invalid sweep value for '{name}': {message}")]
    InvalidSweepValue { name: String, message: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Errors raised while loading or validating a session configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse '{}': {message}", .path.display())]
    Parse { path: PathBuf, message: String },
    #[error("failed to serialise configuration: {0}")]
    Serialize(String),
    #[error("'{label}' validation failed with:{}", bullet_list(.issues))]
    Invalid { label: String, issues: Vec<String> },
    #[error(transparent)]
    Sweep(#[from] SweepError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Top-level errors surfaced by a power balance session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("model '{name}' is not recognised, available models are:{}", bullet_list(.available))]
    UnknownModel { name: String, available: Vec<String> },
    #[error("no solution available for model '{model}'")]
    MissingSolution { model: String },
    #[error("solution for model '{model}' is malformed: {message}")]
    MalformedSolution { model: String, message: String },
    #[error("no power data has been produced, run the session before writing outputs")]
    NoPowerData,
    #[error("failed to serialise session outputs: {0}")]
    Serialize(String),
    #[error(transparent)]
    Parameter(#[from] ParameterError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Sweep(#[from] SweepError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type SessionResult<T> = Result<T, SessionError>;
