//! Simulation options and plasma scenario records.
//!
//! Both are read from their own TOML files inside the parameters directory
//! and are validated as a whole, collecting every violation before failing.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ParameterError;
use crate::value::ParamValue;

/// Smallest positive float accepted for tolerances and step sizes
pub const MIN_POSITIVE_FLOAT: f64 = 1e-36;

/// Solvers understood by the simulation engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Solver {
    #[default]
    Dassl,
    Ida,
    Cvode,
    Impeuler,
    Trapezoid,
    Imprungekutta,
    Euler,
    Heun,
    Rungekutta,
    #[serde(rename = "rungekuttaSsc")]
    RungekuttaSsc,
    Irksco,
    #[serde(rename = "symSolver")]
    SymSolver,
    #[serde(rename = "symSolverSsc")]
    SymSolverSsc,
    Qss,
}

impl Solver {
    pub fn as_str(&self) -> &'static str {
        match self {
            Solver::Dassl => "dassl",
            Solver::Ida => "ida",
            Solver::Cvode => "cvode",
            Solver::Impeuler => "impeuler",
            Solver::Trapezoid => "trapezoid",
            Solver::Imprungekutta => "imprungekutta",
            Solver::Euler => "euler",
            Solver::Heun => "heun",
            Solver::Rungekutta => "rungekutta",
            Solver::RungekuttaSsc => "rungekuttaSsc",
            Solver::Irksco => "irksco",
            Solver::SymSolver => "symSolver",
            Solver::SymSolverSsc => "symSolverSsc",
            Solver::Qss => "qss",
        }
    }
}

/// Integration step, given either as a whole number or a float
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepSize {
    Int(i64),
    Float(f64),
}

impl StepSize {
    pub fn as_f64(&self) -> f64 {
        match self {
            StepSize::Int(i) => *i as f64,
            StepSize::Float(f) => *f,
        }
    }
}

impl From<StepSize> for ParamValue {
    fn from(step: StepSize) -> Self {
        match step {
            StepSize::Int(i) => ParamValue::Int(i),
            StepSize::Float(f) => ParamValue::Float(f),
        }
    }
}

/// Options passed to the engine before every simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SimulationOptions {
    pub start_time: i64,
    pub stop_time: i64,
    pub step_size: StepSize,
    #[serde(default)]
    pub solver: Solver,
    pub tolerance: f64,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            start_time: 0,
            stop_time: 60,
            step_size: StepSize::Int(1),
            solver: Solver::Dassl,
            tolerance: 1e-6,
        }
    }
}

impl SimulationOptions {
    /// Option names in the order they are applied to the engine
    pub const NAMES: [&'static str; 5] = ["startTime", "stopTime", "stepSize", "solver", "tolerance"];

    pub fn validate(&self) -> Result<(), ParameterError> {
        let mut issues = Vec::new();

        if self.start_time < 0 {
            issues.push(format!("startTime must be non-negative, got {}", self.start_time));
        }
        if self.stop_time <= 1 {
            issues.push(format!("stopTime must be greater than 1, got {}", self.stop_time));
        }
        if self.start_time >= self.stop_time {
            issues.push(format!(
                "stopTime ({}) must be greater than startTime ({})",
                self.stop_time, self.start_time
            ));
        }
        match self.step_size {
            StepSize::Int(i) if i < 1 => {
                issues.push(format!("integer stepSize must be at least 1, got {i}"));
            }
            StepSize::Float(f) if f < MIN_POSITIVE_FLOAT => {
                issues.push(format!("stepSize must be at least {MIN_POSITIVE_FLOAT:e}, got {f}"));
            }
            _ => {}
        }
        if self.step_size.as_f64() > self.stop_time as f64 {
            issues.push(format!(
                "stepSize ({}) must not exceed stopTime ({})",
                self.step_size.as_f64(),
                self.stop_time
            ));
        }
        if self.tolerance < MIN_POSITIVE_FLOAT {
            issues.push(format!(
                "tolerance must be at least {MIN_POSITIVE_FLOAT:e}, got {}",
                self.tolerance
            ));
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ParameterError::Validation {
                label: "simulation options".to_string(),
                issues,
            })
        }
    }

    /// Options keyed by their engine names
    pub fn as_values(&self) -> IndexMap<String, ParamValue> {
        IndexMap::from([
            ("startTime".to_string(), ParamValue::Int(self.start_time)),
            ("stopTime".to_string(), ParamValue::Int(self.stop_time)),
            ("stepSize".to_string(), self.step_size.into()),
            ("solver".to_string(), ParamValue::from(self.solver.as_str())),
            ("tolerance".to_string(), ParamValue::Float(self.tolerance)),
        ])
    }
}

/// Times of the four plasma phase transitions, in simulation seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlasmaScenario {
    pub plasma_ramp_up_start: i64,
    pub plasma_flat_top_start: i64,
    pub plasma_flat_top_end: i64,
    pub plasma_ramp_down_end: i64,
}

impl PlasmaScenario {
    pub const NAMES: [&'static str; 4] = [
        "plasma_ramp_up_start",
        "plasma_flat_top_start",
        "plasma_flat_top_end",
        "plasma_ramp_down_end",
    ];

    pub fn times(&self) -> [i64; 4] {
        [
            self.plasma_ramp_up_start,
            self.plasma_flat_top_start,
            self.plasma_flat_top_end,
            self.plasma_ramp_down_end,
        ]
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        Self::NAMES
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))
            .map(|i| self.times()[i])
    }

    /// Check the phase times are non-negative and strictly increasing
    pub fn validate(&self) -> Result<(), ParameterError> {
        let times = self.times();
        let mut issues = Vec::new();

        for (name, time) in Self::NAMES.iter().zip(times) {
            if time < 0 {
                issues.push(format!("{name} must be non-negative, got {time}"));
            }
        }
        for (pair, window) in Self::NAMES.windows(2).zip(times.windows(2)) {
            if window[0] >= window[1] {
                issues.push(format!(
                    "{} ({}) must be earlier than {} ({})",
                    pair[0], window[0], pair[1], window[1]
                ));
            }
        }

        validation_result("plasma scenario", issues)
    }

    /// Check the scenario sits strictly inside the simulation window
    pub fn validate_within(&self, options: &SimulationOptions) -> Result<(), ParameterError> {
        let mut issues = Vec::new();
        if options.start_time >= self.plasma_ramp_up_start {
            issues.push(format!(
                "plasma_ramp_up_start ({}) must be after the simulation startTime ({})",
                self.plasma_ramp_up_start, options.start_time
            ));
        }
        if self.plasma_ramp_down_end >= options.stop_time {
            issues.push(format!(
                "plasma_ramp_down_end ({}) must be before the simulation stopTime ({})",
                self.plasma_ramp_down_end, options.stop_time
            ));
        }
        validation_result("plasma scenario", issues)
    }
}

fn validation_result(label: &str, issues: Vec<String>) -> Result<(), ParameterError> {
    if issues.is_empty() {
        Ok(())
    } else {
        Err(ParameterError::Validation {
            label: label.to_string(),
            issues,
        })
    }
}
