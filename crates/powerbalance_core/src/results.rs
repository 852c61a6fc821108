//! Power tables built from engine solutions.
//!
//! A [`ResultTable`] holds one row per output time with one column per
//! consuming or generating subsystem, their totals, and the sweep values that
//! produced each row. Tables from successive sweep rounds are appended.

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::engine::SolutionTable;
use crate::error::SessionError;
use crate::models::Model;
use crate::sweep::SweepSpec;
use crate::value::ParamValue;

/// Substring identifying power consumption outputs
pub const CONSUMPTION_MARKER: &str = "ElecPowerConsumed";
/// Substring identifying power generation outputs
pub const GENERATION_MARKER: &str = "ElecPowerGen";
/// Column holding the summed consumption
pub const NET_CONSUMPTION: &str = "netpowerconsumption";
/// Column holding generation minus consumption
pub const NET_GENERATION: &str = "netpowergeneration";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultTable {
    time: Vec<f64>,
    columns: IndexMap<String, Vec<f64>>,
    sweep: IndexMap<String, Vec<Option<ParamValue>>>,
}

impl ResultTable {
    /// Build the power table of one model from its solution.
    ///
    /// Consumption columns are named after the declared type of the
    /// component producing them. Output times are rounded to `step_size` and
    /// only the first row of each rounded time is kept.
    pub fn from_solution(solution: &SolutionTable, model: &Model, step_size: f64) -> Result<Self, SessionError> {
        let malformed = |message: String| SessionError::MalformedSolution {
            model: model.name.clone(),
            message,
        };
        let time = solution
            .time()
            .ok_or_else(|| malformed(format!("missing '{}' column", SolutionTable::TIME)))?;
        if !(step_size > 0.0) {
            return Err(malformed(format!("step size must be positive, got {step_size}")));
        }

        let mut consumption: IndexMap<String, Vec<f64>> = IndexMap::new();
        let mut generation: IndexMap<String, Vec<f64>> = IndexMap::new();
        for (name, values) in solution.columns() {
            if values.len() != time.len() {
                return Err(malformed(format!(
                    "column '{name}' has {} rows, expected {}",
                    values.len(),
                    time.len()
                )));
            }
            let instance = name.split('.').next().unwrap_or(name);
            if name.contains(CONSUMPTION_MARKER) {
                let label = model
                    .submodel_type(instance)
                    .unwrap_or_else(|| instance.to_lowercase());
                add_column(&mut consumption, label, values);
            } else if name.contains(GENERATION_MARKER) {
                add_column(&mut generation, instance.to_lowercase(), values);
            }
        }

        let rows = time.len();
        let net_consumption: Vec<f64> = (0..rows)
            .map(|i| consumption.values().map(|c| c[i].abs()).sum())
            .collect();
        let net_generation: Vec<f64> = (0..rows)
            .map(|i| {
                let generated: f64 = generation.values().map(|g| g[i]).sum();
                let consumed: f64 = consumption.values().map(|c| c[i]).sum();
                generated - consumed
            })
            .collect();

        let mut columns = consumption;
        columns.insert(NET_CONSUMPTION.to_string(), net_consumption);
        columns.extend(generation);
        columns.insert(NET_GENERATION.to_string(), net_generation);

        let mut seen = FxHashSet::default();
        let mut keep = Vec::with_capacity(rows);
        let mut rounded_time = Vec::with_capacity(rows);
        for (i, t) in time.iter().enumerate() {
            let step = (t / step_size).round() as i64;
            if seen.insert(step) {
                keep.push(i);
                rounded_time.push(step as f64 * step_size);
            }
        }

        Ok(Self {
            time: rounded_time,
            columns: columns
                .into_iter()
                .map(|(name, values)| (name, keep.iter().map(|&i| values[i]).collect()))
                .collect(),
            sweep: IndexMap::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn sweep_column(&self, name: &str) -> Option<&[Option<ParamValue>]> {
        self.sweep.get(name).map(Vec::as_slice)
    }

    /// Record the value a swept parameter had for every current row
    pub fn tag(&mut self, name: &str, value: ParamValue) {
        let rows = self.len();
        self.sweep
            .insert(name.to_lowercase(), vec![Some(value); rows]);
    }

    /// Append the rows of another table, filling columns either side lacks
    /// with NaN (or no sweep value)
    pub fn append(&mut self, other: ResultTable) {
        let existing = self.len();
        let incoming = other.len();

        for (name, values) in &mut self.columns {
            if !other.columns.contains_key(name) {
                values.extend(std::iter::repeat_n(f64::NAN, incoming));
            }
        }
        for (name, values) in other.columns {
            self.columns
                .entry(name)
                .or_insert_with(|| vec![f64::NAN; existing])
                .extend(values);
        }

        for (name, values) in &mut self.sweep {
            if !other.sweep.contains_key(name) {
                values.extend(std::iter::repeat_n(None, incoming));
            }
        }
        for (name, values) in other.sweep {
            self.sweep
                .entry(name)
                .or_insert_with(|| vec![None; existing])
                .extend(values);
        }

        self.time.extend(other.time);
    }

    fn select_rows(&self, rows: &[usize]) -> ResultTable {
        ResultTable {
            time: rows.iter().map(|&i| self.time[i]).collect(),
            columns: self
                .columns
                .iter()
                .map(|(k, v)| (k.clone(), rows.iter().map(|&i| v[i]).collect()))
                .collect(),
            sweep: self
                .sweep
                .iter()
                .map(|(k, v)| (k.clone(), rows.iter().map(|&i| v[i].clone()).collect()))
                .collect(),
        }
    }

    /// Rows produced by the final value of every swept parameter
    pub fn preview(&self, spec: &SweepSpec) -> ResultTable {
        let last = spec.last_values();
        let rows: Vec<usize> = (0..self.len())
            .filter(|&row| {
                last.iter().all(|(name, value)| match self.sweep.get(&name.to_lowercase()) {
                    Some(column) => column[row].as_ref() == Some(value),
                    None => true,
                })
            })
            .collect();
        self.select_rows(&rows)
    }
}

fn add_column(target: &mut IndexMap<String, Vec<f64>>, label: String, values: &[f64]) {
    match target.get_mut(&label) {
        Some(existing) => {
            for (sum, v) in existing.iter_mut().zip(values) {
                *sum += v;
            }
        }
        None => {
            target.insert(label, values.to_vec());
        }
    }
}
