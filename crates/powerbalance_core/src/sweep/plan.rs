use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::SweepError;
use crate::sweep::profiles::ProfileSweep;
use crate::utilities::flatten_dictionary;
use crate::value::{ParamTable, ParamValue};

/// How the per-parameter value lists of a sweep are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepMode {
    /// Zip the lists element-wise; all lists must have the same length
    #[default]
    Set,
    /// Cartesian product of the lists
    Combinations,
}

/// One point of a sweep: parameter name to the value it takes
pub type Combination = IndexMap<String, ParamValue>;

/// Flattened sweep specification, parameter name to candidate values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepSpec {
    values: IndexMap<String, Vec<ParamValue>>,
}

impl SweepSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a spec from a nested sweep document.
    ///
    /// Every leaf must be a list whose elements share one type.
    pub fn from_table(table: &ParamTable) -> Result<Self, SweepError> {
        let mut spec = Self::new();
        for (name, value) in flatten_dictionary(table) {
            let Some(items) = value.as_sequence() else {
                return Err(SweepError::InvalidSweepValue {
                    name,
                    message: format!("expected a list of values, got '{value}'"),
                });
            };
            spec.insert(name, items.to_vec())?;
        }
        Ok(spec)
    }

    pub fn insert(&mut self, name: impl Into<String>, values: Vec<ParamValue>) -> Result<(), SweepError> {
        let name = name.into();
        if let Some(first) = values.first() {
            if let Some(odd) = values.iter().find(|v| v.kind() != first.kind()) {
                return Err(SweepError::InvalidSweepValue {
                    message: format!(
                        "values must share one type, found {} and {}",
                        first.kind(),
                        odd.kind()
                    ),
                    name,
                });
            }
        }
        self.values.insert(name, values);
        Ok(())
    }

    /// Merge another spec into this one, later entries replacing earlier ones
    pub fn extend(&mut self, other: SweepSpec) {
        self.values.extend(other.values);
    }

    pub fn get(&self, name: &str) -> Option<&[ParamValue]> {
        self.values.get(name).map(Vec::as_slice)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ParamValue])> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Final value of every swept parameter
    pub fn last_values(&self) -> Combination {
        self.values
            .iter()
            .filter_map(|(name, values)| values.last().map(|v| (name.clone(), v.clone())))
            .collect()
    }
}

/// Row-major iterator over every index tuple of an N-dimensional grid.
///
/// The last dimension varies fastest, giving the same ordering as a nested
/// loop over the dimensions in declaration order.
#[derive(Debug, Clone)]
pub struct CartesianIndices {
    shape: Vec<usize>,
    current: Vec<usize>,
    done: bool,
}

impl CartesianIndices {
    pub fn new(shape: Vec<usize>) -> Self {
        let done = shape.is_empty() || shape.contains(&0);
        Self {
            current: vec![0; shape.len()],
            shape,
            done,
        }
    }

    pub fn total(&self) -> usize {
        if self.shape.is_empty() {
            0
        } else {
            self.shape.iter().product()
        }
    }
}

impl Iterator for CartesianIndices {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let result = self.current.clone();

        for i in (0..self.shape.len()).rev() {
            self.current[i] += 1;
            if self.current[i] < self.shape[i] {
                break;
            }
            self.current[i] = 0;
            if i == 0 {
                self.done = true;
            }
        }

        Some(result)
    }
}

/// Expand a sweep spec into the ordered list of points to simulate
pub fn assemble_combinations(spec: &SweepSpec, mode: SweepMode) -> Result<Vec<Combination>, SweepError> {
    if spec.is_empty() {
        return Err(SweepError::EmptySweep);
    }

    match mode {
        SweepMode::Set => {
            let mut lengths = spec.iter().map(|(name, values)| (name, values.len()));
            let (_, expected) = lengths.next().ok_or(SweepError::EmptySweep)?;
            for (name, found) in lengths {
                if found != expected {
                    return Err(SweepError::LengthMismatch {
                        name: name.to_string(),
                        expected,
                        found,
                    });
                }
            }
            Ok((0..expected)
                .map(|i| {
                    spec.iter()
                        .map(|(name, values)| (name.to_string(), values[i].clone()))
                        .collect()
                })
                .collect())
        }
        SweepMode::Combinations => {
            let shape: Vec<usize> = spec.iter().map(|(_, values)| values.len()).collect();
            Ok(CartesianIndices::new(shape)
                .map(|indices| {
                    spec.iter()
                        .zip(indices)
                        .map(|((name, values), i)| (name.to_string(), values[i].clone()))
                        .collect()
                })
                .collect())
        }
    }
}

/// What a run will execute, decided once before any simulation starts
#[derive(Debug, Clone, PartialEq)]
pub enum SweepPlan {
    /// Simulate every configured model once
    Single,
    /// Swap in each set of tagged profiles in turn
    ProfileOnly { iterations: usize },
    /// Apply each parameter combination, optionally swapping profiles in step
    Parameter {
        combinations: Vec<Combination>,
        swap_profiles: bool,
    },
}

impl SweepPlan {
    pub fn build(
        spec: Option<&SweepSpec>,
        mode: SweepMode,
        profiles: &ProfileSweep,
    ) -> Result<Self, SweepError> {
        match spec {
            Some(spec) if !spec.is_empty() => {
                if mode == SweepMode::Combinations && !profiles.is_empty() {
                    return Err(SweepError::ProfileSweepInCombinations);
                }
                let combinations = assemble_combinations(spec, mode)?;
                let swap_profiles = !profiles.is_empty();
                if swap_profiles {
                    let iterations = profiles.iterations()?;
                    if iterations != combinations.len() {
                        return Err(SweepError::LengthMismatch {
                            name: "profile sweep".to_string(),
                            expected: combinations.len(),
                            found: iterations,
                        });
                    }
                }
                Ok(SweepPlan::Parameter {
                    combinations,
                    swap_profiles,
                })
            }
            _ if !profiles.is_empty() => Ok(SweepPlan::ProfileOnly {
                iterations: profiles.iterations()?,
            }),
            _ => Ok(SweepPlan::Single),
        }
    }

    /// Number of simulation rounds the plan performs
    pub fn iterations(&self) -> usize {
        match self {
            SweepPlan::Single => 1,
            SweepPlan::ProfileOnly { iterations } => *iterations,
            SweepPlan::Parameter { combinations, .. } => combinations.len(),
        }
    }
}
