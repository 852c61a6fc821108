//! Mapping between parameter-set names and engine variables.
//!
//! Tunable Modelica parameters carry a `__` prefix on their final segment, so
//! `tokamak.interdependencies.magnetpower.maxcurrent` corresponds to the
//! engine variable `magnetpower.__maxCurrent` of the model
//! `Tokamak.Interdependencies`. Matching against engine names ignores case.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use crate::engine::{EngineVariable, SimulationEngine};
use crate::error::ParameterError;
use crate::parameters::ParameterSet;

/// Prefix marking a tunable parameter inside the engine
pub const TUNABLE_MARKER: &str = "__";

/// Engine-side name a parameter should have within `model`
pub fn engine_candidate_name(model: &str, parameter: &str) -> String {
    let mut segments: Vec<String> = parameter.split('.').map(str::to_string).collect();
    if let Some(last) = segments.last_mut() {
        *last = format!("{TUNABLE_MARKER}{last}");
    }
    let joined = segments
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(".");
    joined.replace(&format!("{}.", model.to_lowercase()), "")
}

/// Case-insensitive index of engine variable names
struct EngineIndex {
    by_lower: FxHashMap<String, String>,
}

impl EngineIndex {
    fn new(variables: &IndexMap<String, EngineVariable>) -> Self {
        let mut by_lower = FxHashMap::default();
        for name in variables.keys() {
            by_lower.entry(name.to_lowercase()).or_insert_with(|| name.clone());
        }
        Self { by_lower }
    }

    fn find(&self, model: &str, parameter: &str) -> Result<String, ParameterError> {
        let candidate = engine_candidate_name(model, parameter);
        self.by_lower
            .get(&candidate.to_lowercase())
            .cloned()
            .ok_or(ParameterError::EngineVariableNotFound {
                model: model.to_string(),
                candidate,
            })
    }
}

/// Engine variable of `model` corresponding to `parameter`
pub fn find_engine_variable(
    engine: &dyn SimulationEngine,
    model: &str,
    parameter: &str,
) -> Result<String, ParameterError> {
    let variables = engine.get_parameters(Some(model))?;
    EngineIndex::new(&variables).find(model, parameter)
}

impl ParameterSet {
    /// Push every parameter belonging to `model` into the engine.
    ///
    /// With `allow_failure`, parameters the engine does not know are dropped
    /// from the set with a warning; otherwise the first one is an error.
    pub fn set_model_parameters(
        &mut self,
        engine: &mut dyn SimulationEngine,
        model: &str,
        allow_failure: bool,
    ) -> Result<(), ParameterError> {
        let model_lower = model.to_lowercase();
        let index = EngineIndex::new(&engine.get_parameters(Some(model))?);

        let owned: Vec<String> = self
            .parameters
            .keys()
            .filter(|name| name.contains(&model_lower) && !self.is_valid_non_modelica_param(name))
            .cloned()
            .collect();

        let mut applied = 0;
        for name in owned {
            match index.find(model, &name) {
                Ok(variable) => {
                    if let Some(value) = self.parameters.get(&name) {
                        engine.set_parameter(&variable, value)?;
                        applied += 1;
                    }
                }
                Err(ParameterError::EngineVariableNotFound { candidate, .. }) if allow_failure => {
                    tracing::warn!(
                        "failed to retrieve parameter '{name}' (as '{candidate}') in model '{model}', removing it from the parameter set"
                    );
                    self.remove(&name);
                }
                Err(ParameterError::EngineVariableNotFound { .. }) => {
                    return Err(ParameterError::ModelicaParameter(name));
                }
                Err(e) => return Err(e),
            }
        }

        tracing::debug!("applied {applied} parameters to model '{model}'");
        Ok(())
    }

    /// Add tunable engine variables of `model` that the set does not yet
    /// track, keyed `<model>.<name without the tunable marker>`. A variable
    /// is tunable when its final segment carries the marker.
    pub fn update_from_model(
        &mut self,
        engine: &dyn SimulationEngine,
        model: &str,
    ) -> Result<usize, ParameterError> {
        let model_lower = model.to_lowercase();
        let mut added = 0;

        for (name, variable) in engine.get_parameters(Some(model))? {
            let tunable = name
                .rsplit('.')
                .next()
                .is_some_and(|last| last.starts_with(TUNABLE_MARKER));
            if !tunable || !variable.has_value() {
                continue;
            }
            let label = format!(
                "{model_lower}.{}",
                name.replace(TUNABLE_MARKER, "").to_lowercase()
            );
            if self.parameters.contains_key(&label) {
                continue;
            }
            if let Some(value) = variable.value {
                self.parameters.insert(label, value);
                added += 1;
            }
        }

        if added > 0 {
            tracing::debug!("added {added} parameters from model '{model}'");
        }
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_marks_final_segment() {
        assert_eq!(
            engine_candidate_name(
                "Tokamak.Interdependencies",
                "tokamak.interdependencies.magnetpower.maxcurrent"
            ),
            "magnetpower.__maxcurrent"
        );
    }

    #[test]
    fn candidate_without_model_prefix() {
        assert_eq!(engine_candidate_name("P.M", "alpha"), "__alpha");
    }
}
