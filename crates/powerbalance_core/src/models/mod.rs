//! Modelica model discovery and compilation
//!
//! - `parsing` - Line scanner extracting packages, models and submodels

mod parsing;

pub use parsing::{CompileContext, MODELICA_EXTENSION, ModelParser, extract_models_from_file, get_local_models};
pub(crate) use parsing::modelica_files;

use std::path::PathBuf;

use rustc_hash::FxHashMap;

/// A model found in a Modelica source file
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Model {
    /// Fully qualified name, e.g. `Tokamak.Interdependencies`
    pub name: String,
    /// Source file the model is declared in
    pub location: PathBuf,
    /// Enclosing package path, if any
    pub package: Option<String>,
    /// Instance name to declared type of every component using a known model
    pub submodels: FxHashMap<String, String>,
    /// Directory holding the compiled binary; set only for root models
    pub binary_folder: Option<PathBuf>,
    pub compiled: bool,
}

impl Model {
    /// A root model is one the engine built and can simulate
    pub fn is_root(&self) -> bool {
        self.binary_folder.is_some()
    }

    /// Name without the package path
    pub fn short_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// Declared type of a component instance, lower-cased final segment,
    /// `magnetpower -> Magnets.MagnetPower` giving `magnetpower`
    pub fn submodel_type(&self, instance: &str) -> Option<String> {
        self.submodels
            .get(instance)
            .map(|ty| ty.rsplit('.').next().unwrap_or(ty).to_lowercase())
    }
}
