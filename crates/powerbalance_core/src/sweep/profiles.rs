//! Discovery and swapping of tagged profile files.
//!
//! A profile variant is named `<base>_sweep_<param>_<value>.mat` where the
//! first underscore in `<value>` stands for the decimal point. Swapping copies
//! the variant over `<base>.mat`, the file the models actually read, and
//! leaves the variant in place so it can be reused for every model.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;

use crate::error::SweepError;

/// Extension of profile data files
pub const PROFILE_EXTENSION: &str = "mat";

lazy_static! {
    static ref VARIANT_RE: Regex =
        Regex::new(r"_sweep_([a-z_]+)_(-?[0-9][0-9_]*(?:[eE][+-]?[0-9]+)?)\.mat$").unwrap();
}

/// One tagged variant of a canonical profile
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileVariant {
    pub file: PathBuf,
    pub param_name: String,
    pub param_value: f64,
}

/// All tagged variants found in a profiles directory, grouped by the
/// canonical file they replace
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileSweep {
    variants: IndexMap<PathBuf, Vec<ProfileVariant>>,
}

impl ProfileSweep {
    /// Scan a directory for tagged profiles. A missing directory yields an
    /// empty sweep.
    pub fn discover(dir: &Path) -> Result<Self, SweepError> {
        let mut sweep = Self::default();
        if !dir.is_dir() {
            return Ok(sweep);
        }

        let mut files: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension().is_some_and(|ext| ext == PROFILE_EXTENSION)
                    && path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.contains("sweep"))
            })
            .collect();
        files.sort();

        for file in files {
            let (canonical, variant) = parse_variant(&file)?;
            sweep.variants.entry(canonical).or_default().push(variant);
        }
        for variants in sweep.variants.values_mut() {
            variants.sort_by(|a, b| a.param_value.total_cmp(&b.param_value));
        }

        if !sweep.is_empty() {
            tracing::info!(
                bases = sweep.variants.len(),
                "discovered tagged profile variants in {}",
                dir.display()
            );
        }
        Ok(sweep)
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Canonical profile files that have tagged variants
    pub fn bases(&self) -> impl Iterator<Item = &Path> {
        self.variants.keys().map(PathBuf::as_path)
    }

    pub fn variants(&self, base: &Path) -> Option<&[ProfileVariant]> {
        self.variants.get(base).map(Vec::as_slice)
    }

    /// Number of sweep steps, which every canonical file must agree on
    pub fn iterations(&self) -> Result<usize, SweepError> {
        let mut counts = self.variants.iter().map(|(base, v)| (base, v.len()));
        let Some((_, expected)) = counts.next() else {
            return Ok(0);
        };
        for (base, found) in counts {
            if found != expected {
                return Err(SweepError::LengthMismatch {
                    name: base.display().to_string(),
                    expected,
                    found,
                });
            }
        }
        Ok(expected)
    }

    /// Swept profile parameters and their values, in sweep order
    pub fn summary(&self) -> IndexMap<String, Vec<f64>> {
        let mut summary: IndexMap<String, Vec<f64>> = IndexMap::new();
        for variant in self.variants.values().flatten() {
            summary
                .entry(variant.param_name.clone())
                .or_default()
                .push(variant.param_value);
        }
        summary
    }

    /// Install the `index`-th variant of every canonical profile.
    ///
    /// Returns the parameter values the installed variants represent.
    pub fn swap(&self, index: usize) -> Result<IndexMap<String, f64>, SweepError> {
        let mut values = IndexMap::new();
        for (canonical, variants) in &self.variants {
            let variant = variants.get(index).ok_or_else(|| SweepError::LengthMismatch {
                name: canonical.display().to_string(),
                expected: index + 1,
                found: variants.len(),
            })?;
            replace_file(&variant.file, canonical)?;
            tracing::debug!(
                "installed profile {} as {}",
                variant.file.display(),
                canonical.display()
            );
            values.insert(variant.param_name.clone(), variant.param_value);
        }
        Ok(values)
    }
}

/// Split a tagged file name into its canonical path and variant metadata
pub fn parse_variant(path: &Path) -> Result<(PathBuf, ProfileVariant), SweepError> {
    let malformed = || SweepError::MalformedProfileName(path.to_path_buf());
    let file_name = path.file_name().and_then(|n| n.to_str()).ok_or_else(malformed)?;
    let captures = VARIANT_RE.captures(file_name).ok_or_else(malformed)?;

    let marker = captures.get(0).ok_or_else(malformed)?;
    let base = &file_name[..marker.start()];
    if base.is_empty() {
        return Err(malformed());
    }
    let param_name = captures[1].to_string();
    let param_value = parse_tagged_value(&captures[2]).ok_or_else(malformed)?;

    let canonical = path.with_file_name(format!("{base}.{PROFILE_EXTENSION}"));
    Ok((
        canonical,
        ProfileVariant {
            file: path.to_path_buf(),
            param_name,
            param_value,
        },
    ))
}

/// `1_5` is 1.5; more than one underscore is ambiguous
fn parse_tagged_value(raw: &str) -> Option<f64> {
    if raw.matches('_').count() > 1 {
        return None;
    }
    raw.replacen('_', ".", 1).parse().ok()
}

/// Copy `source` over `target` via a sibling temporary file so the target is
/// never left half-written
fn replace_file(source: &Path, target: &Path) -> std::io::Result<()> {
    let temp_path = target.with_extension(format!("{PROFILE_EXTENSION}.tmp"));
    fs::copy(source, &temp_path)?;
    fs::rename(&temp_path, target)?;
    Ok(())
}

/// Profile data files directly inside `dir`, sorted by name. A missing
/// directory holds none.
pub fn profile_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == PROFILE_EXTENSION))
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_names() {
        let (canonical, variant) =
            parse_variant(Path::new("/p/currentPF6_sweep_max_current_1_5.mat")).unwrap();
        assert_eq!(canonical, Path::new("/p/currentPF6.mat"));
        assert_eq!(variant.param_name, "max_current");
        assert_eq!(variant.param_value, 1.5);
    }

    #[test]
    fn parses_exponent_values() {
        let (_, variant) = parse_variant(Path::new("heat_sweep_power_1_6E5.mat")).unwrap();
        assert_eq!(variant.param_value, 1.6e5);
    }

    #[test]
    fn rejects_untagged_names() {
        assert!(matches!(
            parse_variant(Path::new("currentPF6_sweep.mat")),
            Err(SweepError::MalformedProfileName(_))
        ));
        assert!(parse_variant(Path::new("a_sweep_x_1_2_3.mat")).is_err());
    }

    #[test]
    fn discovers_and_swaps_variants() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("load.mat"), b"original").unwrap();
        fs::write(dir.path().join("load_sweep_power_2.mat"), b"two").unwrap();
        fs::write(dir.path().join("load_sweep_power_1_5.mat"), b"one and a half").unwrap();
        fs::write(dir.path().join("unrelated.mat"), b"x").unwrap();

        let sweep = ProfileSweep::discover(dir.path()).unwrap();
        assert_eq!(sweep.iterations().unwrap(), 2);
        assert_eq!(sweep.summary()["power"], vec![1.5, 2.0]);

        let values = sweep.swap(0).unwrap();
        assert_eq!(values["power"], 1.5);
        assert_eq!(fs::read(dir.path().join("load.mat")).unwrap(), b"one and a half");
        assert!(dir.path().join("load_sweep_power_1_5.mat").exists());

        sweep.swap(1).unwrap();
        assert_eq!(fs::read(dir.path().join("load.mat")).unwrap(), b"two");
    }

    #[test]
    fn missing_directory_is_an_empty_sweep() {
        let sweep = ProfileSweep::discover(Path::new("/nonexistent/profiles")).unwrap();
        assert!(sweep.is_empty());
        assert_eq!(sweep.iterations().unwrap(), 0);
    }

    #[test]
    fn lists_profile_files_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.mat"), b"b").unwrap();
        fs::write(dir.path().join("a.mat"), b"a").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let files = profile_files(dir.path()).unwrap();
        assert_eq!(files, vec![dir.path().join("a.mat"), dir.path().join("b.mat")]);
        assert!(profile_files(&dir.path().join("absent")).unwrap().is_empty());
    }
}
