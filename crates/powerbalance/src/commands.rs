//! Implementation of the command line subcommands.
//!
//! Each command writes its report to the given writer so the output can be
//! captured in tests.

use std::io::Write;
use std::path::{Path, PathBuf};

use color_eyre::eyre::{WrapErr, bail};
use powerbalance_core::models::get_local_models;
use powerbalance_core::parameters::ParameterSet;
use powerbalance_core::session::plan_run;
use powerbalance_core::sweep::{PROFILE_EXTENSION, ProfileSweep, SweepPlan, SweepSpec, profile_files};
use powerbalance_core::{ParamValue, PowerBalance, SessionConfig};

use crate::omc::OmcSession;

/// Parse a `name=v1,v2,...` sweep argument. Values are coerced from text.
pub fn parse_sweep_argument(argument: &str) -> color_eyre::Result<(String, Vec<ParamValue>)> {
    let Some((name, values)) = argument.split_once('=') else {
        bail!("sweep argument '{argument}' must have the form name=value1,value2,...");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("sweep argument '{argument}' has no parameter name");
    }
    let values: Vec<ParamValue> = values
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| ParamValue::Str(v.to_string()).coerce())
        .collect();
    if values.is_empty() {
        bail!("sweep argument '{argument}' has no values");
    }
    Ok((name.to_string(), values))
}

/// Build a sweep from repeated `--sweep` arguments
pub fn sweep_from_arguments(arguments: &[String]) -> color_eyre::Result<Option<SweepSpec>> {
    if arguments.is_empty() {
        return Ok(None);
    }
    let mut spec = SweepSpec::new();
    for argument in arguments {
        let (name, values) = parse_sweep_argument(argument)?;
        spec.insert(name, values)?;
    }
    Ok(Some(spec))
}

/// List the models declared under `path` without compiling them
pub fn list_models(path: &Path, out: &mut impl Write) -> color_eyre::Result<()> {
    let models = get_local_models(path, None)
        .wrap_err_with(|| format!("failed to read models from {}", path.display()))?;

    for model in models.values() {
        writeln!(out, "{}", model.name)?;
        let mut submodels: Vec<(&String, &String)> = model.submodels.iter().collect();
        submodels.sort();
        for (instance, declared) in submodels {
            writeln!(out, "    {instance}: {declared}")?;
        }
    }
    Ok(())
}

/// Print the parameter set of a session, optionally filtered by a search term
pub fn show_parameters(
    config: &SessionConfig,
    search: Option<&str>,
    out: &mut impl Write,
) -> color_eyre::Result<()> {
    let parameters = ParameterSet::from_config(config)?;

    let names: Vec<String> = match search {
        Some(term) => parameters.search(term),
        None => parameters.keys().map(str::to_string).collect(),
    };
    for name in names {
        writeln!(out, "{name} = {}", parameters.get_parameter(&name)?)?;
    }

    if search.is_none() {
        writeln!(out)?;
        for (name, value) in parameters.simulation_options().as_values() {
            writeln!(out, "{name} = {value}")?;
        }
        let scenario = parameters.plasma_scenario().times();
        writeln!(
            out,
            "plasma scenario: ramp up {}, flat top {}..{}, ramp down end {}",
            scenario[0], scenario[1], scenario[2], scenario[3]
        )?;
    }
    Ok(())
}

/// Write a hint when the profiles directory holds no profile data. Returns
/// whether the hint was written.
pub fn warn_missing_profiles(config: &SessionConfig, out: &mut impl Write) -> color_eyre::Result<bool> {
    let dir = &config.profiles_directory;
    if !profile_files(dir)?.is_empty() {
        return Ok(false);
    }
    writeln!(
        out,
        "warning: no .{PROFILE_EXTENSION} profiles in {}; models reading input profiles will fail until they are generated there",
        dir.display()
    )?;
    Ok(true)
}

/// Print what a run would execute without invoking an engine
pub fn show_plan(
    config: &SessionConfig,
    extra: Option<SweepSpec>,
    out: &mut impl Write,
) -> color_eyre::Result<SweepPlan> {
    let profiles = ProfileSweep::discover(&config.profiles_directory)?;
    let plan = plan_run(config, extra, &profiles)?;

    match &plan {
        SweepPlan::Single => writeln!(out, "single run")?,
        SweepPlan::ProfileOnly { iterations } => {
            writeln!(out, "profile sweep: {iterations} iterations")?;
        }
        SweepPlan::Parameter {
            combinations,
            swap_profiles,
        } => {
            writeln!(out, "parameter sweep: {} iterations", combinations.len())?;
            if *swap_profiles {
                writeln!(out, "profiles are swapped in step with the parameters")?;
            }
            for (i, combination) in combinations.iter().enumerate() {
                let assignments: Vec<String> = combination
                    .iter()
                    .map(|(name, value)| format!("{name}={value}"))
                    .collect();
                writeln!(out, "  {i}: {}", assignments.join(", "))?;
            }
        }
    }

    for (name, values) in profiles.summary() {
        let values: Vec<String> = values.iter().map(f64::to_string).collect();
        writeln!(out, "profile {name}: {}", values.join(", "))?;
    }
    warn_missing_profiles(config, out)?;
    Ok(plan)
}

/// Run a full session through `omc` and return the output directory
pub fn run(
    config: SessionConfig,
    output_dir: &Path,
    omc: &Path,
    extra: Option<SweepSpec>,
    out: &mut impl Write,
) -> color_eyre::Result<PathBuf> {
    warn_missing_profiles(&config, out)?;
    let engine = OmcSession::new(omc)?;
    let mut session = PowerBalance::new(config, engine).wrap_err("failed to set up session")?;

    writeln!(out, "simulating: {}", session.configured_models().join(", "))?;
    let written = session
        .run_simulation(output_dir, extra)
        .wrap_err("simulation run failed")?;
    writeln!(out, "results written to {}", written.display())?;
    Ok(written)
}
