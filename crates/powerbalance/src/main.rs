use std::path::PathBuf;

use clap::{Parser, Subcommand};
use powerbalance::commands;
use powerbalance::init_logging;
use powerbalance::omc::DEFAULT_OMC;
use powerbalance_core::SessionConfig;

#[derive(Parser, Debug)]
#[command(name = "powerbalance")]
#[command(about = "Power balance simulations of tokamak plant models")]
struct Args {
    /// Directory for the log file (default: ~/.powerbalance/)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log level (debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Also print log events to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the models declared in a Modelica file or directory
    Models {
        path: PathBuf,
    },
    /// Print the parameters of a session
    Parameters {
        /// Session configuration file
        config: PathBuf,
        /// Only show parameters containing this term
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Print the sweep a run would perform
    Plan {
        /// Session configuration file
        config: PathBuf,
        /// Additional sweep, as name=value1,value2,...
        #[arg(long = "sweep")]
        sweeps: Vec<String>,
    },
    /// Build and simulate the configured models
    Run {
        /// Session configuration file
        config: PathBuf,
        /// Directory receiving the results folder
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
        /// OpenModelica compiler executable
        #[arg(long, default_value = DEFAULT_OMC)]
        omc: PathBuf,
        /// Additional sweep, as name=value1,value2,...
        #[arg(long = "sweep")]
        sweeps: Vec<String>,
    },
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".powerbalance")
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let data_dir = args.data_dir.unwrap_or_else(default_data_dir);

    init_logging(&data_dir, &args.log_level, args.verbose)?;

    let mut stdout = std::io::stdout().lock();
    match args.command {
        Command::Models { path } => commands::list_models(&path, &mut stdout)?,
        Command::Parameters { config, search } => {
            let config = SessionConfig::load(&config)?;
            commands::show_parameters(&config, search.as_deref(), &mut stdout)?;
        }
        Command::Plan { config, sweeps } => {
            let config = SessionConfig::load(&config)?;
            let extra = commands::sweep_from_arguments(&sweeps)?;
            commands::show_plan(&config, extra, &mut stdout)?;
        }
        Command::Run {
            config,
            output,
            omc,
            sweeps,
        } => {
            let config = SessionConfig::load(&config)?;
            let extra = commands::sweep_from_arguments(&sweeps)?;
            commands::run(config, &output, &omc, extra, &mut stdout)?;
        }
    }

    tracing::info!("powerbalance finished");
    Ok(())
}
