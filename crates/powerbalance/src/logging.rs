//! Per-invocation log files.
//!
//! Every invocation of the binary writes to its own file under
//! `<data_dir>/logs`, named after the time it started, so the log of a run
//! can be matched to the output directory of the same session. Only the most
//! recent [`KEEP_RUN_LOGS`] files are kept.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Directory under the data directory holding the run logs
pub const LOG_DIR: &str = "logs";
/// File name prefix of a run log
pub const LOG_PREFIX: &str = "powerbalance_";
const LOG_EXTENSION: &str = "log";
/// Number of run logs kept, the new one included
pub const KEEP_RUN_LOGS: usize = 20;

/// Path of the log for a run started at `time_stamp`
pub fn run_log_path(log_dir: &Path, time_stamp: &str) -> PathBuf {
    log_dir.join(format!("{LOG_PREFIX}{time_stamp}.{LOG_EXTENSION}"))
}

/// Run logs in `log_dir`, oldest first
pub fn run_logs(log_dir: &Path) -> io::Result<Vec<PathBuf>> {
    if !log_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut logs: Vec<PathBuf> = fs::read_dir(log_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path.extension().is_some_and(|ext| ext == LOG_EXTENSION)
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(LOG_PREFIX))
        })
        .collect();
    // Time stamps are zero padded, so name order is start order
    logs.sort();
    Ok(logs)
}

/// Delete the oldest run logs so at most `keep` remain. Returns the removed
/// files.
pub(crate) fn prune_run_logs(log_dir: &Path, keep: usize) -> io::Result<Vec<PathBuf>> {
    let logs = run_logs(log_dir)?;
    let excess = logs.len().saturating_sub(keep);
    let removed: Vec<PathBuf> = logs.into_iter().take(excess).collect();
    for log in &removed {
        fs::remove_file(log)?;
    }
    Ok(removed)
}

/// Filter used when `RUST_LOG` is not set
pub fn default_filter(level: &str) -> String {
    format!("powerbalance={level},powerbalance_core={level}")
}

/// Initialise logging into a fresh run log under `{data_dir}/logs`.
///
/// The level applies to both crates unless `RUST_LOG` is set. With `echo`
/// set, events are also written to stderr. Returns the path of the run log.
pub fn init_logging(data_dir: &Path, level: &str, echo: bool) -> color_eyre::Result<PathBuf> {
    let log_dir = data_dir.join(LOG_DIR);
    fs::create_dir_all(&log_dir)?;

    if let Err(e) = prune_run_logs(&log_dir, KEEP_RUN_LOGS.saturating_sub(1)) {
        eprintln!("Warning: failed to prune old logs in {}: {e}", log_dir.display());
    }

    let time_stamp = jiff::Zoned::now().strftime("%Y_%m_%d_%H_%M_%S").to_string();
    let log_path = run_log_path(&log_dir, &time_stamp);
    let file = File::options().create(true).append(true).open(&log_path)?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(level)));

    let stderr_layer = echo.then(|| {
        fmt::layer()
            .with_writer(io::stderr)
            .with_target(false)
            .compact()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true),
        )
        .with(stderr_layer)
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log = %log_path.display(),
        "powerbalance started"
    );
    Ok(log_path)
}
