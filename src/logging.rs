//! Logging configuration for the `quarry` binary.
//!
//! Command output (`quarry run` rows, `quarry cache show --output json`)
//! goes to stdout, so logs never do. By default they go to stderr; with
//! `--log-file` they are appended to `quarry.log` under the platform state
//! directory. `RUST_LOG` selects the level, `info` when unset.

use std::fs::{self, File};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initializes logging for `quarry --log-file`.
///
/// Location: `~/.local/state/quarry/quarry.log` on Linux (XDG state directory),
/// or the platform-appropriate state/config directory on other systems.
/// Falls back to stderr if the file cannot be opened, so a broken log
/// location never fails the command itself.
pub fn init_file_logging() {
    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            eprintln!("Warning: Could not create log directory: {e}");
            init_stderr_logging();
            return;
        }
    }

    // Each invocation is short-lived; appending keeps the history of earlier runs.
    let log_file = match File::options().create(true).append(true).open(&log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not open log file: {e}");
            init_stderr_logging();
            return;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(log_file)
        .with_ansi(false)
        .init();
}

/// Initializes logging to stderr, the default for every subcommand.
///
/// Stdout is left to command output so it can be piped into other tools.
pub fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

/// Returns the path for the log file.
///
/// Uses XDG state directory on Linux (`~/.local/state/quarry/quarry.log`),
/// or falls back to config directory on other platforms.
pub fn get_log_path() -> PathBuf {
    if let Some(state_dir) = dirs::state_dir() {
        return state_dir.join("quarry").join("quarry.log");
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("quarry").join("quarry.log");
    }

    std::env::temp_dir().join("quarry.log")
}
