//! Tracing setup shared by the binaries.
//!
//! Every run logs to stdout and appends the same lines (without colours)
//! to `logs/<prefix>_<timestamp>.log`. `RUST_LOG` overrides the default
//! `info` filter.

use anyhow::{Context, Result};
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const LOG_DIR: &str = "logs";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn log_file_path(dir: &Path, prefix: &str) -> PathBuf {
    let stamp = Utc::now().format("%Y-%m-%dT%H-%M-%S%.3fZ");
    dir.join(format!("{}_{}.log", prefix, stamp))
}

/// Console plus file logging. Returns the log file path.
pub fn init(prefix: &str) -> Result<PathBuf> {
    let dir = Path::new(LOG_DIR);
    fs::create_dir_all(dir).with_context(|| format!("Failed to create log directory: {:?}", dir))?;
    let path = log_file_path(dir, prefix);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file: {:?}", path))?;

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_thread_names(true))
        .with(
            fmt::layer()
                .with_thread_names(true)
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(path)
}

/// Console-only logging for small utilities.
pub fn init_console() {
    fmt().with_env_filter(env_filter()).with_target(false).init();
}
