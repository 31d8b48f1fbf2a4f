//! Tracing configuration and log routing.
//!
//! The application logs to stdout using a compact formatter, and to a file. When
//! `KBPREP_LOG_FILE` is set, logs are appended to that path; otherwise the file logger writes
//! `<output>/logs/kbprep.log`. A non-blocking writer keeps file I/O off the worker threads.
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::persist::LOGS_DIR;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// File name used under the output tree's `logs/` directory.
pub const LOG_FILE_NAME: &str = "kbprep.log";

/// Configure tracing subscribers for stdout and file logging.
///
/// - Respects `RUST_LOG` for filtering (defaults to `info`).
/// - Installs a compact stdout layer and, when the file can be opened, a file layer.
/// - Keeps the non-blocking writer's guard alive for the process lifetime.
pub fn init_tracing(output_dir: &Path) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    if let Some(writer) = configure_file_writer(output_dir) {
        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .compact();

        registry.with(file_layer).init();
    } else {
        registry.init();
    }
}

/// Where file logs go: `KBPREP_LOG_FILE` when set, else `<output>/logs/kbprep.log`.
pub fn log_file_path(output_dir: &Path) -> PathBuf {
    match std::env::var_os("KBPREP_LOG_FILE") {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => output_dir.join(LOGS_DIR).join(LOG_FILE_NAME),
    }
}

/// Open the log file in append mode behind a non-blocking writer.
///
/// Returns `None` when the parent directory cannot be created or the file cannot be opened;
/// stdout logging still works in that case.
fn configure_file_writer(output_dir: &Path) -> Option<NonBlocking> {
    let path = log_file_path(output_dir);
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        if let Err(err) = std::fs::create_dir_all(parent) {
            eprintln!("Failed to create log directory {}: {err}", parent.display());
            return None;
        }
    }
    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
    {
        Ok(file) => file,
        Err(err) => {
            eprintln!("Failed to open log file {}: {err}", path.display());
            return None;
        }
    };
    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    let _ = LOG_GUARD.set(guard);
    Some(non_blocking)
}
