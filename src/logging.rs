// Logging setup: a tracing fmt subscriber on stderr, plus a plain-text copy
// in a log file when one is configured. `RUST_LOG` wins over the configured
// level.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Calling it twice is harmless; the second
/// call is ignored.
pub fn init(level: &str, log_file: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let mut file_error = None;
    let file_layer = log_file.and_then(|path| match open_log_file(path) {
        Ok(file) => Some(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false),
        ),
        Err(e) => {
            file_error = Some(format!("{}: {e}", path.display()));
            None
        }
    });

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .is_ok();

    if installed {
        match (&file_error, log_file) {
            (Some(err), _) => {
                tracing::warn!("failed to open log file {err}, logging to console only")
            }
            (None, Some(path)) => {
                tracing::debug!(level, file = %path.display(), "logging configured")
            }
            (None, None) => tracing::debug!(level, "logging configured"),
        }
    }
}

/// Console-only subscriber for the current thread, used while settings and
/// `.env` are still being loaded. Drop the guard before calling `init`.
pub fn bootstrap() -> tracing::subscriber::DefaultGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .set_default()
}

fn open_log_file(path: &Path) -> std::io::Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}
