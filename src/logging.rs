//! Logging setup
//!
//! Console output goes to stderr so it does not mix with the prompts the host
//! prints on stdout. When a log directory is given, everything is also
//! appended to `voicenav.log` without colour codes.

use std::path::Path;
use tracing_subscriber::prelude::*;

/// Log file created inside the log directory
pub const LOG_FILE_NAME: &str = "voicenav.log";

/// Format timestamps using the system's local time via chrono
struct LocalTimer;

impl tracing_subscriber::fmt::time::FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// Installs the global subscriber.
///
/// `RUST_LOG` overrides `default_filter`. Calling this more than once is
/// harmless; later calls leave the first subscriber in place.
pub fn init(log_dir: Option<&Path>, default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(LocalTimer);

    let log_file = log_dir.and_then(|dir| {
        let _ = std::fs::create_dir_all(dir);
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(LOG_FILE_NAME))
            .ok()
    });

    let result = if let Some(file) = log_file {
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::sync::Mutex::new(file))
            .with_timer(LocalTimer)
            .with_ansi(false);
        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("Logging already initialised");
    }
}
