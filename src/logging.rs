//! Logging initialization for console and service modes

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Settings;

/// Initialize logging for an interactive console run.
///
/// `RUST_LOG` wins over `level` when set. Repeated calls are harmless;
/// the first subscriber stays installed.
pub fn init_console(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Initialize logging for a managed service run.
///
/// Services have no console; output goes to the configured file, or
/// nowhere when none is set.
pub fn init_service(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.as_str()));

    if !settings.log_file.is_empty() {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&settings.log_file);

        match file {
            Ok(file) => {
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().with_writer(file).with_ansi(false))
                    .try_init();
                return;
            }
            Err(e) => {
                eprintln!("Warning: failed to open log file: {}", e);
            }
        }
    }

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::sink))
        .try_init();
}
