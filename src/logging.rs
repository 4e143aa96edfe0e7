//! Logging setup for Feedscout.
//!
//! The engine itself only emits `tracing` events; host applications call
//! [`init`] once at startup to route them somewhere.

use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::{Result, ScoutError};

/// Level filter for a configured level name, `info` when unrecognized.
fn parse_level(level: &str) -> LevelFilter {
    match level.trim().to_ascii_lowercase().as_str() {
        "" => LevelFilter::INFO,
        "warning" => LevelFilter::WARN,
        other => other.parse().unwrap_or(LevelFilter::INFO),
    }
}

fn open_log_file(path: &str) -> Result<File> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(File::create(path)?)
}

/// Install the global subscriber described by `config`.
///
/// Events go to stdout, and also to `config.file` when one is set. `RUST_LOG`
/// directives are honoured on top of the configured level. Fails if a global
/// subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(parse_level(&config.level).into());

    let file_layer = match config.file.as_deref() {
        Some(path) => Some(
            fmt::layer()
                .with_writer(Arc::new(open_log_file(path)?))
                .with_ansi(false)
                .with_target(true),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stdout).with_target(true))
        .with(file_layer)
        .try_init()
        .map_err(|e| ScoutError::Config(format!("logging already initialized: {e}")))
}

/// Console-only logging at `level`, for development and tests.
pub fn init_console_only(level: &str) -> Result<()> {
    init(&LoggingConfig {
        level: level.to_string(),
        file: None,
    })
}
