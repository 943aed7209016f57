//! Tracing setup.
//!
//! Stdout gets a compact formatter filtered by `RUST_LOG` (default `info`). A second layer
//! writes through a non-blocking worker to the file named by [`Config::log_file`], or to
//! daily-rotated files under `logs/` when none is configured.
use std::fs::{self, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::config::Config;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Directory used for rotated logs when no file is configured.
pub const DEFAULT_LOG_DIR: &str = "logs";

/// File name prefix for rotated logs.
pub const DEFAULT_LOG_PREFIX: &str = "docqa.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Destination of the file log layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    /// Append to one file.
    File(PathBuf),
    /// Rotate daily inside `directory`.
    Daily {
        /// Directory holding the rotated files.
        directory: PathBuf,
        /// Prefix of each rotated file name.
        prefix: String,
    },
}

impl LogTarget {
    /// Pick the target for `config`; blank paths count as unset.
    pub fn from_config(config: &Config) -> Self {
        match config
            .log_file
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
        {
            Some(path) => Self::File(PathBuf::from(path)),
            None => Self::Daily {
                directory: PathBuf::from(DEFAULT_LOG_DIR),
                prefix: DEFAULT_LOG_PREFIX.to_string(),
            },
        }
    }

    /// Create missing directories and open a non-blocking writer.
    fn writer(&self) -> io::Result<(NonBlocking, WorkerGuard)> {
        match self {
            Self::File(path) => {
                if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
                    fs::create_dir_all(parent)?;
                }
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                Ok(tracing_appender::non_blocking(file))
            }
            Self::Daily { directory, prefix } => {
                fs::create_dir_all(directory)?;
                let appender = tracing_appender::rolling::daily(directory, prefix);
                Ok(tracing_appender::non_blocking(appender))
            }
        }
    }
}

/// Install the stdout layer and, when the target can be opened, the file layer.
///
/// The writer guard is kept for the process lifetime.
pub fn init_tracing(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();

    let target = LogTarget::from_config(config);
    let file_layer = match target.writer() {
        Ok((writer, guard)) => {
            let _ = LOG_GUARD.set(guard);
            Some(
                fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_ansi(false)
                    .compact(),
            )
        }
        Err(err) => {
            // The subscriber is not installed yet.
            eprintln!("File logging disabled, cannot open {target:?}: {err}");
            None
        }
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();
}
