//! Tracing subscriber setup shared by the `packastack-orchestrator` and
//! `packastack-driver` entry points: a console layer, an optional file
//! layer and an optional chrome-trace layer, all driven by environment
//! variables so CI and interactive runs need no code changes.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{bail, Context, Result};
use itertools::Itertools;
use tracing_chrome::ChromeLayerBuilder;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;
use tracing_subscriber::Layer;

/// Trace output directory/file; setting both is an error.
pub const TRACE_DIR_ENV: &str = "PACKASTACK_TRACE_DIR";
pub const TRACE_FILE_ENV: &str = "PACKASTACK_TRACE_FILE";

/// Log output directory/file; setting both is an error.
pub const LOG_DIR_ENV: &str = "PACKASTACK_LOG_DIR";
pub const LOG_FILE_ENV: &str = "PACKASTACK_LOG_FILE";

/// Set to `"0"` to suppress console logging entirely.
pub const CONSOLE_LOG_ENV: &str = "PACKASTACK_LOG_CONSOLE";

/// Set to `"1"` to emit console logs as JSON lines instead of the default
/// human-readable format, for log-aggregating CI pipelines.
pub const CONSOLE_JSON_ENV: &str = "PACKASTACK_LOG_JSON";

/// RAII guard that keeps the tracing subscriber (and chrome-trace flush
/// thread, if any) alive for the life of the process.
pub struct LogGuard {
    _span_guard: tracing::span::EnteredSpan,
    _flush_guard: Option<tracing_chrome::FlushGuard>,
}

pub struct LoggingConfig {
    pub trace_file: Option<PathBuf>,
    pub log_file: Option<(PathBuf, EnvFilter)>,
    pub console_logger: Option<EnvFilter>,
    pub console_json: bool,
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self> {
        let timestamp = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap()
            .as_nanos();

        let get_file = |dir_env: &str, file_env: &str, ext: &str| -> Result<Option<PathBuf>> {
            Ok(
                match (std::env::var_os(file_env), std::env::var_os(dir_env)) {
                    (Some(_), Some(_)) => bail!("you can't have both {file_env} and {dir_env} set"),
                    (Some(file), None) => {
                        std::env::remove_var(file_env);
                        Some(PathBuf::from(file))
                    }
                    (None, Some(dir)) => {
                        let name = format!("{}.{timestamp}.{ext}", current_process_name());
                        Some(Path::new(&dir).join(name))
                    }
                    (None, None) => None,
                },
            )
        };

        let trace_file = get_file(TRACE_DIR_ENV, TRACE_FILE_ENV, "json")?;
        let log_file = get_file(LOG_DIR_ENV, LOG_FILE_ENV, "log")?;

        let console_logger = match std::env::var(CONSOLE_LOG_ENV).ok().as_deref() {
            Some("0") => None,
            _ => Some(
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::INFO.into())
                    .from_env()?,
            ),
        };

        let log_file = match log_file {
            Some(path) => Some((
                path,
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::INFO.into())
                    .from_env()?,
            )),
            None => None,
        };

        let console_json = matches!(std::env::var(CONSOLE_JSON_ENV).ok().as_deref(), Some("1"));

        Ok(Self {
            trace_file,
            log_file,
            console_logger,
            console_json,
        })
    }

    /// Installs the global subscriber and opens a `main` span covering the
    /// rest of the process.
    pub fn setup(self) -> Result<LogGuard> {
        let mut layers = Vec::new();

        let flush_guard = if let Some(trace_file) = &self.trace_file {
            let (chrome_layer, guard) = ChromeLayerBuilder::new()
                .file(trace_file)
                .build();
            layers.push(chrome_layer.boxed());
            Some(guard)
        } else {
            None
        };

        if let Some(filter) = self.console_logger {
            let layer = if self.console_json {
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_filter(filter)
                    .boxed()
            } else {
                tracing_subscriber::fmt::layer()
                    .with_ansi(true)
                    .with_writer(std::io::stderr)
                    .with_filter(filter)
                    .boxed()
            };
            layers.push(layer);
        }

        if let Some((log_file, filter)) = self.log_file {
            let f = std::fs::File::create(&log_file)
                .with_context(|| format!("failed to open log file {log_file:?}"))?;
            layers.push(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(f)
                    .with_filter(filter)
                    .boxed(),
            );
        }

        tracing_subscriber::registry().with(layers).try_init().context(
            "failed to start tracing; a subscriber is probably already installed",
        )?;

        let args = std::env::args()
            .map(|s| shell_escape::escape(s.into()))
            .join(" ");
        let span_guard = tracing::trace_span!("main", args = args).entered();

        Ok(LogGuard {
            _span_guard: span_guard,
            _flush_guard: flush_guard,
        })
    }
}

/// Emits a single `COMMAND: ...` info-level line with the current argv,
/// shell-escaped, for operators grepping logs.
pub fn log_current_command_line() {
    let escaped = std::env::args()
        .map(|s| shell_escape::escape(s.into()))
        .join(" ");
    tracing::info!("COMMAND: {}", escaped);
}

fn current_process_name() -> String {
    std::env::current_exe()
        .unwrap_or_default()
        .file_name()
        .unwrap_or(OsStr::new("__unknown__"))
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_file_rejects_both_dir_and_file_set() {
        std::env::set_var(TRACE_DIR_ENV, "/tmp/somedir");
        std::env::set_var(TRACE_FILE_ENV, "/tmp/somefile.json");
        let result = LoggingConfig::from_env();
        std::env::remove_var(TRACE_DIR_ENV);
        std::env::remove_var(TRACE_FILE_ENV);
        assert!(result.is_err());
    }
}
