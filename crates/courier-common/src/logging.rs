//! ---
//! courier_section: "01-core-functionality"
//! courier_subsection: "module"
//! courier_type: "source"
//! courier_scope: "code"
//! courier_description: "Tracing setup for the Courier daemon, keyed by bridge destination."
//! courier_version: "v0.0.0-prealpha"
//! courier_owner: "tbd"
//! ---
use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{AppConfig, LoggingConfig};

/// Environment variable that overrides [`LoggingConfig::level`].
pub const LOG_ENV: &str = "COURIER_LOG";

static WRITER_GUARDS: OnceCell<Vec<WorkerGuard>> = OnceCell::new();

/// Stdout format for the daemon. The log file is always JSON.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// Install the global subscriber for `service` delivering into `config.bridge.destination`.
///
/// The filter comes from `COURIER_LOG` when set, otherwise from
/// [`LoggingConfig::level`]. Unless [`LoggingConfig::file_output`] is off,
/// events are also written to a daily JSON file in [`LoggingConfig::directory`]
/// named by [`log_file_name`].
pub fn init_tracing(service: &str, config: &AppConfig) -> Result<()> {
    let logging = &config.logging;
    let destination = config.bridge.destination.as_str();
    let directive = filter_directive(std::env::var(LOG_ENV).ok(), logging);
    let filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("invalid log filter `{directive}`"))?;

    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let mut guards = vec![stdout_guard];
    let stdout_layer = match logging.format {
        LogFormat::StructuredJson => fmt::layer()
            .with_target(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .json()
            .with_writer(stdout_writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(stdout_writer)
            .boxed(),
    };

    let file_name = log_file_name(service, destination);
    let file_layer = if logging.file_output {
        let directory = &logging.directory;
        std::fs::create_dir_all(directory).with_context(|| {
            format!("unable to create log directory {}", directory.display())
        })?;
        let (file_writer, file_guard) =
            tracing_appender::non_blocking(daily(directory, &file_name));
        guards.push(file_guard);
        Some(
            fmt::layer()
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .json()
                .with_writer(file_writer)
                .boxed(),
        )
    } else {
        None
    };
    let _ = WRITER_GUARDS.set(guards);

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .ok();

    info!(
        service,
        destination,
        filter = %directive,
        log_dir = %logging.directory.display(),
        log_file = logging.file_output.then_some(file_name.as_str()),
        "tracing initialised"
    );
    Ok(())
}

/// Base name of the rolling log file for `service` serving `destination`.
///
/// Characters outside `[A-Za-z0-9_-]` in the destination label become `-`.
pub fn log_file_name(service: &str, destination: &str) -> String {
    let label: String = destination
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    format!("{service}-{label}.log")
}

fn filter_directive(env_value: Option<String>, config: &LoggingConfig) -> String {
    env_value
        .filter(|directive| !directive.trim().is_empty())
        .unwrap_or_else(|| config.level.clone())
}
