//! ---
//! courier_section: "01-core-functionality"
//! courier_subsection: "module"
//! courier_type: "source"
//! courier_scope: "code"
//! courier_description: "Shared configuration and tracing primitives."
//! courier_version: "v0.0.0-prealpha"
//! courier_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::debug;
use tracing_subscriber::filter::EnvFilter;

use crate::logging::LogFormat;

fn default_destination() -> String {
    "main-frame".to_owned()
}

fn default_pending_warn_threshold() -> usize {
    1024
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_file_output() -> bool {
    true
}

/// Primary configuration object for the Courier runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "COURIER_CONFIG";

    /// Load configuration from disk together with the effective source path.
    ///
    /// `COURIER_CONFIG`, when set, wins over every candidate.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.bridge.validate()?;
        self.logging.validate()
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Payload codec used to project message payloads into destination values.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CodecKind {
    #[default]
    Json,
    Cbor,
}

/// What happens to the active channel binding when the destination context is replaced.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BindingResetPolicy {
    /// Park the active binding so it is re-promoted when the next context is ready.
    #[default]
    Preserve,
    /// Release the active binding; only a pending binding survives the reset.
    Drop,
}

/// Settings for a single delivery bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Label identifying the destination in logs and metrics.
    #[serde(default = "default_destination")]
    pub destination: String,
    #[serde(default)]
    pub codec: CodecKind,
    #[serde(default)]
    pub binding_reset_policy: BindingResetPolicy,
    /// Queue depth at which a warning is logged while the destination is not ready.
    #[serde(default = "default_pending_warn_threshold")]
    pub pending_warn_threshold: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            destination: default_destination(),
            codec: CodecKind::default(),
            binding_reset_policy: BindingResetPolicy::default(),
            pending_warn_threshold: default_pending_warn_threshold(),
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.destination.trim().is_empty() {
            return Err(anyhow!("bridge destination label must not be empty"));
        }
        if self.pending_warn_threshold == 0 {
            return Err(anyhow!("bridge pending_warn_threshold must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory holding the rolling log file.
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    /// Filter directive used when `COURIER_LOG` is unset, e.g. `info,courier_msg=debug`.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Write the rolling JSON file next to stdout output.
    #[serde(default = "default_file_output")]
    pub file_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            level: default_log_level(),
            file_output: default_file_output(),
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.level.trim().is_empty() {
            return Err(anyhow!("logging level must not be empty"));
        }
        EnvFilter::try_new(&self.level)
            .with_context(|| format!("logging level `{}` is not a valid filter", self.level))?;
        Ok(())
    }
}
