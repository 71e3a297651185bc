//! ---
//! courier_section: "01-core-functionality"
//! courier_subsection: "module"
//! courier_type: "source"
//! courier_scope: "code"
//! courier_description: "Shared configuration and tracing primitives."
//! courier_version: "v0.0.0-prealpha"
//! courier_owner: "tbd"
//! ---
//! Shared primitives for the Courier workspace.
//! This crate exposes configuration loading and tracing initialisation
//! consumed by the bridge crates and the daemon.

pub mod config;
pub mod logging;

pub use config::{
    AppConfig, BindingResetPolicy, BridgeConfig, CodecKind, LoadedAppConfig, LoggingConfig,
};
pub use logging::{init_tracing, log_file_name, LogFormat, LOG_ENV};
