//! CLI error types with miette diagnostics.
//!
//! Maps `ConfigError` and `CoreError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use adcadence_config::ConfigError;
use adcadence_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    #[cfg_attr(not(feature = "simulate"), allow(dead_code))]
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(adcadence::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: adcadence config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Config file already exists at {path}")]
    #[diagnostic(
        code(adcadence::config_exists),
        help("Use --force (-f) to overwrite it.")
    )]
    ConfigExists { path: String },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(adcadence::validation))]
    Validation { field: String, reason: String },

    #[error(transparent)]
    #[diagnostic(
        code(adcadence::config),
        help("Check the config file with: adcadence config show")
    )]
    Config(Box<ConfigError>),

    // ── Orchestrator ─────────────────────────────────────────────────
    #[error("Orchestrator error: {0}")]
    #[diagnostic(code(adcadence::orchestrator))]
    Orchestrator(#[from] CoreError),

    #[cfg(feature = "simulate")]
    #[error("Scenario '{scenario}' stalled: {waiting_for} never happened")]
    #[diagnostic(
        code(adcadence::stalled),
        help("The simulated SDK never produced the expected event; rerun with -vv for a trace.")
    )]
    Stalled {
        scenario: String,
        waiting_for: String,
    },

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render JSON: {0}")]
    #[diagnostic(code(adcadence::json))]
    Json(#[from] serde_json::Error),

    #[error("Failed to render TOML: {0}")]
    #[diagnostic(code(adcadence::toml))]
    Toml(#[from] toml::ser::Error),
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::ProfileNotFound { name } => Self::ProfileNotFound {
                name,
                available: "(none)".into(),
            },
            ConfigError::Io(e) => Self::Io(e),
            other => Self::Config(Box::new(other)),
        }
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::ConfigExists { .. } => exit_code::CONFLICT,
            Self::Validation { .. } => exit_code::USAGE,
            Self::Config(_) => exit_code::CONFIG,
            #[cfg(feature = "simulate")]
            Self::Stalled { .. } => exit_code::TIMEOUT,
            _ => exit_code::GENERAL,
        }
    }
}
