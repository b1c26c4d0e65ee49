//! Clap derive structures for the `adcadence` CLI.

use std::path::PathBuf;
#[cfg(feature = "simulate")]
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
#[cfg(feature = "simulate")]
use serde::Serialize;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// adcadence -- ad lifecycle orchestration, simulated
#[derive(Debug, Parser)]
#[command(
    name = "adcadence",
    version,
    about = "Simulate and configure the adcadence ad orchestrator",
    long_about = "Runs the orchestrator against a scripted, in-process ad SDK on a\n\
        virtual clock, so cooldowns and retry schedules play out instantly.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Configuration profile to use
    #[arg(long, short = 'p', env = "ADCADENCE_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "ADCADENCE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table", global = true)]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one line per result (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a scripted scenario against the orchestrator
    #[cfg(feature = "simulate")]
    #[command(alias = "sim")]
    Simulate(SimulateArgs),

    /// Manage configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Simulate ─────────────────────────────────────────────────────────

#[cfg(feature = "simulate")]
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Scenario to play
    pub scenario: Scenario,

    /// How long scripted loads take to succeed or fail
    #[arg(long, default_value = "500ms", value_parser = humantime::parse_duration)]
    pub load_delay: Duration,

    /// Include the full event timeline in table output
    #[arg(long, short = 't')]
    pub timeline: bool,
}

#[cfg(feature = "simulate")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    /// First launch: the app-open ad shows as soon as it loads
    ColdStart,
    /// Foreground app-open shows respect the 30 minute cooldown
    Cooldown,
    /// An interstitial that never fills exhausts its retries
    RetryExhausted,
    /// Concurrent show requests on one placement produce one show
    Race,
    /// Rapid foreground transitions collapse into one attempt
    ForegroundDebounce,
    /// A second placement fills in when the first is not ready
    Fallback,
}

#[cfg(feature = "simulate")]
impl Scenario {
    pub fn name(self) -> &'static str {
        match self {
            Self::ColdStart => "cold-start",
            Self::Cooldown => "cooldown",
            Self::RetryExhausted => "retry-exhausted",
            Self::Race => "race",
            Self::ForegroundDebounce => "foreground-debounce",
            Self::Fallback => "fallback",
        }
    }
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Write a starter config file with every default spelled out
    Init {
        /// Overwrite an existing file
        #[arg(long, short = 'f')]
        force: bool,
    },

    /// Display the resolved settings of the active profile
    Show,

    /// Print the config file path
    Path,

    /// List configured profiles
    Profiles,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
