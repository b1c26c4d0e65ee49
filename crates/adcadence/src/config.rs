//! CLI-aware wrappers around `adcadence_config`: `--config` and
//! `--profile` take precedence over the file's own defaults.

use std::path::PathBuf;

use adcadence_config::Config;
use adcadence_core::OrchestratorConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Config file in effect: `--config` / `ADCADENCE_CONFIG`, else the
/// platform default.
pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(adcadence_config::config_path)
}

pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(adcadence_config::load_config_from(&config_file(global))?)
}

pub fn active_profile_name(global: &GlobalOpts, cfg: &Config) -> String {
    cfg.profile_name(global.profile.as_deref()).to_owned()
}

/// Resolve the active profile into an orchestrator configuration.
pub fn resolve(global: &GlobalOpts) -> Result<(String, OrchestratorConfig), CliError> {
    let cfg = load(global)?;
    let name = active_profile_name(global, &cfg);
    match adcadence_config::resolve_profile(&cfg, Some(&name)) {
        Ok(resolved) => Ok((name, resolved)),
        Err(adcadence_config::ConfigError::ProfileNotFound { name }) => {
            Err(CliError::ProfileNotFound {
                name,
                available: available_profiles(&cfg),
            })
        }
        Err(e) => Err(e.into()),
    }
}

fn available_profiles(cfg: &Config) -> String {
    if cfg.profiles.is_empty() {
        return "(none)".into();
    }
    let mut names: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
    names.sort_unstable();
    names.join(", ")
}
