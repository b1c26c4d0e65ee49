//! Configuration profiles for adcadence.
//!
//! TOML profiles layered under `ADCADENCE_` environment overrides, and
//! translation to `adcadence_core::OrchestratorConfig`. Core never reads
//! files; the binary (or a host app) resolves a profile here and hands
//! the result in.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use adcadence_core::OrchestratorConfig;
use adcadence_sdk::MaxAdContentRating;

/// Profile used when neither the caller nor the file names one.
pub const DEFAULT_PROFILE: &str = "default";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    ProfileNotFound { name: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults for the binary.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named orchestrator profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some(DEFAULT_PROFILE.into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// A config with a single `default` profile spelling out every
    /// built-in value. Written by `adcadence config init`.
    pub fn starter() -> Self {
        let mut cfg = Self::default();
        cfg.profiles.insert(
            DEFAULT_PROFILE.into(),
            Profile::from_orchestrator(&OrchestratorConfig::default()),
        );
        cfg
    }

    /// Name of the profile `requested` resolves to.
    pub fn profile_name<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested
            .or(self.default_profile.as_deref())
            .unwrap_or(DEFAULT_PROFILE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// `tracing` filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log")]
    pub log: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            log: default_log(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_log() -> String {
    "warn".into()
}

/// A named orchestrator profile. Every field is optional; unset fields
/// keep the built-in default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    pub native_unit_id: Option<String>,
    pub banner_unit_id: Option<String>,

    /// Keywords attached to every request.
    pub keywords: Option<Vec<String>>,
    pub non_personalized_only: Option<bool>,

    pub max_ad_content_rating: Option<MaxAdContentRating>,
    pub child_directed: Option<bool>,
    pub under_age_of_consent: Option<bool>,
    pub test_device_ids: Option<Vec<String>>,

    /// Bound on how long a show request may hold up navigation.
    pub show_deadline_ms: Option<u64>,
    pub foreground_settle_ms: Option<u64>,
    pub show_on_cold_start: Option<bool>,

    #[serde(default)]
    pub app_open: AppOpenProfile,

    #[serde(default)]
    pub interstitial: InterstitialProfile,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct AppOpenProfile {
    pub unit_id: Option<String>,
    pub min_interval_secs: Option<u64>,
    pub retry_delay_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub first_launch_wait_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct InterstitialProfile {
    pub unit_id: Option<String>,
    pub retry_delay_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub reprime_delay_ms: Option<u64>,
    /// Per-placement unit id overrides.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub placements: HashMap<String, String>,
}

impl Profile {
    /// Spell out every value of `config` explicitly.
    pub fn from_orchestrator(config: &OrchestratorConfig) -> Self {
        Self {
            app_open: AppOpenProfile {
                unit_id: Some(config.app_open.unit_id.clone()),
                min_interval_secs: Some(config.app_open.min_interval.as_secs()),
                retry_delay_secs: Some(config.app_open.retry_delay.as_secs()),
                max_retries: Some(config.app_open.max_retries),
                first_launch_wait_secs: Some(config.app_open.first_launch_wait.as_secs()),
            },
            interstitial: InterstitialProfile {
                unit_id: Some(config.interstitial.unit_id.clone()),
                retry_delay_secs: Some(config.interstitial.retry_delay.as_secs()),
                max_retries: Some(config.interstitial.max_retries),
                reprime_delay_ms: Some(millis(config.interstitial.reprime_delay)),
                placements: config.interstitial.placement_units.clone(),
            },
            native_unit_id: Some(config.native_unit_id.clone()),
            banner_unit_id: Some(config.banner_unit_id.clone()),
            keywords: Some(config.request.keywords.clone()),
            non_personalized_only: Some(config.request.request_non_personalized_ads_only),
            max_ad_content_rating: Some(config.sdk.max_ad_content_rating),
            child_directed: Some(config.sdk.tag_for_child_directed_treatment),
            under_age_of_consent: Some(config.sdk.tag_for_under_age_of_consent),
            test_device_ids: Some(config.sdk.test_device_identifiers.clone()),
            show_deadline_ms: Some(millis(config.show_deadline)),
            foreground_settle_ms: Some(millis(config.foreground_settle_delay)),
            show_on_cold_start: Some(config.show_on_cold_start),
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "adcadence", "adcadence").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("adcadence");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + environment. A missing file is not an error.
///
/// Environment keys nest on `__`:
/// `ADCADENCE_PROFILES__DEFAULT__SHOW_DEADLINE_MS=2000`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("ADCADENCE_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Profile resolution ──────────────────────────────────────────────

/// Build an `OrchestratorConfig` from the named profile (or the default).
///
/// An absent `default` profile means "all built-in values"; any other
/// missing name is an error.
pub fn resolve_profile(
    cfg: &Config,
    requested: Option<&str>,
) -> Result<OrchestratorConfig, ConfigError> {
    let name = cfg.profile_name(requested);
    match cfg.profiles.get(name) {
        Some(profile) => profile_to_orchestrator_config(profile),
        None if name == DEFAULT_PROFILE => Ok(OrchestratorConfig::default()),
        None => Err(ConfigError::ProfileNotFound { name: name.into() }),
    }
}

/// Overlay `profile` on the built-in defaults and validate the result.
pub fn profile_to_orchestrator_config(profile: &Profile) -> Result<OrchestratorConfig, ConfigError> {
    let mut config = OrchestratorConfig::default();

    let app_open = &profile.app_open;
    set(&mut config.app_open.unit_id, app_open.unit_id.clone());
    set(&mut config.app_open.min_interval, app_open.min_interval_secs.map(Duration::from_secs));
    set(&mut config.app_open.retry_delay, app_open.retry_delay_secs.map(Duration::from_secs));
    set(&mut config.app_open.max_retries, app_open.max_retries);
    set(
        &mut config.app_open.first_launch_wait,
        app_open.first_launch_wait_secs.map(Duration::from_secs),
    );

    let interstitial = &profile.interstitial;
    set(&mut config.interstitial.unit_id, interstitial.unit_id.clone());
    set(
        &mut config.interstitial.retry_delay,
        interstitial.retry_delay_secs.map(Duration::from_secs),
    );
    set(&mut config.interstitial.max_retries, interstitial.max_retries);
    set(
        &mut config.interstitial.reprime_delay,
        interstitial.reprime_delay_ms.map(Duration::from_millis),
    );
    config
        .interstitial
        .placement_units
        .extend(interstitial.placements.clone());

    set(&mut config.native_unit_id, profile.native_unit_id.clone());
    set(&mut config.banner_unit_id, profile.banner_unit_id.clone());
    set(&mut config.request.keywords, profile.keywords.clone());
    set(
        &mut config.request.request_non_personalized_ads_only,
        profile.non_personalized_only,
    );
    set(&mut config.sdk.max_ad_content_rating, profile.max_ad_content_rating);
    set(&mut config.sdk.tag_for_child_directed_treatment, profile.child_directed);
    set(&mut config.sdk.tag_for_under_age_of_consent, profile.under_age_of_consent);
    set(&mut config.sdk.test_device_identifiers, profile.test_device_ids.clone());
    set(&mut config.show_deadline, profile.show_deadline_ms.map(Duration::from_millis));
    set(
        &mut config.foreground_settle_delay,
        profile.foreground_settle_ms.map(Duration::from_millis),
    );
    set(&mut config.show_on_cold_start, profile.show_on_cold_start);

    validate(&config)?;
    Ok(config)
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn validate(config: &OrchestratorConfig) -> Result<(), ConfigError> {
    let units = [
        ("app_open.unit_id", config.app_open.unit_id.as_str()),
        ("interstitial.unit_id", config.interstitial.unit_id.as_str()),
        ("native_unit_id", config.native_unit_id.as_str()),
        ("banner_unit_id", config.banner_unit_id.as_str()),
    ];
    for (field, unit) in units {
        if unit.trim().is_empty() {
            return Err(invalid(field, "ad unit id must not be empty"));
        }
    }
    if let Some((placement, _)) = config
        .interstitial
        .placement_units
        .iter()
        .find(|(_, unit)| unit.trim().is_empty())
    {
        return Err(invalid(
            &format!("interstitial.placements.{placement}"),
            "ad unit id must not be empty",
        ));
    }
    if config.show_deadline.is_zero() {
        return Err(invalid("show_deadline_ms", "must be greater than zero"));
    }
    if config.app_open.first_launch_wait.is_zero() {
        return Err(invalid("app_open.first_launch_wait_secs", "must be greater than zero"));
    }
    if config.app_open.retry_delay.is_zero() || config.interstitial.retry_delay.is_zero() {
        return Err(invalid("retry_delay_secs", "must be greater than zero"));
    }
    Ok(())
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn write_toml(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.default_profile.as_deref(), Some(DEFAULT_PROFILE));
        assert_eq!(cfg.defaults, Defaults::default());
        assert!(cfg.profiles.is_empty());
    }

    #[test]
    fn test_profile_overrides_only_what_it_sets() {
        let (_dir, path) = write_toml(
            r#"
default_profile = "staging"

[profiles.staging]
show_deadline_ms = 2500
show_on_cold_start = false
max_ad_content_rating = "G"

[profiles.staging.app_open]
min_interval_secs = 600
max_retries = 2

[profiles.staging.interstitial.placements]
job_details = "ca-app-pub-xxx/111"
"#,
        );
        let cfg = load_config_from(&path).unwrap();
        let config = resolve_profile(&cfg, None).unwrap();
        let defaults = OrchestratorConfig::default();

        assert_eq!(config.show_deadline, Duration::from_millis(2500));
        assert!(!config.show_on_cold_start);
        assert_eq!(config.sdk.max_ad_content_rating, MaxAdContentRating::G);
        assert_eq!(config.app_open.min_interval, Duration::from_secs(600));
        assert_eq!(config.app_open.max_retries, 2);
        assert_eq!(config.app_open.retry_delay, defaults.app_open.retry_delay);
        assert_eq!(config.interstitial.unit_id, defaults.interstitial.unit_id);
        assert_eq!(
            config.interstitial.placement_units.get("job_details").map(String::as_str),
            Some("ca-app-pub-xxx/111")
        );
    }

    #[test]
    fn test_missing_default_profile_means_builtin_values() {
        let config = resolve_profile(&Config::default(), None).unwrap();
        assert_eq!(config, OrchestratorConfig::default());
    }

    #[test]
    fn test_unknown_named_profile_is_an_error() {
        let err = resolve_profile(&Config::default(), Some("prod")).unwrap_err();
        assert!(matches!(err, ConfigError::ProfileNotFound { ref name } if name == "prod"));
    }

    #[test]
    fn test_validation_rejects_zero_deadline() {
        let profile = Profile {
            show_deadline_ms: Some(0),
            ..Profile::default()
        };
        let err = profile_to_orchestrator_config(&profile).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "show_deadline_ms"));
    }

    #[test]
    fn test_validation_rejects_blank_unit_ids() {
        let profile = Profile {
            banner_unit_id: Some("  ".into()),
            ..Profile::default()
        };
        let err = profile_to_orchestrator_config(&profile).unwrap_err();
        assert!(err.to_string().contains("banner_unit_id"));
    }

    #[test]
    fn test_starter_config_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        save_config_to(&Config::starter(), &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded, Config::starter());
        assert_eq!(
            resolve_profile(&loaded, None).unwrap(),
            OrchestratorConfig::default()
        );
    }

    #[test]
    fn test_malformed_toml_is_reported() {
        let (_dir, path) = write_toml("profiles = 3");
        assert!(matches!(load_config_from(&path), Err(ConfigError::Figment(_))));
    }
}
