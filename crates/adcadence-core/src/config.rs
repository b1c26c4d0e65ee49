// ── Runtime orchestration configuration ──
//
// These types describe *how* ads are requested, retried and gated.
// They never touch disk: the host app (or adcadence-config) builds an
// `OrchestratorConfig` and hands it in.

use std::collections::HashMap;
use std::time::Duration;

use adcadence_sdk::{AdRequestOptions, RequestConfiguration};

use crate::model::PlacementId;

/// App-open cooldown between two non-first-launch shows.
pub const APP_OPEN_MIN_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Settings for the singleton app-open unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppOpenConfig {
    pub unit_id: String,
    /// Minimum time between two app-open shows.
    pub min_interval: Duration,
    /// Fixed delay before retrying a failed load.
    pub retry_delay: Duration,
    pub max_retries: u32,
    /// How long a deferred first-launch show stays queued.
    pub first_launch_wait: Duration,
}

impl Default for AppOpenConfig {
    fn default() -> Self {
        Self {
            unit_id: "ca-app-pub-3940256099942544/9257395921".into(),
            min_interval: APP_OPEN_MIN_INTERVAL,
            retry_delay: Duration::from_secs(5),
            max_retries: 5,
            first_launch_wait: Duration::from_secs(10),
        }
    }
}

/// Settings shared by every interstitial placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterstitialConfig {
    pub unit_id: String,
    pub retry_delay: Duration,
    pub max_retries: u32,
    /// Delay between `Closed` and the re-prime load.
    pub reprime_delay: Duration,
    /// Per-placement unit id overrides.
    pub placement_units: HashMap<String, String>,
}

impl Default for InterstitialConfig {
    fn default() -> Self {
        Self {
            unit_id: "ca-app-pub-3940256099942544/1033173712".into(),
            retry_delay: Duration::from_secs(2),
            max_retries: 3,
            reprime_delay: Duration::ZERO,
            placement_units: HashMap::new(),
        }
    }
}

impl InterstitialConfig {
    /// Unit id to request for `placement`.
    pub fn unit_for(&self, placement: &PlacementId) -> &str {
        self.placement_units
            .get(placement.as_str())
            .map_or(self.unit_id.as_str(), String::as_str)
    }
}

/// Load/show policy of a single controller, derived from the unit configs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitPolicy {
    /// Cooldown between shows; `None` disables interval gating.
    pub min_interval: Option<Duration>,
    pub retry_delay: Duration,
    pub max_retries: u32,
    pub first_launch_wait: Duration,
    pub reprime_delay: Duration,
}

impl AppOpenConfig {
    pub fn policy(&self) -> UnitPolicy {
        UnitPolicy {
            min_interval: Some(self.min_interval),
            retry_delay: self.retry_delay,
            max_retries: self.max_retries,
            first_launch_wait: self.first_launch_wait,
            reprime_delay: Duration::ZERO,
        }
    }
}

impl InterstitialConfig {
    pub fn policy(&self) -> UnitPolicy {
        UnitPolicy {
            min_interval: None,
            retry_delay: self.retry_delay,
            max_retries: self.max_retries,
            first_launch_wait: Duration::ZERO,
            reprime_delay: self.reprime_delay,
        }
    }
}

/// Configuration for an [`AdOrchestrator`](crate::AdOrchestrator).
///
/// Built by the host app, passed to the orchestrator -- core never reads
/// config files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub app_open: AppOpenConfig,
    pub interstitial: InterstitialConfig,
    pub native_unit_id: String,
    pub banner_unit_id: String,
    /// Targeting options attached to every request.
    pub request: AdRequestOptions,
    /// Applied once at SDK initialization.
    pub sdk: RequestConfiguration,
    /// Upper bound on how long `request_show` may hold up navigation.
    pub show_deadline: Duration,
    /// Delay between returning to the foreground and the app-open attempt.
    pub foreground_settle_delay: Duration,
    /// Issue the first-launch app-open request from `start()`.
    pub show_on_cold_start: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            app_open: AppOpenConfig::default(),
            interstitial: InterstitialConfig::default(),
            native_unit_id: "ca-app-pub-3940256099942544/2247696110".into(),
            banner_unit_id: "ca-app-pub-3940256099942544/6300978111".into(),
            request: AdRequestOptions::default()
                .with_keywords(["job", "career", "employment", "work"]),
            sdk: RequestConfiguration::default(),
            show_deadline: Duration::from_millis(1500),
            foreground_settle_delay: Duration::from_secs(1),
            show_on_cold_start: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_timings() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.app_open.min_interval, Duration::from_secs(1800));
        assert_eq!(config.app_open.retry_delay, Duration::from_secs(5));
        assert_eq!(config.interstitial.retry_delay, Duration::from_secs(2));
        assert_eq!(config.interstitial.max_retries, 3);
        assert_eq!(config.show_deadline, Duration::from_millis(1500));
        assert!(config.request.request_non_personalized_ads_only);
    }

    #[test]
    fn interstitial_policy_has_no_cooldown() {
        let policy = InterstitialConfig::default().policy();
        assert_eq!(policy.min_interval, None);
        assert_eq!(policy.max_retries, 3);
    }

    #[test]
    fn placement_unit_override_wins() {
        let mut config = InterstitialConfig::default();
        config
            .placement_units
            .insert("job_details".into(), "custom-unit".into());

        assert_eq!(config.unit_for(&PlacementId::from("job_details")), "custom-unit");
        assert_eq!(config.unit_for(&PlacementId::from("categories")), config.unit_id);
    }
}
