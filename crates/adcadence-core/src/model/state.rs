//! Per-unit lifecycle state.
//!
//! [`AdUnitState`] is owned by exactly one controller actor and mutated only
//! by its transition functions. Observers receive copies through a `watch`
//! channel; nobody else writes to it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::{Display, EnumString};
use tokio::time::Instant;

use adcadence_sdk::AdFormat;

use super::PlacementId;

/// Lifecycle phase of a single ad unit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AdPhase {
    #[default]
    Idle,
    Loading,
    Loaded,
    Showing,
    Error,
}

/// Mutable state of one ad unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdUnitState {
    pub phase: AdPhase,
    /// Consecutive load failures since the last successful load.
    pub retry_count: u32,
    /// Last confirmed `Opened`/`Closed` event. Never set on a show request.
    pub last_shown_at: Option<Instant>,
    /// Wall-clock mirror of `last_shown_at`, for diagnostics.
    pub last_shown_wall: Option<DateTime<Utc>>,
    /// Set once, on the first `Opened` in the process lifetime.
    pub has_shown_first_launch_ad: bool,
    /// A first-launch show is queued until the unit loads.
    pub pending_first_launch_show: bool,
    /// `show()` was issued and the SDK has not yet confirmed `Opened`.
    pub show_issued: bool,
    pub last_error: Option<String>,
}

impl AdUnitState {
    /// `true` while an ad is on screen or a show is in flight.
    pub fn is_showing(&self) -> bool {
        self.phase == AdPhase::Showing || self.show_issued
    }

    /// `true` when a show can be issued right now (ignoring any cooldown).
    pub fn is_ready(&self) -> bool {
        self.phase == AdPhase::Loaded && !self.show_issued
    }

    /// Record a confirmed display at `now`, keeping the timestamp monotonic.
    pub(crate) fn mark_shown(&mut self, now: Instant) {
        let at = self.last_shown_at.map_or(now, |prev| prev.max(now));
        if self.last_shown_at != Some(at) {
            self.last_shown_wall = Some(Utc::now());
        }
        self.last_shown_at = Some(at);
    }
}

/// Point-in-time view of a unit, for logs and tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdUnitSnapshot {
    pub placement: PlacementId,
    pub format: AdFormat,
    pub unit_id: String,
    pub phase: AdPhase,
    pub retry_count: u32,
    pub last_shown: Option<DateTime<Utc>>,
    pub has_shown_first_launch_ad: bool,
    pub pending_first_launch_show: bool,
    pub last_error: Option<String>,
}

impl AdUnitSnapshot {
    pub(crate) fn new(
        placement: PlacementId,
        format: AdFormat,
        unit_id: String,
        state: &AdUnitState,
    ) -> Self {
        Self {
            placement,
            format,
            unit_id,
            phase: state.phase,
            retry_count: state.retry_count,
            last_shown: state.last_shown_wall,
            has_shown_first_launch_ad: state.has_shown_first_launch_ad,
            pending_first_launch_show: state.pending_first_launch_show,
            last_error: state.last_error.clone(),
        }
    }
}
