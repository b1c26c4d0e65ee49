//! Interval gating.
//!
//! [`IntervalGate`] is a pure policy: given a unit's state, the current
//! time and whether the caller is asking for the first-launch ad, it says
//! whether a show may be issued now, must be deferred until the unit
//! loads, or is denied.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::model::{AdPhase, AdUnitState};

/// Why a show was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DenyReason {
    /// No creative is loaded.
    NotLoaded,
    /// An ad is already on screen or a show is in flight.
    AlreadyShowing,
    /// The minimum interval since the last show has not elapsed.
    Cooldown { remaining: Duration },
    /// The SDK refused to present the loaded creative.
    ShowFailed,
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotLoaded => f.write_str("no ad loaded"),
            Self::AlreadyShowing => f.write_str("an ad is already showing"),
            Self::Cooldown { remaining } => {
                write!(f, "cooling down, {}s remaining", remaining.as_secs())
            }
            Self::ShowFailed => f.write_str("the SDK refused to present the ad"),
        }
    }
}

/// Outcome of [`IntervalGate::can_show`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    /// First-launch request on a unit that has not loaded yet: queue the
    /// show and issue it on `Loaded`.
    Defer,
    Deny(DenyReason),
}

impl GateDecision {
    pub fn is_allowed(self) -> bool {
        self == Self::Allow
    }
}

/// Minimum-interval policy with the first-launch exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalGate {
    min_interval: Option<Duration>,
}

impl IntervalGate {
    /// `None` disables the cooldown (interstitials).
    pub fn new(min_interval: Option<Duration>) -> Self {
        Self { min_interval }
    }

    pub fn min_interval(&self) -> Option<Duration> {
        self.min_interval
    }

    pub fn can_show(
        &self,
        state: &AdUnitState,
        now: Instant,
        is_first_launch_show: bool,
    ) -> GateDecision {
        if state.is_showing() {
            return GateDecision::Deny(DenyReason::AlreadyShowing);
        }

        // The first-run ad is exempt from the cooldown.
        if is_first_launch_show && !state.has_shown_first_launch_ad {
            return if state.phase == AdPhase::Loaded {
                GateDecision::Allow
            } else {
                GateDecision::Defer
            };
        }

        if let Some(remaining) = self.cooldown_remaining(state, now) {
            return GateDecision::Deny(DenyReason::Cooldown { remaining });
        }

        if state.phase != AdPhase::Loaded {
            return GateDecision::Deny(DenyReason::NotLoaded);
        }

        GateDecision::Allow
    }

    /// Time left before the interval allows another show, if any.
    /// A unit that has never shown is not cooling down.
    pub fn cooldown_remaining(&self, state: &AdUnitState, now: Instant) -> Option<Duration> {
        let min = self.min_interval?;
        let last = state.last_shown_at?;
        let elapsed = now.saturating_duration_since(last);
        (elapsed < min).then(|| min - elapsed)
    }
}
