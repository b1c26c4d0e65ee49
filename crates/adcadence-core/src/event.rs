// ── Orchestrator events ──
//
// Cross-cutting notifications published on the orchestrator's broadcast
// channel. Hosts use them for analytics (revenue), loading indicators and
// diagnostics; nothing in the show path depends on anyone listening.

use std::time::Duration;

use serde::Serialize;

use adcadence_sdk::{AdFormat, RevenuePrecision};

use crate::gate::DenyReason;
use crate::lifecycle::AppState;
use crate::model::PlacementId;

/// A notification from a controller, slot, coordinator or trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    Loaded {
        placement: PlacementId,
        format: AdFormat,
    },
    LoadFailed {
        placement: PlacementId,
        code: i32,
        message: String,
        /// Consecutive failures so far.
        attempt: u32,
        /// `None` once retries are exhausted (or for one-shot slots).
        retry_in: Option<Duration>,
    },
    RetriesExhausted {
        placement: PlacementId,
        attempts: u32,
    },
    Shown {
        placement: PlacementId,
    },
    Closed {
        placement: PlacementId,
    },
    /// The SDK accepted a show and then failed to present it.
    ShowFailed {
        placement: PlacementId,
        message: String,
    },
    Paid {
        placement: PlacementId,
        value_micros: i64,
        currency_code: String,
        precision: RevenuePrecision,
    },
    ShowSkipped {
        placement: PlacementId,
        reason: DenyReason,
    },
    /// A `request_show` call settled.
    ShowResolved {
        placement: PlacementId,
        shown: bool,
        first_launch: bool,
        waited: Duration,
    },
    AppStateChanged {
        from: AppState,
        to: AppState,
    },
}

impl OrchestratorEvent {
    /// Placement the event concerns, if any.
    pub fn placement(&self) -> Option<&PlacementId> {
        match self {
            Self::Loaded { placement, .. }
            | Self::LoadFailed { placement, .. }
            | Self::RetriesExhausted { placement, .. }
            | Self::Shown { placement }
            | Self::Closed { placement }
            | Self::ShowFailed { placement, .. }
            | Self::Paid { placement, .. }
            | Self::ShowSkipped { placement, .. }
            | Self::ShowResolved { placement, .. } => Some(placement),
            Self::AppStateChanged { .. } => None,
        }
    }

    /// Short, stable name used in logs and the simulator timeline.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Loaded { .. } => "loaded",
            Self::LoadFailed { .. } => "load_failed",
            Self::RetriesExhausted { .. } => "retries_exhausted",
            Self::Shown { .. } => "shown",
            Self::Closed { .. } => "closed",
            Self::ShowFailed { .. } => "show_failed",
            Self::Paid { .. } => "paid",
            Self::ShowSkipped { .. } => "show_skipped",
            Self::ShowResolved { .. } => "show_resolved",
            Self::AppStateChanged { .. } => "app_state_changed",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn serializes_with_event_tag() {
        let event = OrchestratorEvent::Paid {
            placement: PlacementId::from("job_details"),
            value_micros: 1200,
            currency_code: "USD".into(),
            precision: RevenuePrecision::Estimated,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "event": "paid",
                "placement": "job_details",
                "value_micros": 1200,
                "currency_code": "USD",
                "precision": "estimated",
            })
        );
    }

    #[test]
    fn app_state_changes_have_no_placement() {
        let event = OrchestratorEvent::AppStateChanged {
            from: AppState::Background,
            to: AppState::Active,
        };
        assert_eq!(event.placement(), None);
        assert_eq!(event.kind(), "app_state_changed");
    }
}
