// ── Core error types ──
//
// Errors from adcadence-core. Navigation-facing APIs (`request_show`)
// never return these: they resolve to `bool`. `CoreError` surfaces only
// on setup and on the explicit, fail-fast controller operations.
// The `From<adcadence_sdk::Error>` impl translates SDK-level failures
// into orchestrator-level variants.

use thiserror::Error;

use crate::model::{AdPhase, PlacementId};

/// Unified error type for the core crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    // ── Lifecycle errors ─────────────────────────────────────────────
    #[error("Orchestrator already started")]
    AlreadyStarted,

    #[error("Orchestrator not started")]
    NotStarted,

    #[error("Ad unit for placement '{placement}' has been torn down")]
    UnitStopped { placement: PlacementId },

    // ── Placement errors ─────────────────────────────────────────────
    #[error("Placement '{placement}' is already mounted")]
    PlacementAlreadyMounted { placement: PlacementId },

    #[error("Placement not found: {placement}")]
    PlacementNotFound { placement: PlacementId },

    // ── Show errors ──────────────────────────────────────────────────
    #[error("Placement '{placement}' is not ready to show (phase: {phase})")]
    NotReady {
        placement: PlacementId,
        phase: AdPhase,
    },

    #[error("Placement '{placement}' could not show: {message}")]
    ShowFailed {
        placement: PlacementId,
        message: String,
    },

    // ── SDK errors (wrapped, not exposed raw) ────────────────────────
    #[error("SDK initialization failed: {message}")]
    SdkInitialization { message: String },

    #[error("SDK error: {message}")]
    Sdk {
        message: String,
        /// Numeric code reported by the SDK.
        code: i32,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

// ── Conversion from SDK-layer errors ─────────────────────────────────

impl From<adcadence_sdk::Error> for CoreError {
    fn from(err: adcadence_sdk::Error) -> Self {
        match err {
            adcadence_sdk::Error::Initialization { message } => {
                CoreError::SdkInitialization { message }
            }
            adcadence_sdk::Error::InvalidUnit { unit_id, message } => CoreError::Config {
                message: format!("invalid ad unit '{unit_id}': {message}"),
            },
            other => CoreError::Sdk {
                code: other.code(),
                message: other.to_string(),
            },
        }
    }
}
