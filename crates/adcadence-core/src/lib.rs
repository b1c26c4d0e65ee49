// adcadence-core: Ad lifecycle orchestration between the ad SDK and the host app.
//
// Preloads ads, retries failed loads, gates app-open ads behind a minimum
// interval (with a first-launch exception), and lets navigation code ask
// for an ad with a bounded wait that always resolves.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod gate;
pub mod lifecycle;
pub mod model;
pub mod orchestrator;
pub mod retry;
pub mod slot;
pub mod stream;
pub mod unit;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{AppOpenConfig, InterstitialConfig, OrchestratorConfig, UnitPolicy};
pub use coordinator::{ShowCoordinator, ShowOptions, ShowRequest};
pub use error::CoreError;
pub use event::OrchestratorEvent;
pub use gate::{DenyReason, GateDecision, IntervalGate};
pub use lifecycle::{AppState, LifecycleTrigger, TriggerTiming};
pub use model::{AdPhase, AdUnitSnapshot, AdUnitState, PlacementId};
pub use orchestrator::{AdOrchestrator, InterstitialMount};
pub use retry::{FiredRetry, RetryScheduler};
pub use slot::{BannerSlot, NativeAdSlot, SlotEngagement, SlotPhase, SlotSnapshot};
pub use stream::PhaseStream;
pub use unit::{AdUnitController, UnitSetup};
