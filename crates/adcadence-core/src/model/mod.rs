// ── Domain model ──
//
// Placement identity and the per-unit lifecycle state.

pub mod placement;
pub mod state;

pub use placement::PlacementId;
pub use state::{AdPhase, AdUnitSnapshot, AdUnitState};
