use thiserror::Error;

/// Top-level error type for the `adcadence-sdk` crate.
///
/// Covers the synchronous failure modes of the SDK primitives. Asynchronous
/// load failures are not errors here: they arrive as [`AdEvent::Error`]
/// on the ad's event stream. `adcadence-core` maps both into unit state.
///
/// [`AdEvent::Error`]: crate::AdEvent::Error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    // ── Setup ───────────────────────────────────────────────────────
    /// SDK initialization was rejected (bad configuration, platform refusal).
    #[error("SDK initialization failed: {message}")]
    Initialization { message: String },

    /// The ad unit id was rejected when creating the ad object.
    #[error("Invalid ad unit '{unit_id}': {message}")]
    InvalidUnit { unit_id: String, message: String },

    // ── Ad object ───────────────────────────────────────────────────
    /// A load request could not be issued.
    #[error("Load request for '{unit_id}' rejected: {message}")]
    LoadRejected { unit_id: String, message: String },

    /// `show()` was called on an ad that has no loaded creative.
    #[error("Ad '{unit_id}' is not loaded")]
    NotLoaded { unit_id: String },

    /// `show()` was issued but the SDK refused to present the creative.
    #[error("Show request for '{unit_id}' rejected: {message}")]
    ShowRejected { unit_id: String, message: String },

    /// The ad object has already been destroyed.
    #[error("Ad '{unit_id}' has been destroyed")]
    Destroyed { unit_id: String },
}

impl Error {
    /// Numeric code reported alongside synthetic [`AdEvent::Error`] events.
    ///
    /// [`AdEvent::Error`]: crate::AdEvent::Error
    pub fn code(&self) -> i32 {
        match self {
            Self::Initialization { .. } => 0,
            Self::InvalidUnit { .. } => 1,
            Self::LoadRejected { .. } => 2,
            Self::NotLoaded { .. } => 3,
            Self::ShowRejected { .. } => 4,
            Self::Destroyed { .. } => 5,
        }
    }
}
