//! Events emitted by an ad object.
//!
//! The SDK delivers these asynchronously, per ad object, in the order
//! `Loaded | Error` → `Opened` → `Closed`. Revenue and engagement events
//! (`Paid`, `Clicked`, `Impression`, video progress) may interleave.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::Error;

/// A single event from an ad object's listener stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdEvent {
    /// A creative was fetched; the ad can now be shown.
    Loaded,
    /// The load (or a show) failed inside the SDK.
    Error(AdError),
    /// The ad is now covering the screen.
    Opened,
    /// The user dismissed the ad.
    Closed,
    /// An impression generated revenue.
    Paid(PaidEvent),
    Clicked,
    Impression,
    VideoStarted,
    VideoCompleted,
}

impl AdEvent {
    /// Short, stable name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Loaded => "loaded",
            Self::Error(_) => "error",
            Self::Opened => "opened",
            Self::Closed => "closed",
            Self::Paid(_) => "paid",
            Self::Clicked => "clicked",
            Self::Impression => "impression",
            Self::VideoStarted => "video_started",
            Self::VideoCompleted => "video_completed",
        }
    }

    /// `true` for events that drive the load/show lifecycle.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::Loaded | Self::Error(_) | Self::Opened | Self::Closed
        )
    }
}

/// Error payload carried by [`AdEvent::Error`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdError {
    pub code: i32,
    pub message: String,
}

impl AdError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<&Error> for AdError {
    fn from(err: &Error) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

impl std::fmt::Display for AdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Revenue report for a single impression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaidEvent {
    /// Value in micro-units of `currency_code`.
    pub value_micros: i64,
    /// ISO 4217 currency code.
    pub currency_code: String,
    pub precision: RevenuePrecision,
}

/// How trustworthy the reported revenue value is.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RevenuePrecision {
    #[default]
    Unknown,
    Estimated,
    PublisherProvided,
    Precise,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_events_are_classified() {
        assert!(AdEvent::Loaded.is_lifecycle());
        assert!(AdEvent::Error(AdError::new(3, "no fill")).is_lifecycle());
        assert!(AdEvent::Closed.is_lifecycle());
        assert!(!AdEvent::Clicked.is_lifecycle());
        assert!(!AdEvent::VideoCompleted.is_lifecycle());
    }

    #[test]
    fn sdk_error_converts_to_event_payload() {
        let err = Error::NotLoaded {
            unit_id: "unit-1".into(),
        };
        let payload = AdError::from(&err);
        assert_eq!(payload.code, 3);
        assert_eq!(payload.message, "Ad 'unit-1' is not loaded");
    }

    #[test]
    fn paid_event_serializes_with_tag() {
        let event = AdEvent::Paid(PaidEvent {
            value_micros: 1_250,
            currency_code: "USD".into(),
            precision: RevenuePrecision::Estimated,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "paid");
        assert_eq!(json["precision"], "estimated");
        assert_eq!(json["value_micros"], 1_250);
    }

    #[test]
    fn precision_parses_from_snake_case() {
        let precision: RevenuePrecision = "publisher_provided".parse().unwrap();
        assert_eq!(precision, RevenuePrecision::PublisherProvided);
    }
}
