// adcadence-sdk: Event-driven boundary over a mobile advertising SDK.
//
// The real SDK is an opaque black box. This crate exposes only the
// primitives the orchestrator consumes: create an ad object for a unit,
// `load()`, `show()`, and subscribe to its event stream. Everything else
// (bidding, creative rendering) stays on the far side of the trait.

pub mod error;
pub mod event;
pub mod handle;
pub mod request;
pub mod scripted;

pub use error::Error;
pub use event::{AdError, AdEvent, PaidEvent, RevenuePrecision};
pub use handle::{AdEventSubscription, AdHandle, AdSdk};
pub use request::{AdFormat, AdRequestOptions, MaxAdContentRating, RequestConfiguration};
