//! The SDK seam: factory, ad object, and listener subscription.
//!
//! Every ad object owns its own event stream. Listeners are registered by
//! [`AdHandle::subscribe`] and deregistered when the returned
//! [`AdEventSubscription`] is dropped, so a consumer that goes away can
//! never leave a callback mutating state it no longer owns.

use tokio::sync::mpsc;

use crate::{AdEvent, AdFormat, AdRequestOptions, Error, RequestConfiguration};

/// Factory side of the advertising SDK.
pub trait AdSdk: Send + Sync + 'static {
    /// Apply the process-wide request configuration and start the SDK.
    fn initialize(&self, config: &RequestConfiguration) -> Result<(), Error>;

    /// Create a fresh ad object for `unit_id`.
    ///
    /// Each call yields an independent object; two consumers must never
    /// share one.
    fn create_for_ad_request(
        &self,
        format: AdFormat,
        unit_id: &str,
        options: &AdRequestOptions,
    ) -> Result<Box<dyn AdHandle>, Error>;
}

/// A single ad object created by [`AdSdk::create_for_ad_request`].
pub trait AdHandle: Send + Sync {
    fn unit_id(&self) -> &str;

    fn format(&self) -> AdFormat;

    /// Register a listener for this object's events.
    fn subscribe(&self) -> AdEventSubscription;

    /// Start fetching a creative. The outcome arrives as
    /// [`AdEvent::Loaded`] or [`AdEvent::Error`].
    fn load(&self) -> Result<(), Error>;

    /// Present the loaded creative. Progress arrives as
    /// [`AdEvent::Opened`] then [`AdEvent::Closed`].
    fn show(&self) -> Result<(), Error>;

    /// Release the native ad object. Further calls fail with
    /// [`Error::Destroyed`].
    fn destroy(&self);
}

type Unsubscribe = Box<dyn FnOnce() + Send>;

/// Listener registration for one ad object.
///
/// Dropping the subscription runs the SDK's unsubscribe hook exactly once.
pub struct AdEventSubscription {
    rx: mpsc::UnboundedReceiver<AdEvent>,
    unsubscribe: Option<Unsubscribe>,
}

impl AdEventSubscription {
    /// Wrap a receiver with the hook that deregisters its sender.
    pub fn new(
        rx: mpsc::UnboundedReceiver<AdEvent>,
        unsubscribe: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            rx,
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Create a connected sender/subscription pair.
    pub fn channel(
        unsubscribe: impl FnOnce() + Send + 'static,
    ) -> (mpsc::UnboundedSender<AdEvent>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self::new(rx, unsubscribe))
    }

    /// Wait for the next event. Returns `None` once the SDK side is gone.
    pub async fn recv(&mut self) -> Option<AdEvent> {
        self.rx.recv().await
    }

    /// Non-blocking poll for a queued event.
    pub fn try_recv(&mut self) -> Option<AdEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for AdEventSubscription {
    fn drop(&mut self) {
        self.rx.close();
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl std::fmt::Debug for AdEventSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdEventSubscription")
            .field("attached", &self.unsubscribe.is_some())
            .finish_non_exhaustive()
    }
}
