// ── Inline ad slots ──
//
// Native and banner ads are rendered inline by the host and never go
// through the show/close cycle. A slot requests exactly one creative per
// mount, with no gating and no retry, and destroys it on unmount.

use std::sync::Arc;

use serde::Serialize;
use strum::{Display, EnumString};
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use adcadence_sdk::{AdError, AdEvent, AdFormat, AdRequestOptions, AdSdk};

use crate::event::OrchestratorEvent;
use crate::model::PlacementId;
use crate::unit::ActiveAd;

/// Phase of an inline slot.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SlotPhase {
    #[default]
    Loading,
    Loaded,
    Error,
}

/// User engagement recorded by a slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SlotEngagement {
    pub clicks: u32,
    pub impressions: u32,
    pub video_starts: u32,
    pub video_completions: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct SlotState {
    phase: SlotPhase,
    engagement: SlotEngagement,
    error: Option<String>,
}

/// Point-in-time view of a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotSnapshot {
    pub placement: PlacementId,
    pub format: AdFormat,
    pub unit_id: String,
    pub phase: SlotPhase,
    pub engagement: SlotEngagement,
    pub error: Option<String>,
}

// ── SlotCore ─────────────────────────────────────────────────────────

struct SlotCore {
    placement: PlacementId,
    format: AdFormat,
    unit_id: String,
    state: watch::Receiver<SlotState>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SlotCore {
    fn mount(
        format: AdFormat,
        placement: PlacementId,
        unit_id: String,
        options: AdRequestOptions,
        sdk: Arc<dyn AdSdk>,
        events: broadcast::Sender<Arc<OrchestratorEvent>>,
        parent: &CancellationToken,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(SlotState::default());
        let cancel = parent.child_token();
        debug!(%placement, %format, %unit_id, "mounting ad slot");

        let task = SlotTask {
            placement: placement.clone(),
            format,
            events,
            state: state_tx,
        };
        let handle = tokio::spawn(task.run(sdk, unit_id.clone(), options, cancel.clone()));

        Self {
            placement,
            format,
            unit_id,
            state: state_rx,
            cancel,
            task: Mutex::new(Some(handle)),
        }
    }

    fn phase(&self) -> SlotPhase {
        self.state.borrow().phase
    }

    fn snapshot(&self) -> SlotSnapshot {
        let state = self.state.borrow();
        SlotSnapshot {
            placement: self.placement.clone(),
            format: self.format,
            unit_id: self.unit_id.clone(),
            phase: state.phase,
            engagement: state.engagement,
            error: state.error.clone(),
        }
    }

    async fn wait_settled(&self) -> SlotPhase {
        let mut state = self.state.clone();
        let settled = state
            .wait_for(|s| s.phase != SlotPhase::Loading)
            .await
            .map(|s| s.phase);
        settled.unwrap_or(SlotPhase::Error)
    }

    async fn unmount(&self) {
        self.cancel.cancel();
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl Drop for SlotCore {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct SlotTask {
    placement: PlacementId,
    format: AdFormat,
    events: broadcast::Sender<Arc<OrchestratorEvent>>,
    state: watch::Sender<SlotState>,
}

impl SlotTask {
    async fn run(
        self,
        sdk: Arc<dyn AdSdk>,
        unit_id: String,
        options: AdRequestOptions,
        cancel: CancellationToken,
    ) {
        let mut ad = match ActiveAd::request(sdk.as_ref(), self.format, &unit_id, &options) {
            Ok(ad) => ad,
            Err(e) => {
                self.failed(&AdError::from(&e));
                return;
            }
        };

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                event = ad.next_event() => {
                    let Some(event) = event else { break };
                    self.on_event(event);
                }
            }
        }

        drop(ad);
        debug!(placement = %self.placement, "ad slot unmounted");
    }

    fn on_event(&self, event: AdEvent) {
        match event {
            AdEvent::Loaded => {
                let changed = self.state.send_if_modified(|s| {
                    let loading = s.phase == SlotPhase::Loading;
                    if loading {
                        s.phase = SlotPhase::Loaded;
                    }
                    loading
                });
                if changed {
                    info!(placement = %self.placement, format = %self.format, "slot loaded");
                    self.emit(OrchestratorEvent::Loaded {
                        placement: self.placement.clone(),
                        format: self.format,
                    });
                }
            }
            AdEvent::Error(err) => {
                if self.state.borrow().phase == SlotPhase::Loading {
                    self.failed(&err);
                }
            }
            AdEvent::Paid(paid) => {
                info!(
                    placement = %self.placement,
                    value_micros = paid.value_micros,
                    currency = %paid.currency_code,
                    "paid event"
                );
                self.emit(OrchestratorEvent::Paid {
                    placement: self.placement.clone(),
                    value_micros: paid.value_micros,
                    currency_code: paid.currency_code,
                    precision: paid.precision,
                });
            }
            AdEvent::Clicked => self.count(|e| e.clicks += 1, "clicked"),
            AdEvent::Impression => self.count(|e| e.impressions += 1, "impression"),
            AdEvent::VideoStarted => self.count(|e| e.video_starts += 1, "video started"),
            AdEvent::VideoCompleted => {
                self.count(|e| e.video_completions += 1, "video completed");
            }
            AdEvent::Opened | AdEvent::Closed => {
                trace!(placement = %self.placement, "ignoring full-screen event on inline slot");
            }
        }
    }

    /// Terminal for this mount: slots never retry.
    fn failed(&self, err: &AdError) {
        warn!(placement = %self.placement, error = %err, "slot failed to load");
        self.state.send_modify(|s| {
            s.phase = SlotPhase::Error;
            s.error = Some(err.to_string());
        });
        self.emit(OrchestratorEvent::LoadFailed {
            placement: self.placement.clone(),
            code: err.code,
            message: err.message.clone(),
            attempt: 1,
            retry_in: None,
        });
    }

    fn count(&self, bump: impl FnOnce(&mut SlotEngagement), what: &str) {
        debug!(placement = %self.placement, what, "slot engagement");
        self.state.send_modify(|s| bump(&mut s.engagement));
    }

    fn emit(&self, event: OrchestratorEvent) {
        let _ = self.events.send(Arc::new(event));
    }
}

// ── NativeAdSlot ─────────────────────────────────────────────────────

/// One native creative for the lifetime of a mount.
pub struct NativeAdSlot {
    core: SlotCore,
}

impl NativeAdSlot {
    /// Create the ad object and start its load. Must be called from within
    /// a tokio runtime.
    pub fn mount(
        placement: PlacementId,
        unit_id: impl Into<String>,
        options: AdRequestOptions,
        sdk: Arc<dyn AdSdk>,
        events: broadcast::Sender<Arc<OrchestratorEvent>>,
        parent: &CancellationToken,
    ) -> Self {
        Self {
            core: SlotCore::mount(
                AdFormat::Native,
                placement,
                unit_id.into(),
                options,
                sdk,
                events,
                parent,
            ),
        }
    }

    pub fn placement(&self) -> &PlacementId {
        &self.core.placement
    }

    pub fn phase(&self) -> SlotPhase {
        self.core.phase()
    }

    /// Wait until the load settles and return the final phase.
    pub async fn ready(&self) -> SlotPhase {
        self.core.wait_settled().await
    }

    pub fn snapshot(&self) -> SlotSnapshot {
        self.core.snapshot()
    }

    /// Destroy the ad and detach its listener, waiting for both.
    pub async fn unmount(self) {
        self.core.unmount().await;
    }
}

// ── BannerSlot ───────────────────────────────────────────────────────

/// Inline banner. Same contract as [`NativeAdSlot`]; hidden once it fails.
pub struct BannerSlot {
    core: SlotCore,
}

impl BannerSlot {
    pub fn mount(
        placement: PlacementId,
        unit_id: impl Into<String>,
        options: AdRequestOptions,
        sdk: Arc<dyn AdSdk>,
        events: broadcast::Sender<Arc<OrchestratorEvent>>,
        parent: &CancellationToken,
    ) -> Self {
        Self {
            core: SlotCore::mount(
                AdFormat::Banner,
                placement,
                unit_id.into(),
                options,
                sdk,
                events,
                parent,
            ),
        }
    }

    pub fn placement(&self) -> &PlacementId {
        &self.core.placement
    }

    pub fn phase(&self) -> SlotPhase {
        self.core.phase()
    }

    /// The host should not reserve space for a failed banner.
    pub fn is_visible(&self) -> bool {
        self.phase() != SlotPhase::Error
    }

    pub async fn ready(&self) -> SlotPhase {
        self.core.wait_settled().await
    }

    pub fn snapshot(&self) -> SlotSnapshot {
        self.core.snapshot()
    }

    pub async fn unmount(self) {
        self.core.unmount().await;
    }
}
