// ── Orchestrator facade ──
//
// Process-wide entry point: initializes the SDK, owns the app-open unit
// and its lifecycle trigger, keeps the placement registry (one controller
// per placement) and routes screen show requests through the coordinator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use adcadence_sdk::{AdFormat, AdSdk};

use crate::config::OrchestratorConfig;
use crate::coordinator::{ShowCoordinator, ShowOptions};
use crate::error::CoreError;
use crate::event::OrchestratorEvent;
use crate::lifecycle::{AppState, LifecycleTrigger, TriggerTiming};
use crate::model::{AdUnitSnapshot, PlacementId};
use crate::slot::{BannerSlot, NativeAdSlot};
use crate::unit::{AdUnitController, UnitSetup};

const EVENT_CHANNEL_SIZE: usize = 256;

/// The main entry point for host applications.
///
/// Cheaply cloneable via `Arc<OrchestratorInner>`. Call [`start`](Self::start)
/// once at launch, mount interstitial placements as screens appear, and
/// call [`request_show`](Self::request_show) from navigation code.
#[derive(Clone)]
pub struct AdOrchestrator {
    inner: Arc<OrchestratorInner>,
}

struct OrchestratorInner {
    config: OrchestratorConfig,
    sdk: Arc<dyn AdSdk>,
    events: broadcast::Sender<Arc<OrchestratorEvent>>,
    coordinator: ShowCoordinator,
    units: DashMap<PlacementId, AdUnitController>,
    lifecycle: OnceLock<LifecycleTrigger>,
    started: AtomicBool,
    cancel: CancellationToken,
    /// Non-fatal problems hit during `start()` (e.g. SDK init failure).
    warnings: Mutex<Vec<String>>,
}

impl Drop for OrchestratorInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl AdOrchestrator {
    pub fn new(config: OrchestratorConfig, sdk: Arc<dyn AdSdk>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let coordinator = ShowCoordinator::new(config.show_deadline, events.clone());
        Self {
            inner: Arc::new(OrchestratorInner {
                config,
                sdk,
                events,
                coordinator,
                units: DashMap::new(),
                lifecycle: OnceLock::new(),
                started: AtomicBool::new(false),
                cancel: CancellationToken::new(),
                warnings: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Initialize the SDK, start preloading the app-open ad and, unless
    /// disabled, issue the first-launch request.
    ///
    /// An SDK initialization failure is logged and recorded as a warning;
    /// ads simply fail to load afterwards.
    pub async fn start(&self) -> Result<(), CoreError> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(CoreError::AlreadyStarted);
        }
        let config = &self.inner.config;

        match self.inner.sdk.initialize(&config.sdk) {
            Ok(()) => info!(
                rating = %config.sdk.max_ad_content_rating,
                child_directed = config.sdk.tag_for_child_directed_treatment,
                "ad SDK initialized"
            ),
            Err(e) => {
                let err = CoreError::from(e);
                warn!(error = %err, "ad SDK initialization failed, continuing without it");
                self.inner.warnings.lock().await.push(err.to_string());
            }
        }

        let app_open = AdUnitController::spawn(
            UnitSetup {
                placement: PlacementId::app_open(),
                format: AdFormat::AppOpen,
                unit_id: config.app_open.unit_id.clone(),
                options: config.request.clone(),
                policy: config.app_open.policy(),
            },
            Arc::clone(&self.inner.sdk),
            self.inner.events.clone(),
            &self.inner.cancel,
        );
        self.inner
            .units
            .insert(PlacementId::app_open(), app_open.clone());

        let trigger = LifecycleTrigger::spawn(
            app_open,
            self.inner.coordinator.clone(),
            TriggerTiming {
                settle_delay: config.foreground_settle_delay,
                first_launch_wait: config.app_open.first_launch_wait,
            },
            self.inner.events.clone(),
            &self.inner.cancel,
        );
        let trigger = self.inner.lifecycle.get_or_init(|| trigger);
        if config.show_on_cold_start {
            trigger.on_cold_start();
        }

        info!("ad orchestrator started");
        Ok(())
    }

    /// Tear down every controller and the trigger, waiting until all ad
    /// objects are destroyed and listeners detached.
    pub async fn shutdown(&self) {
        if let Some(trigger) = self.inner.lifecycle.get() {
            trigger.teardown().await;
        }
        let units: Vec<AdUnitController> = self
            .inner
            .units
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        self.inner.units.clear();
        for unit in units {
            unit.teardown().await;
        }
        self.inner.cancel.cancel();
        info!("ad orchestrator shut down");
    }

    fn ensure_started(&self) -> Result<(), CoreError> {
        if self.inner.started.load(Ordering::SeqCst) && !self.inner.cancel.is_cancelled() {
            Ok(())
        } else {
            Err(CoreError::NotStarted)
        }
    }

    // ── Placements ───────────────────────────────────────────────────

    /// Create the interstitial controller for a screen. The placement is
    /// owned by the returned mount until it is dropped or unmounted.
    pub fn mount_interstitial(
        &self,
        placement: impl Into<PlacementId>,
    ) -> Result<InterstitialMount, CoreError> {
        self.ensure_started()?;
        let placement = placement.into();
        let config = &self.inner.config;

        match self.inner.units.entry(placement.clone()) {
            Entry::Occupied(_) => Err(CoreError::PlacementAlreadyMounted { placement }),
            Entry::Vacant(slot) => {
                let controller = AdUnitController::spawn(
                    UnitSetup {
                        unit_id: config.interstitial.unit_for(&placement).to_owned(),
                        placement,
                        format: AdFormat::Interstitial,
                        options: config.request.clone(),
                        policy: config.interstitial.policy(),
                    },
                    Arc::clone(&self.inner.sdk),
                    self.inner.events.clone(),
                    &self.inner.cancel,
                );
                slot.insert(controller.clone());
                Ok(InterstitialMount {
                    controller,
                    registry: Arc::downgrade(&self.inner),
                })
            }
        }
    }

    pub fn mount_native(&self, placement: impl Into<PlacementId>) -> Result<NativeAdSlot, CoreError> {
        self.ensure_started()?;
        Ok(NativeAdSlot::mount(
            placement.into(),
            self.inner.config.native_unit_id.clone(),
            self.inner.config.request.clone(),
            Arc::clone(&self.inner.sdk),
            self.inner.events.clone(),
            &self.inner.cancel,
        ))
    }

    pub fn mount_banner(&self, placement: impl Into<PlacementId>) -> Result<BannerSlot, CoreError> {
        self.ensure_started()?;
        Ok(BannerSlot::mount(
            placement.into(),
            self.inner.config.banner_unit_id.clone(),
            self.inner.config.request.clone(),
            Arc::clone(&self.inner.sdk),
            self.inner.events.clone(),
            &self.inner.cancel,
        ))
    }

    pub fn controller(&self, placement: &PlacementId) -> Option<AdUnitController> {
        self.inner
            .units
            .get(placement)
            .map(|entry| entry.value().clone())
    }

    pub fn app_open(&self) -> Option<AdUnitController> {
        self.controller(&PlacementId::app_open())
    }

    // ── Showing ──────────────────────────────────────────────────────

    /// Show an ad for `placement` if it is (or becomes) ready before the
    /// deadline. Never fails; `false` means "proceed without an ad".
    pub async fn request_show(&self, placement: &PlacementId, options: ShowOptions) -> bool {
        let Some(controller) = self.controller(placement) else {
            warn!(%placement, "show requested for unmounted placement");
            return false;
        };
        self.inner.coordinator.request_show(&controller, options).await
    }

    /// Try `placements` in order under one shared deadline.
    pub async fn request_show_any(&self, placements: &[PlacementId], options: ShowOptions) -> bool {
        let controllers: Vec<AdUnitController> = placements
            .iter()
            .filter_map(|placement| {
                let controller = self.controller(placement);
                if controller.is_none() {
                    debug!(%placement, "skipping unmounted fallback placement");
                }
                controller
            })
            .collect();
        self.inner
            .coordinator
            .request_show_any(&controllers, options)
            .await
    }

    /// Foreground-transition hook for the host platform.
    pub fn on_app_state_change(&self, state: AppState) {
        match self.inner.lifecycle.get() {
            Some(trigger) => trigger.on_app_state_change(state),
            None => debug!(%state, "app state change before start, ignored"),
        }
    }

    // ── Observation ──────────────────────────────────────────────────

    pub fn events(&self) -> broadcast::Receiver<Arc<OrchestratorEvent>> {
        self.inner.events.subscribe()
    }

    /// Snapshot of every registered unit, ordered by placement.
    pub fn snapshot(&self) -> Vec<AdUnitSnapshot> {
        let mut units: Vec<AdUnitSnapshot> = self
            .inner
            .units
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        units.sort_by(|a, b| a.placement.cmp(&b.placement));
        units
    }

    /// Drain warnings accumulated during `start()`.
    pub async fn take_warnings(&self) -> Vec<String> {
        std::mem::take(&mut *self.inner.warnings.lock().await)
    }
}

// ── InterstitialMount ────────────────────────────────────────────────

/// Ownership of one interstitial placement for the lifetime of a screen.
///
/// Dropping the mount frees the placement and stops its controller
/// (destroying the ad and detaching its listeners in the background);
/// [`unmount`](Self::unmount) does the same and waits for it.
pub struct InterstitialMount {
    controller: AdUnitController,
    registry: Weak<OrchestratorInner>,
}

impl InterstitialMount {
    pub fn controller(&self) -> &AdUnitController {
        &self.controller
    }

    pub fn placement(&self) -> &PlacementId {
        self.controller.placement()
    }

    pub async fn unmount(self) {
        self.controller.teardown().await;
    }
}

impl Drop for InterstitialMount {
    fn drop(&mut self) {
        if let Some(inner) = self.registry.upgrade() {
            inner
                .units
                .remove_if(self.controller.placement(), |_, registered| {
                    registered.same_unit(&self.controller)
                });
        }
        self.controller.detach();
        debug!(placement = %self.controller.placement(), "interstitial unmounted");
    }
}
