// ── Ad unit controller ──
//
// Handle to one ad placement instance (an interstitial on a screen, or
// the process-wide app-open ad). The handle is cheap to clone; all state
// lives in a single actor task that owns the SDK ad object, its listener
// registration and every timer. Dropping the last handle or calling
// `teardown()` stops the actor, destroys the ad and deregisters listeners.

mod actor;
pub(crate) mod transition;

use std::sync::Arc;

use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use adcadence_sdk::{AdEvent, AdEventSubscription, AdFormat, AdHandle, AdRequestOptions, AdSdk};

use crate::config::UnitPolicy;
use crate::error::CoreError;
use crate::event::OrchestratorEvent;
use crate::gate::DenyReason;
use crate::model::{AdPhase, AdUnitSnapshot, AdUnitState, PlacementId};
use crate::stream::PhaseStream;

use self::actor::UnitActor;

const COMMAND_CHANNEL_SIZE: usize = 32;

/// What a controller is created for.
#[derive(Debug, Clone)]
pub struct UnitSetup {
    pub placement: PlacementId,
    pub format: AdFormat,
    pub unit_id: String,
    pub options: AdRequestOptions,
    pub policy: UnitPolicy,
}

pub(crate) enum UnitCommand {
    Load,
    Show {
        first_launch: bool,
        /// Kick off a load when the unit has nothing to show.
        load_if_missing: bool,
        reply: oneshot::Sender<ShowAttempt>,
    },
    CancelPendingFirstLaunch,
}

/// Immediate answer of the actor to a show command.
#[derive(Debug)]
pub(crate) enum ShowAttempt {
    /// The SDK accepted `show()`.
    Issued,
    /// Queued as the first-launch show; resolves once the unit loads
    /// (`true`) or the wait is abandoned (`false`).
    Deferred(oneshot::Receiver<bool>),
    /// Nothing loaded yet; a load is in flight.
    NotReady,
    Denied(DenyReason),
}

/// The live SDK ad object plus its listener registration.
///
/// Dropping it destroys the ad and then deregisters the listener.
pub(crate) struct ActiveAd {
    handle: Box<dyn AdHandle>,
    events: AdEventSubscription,
}

impl ActiveAd {
    /// Create a fresh ad object, subscribe to it and start its load. The
    /// listener is registered before `load()` so no outcome is missed.
    pub(crate) fn request(
        sdk: &dyn AdSdk,
        format: AdFormat,
        unit_id: &str,
        options: &AdRequestOptions,
    ) -> Result<Self, adcadence_sdk::Error> {
        let handle = sdk.create_for_ad_request(format, unit_id, options)?;
        let events = handle.subscribe();
        let ad = Self { handle, events };
        ad.handle.load()?;
        Ok(ad)
    }

    pub(crate) fn show(&self) -> Result<(), adcadence_sdk::Error> {
        self.handle.show()
    }

    pub(crate) async fn next_event(&mut self) -> Option<AdEvent> {
        self.events.recv().await
    }
}

impl Drop for ActiveAd {
    fn drop(&mut self) {
        self.handle.destroy();
    }
}

// ── AdUnitController ─────────────────────────────────────────────────

/// Cheaply cloneable handle to one ad unit actor.
#[derive(Clone)]
pub struct AdUnitController {
    inner: Arc<UnitInner>,
}

struct UnitInner {
    placement: PlacementId,
    format: AdFormat,
    unit_id: String,
    commands: mpsc::Sender<UnitCommand>,
    state: watch::Receiver<AdUnitState>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for UnitInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl AdUnitController {
    /// Spawn the actor and start preloading. Must be called from within a
    /// tokio runtime. The actor stops when `parent` is cancelled.
    pub fn spawn(
        setup: UnitSetup,
        sdk: Arc<dyn AdSdk>,
        events: broadcast::Sender<Arc<OrchestratorEvent>>,
        parent: &CancellationToken,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(AdUnitState::default());
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let cancel = parent.child_token();

        let placement = setup.placement.clone();
        let format = setup.format;
        let unit_id = setup.unit_id.clone();
        debug!(%placement, %format, %unit_id, "spawning ad unit");

        let actor = UnitActor::new(setup, sdk, events, state_tx);
        let handle = tokio::spawn(actor.run(command_rx, cancel.clone()));

        Self {
            inner: Arc::new(UnitInner {
                placement,
                format,
                unit_id,
                commands: command_tx,
                state: state_rx,
                cancel,
                task: Mutex::new(Some(handle)),
            }),
        }
    }

    pub fn placement(&self) -> &PlacementId {
        &self.inner.placement
    }

    pub fn format(&self) -> AdFormat {
        self.inner.format
    }

    pub fn unit_id(&self) -> &str {
        &self.inner.unit_id
    }

    // ── Operations ───────────────────────────────────────────────────

    /// Request a load. No-op while loading, loaded or showing.
    pub async fn load(&self) -> Result<(), CoreError> {
        self.send(UnitCommand::Load).await
    }

    /// Show the loaded ad right now, or fail fast.
    ///
    /// Unlike [`ShowCoordinator::request_show`](crate::ShowCoordinator::request_show)
    /// this neither waits nor triggers a load.
    pub async fn show(&self) -> Result<(), CoreError> {
        match self.attempt_show(false, false).await? {
            ShowAttempt::Issued => Ok(()),
            ShowAttempt::NotReady
            | ShowAttempt::Deferred(_)
            | ShowAttempt::Denied(DenyReason::NotLoaded | DenyReason::AlreadyShowing) => {
                Err(CoreError::NotReady {
                    placement: self.inner.placement.clone(),
                    phase: self.phase(),
                })
            }
            ShowAttempt::Denied(reason) => Err(CoreError::ShowFailed {
                placement: self.inner.placement.clone(),
                message: reason.to_string(),
            }),
        }
    }

    pub(crate) async fn attempt_show(
        &self,
        first_launch: bool,
        load_if_missing: bool,
    ) -> Result<ShowAttempt, CoreError> {
        let reply = self.queue_show(first_launch, load_if_missing).await?;
        reply.await.map_err(|_| self.stopped())
    }

    /// Hand a show attempt to the actor without waiting for its answer.
    /// The actor replies as soon as it has processed the command.
    pub(crate) async fn queue_show(
        &self,
        first_launch: bool,
        load_if_missing: bool,
    ) -> Result<oneshot::Receiver<ShowAttempt>, CoreError> {
        let (reply, rx) = oneshot::channel();
        self.send(UnitCommand::Show {
            first_launch,
            load_if_missing,
            reply,
        })
        .await?;
        Ok(rx)
    }

    /// Abandon a queued first-launch show (e.g. the app went to the
    /// background before the ad loaded).
    pub async fn cancel_pending_first_launch(&self) {
        let _ = self.send(UnitCommand::CancelPendingFirstLaunch).await;
    }

    async fn send(&self, command: UnitCommand) -> Result<(), CoreError> {
        self.inner
            .commands
            .send(command)
            .await
            .map_err(|_| self.stopped())
    }

    fn stopped(&self) -> CoreError {
        CoreError::UnitStopped {
            placement: self.inner.placement.clone(),
        }
    }

    // ── Observation ──────────────────────────────────────────────────

    /// Copy of the current state.
    pub fn state(&self) -> AdUnitState {
        self.inner.state.borrow().clone()
    }

    pub fn phase(&self) -> AdPhase {
        self.inner.state.borrow().phase
    }

    /// `true` while a load is in flight (drives loading indicators).
    pub fn is_loading(&self) -> bool {
        self.phase() == AdPhase::Loading
    }

    /// Receiver that observes every published state change.
    pub fn subscribe_state(&self) -> watch::Receiver<AdUnitState> {
        self.inner.state.clone()
    }

    /// Stream of distinct phases, starting with the current one.
    pub fn phases(&self) -> PhaseStream {
        PhaseStream::new(self.inner.state.clone())
    }

    pub fn snapshot(&self) -> AdUnitSnapshot {
        AdUnitSnapshot::new(
            self.inner.placement.clone(),
            self.inner.format,
            self.inner.unit_id.clone(),
            &self.inner.state.borrow(),
        )
    }

    /// `true` if both handles refer to the same actor.
    pub fn same_unit(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.cancel.is_cancelled() || self.inner.commands.is_closed()
    }

    // ── Teardown ─────────────────────────────────────────────────────

    /// Signal the actor to stop without waiting for it.
    pub fn detach(&self) {
        self.inner.cancel.cancel();
    }

    /// Stop the actor and wait until it has destroyed its ad object,
    /// dropped its listeners and cleared its timers.
    pub async fn teardown(&self) {
        self.inner.cancel.cancel();
        let handle = self.inner.task.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
            debug!(placement = %self.inner.placement, "ad unit torn down");
        }
    }
}

impl std::fmt::Debug for AdUnitController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdUnitController")
            .field("placement", &self.inner.placement)
            .field("format", &self.inner.format)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}
