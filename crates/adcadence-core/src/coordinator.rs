// ── Show coordination ──
//
// Bounded-wait entry point used by navigation code: show the ad if it is
// ready, otherwise wait for it up to a deadline, then let the caller move
// on. Every path resolves to a `bool`; nothing here can hang navigation or
// surface an error to it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tracing::{Instrument, debug, info_span, warn};
use uuid::Uuid;

use crate::error::CoreError;
use crate::event::OrchestratorEvent;
use crate::model::{AdUnitState, PlacementId};
use crate::unit::{AdUnitController, ShowAttempt};

/// Per-call options for [`ShowCoordinator::request_show`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShowOptions {
    /// Request the once-per-process first-launch ad, exempt from the cooldown.
    pub is_first_launch_show: bool,
    /// Override the coordinator's default deadline.
    pub deadline: Option<Duration>,
}

impl ShowOptions {
    pub fn first_launch() -> Self {
        Self {
            is_first_launch_show: true,
            deadline: None,
        }
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// One in-flight `request_show` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowRequest {
    pub id: Uuid,
    pub placement: PlacementId,
    pub is_first_launch_show: bool,
    /// Absolute point after which the call resolves `false`.
    pub deadline: Instant,
}

impl ShowRequest {
    fn new(placement: PlacementId, options: ShowOptions, default_deadline: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            placement,
            is_first_launch_show: options.is_first_launch_show,
            deadline: Instant::now() + options.deadline.unwrap_or(default_deadline),
        }
    }
}

// ── ShowCoordinator ──────────────────────────────────────────────────

/// Resolves show requests against ad unit controllers.
#[derive(Debug, Clone)]
pub struct ShowCoordinator {
    default_deadline: Duration,
    events: broadcast::Sender<Arc<OrchestratorEvent>>,
}

impl ShowCoordinator {
    pub fn new(default_deadline: Duration, events: broadcast::Sender<Arc<OrchestratorEvent>>) -> Self {
        Self {
            default_deadline,
            events,
        }
    }

    pub fn default_deadline(&self) -> Duration {
        self.default_deadline
    }

    /// Show an ad on `controller` if one is (or becomes) ready before the
    /// deadline.
    ///
    /// Resolves `true` once the SDK has accepted the show, `false` when the
    /// deadline passes, the gate refuses, another request won the race, or
    /// the unit is gone.
    pub async fn request_show(&self, controller: &AdUnitController, options: ShowOptions) -> bool {
        let request = ShowRequest::new(controller.placement().clone(), options, self.default_deadline);
        let span = info_span!(
            "request_show",
            id = %request.id,
            placement = %request.placement,
            first_launch = request.is_first_launch_show,
        );
        let started = Instant::now();

        let outcome = show_when_ready(controller, request.is_first_launch_show, request.deadline)
            .instrument(span)
            .await;

        let shown = match outcome {
            Ok(shown) => shown,
            Err(e) => {
                warn!(placement = %request.placement, error = %e, "show request failed");
                false
            }
        };
        self.resolved(&request, shown, started);
        shown
    }

    /// Try `controllers` in order under one shared deadline; the first
    /// one that can show wins.
    ///
    /// Ready units are tried immediately. If none is, loads are kicked off on
    /// all of them and the first to become ready is shown.
    pub async fn request_show_any(
        &self,
        controllers: &[AdUnitController],
        options: ShowOptions,
    ) -> bool {
        let Some(primary) = controllers.first() else {
            return false;
        };
        let request = ShowRequest::new(primary.placement().clone(), options, self.default_deadline);
        let started = Instant::now();

        let winner =
            show_first_ready(controllers, request.is_first_launch_show, request.deadline).await;

        match winner {
            Some(placement) => {
                let request = ShowRequest { placement, ..request };
                self.resolved(&request, true, started);
                true
            }
            None => {
                self.resolved(&request, false, started);
                false
            }
        }
    }

    fn resolved(&self, request: &ShowRequest, shown: bool, started: Instant) {
        let waited = started.elapsed();
        debug!(
            id = %request.id,
            placement = %request.placement,
            shown,
            waited_ms = u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
            "show request resolved"
        );
        let _ = self.events.send(Arc::new(OrchestratorEvent::ShowResolved {
            placement: request.placement.clone(),
            shown,
            first_launch: request.is_first_launch_show,
            waited,
        }));
    }
}

// ── Waiting ──────────────────────────────────────────────────────────

/// Queue a show attempt unless `deadline` passes first (`None`).
///
/// Only queueing is bounded. Once the actor has the command its reply is
/// read unconditionally: the show may already be on screen.
async fn attempt_before(
    controller: &AdUnitController,
    first_launch: bool,
    load_if_missing: bool,
    deadline: Instant,
) -> Result<Option<ShowAttempt>, CoreError> {
    let Ok(queued) = timeout_at(deadline, controller.queue_show(first_launch, load_if_missing)).await
    else {
        return Ok(None);
    };
    let attempt = queued?.await.map_err(|_| CoreError::UnitStopped {
        placement: controller.placement().clone(),
    })?;
    Ok(Some(attempt))
}

/// Ask until the unit either shows, refuses, stops, or the deadline passes.
async fn show_when_ready(
    controller: &AdUnitController,
    first_launch: bool,
    deadline: Instant,
) -> Result<bool, CoreError> {
    let mut state = controller.subscribe_state();
    loop {
        let Some(attempt) = attempt_before(controller, first_launch, true, deadline).await? else {
            debug!(placement = %controller.placement(), "show deadline elapsed");
            return Ok(false);
        };
        match attempt {
            ShowAttempt::Issued => return Ok(true),
            ShowAttempt::Denied(_) => return Ok(false),
            ShowAttempt::Deferred(waiter) => {
                let Ok(shown) = timeout_at(deadline, waiter).await else {
                    debug!(placement = %controller.placement(), "show deadline elapsed");
                    return Ok(false);
                };
                return Ok(shown.unwrap_or(false));
            }
            ShowAttempt::NotReady => {
                let ready = timeout_at(deadline, state.wait_for(AdUnitState::is_ready))
                    .await
                    .map(|ready| ready.is_ok());
                match ready {
                    Ok(true) => {}
                    Ok(false) => {
                        return Err(CoreError::UnitStopped {
                            placement: controller.placement().clone(),
                        });
                    }
                    Err(_) => {
                        debug!(placement = %controller.placement(), "show deadline elapsed");
                        return Ok(false);
                    }
                }
            }
        }
    }
}

async fn show_first_ready(
    controllers: &[AdUnitController],
    first_launch: bool,
    deadline: Instant,
) -> Option<PlacementId> {
    let mut waiting = JoinSet::new();

    for controller in controllers {
        match attempt_before(controller, first_launch, true, deadline).await {
            Ok(Some(ShowAttempt::Issued)) => return Some(controller.placement().clone()),
            Ok(Some(ShowAttempt::Deferred(waiter))) => {
                if let Ok(Ok(true)) = timeout_at(deadline, waiter).await {
                    return Some(controller.placement().clone());
                }
            }
            Ok(Some(ShowAttempt::NotReady)) => {
                waiting.spawn(until_ready(controller.clone()));
            }
            Ok(Some(ShowAttempt::Denied(reason))) => {
                debug!(placement = %controller.placement(), %reason, "fallback candidate denied");
            }
            Ok(None) => return None,
            Err(e) => debug!(error = %e, "fallback candidate unavailable"),
        }
    }

    while let Ok(Some(joined)) = timeout_at(deadline, waiting.join_next()).await {
        let Ok(Some(controller)) = joined else {
            continue;
        };
        match attempt_before(&controller, first_launch, false, deadline).await {
            Ok(Some(ShowAttempt::Issued)) => return Some(controller.placement().clone()),
            // Someone else took the creative; keep waiting on this unit.
            Ok(Some(ShowAttempt::NotReady)) => {
                waiting.spawn(until_ready(controller));
            }
            Ok(None) => return None,
            _ => {}
        }
    }
    None
}

async fn until_ready(controller: AdUnitController) -> Option<AdUnitController> {
    let mut state = controller.subscribe_state();
    let ready = state.wait_for(AdUnitState::is_ready).await.is_ok();
    ready.then_some(controller)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn request_deadline_defaults_to_coordinator_setting() {
        let now = Instant::now();
        let request = ShowRequest::new(
            PlacementId::from("job_details"),
            ShowOptions::default(),
            Duration::from_millis(1500),
        );
        assert_eq!(request.deadline - now, Duration::from_millis(1500));
        assert!(!request.is_first_launch_show);
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_deadline_wins() {
        let now = Instant::now();
        let options = ShowOptions::first_launch().with_deadline(Duration::from_secs(10));
        let request = ShowRequest::new(PlacementId::app_open(), options, Duration::from_millis(1500));
        assert_eq!(request.deadline - now, Duration::from_secs(10));
        assert!(request.is_first_launch_show);
    }
}
