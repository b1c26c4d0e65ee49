// ── Ad unit actor ──
//
// The only writer of an `AdUnitState`. One task per controller multiplexes
// commands from the handle, events from the current SDK ad object, the
// retry and re-prime timers and the first-launch expiry, so every state
// change is a sequential step of a single loop.

use std::future;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use adcadence_sdk::{AdError, AdEvent, AdFormat, AdRequestOptions, AdSdk};

use super::transition::{self, Effect, Step};
use super::{ActiveAd, ShowAttempt, UnitCommand};
use crate::config::UnitPolicy;
use crate::event::OrchestratorEvent;
use crate::gate::{DenyReason, GateDecision, IntervalGate};
use crate::model::{AdUnitState, PlacementId};
use crate::retry::{RetryScheduler, sleep_until_opt};

pub(super) struct UnitActor {
    placement: PlacementId,
    format: AdFormat,
    unit_id: String,
    options: AdRequestOptions,
    policy: UnitPolicy,
    gate: IntervalGate,
    sdk: Arc<dyn AdSdk>,
    events: broadcast::Sender<Arc<OrchestratorEvent>>,
    state: AdUnitState,
    state_tx: watch::Sender<AdUnitState>,
    ad: Option<ActiveAd>,
    retry: RetryScheduler,
    reprime: RetryScheduler,
    first_launch_deadline: Option<Instant>,
    deferred: Vec<oneshot::Sender<bool>>,
}

impl UnitActor {
    pub(super) fn new(
        setup: super::UnitSetup,
        sdk: Arc<dyn AdSdk>,
        events: broadcast::Sender<Arc<OrchestratorEvent>>,
        state_tx: watch::Sender<AdUnitState>,
    ) -> Self {
        let super::UnitSetup {
            placement,
            format,
            unit_id,
            options,
            policy,
        } = setup;
        Self {
            gate: IntervalGate::new(policy.min_interval),
            retry: RetryScheduler::new(policy.retry_delay),
            reprime: RetryScheduler::new(policy.reprime_delay),
            placement,
            format,
            unit_id,
            options,
            policy,
            sdk,
            events,
            state: AdUnitState::default(),
            state_tx,
            ad: None,
            first_launch_deadline: None,
            deferred: Vec::new(),
        }
    }

    pub(super) async fn run(
        mut self,
        mut commands: mpsc::Receiver<UnitCommand>,
        cancel: CancellationToken,
    ) {
        // Preload so the first request finds a creative.
        self.load();

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    self.handle_command(command);
                }
                event = next_event(&mut self.ad) => self.on_ad_event(event),
                fired = self.retry.fired() => {
                    debug!(
                        placement = %self.placement,
                        attempt = fired.retry_count,
                        generation = fired.generation,
                        "retrying load"
                    );
                    self.load();
                }
                _ = self.reprime.fired() => {
                    debug!(placement = %self.placement, "re-priming after delay");
                    self.load();
                }
                () = sleep_until_opt(self.first_launch_deadline) => {
                    info!(placement = %self.placement, "first-launch show expired before load");
                    self.cancel_pending_first_launch();
                }
            }
        }

        self.shutdown();
    }

    // ── Commands ─────────────────────────────────────────────────────

    fn handle_command(&mut self, command: UnitCommand) {
        match command {
            UnitCommand::Load => {
                self.load();
            }
            UnitCommand::Show {
                first_launch,
                load_if_missing,
                reply,
            } => {
                let attempt = self.attempt_show(first_launch, load_if_missing);
                let _ = reply.send(attempt);
            }
            UnitCommand::CancelPendingFirstLaunch => self.cancel_pending_first_launch(),
        }
    }

    fn attempt_show(&mut self, first_launch: bool, load_if_missing: bool) -> ShowAttempt {
        let now = Instant::now();
        match self.gate.can_show(&self.state, now, first_launch) {
            GateDecision::Allow => {
                if self.issue_show() {
                    ShowAttempt::Issued
                } else {
                    ShowAttempt::Denied(DenyReason::ShowFailed)
                }
            }
            GateDecision::Defer => {
                let (tx, rx) = oneshot::channel();
                self.deferred.push(tx);
                if !self.state.pending_first_launch_show {
                    debug!(placement = %self.placement, "deferring first-launch show until loaded");
                    self.state.pending_first_launch_show = true;
                    self.first_launch_deadline = Some(now + self.policy.first_launch_wait);
                }
                self.load();
                self.publish();
                ShowAttempt::Deferred(rx)
            }
            GateDecision::Deny(DenyReason::NotLoaded) => {
                if load_if_missing {
                    self.load();
                }
                ShowAttempt::NotReady
            }
            GateDecision::Deny(reason) => {
                debug!(placement = %self.placement, %reason, "show skipped");
                self.emit(OrchestratorEvent::ShowSkipped {
                    placement: self.placement.clone(),
                    reason,
                });
                ShowAttempt::Denied(reason)
            }
        }
    }

    // ── SDK interaction ──────────────────────────────────────────────

    /// Start a load unless one is pointless right now. A fresh ad object
    /// replaces (and destroys) the previous one.
    fn load(&mut self) -> bool {
        if !transition::begin_load(&mut self.state) {
            trace!(placement = %self.placement, phase = %self.state.phase, "load skipped");
            return false;
        }
        self.retry.cancel();
        self.reprime.cancel();
        self.ad = None;

        match self.create_and_load() {
            Ok(ad) => {
                debug!(
                    placement = %self.placement,
                    unit_id = %self.unit_id,
                    retry_count = self.state.retry_count,
                    "load issued"
                );
                self.ad = Some(ad);
                self.publish();
            }
            // A synchronous refusal follows the same path as an ERROR event.
            Err(e) => self.on_ad_event(AdEvent::Error(AdError::from(&e))),
        }
        true
    }

    fn create_and_load(&self) -> Result<ActiveAd, adcadence_sdk::Error> {
        ActiveAd::request(self.sdk.as_ref(), self.format, &self.unit_id, &self.options)
    }

    /// Issue `show()` on the loaded ad. Returns `true` once the SDK has
    /// accepted the call.
    fn issue_show(&mut self) -> bool {
        if !transition::begin_show(&mut self.state) {
            return false;
        }
        let result = match &self.ad {
            Some(ad) => ad.show(),
            None => Err(adcadence_sdk::Error::NotLoaded {
                unit_id: self.unit_id.clone(),
            }),
        };
        match result {
            Ok(()) => {
                info!(placement = %self.placement, format = %self.format, "show issued");
                self.publish();
                true
            }
            Err(e) => {
                warn!(placement = %self.placement, error = %e, "show rejected by SDK");
                let step = transition::show_rejected(&mut self.state, e.to_string());
                self.emit(OrchestratorEvent::ShowFailed {
                    placement: self.placement.clone(),
                    message: e.to_string(),
                });
                if let Step::Then(effect) = step {
                    self.run_effect(effect);
                }
                self.publish();
                false
            }
        }
    }

    // ── Events ───────────────────────────────────────────────────────

    fn on_ad_event(&mut self, event: AdEvent) {
        match &event {
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
                    currency_code: paid.currency_code.clone(),
                    precision: paid.precision,
                });
                return;
            }
            event if !event.is_lifecycle() => {
                trace!(placement = %self.placement, event = event.kind(), "engagement event");
                return;
            }
            _ => {}
        }

        let from = self.state.phase;
        let step = transition::apply_event(
            &mut self.state,
            &event,
            Instant::now(),
            self.policy.max_retries,
        );
        if step == Step::Ignored {
            debug!(
                placement = %self.placement,
                event = event.kind(),
                phase = %from,
                "ignoring out-of-phase event"
            );
            return;
        }
        debug!(
            placement = %self.placement,
            event = event.kind(),
            %from,
            to = %self.state.phase,
            "transition"
        );

        self.notify(&event, step);
        if let Step::Then(effect) = step {
            self.run_effect(effect);
        }
        self.publish();
    }

    fn notify(&self, event: &AdEvent, step: Step) {
        let placement = self.placement.clone();
        let notification = match (event, step) {
            (AdEvent::Loaded, _) => {
                info!(placement = %self.placement, "ad loaded");
                OrchestratorEvent::Loaded {
                    placement,
                    format: self.format,
                }
            }
            (AdEvent::Opened, _) => OrchestratorEvent::Shown { placement },
            (AdEvent::Closed, _) | (AdEvent::Error(_), Step::Then(Effect::Reprime { shown: true })) => {
                info!(placement = %self.placement, "ad closed");
                OrchestratorEvent::Closed { placement }
            }
            (AdEvent::Error(err), Step::Then(Effect::Reprime { shown: false })) => {
                warn!(placement = %self.placement, error = %err, "ad failed to present");
                OrchestratorEvent::ShowFailed {
                    placement,
                    message: err.message.clone(),
                }
            }
            (AdEvent::Error(err), _) => {
                let retry_in = matches!(step, Step::Then(Effect::ScheduleRetry { .. }))
                    .then(|| self.retry.base_delay());
                warn!(
                    placement = %self.placement,
                    error = %err,
                    attempt = self.state.retry_count,
                    ?retry_in,
                    "ad failed to load"
                );
                OrchestratorEvent::LoadFailed {
                    placement,
                    code: err.code,
                    message: err.message.clone(),
                    attempt: self.state.retry_count,
                    retry_in,
                }
            }
            _ => return,
        };
        self.emit(notification);
    }

    fn run_effect(&mut self, effect: Effect) {
        match effect {
            Effect::ShowPending => {
                self.first_launch_deadline = None;
                let shown = self.issue_show();
                // One show, one winner: the first caller to defer owns it.
                let mut waiters = self.deferred.drain(..);
                if let Some(first) = waiters.next() {
                    let _ = first.send(shown);
                }
                for waiter in waiters {
                    let _ = waiter.send(false);
                }
            }
            Effect::ScheduleRetry { retry_count } => {
                self.retry.schedule(retry_count);
            }
            Effect::RetriesExhausted => {
                warn!(
                    placement = %self.placement,
                    attempts = self.state.retry_count,
                    "load retries exhausted"
                );
                self.emit(OrchestratorEvent::RetriesExhausted {
                    placement: self.placement.clone(),
                    attempts: self.state.retry_count,
                });
                self.cancel_pending_first_launch();
            }
            Effect::Reprime { .. } => {
                if self.reprime.base_delay().is_zero() {
                    self.load();
                } else {
                    self.reprime.schedule(0);
                }
            }
        }
    }

    // ── Housekeeping ─────────────────────────────────────────────────

    /// Drop a queued first-launch show and resolve its waiters with `false`.
    fn cancel_pending_first_launch(&mut self) {
        self.first_launch_deadline = None;
        for waiter in self.deferred.drain(..) {
            let _ = waiter.send(false);
        }
        if self.state.pending_first_launch_show {
            self.state.pending_first_launch_show = false;
            self.publish();
        }
    }

    fn shutdown(&mut self) {
        self.retry.cancel();
        self.reprime.cancel();
        self.cancel_pending_first_launch();
        if self.ad.take().is_some() {
            debug!(placement = %self.placement, "ad object destroyed on teardown");
        }
    }

    fn publish(&self) {
        self.state_tx.send_if_modified(|current| {
            if *current == self.state {
                false
            } else {
                current.clone_from(&self.state);
                true
            }
        });
    }

    fn emit(&self, event: OrchestratorEvent) {
        let _ = self.events.send(Arc::new(event));
    }
}

/// Next event from the current ad object; pending while there is none.
async fn next_event(ad: &mut Option<ActiveAd>) -> AdEvent {
    if let Some(ad) = ad {
        if let Some(event) = ad.next_event().await {
            return event;
        }
    }
    future::pending().await
}
