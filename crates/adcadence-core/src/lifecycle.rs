// ── Foreground lifecycle trigger ──
//
// Turns application state transitions into app-open show attempts. A
// return to the foreground schedules one attempt after a settle delay;
// repeated transitions inside that window collapse into a single attempt,
// and leaving the foreground cancels it. The cold-start (first-launch)
// attempt is issued at most once per trigger.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::coordinator::{ShowCoordinator, ShowOptions};
use crate::event::OrchestratorEvent;
use crate::retry::sleep_until_opt;
use crate::unit::AdUnitController;

/// Application state as reported by the host platform.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum AppState {
    Active,
    Inactive,
    Background,
}

/// Timing knobs of a [`LifecycleTrigger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerTiming {
    /// Delay between becoming active and the show attempt.
    pub settle_delay: Duration,
    /// Deadline of the cold-start request.
    pub first_launch_wait: Duration,
}

enum TriggerInput {
    AppState(AppState),
    ColdStart,
}

// ── LifecycleTrigger ─────────────────────────────────────────────────

pub struct LifecycleTrigger {
    inputs: mpsc::UnboundedSender<TriggerInput>,
    cold_started: AtomicBool,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LifecycleTrigger {
    /// Spawn the trigger for `app_open`. The process is assumed to start in
    /// the foreground.
    pub fn spawn(
        app_open: AdUnitController,
        coordinator: ShowCoordinator,
        timing: TriggerTiming,
        events: broadcast::Sender<Arc<OrchestratorEvent>>,
        parent: &CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = parent.child_token();
        let actor = TriggerActor {
            app_open,
            coordinator,
            timing,
            events,
            current: AppState::Active,
            scheduled: None,
            attempts: JoinSet::new(),
        };
        let handle = tokio::spawn(actor.run(rx, cancel.clone()));
        Self {
            inputs: tx,
            cold_started: AtomicBool::new(false),
            cancel,
            task: Mutex::new(Some(handle)),
        }
    }

    /// Foreground-transition hook for the host platform.
    pub fn on_app_state_change(&self, state: AppState) {
        let _ = self.inputs.send(TriggerInput::AppState(state));
    }

    /// Issue the first-launch request. Returns `false` if it was already
    /// issued (or the trigger is stopped).
    pub fn on_cold_start(&self) -> bool {
        if self.cold_started.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.inputs.send(TriggerInput::ColdStart).is_ok()
    }

    /// Stop the trigger, cancel any scheduled attempt and abort show
    /// requests it started.
    pub async fn teardown(&self) {
        self.cancel.cancel();
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl Drop for LifecycleTrigger {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Actor ────────────────────────────────────────────────────────────

struct TriggerActor {
    app_open: AdUnitController,
    coordinator: ShowCoordinator,
    timing: TriggerTiming,
    events: broadcast::Sender<Arc<OrchestratorEvent>>,
    current: AppState,
    scheduled: Option<Instant>,
    attempts: JoinSet<bool>,
}

impl TriggerActor {
    async fn run(mut self, mut inputs: mpsc::UnboundedReceiver<TriggerInput>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                input = inputs.recv() => {
                    let Some(input) = input else { break };
                    match input {
                        TriggerInput::AppState(next) => self.on_app_state(next).await,
                        TriggerInput::ColdStart => {
                            info!("cold start: requesting first-launch app-open ad");
                            let options = ShowOptions::first_launch()
                                .with_deadline(self.timing.first_launch_wait);
                            self.attempt(options);
                        }
                    }
                }
                () = sleep_until_opt(self.scheduled) => {
                    self.scheduled = None;
                    debug!("foreground settle elapsed, requesting app-open ad");
                    self.attempt(ShowOptions::default());
                }
                Some(joined) = self.attempts.join_next(), if !self.attempts.is_empty() => {
                    if let Ok(shown) = joined {
                        debug!(shown, "app-open attempt finished");
                    }
                }
            }
        }
        self.attempts.shutdown().await;
    }

    async fn on_app_state(&mut self, next: AppState) {
        let previous = self.current;
        if previous == next {
            return;
        }
        self.current = next;
        debug!(from = %previous, to = %next, "app state changed");
        let _ = self.events.send(Arc::new(OrchestratorEvent::AppStateChanged {
            from: previous,
            to: next,
        }));

        if next == AppState::Active {
            // Debounce: a newer foreground transition replaces the old one.
            self.scheduled = Some(Instant::now() + self.timing.settle_delay);
            return;
        }

        if self.scheduled.take().is_some() {
            debug!("scheduled app-open attempt cancelled");
        }
        if next == AppState::Background {
            self.app_open.cancel_pending_first_launch().await;
        }
    }

    fn attempt(&mut self, options: ShowOptions) {
        let coordinator = self.coordinator.clone();
        let controller = self.app_open.clone();
        self.attempts
            .spawn(async move { coordinator.request_show(&controller, options).await });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_state_parses_platform_names() {
        assert_eq!("background".parse::<AppState>().ok(), Some(AppState::Background));
        assert_eq!("Active".parse::<AppState>().ok(), Some(AppState::Active));
        assert_eq!(AppState::Inactive.to_string(), "inactive");
    }
}
