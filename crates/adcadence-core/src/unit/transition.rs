//! State transitions of a single ad unit.
//!
//! Everything here is a plain function over `&mut AdUnitState`; the actor
//! decides what to do with the returned [`Step`]. Events that do not fit the
//! current phase (duplicates, stragglers from a replaced ad object, out of
//! order delivery) come back as [`Step::Ignored`] and leave the state alone.

use tokio::time::Instant;

use adcadence_sdk::{AdError, AdEvent};

use crate::model::{AdPhase, AdUnitState};

/// Follow-up work the actor must perform after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Effect {
    /// A first-launch show was queued; issue it now.
    ShowPending,
    /// Arm the retry timer for attempt `retry_count`.
    ScheduleRetry { retry_count: u32 },
    /// The load failed and no retries are left.
    RetriesExhausted,
    /// The ad left the screen (or never made it); load the next one.
    Reprime { shown: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Ignored,
    Applied,
    Then(Effect),
}

/// Enter `Loading`. Returns `false` when a load is pointless because one
/// is in flight, a creative is ready, or an ad is on screen.
pub(crate) fn begin_load(state: &mut AdUnitState) -> bool {
    match state.phase {
        AdPhase::Loading | AdPhase::Loaded | AdPhase::Showing => false,
        AdPhase::Idle | AdPhase::Error => {
            state.phase = AdPhase::Loading;
            true
        }
    }
}

/// Mark a show as in flight. Only valid on a ready unit.
pub(crate) fn begin_show(state: &mut AdUnitState) -> bool {
    if !state.is_ready() {
        return false;
    }
    state.show_issued = true;
    state.pending_first_launch_show = false;
    true
}

/// Apply one lifecycle event from the current ad object.
pub(crate) fn apply_event(
    state: &mut AdUnitState,
    event: &AdEvent,
    now: Instant,
    max_retries: u32,
) -> Step {
    match event {
        AdEvent::Loaded => on_loaded(state),
        AdEvent::Error(err) => on_error(state, err, now, max_retries),
        AdEvent::Opened => on_opened(state, now),
        AdEvent::Closed => on_closed(state, now),
        _ => Step::Ignored,
    }
}

fn on_loaded(state: &mut AdUnitState) -> Step {
    if state.phase != AdPhase::Loading {
        return Step::Ignored;
    }
    state.phase = AdPhase::Loaded;
    state.retry_count = 0;
    state.last_error = None;
    if state.pending_first_launch_show {
        Step::Then(Effect::ShowPending)
    } else {
        Step::Applied
    }
}

fn on_error(state: &mut AdUnitState, err: &AdError, now: Instant, max_retries: u32) -> Step {
    state.last_error = Some(err.to_string());
    match state.phase {
        AdPhase::Loading => {
            state.phase = AdPhase::Error;
            if state.retry_count < max_retries {
                state.retry_count += 1;
                Step::Then(Effect::ScheduleRetry {
                    retry_count: state.retry_count,
                })
            } else {
                Step::Then(Effect::RetriesExhausted)
            }
        }
        // Presentation failed before `Opened`: nothing was displayed.
        AdPhase::Loaded if state.show_issued => {
            state.show_issued = false;
            state.phase = AdPhase::Idle;
            Step::Then(Effect::Reprime { shown: false })
        }
        // Failure while on screen is treated as a close.
        AdPhase::Showing => {
            state.phase = AdPhase::Idle;
            state.mark_shown(now);
            Step::Then(Effect::Reprime { shown: true })
        }
        _ => Step::Ignored,
    }
}

fn on_opened(state: &mut AdUnitState, now: Instant) -> Step {
    if state.phase != AdPhase::Loaded || !state.show_issued {
        return Step::Ignored;
    }
    state.phase = AdPhase::Showing;
    state.show_issued = false;
    state.has_shown_first_launch_ad = true;
    state.mark_shown(now);
    Step::Applied
}

fn on_closed(state: &mut AdUnitState, now: Instant) -> Step {
    if state.phase != AdPhase::Showing {
        return Step::Ignored;
    }
    state.phase = AdPhase::Idle;
    state.mark_shown(now);
    Step::Then(Effect::Reprime { shown: true })
}

/// `show()` was refused synchronously; handled like a failed presentation.
pub(crate) fn show_rejected(state: &mut AdUnitState, message: String) -> Step {
    state.show_issued = false;
    state.phase = AdPhase::Idle;
    state.last_error = Some(message);
    Step::Then(Effect::Reprime { shown: false })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;

    fn no_fill() -> AdEvent {
        AdEvent::Error(AdError::new(3, "No fill"))
    }

    fn loading() -> AdUnitState {
        AdUnitState {
            phase: AdPhase::Loading,
            ..AdUnitState::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn load_success_resets_retry_count() {
        let mut state = AdUnitState {
            retry_count: 2,
            ..loading()
        };
        let step = apply_event(&mut state, &AdEvent::Loaded, Instant::now(), 3);
        assert_eq!(step, Step::Applied);
        assert_eq!(state.phase, AdPhase::Loaded);
        assert_eq!(state.retry_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn loaded_with_pending_first_launch_asks_for_show() {
        let mut state = AdUnitState {
            pending_first_launch_show: true,
            ..loading()
        };
        let step = apply_event(&mut state, &AdEvent::Loaded, Instant::now(), 3);
        assert_eq!(step, Step::Then(Effect::ShowPending));
        assert!(begin_show(&mut state));
        assert!(!state.pending_first_launch_show);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_count_never_exceeds_max() {
        let mut state = loading();
        let now = Instant::now();
        for expected in 1..=3 {
            let step = apply_event(&mut state, &no_fill(), now, 3);
            assert_eq!(step, Step::Then(Effect::ScheduleRetry { retry_count: expected }));
            assert!(begin_load(&mut state));
        }
        let step = apply_event(&mut state, &no_fill(), now, 3);
        assert_eq!(step, Step::Then(Effect::RetriesExhausted));
        assert_eq!(state.retry_count, 3);
        assert_eq!(state.phase, AdPhase::Error);
        assert_eq!(state.last_error.as_deref(), Some("[3] No fill"));
    }

    #[tokio::test(start_paused = true)]
    async fn show_cycle_sets_timestamps_on_confirmed_events_only() {
        let t0 = Instant::now();
        let mut state = AdUnitState {
            phase: AdPhase::Loaded,
            ..AdUnitState::default()
        };
        assert!(begin_show(&mut state));
        assert_eq!(state.last_shown_at, None, "a show request is not a display");

        assert_eq!(apply_event(&mut state, &AdEvent::Opened, t0, 3), Step::Applied);
        assert_eq!(state.phase, AdPhase::Showing);
        assert!(state.has_shown_first_launch_ad);
        assert_eq!(state.last_shown_at, Some(t0));

        let t1 = t0 + Duration::from_secs(5);
        let step = apply_event(&mut state, &AdEvent::Closed, t1, 3);
        assert_eq!(step, Step::Then(Effect::Reprime { shown: true }));
        assert_eq!(state.phase, AdPhase::Idle);
        assert_eq!(state.last_shown_at, Some(t1));
        assert!(begin_load(&mut state));
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_order_and_duplicate_events_are_ignored() {
        let now = Instant::now();
        let mut idle = AdUnitState::default();
        assert_eq!(apply_event(&mut idle, &AdEvent::Loaded, now, 3), Step::Ignored);
        assert_eq!(apply_event(&mut idle, &AdEvent::Closed, now, 3), Step::Ignored);
        assert_eq!(apply_event(&mut idle, &no_fill(), now, 3), Step::Ignored);

        let mut loaded = AdUnitState {
            phase: AdPhase::Loaded,
            ..AdUnitState::default()
        };
        // Opened without a show request in flight.
        assert_eq!(apply_event(&mut loaded, &AdEvent::Opened, now, 3), Step::Ignored);
        assert_eq!(apply_event(&mut loaded, &AdEvent::Loaded, now, 3), Step::Ignored);
        assert_eq!(loaded.phase, AdPhase::Loaded);
    }

    #[tokio::test(start_paused = true)]
    async fn presentation_failure_reprimes_without_marking_a_show() {
        let mut state = AdUnitState {
            phase: AdPhase::Loaded,
            ..AdUnitState::default()
        };
        assert!(begin_show(&mut state));
        let step = apply_event(&mut state, &no_fill(), Instant::now(), 3);
        assert_eq!(step, Step::Then(Effect::Reprime { shown: false }));
        assert_eq!(state.phase, AdPhase::Idle);
        assert!(!state.show_issued);
        assert_eq!(state.last_shown_at, None);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_while_on_screen_counts_as_a_close() {
        let mut state = AdUnitState {
            phase: AdPhase::Loaded,
            ..AdUnitState::default()
        };
        assert!(begin_show(&mut state));
        let opened = Instant::now();
        assert_eq!(apply_event(&mut state, &AdEvent::Opened, opened, 3), Step::Applied);

        let failed = opened + Duration::from_secs(5);
        let step = apply_event(&mut state, &no_fill(), failed, 3);
        assert_eq!(step, Step::Then(Effect::Reprime { shown: true }));
        assert_eq!(state.phase, AdPhase::Idle);
        assert_eq!(state.last_shown_at, Some(failed));
    }

    #[test]
    fn load_is_a_no_op_while_busy() {
        for phase in [AdPhase::Loading, AdPhase::Loaded, AdPhase::Showing] {
            let mut state = AdUnitState {
                phase,
                ..AdUnitState::default()
            };
            assert!(!begin_load(&mut state));
            assert_eq!(state.phase, phase);
        }
    }

    #[test]
    fn show_requires_a_ready_unit() {
        let mut state = AdUnitState {
            phase: AdPhase::Loaded,
            show_issued: true,
            ..AdUnitState::default()
        };
        assert!(!begin_show(&mut state));
        state.phase = AdPhase::Error;
        state.show_issued = false;
        assert!(!begin_show(&mut state));
    }
}
