#![allow(clippy::unwrap_used)]
// Integration tests for the cold-start and foreground app-open triggers.

mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use adcadence_core::{
    AdOrchestrator, AdUnitController, AppOpenConfig, AppState, LifecycleTrigger,
    OrchestratorConfig, OrchestratorEvent, PlacementId, ShowCoordinator, TriggerTiming, UnitSetup,
};
use adcadence_sdk::scripted::{LoadScript, ScriptedSdk};
use adcadence_sdk::{AdFormat, AdRequestOptions};

use common::{app_open_unit, next_matching, quiet_config, settle, started, wait_ready};

const SETTLE: Duration = Duration::from_secs(1);

fn is_resolved(event: &OrchestratorEvent) -> bool {
    matches!(event, OrchestratorEvent::ShowResolved { .. })
}

fn is_shown(event: &OrchestratorEvent) -> bool {
    matches!(event, OrchestratorEvent::Shown { .. })
}

// ── Cold start ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_cold_start_shows_app_open_as_soon_as_it_loads() {
    let sdk = ScriptedSdk::new();
    sdk.script_loads(&app_open_unit(), [LoadScript::succeed(Duration::from_millis(500))]);
    let orchestrator = AdOrchestrator::new(OrchestratorConfig::default(), Arc::new(sdk.clone()));
    let mut events = orchestrator.events();
    let start = Instant::now();
    orchestrator.start().await.unwrap();

    let resolved = next_matching(&mut events, is_resolved).await;
    assert_eq!(
        *resolved,
        OrchestratorEvent::ShowResolved {
            placement: PlacementId::app_open(),
            shown: true,
            first_launch: true,
            waited: Duration::from_millis(500),
        }
    );
    assert_eq!(Instant::now() - start, Duration::from_millis(500));
    assert_eq!(sdk.stats(&app_open_unit()).show_calls, 1);

    settle().await;
    let state = orchestrator.app_open().unwrap().state();
    assert!(state.has_shown_first_launch_ad);
    assert!(!state.pending_first_launch_show);
}

#[tokio::test(start_paused = true)]
async fn test_cold_start_wait_is_bounded() {
    let sdk = ScriptedSdk::new();
    sdk.set_default_load(&app_open_unit(), LoadScript::Hang);
    let orchestrator = AdOrchestrator::new(OrchestratorConfig::default(), Arc::new(sdk.clone()));
    let mut events = orchestrator.events();
    let start = Instant::now();
    orchestrator.start().await.unwrap();

    let resolved = next_matching(&mut events, is_resolved).await;
    assert!(matches!(
        resolved.as_ref(),
        OrchestratorEvent::ShowResolved { shown: false, first_launch: true, .. }
    ));
    assert_eq!(
        Instant::now() - start,
        AppOpenConfig::default().first_launch_wait
    );
    settle().await;
    assert!(!orchestrator.app_open().unwrap().state().pending_first_launch_show);
}

#[tokio::test(start_paused = true)]
async fn test_backgrounding_abandons_pending_first_launch_show() {
    let sdk = ScriptedSdk::new();
    sdk.script_loads(&app_open_unit(), [LoadScript::succeed(Duration::from_secs(5))]);
    let orchestrator = AdOrchestrator::new(OrchestratorConfig::default(), Arc::new(sdk.clone()));
    let mut events = orchestrator.events();
    let start = Instant::now();
    orchestrator.start().await.unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;
    orchestrator.on_app_state_change(AppState::Background);

    let resolved = next_matching(&mut events, is_resolved).await;
    assert!(matches!(
        resolved.as_ref(),
        OrchestratorEvent::ShowResolved { shown: false, .. }
    ));
    assert_eq!(Instant::now() - start, Duration::from_secs(2));

    // The creative still lands later, but nobody shows it.
    tokio::time::sleep(Duration::from_secs(10)).await;
    let app_open = orchestrator.app_open().unwrap();
    assert!(app_open.state().is_ready());
    assert_eq!(sdk.stats(&app_open_unit()).show_calls, 0);
}

// ── Foreground transitions ──────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_foreground_attempt_fires_after_settle_delay() {
    let sdk = ScriptedSdk::new();
    let orchestrator = started(&sdk, quiet_config()).await;
    let mut events = orchestrator.events();
    wait_ready(&orchestrator.app_open().unwrap()).await;

    orchestrator.on_app_state_change(AppState::Background);
    settle().await;
    orchestrator.on_app_state_change(AppState::Active);
    let foreground_at = Instant::now();

    next_matching(&mut events, |e| {
        matches!(
            e,
            OrchestratorEvent::AppStateChanged {
                from: AppState::Background,
                to: AppState::Active
            }
        )
    })
    .await;
    next_matching(&mut events, is_shown).await;
    assert_eq!(Instant::now() - foreground_at, SETTLE);
    assert_eq!(sdk.stats(&app_open_unit()).show_calls, 1);
}

#[tokio::test(start_paused = true)]
async fn test_rapid_transitions_collapse_into_one_attempt() {
    let sdk = ScriptedSdk::new();
    let orchestrator = started(&sdk, quiet_config()).await;
    let mut events = orchestrator.events();
    wait_ready(&orchestrator.app_open().unwrap()).await;

    orchestrator.on_app_state_change(AppState::Background);
    orchestrator.on_app_state_change(AppState::Active);
    for _ in 0..3 {
        tokio::time::sleep(Duration::from_millis(300)).await;
        orchestrator.on_app_state_change(AppState::Inactive);
        orchestrator.on_app_state_change(AppState::Active);
    }
    let last_foreground = Instant::now();

    next_matching(&mut events, is_shown).await;
    assert_eq!(Instant::now() - last_foreground, SETTLE);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(sdk.stats(&app_open_unit()).show_calls, 1);
}

#[tokio::test(start_paused = true)]
async fn test_leaving_foreground_cancels_scheduled_attempt() {
    let sdk = ScriptedSdk::new();
    let orchestrator = started(&sdk, quiet_config()).await;
    wait_ready(&orchestrator.app_open().unwrap()).await;

    orchestrator.on_app_state_change(AppState::Background);
    orchestrator.on_app_state_change(AppState::Active);
    tokio::time::sleep(Duration::from_millis(500)).await;
    orchestrator.on_app_state_change(AppState::Background);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(sdk.stats(&app_open_unit()).show_calls, 0);
}

#[tokio::test(start_paused = true)]
async fn test_foreground_attempt_respects_cooldown() {
    let sdk = ScriptedSdk::new();
    let orchestrator = started(&sdk, quiet_config()).await;
    let mut events = orchestrator.events();
    let app_open = orchestrator.app_open().unwrap();
    wait_ready(&app_open).await;

    orchestrator.on_app_state_change(AppState::Background);
    orchestrator.on_app_state_change(AppState::Active);
    next_matching(&mut events, |e| matches!(e, OrchestratorEvent::Closed { .. })).await;
    wait_ready(&app_open).await;

    // Ten minutes later the user leaves and comes back: still cooling down.
    tokio::time::sleep(Duration::from_secs(600)).await;
    orchestrator.on_app_state_change(AppState::Background);
    orchestrator.on_app_state_change(AppState::Active);
    let resolved = next_matching(&mut events, is_resolved).await;
    assert!(matches!(
        resolved.as_ref(),
        OrchestratorEvent::ShowResolved { shown: false, .. }
    ));
    assert_eq!(sdk.stats(&app_open_unit()).show_calls, 1);
}

// ── Standalone trigger ──────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_cold_start_is_issued_at_most_once() {
    let sdk = ScriptedSdk::new();
    let (events, _) = broadcast::channel(64);
    let cancel = CancellationToken::new();
    let app_open = AdUnitController::spawn(
        UnitSetup {
            placement: PlacementId::app_open(),
            format: AdFormat::AppOpen,
            unit_id: app_open_unit(),
            options: AdRequestOptions::default(),
            policy: AppOpenConfig::default().policy(),
        },
        Arc::new(sdk.clone()),
        events.clone(),
        &cancel,
    );
    let trigger = LifecycleTrigger::spawn(
        app_open.clone(),
        ShowCoordinator::new(Duration::from_millis(1500), events.clone()),
        TriggerTiming {
            settle_delay: SETTLE,
            first_launch_wait: Duration::from_secs(10),
        },
        events,
        &cancel,
    );

    assert!(trigger.on_cold_start());
    assert!(!trigger.on_cold_start());
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(sdk.stats(&app_open_unit()).show_calls, 1);

    trigger.teardown().await;
    app_open.teardown().await;
    assert_eq!(sdk.live_listeners(), 0);
}
