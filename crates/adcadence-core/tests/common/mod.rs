#![allow(clippy::unwrap_used, dead_code)]
// Shared helpers for adcadence-core integration tests.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use adcadence_core::{
    AdOrchestrator, AdUnitController, AdUnitState, AppOpenConfig, InterstitialConfig,
    OrchestratorConfig, OrchestratorEvent,
};
use adcadence_sdk::scripted::ScriptedSdk;

pub fn app_open_unit() -> String {
    AppOpenConfig::default().unit_id
}

pub fn interstitial_unit() -> String {
    InterstitialConfig::default().unit_id
}

/// Default configuration without the automatic cold-start request.
pub fn quiet_config() -> OrchestratorConfig {
    OrchestratorConfig {
        show_on_cold_start: false,
        ..OrchestratorConfig::default()
    }
}

pub async fn started(sdk: &ScriptedSdk, config: OrchestratorConfig) -> AdOrchestrator {
    let orchestrator = AdOrchestrator::new(config, Arc::new(sdk.clone()));
    orchestrator.start().await.unwrap();
    orchestrator
}

/// Let spawned tasks (actors, scripted SDK deliveries) run without
/// advancing the paused clock.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

pub async fn wait_ready(controller: &AdUnitController) {
    let mut state = controller.subscribe_state();
    tokio::time::timeout(Duration::from_secs(60), state.wait_for(AdUnitState::is_ready))
        .await
        .expect("unit never became ready")
        .unwrap();
}

/// Receive events until one matches, failing after a generous timeout.
pub async fn next_matching<F>(
    rx: &mut broadcast::Receiver<Arc<OrchestratorEvent>>,
    mut matches: F,
) -> Arc<OrchestratorEvent>
where
    F: FnMut(&OrchestratorEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(3600), async {
        loop {
            let event = rx.recv().await.unwrap();
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("expected event never arrived")
}

/// Drain whatever is queued right now.
pub fn drain(rx: &mut broadcast::Receiver<Arc<OrchestratorEvent>>) -> Vec<Arc<OrchestratorEvent>> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
