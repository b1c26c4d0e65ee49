#![allow(clippy::unwrap_used)]
// Integration tests for `ScriptedSdk` driven on a paused tokio clock.

use std::time::Duration;

use pretty_assertions::assert_eq;

use adcadence_sdk::scripted::{LoadScript, ScriptedSdk, ShowScript, UnitStats};
use adcadence_sdk::{
    AdEvent, AdFormat, AdRequestOptions, AdSdk, Error, PaidEvent, RequestConfiguration,
    RevenuePrecision,
};

const UNIT: &str = "ca-app-pub-test/interstitial";

// ── Helpers ─────────────────────────────────────────────────────────

fn create(sdk: &ScriptedSdk) -> Box<dyn adcadence_sdk::AdHandle> {
    sdk.create_for_ad_request(AdFormat::Interstitial, UNIT, &AdRequestOptions::default())
        .unwrap()
}

// ── Initialization ──────────────────────────────────────────────────

#[test]
fn test_initialize_records_configuration() {
    let sdk = ScriptedSdk::new();
    let config = RequestConfiguration::default();
    sdk.initialize(&config).unwrap();
    assert_eq!(sdk.initialized_with(), Some(config));
}

#[test]
fn test_initialize_failure_is_reported() {
    let sdk = ScriptedSdk::new();
    sdk.fail_initialization("consent missing");
    let result = sdk.initialize(&RequestConfiguration::default());
    assert!(
        matches!(result, Err(Error::Initialization { .. })),
        "expected Initialization error, got: {result:?}"
    );
    assert!(sdk.initialized_with().is_none());
}

// ── Load / show lifecycle ───────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_load_then_show_emits_lifecycle_in_order() {
    let sdk = ScriptedSdk::new();
    sdk.script_loads(UNIT, [LoadScript::succeed(Duration::from_millis(500))])
        .script_show(UNIT, ShowScript::open_for(Duration::from_secs(3)));

    let ad = create(&sdk);
    let mut events = ad.subscribe();
    ad.load().unwrap();

    assert_eq!(events.recv().await, Some(AdEvent::Loaded));
    ad.show().unwrap();
    assert_eq!(events.recv().await, Some(AdEvent::Opened));
    assert_eq!(events.recv().await, Some(AdEvent::Closed));

    let stats = sdk.stats(UNIT);
    assert_eq!(stats.load_calls, 1);
    assert_eq!(stats.show_calls, 1);
}

#[tokio::test(start_paused = true)]
async fn test_scripted_loads_run_in_order_then_default() {
    let sdk = ScriptedSdk::new();
    sdk.script_loads(UNIT, [LoadScript::fail(Duration::ZERO)]);

    let ad = create(&sdk);
    let mut events = ad.subscribe();

    ad.load().unwrap();
    assert!(matches!(events.recv().await, Some(AdEvent::Error(_))));

    ad.load().unwrap();
    assert_eq!(events.recv().await, Some(AdEvent::Loaded));
}

#[tokio::test(start_paused = true)]
async fn test_show_before_load_is_rejected() {
    let sdk = ScriptedSdk::new();
    let ad = create(&sdk);
    let result = ad.show();
    assert!(
        matches!(result, Err(Error::NotLoaded { .. })),
        "expected NotLoaded, got: {result:?}"
    );
    assert_eq!(sdk.stats(UNIT).show_calls, 1);
}

#[tokio::test(start_paused = true)]
async fn test_paid_event_follows_open() {
    let sdk = ScriptedSdk::new();
    let paid = PaidEvent {
        value_micros: 4_200,
        currency_code: "USD".into(),
        precision: RevenuePrecision::Precise,
    };
    sdk.script_show(UNIT, ShowScript::stay_open())
        .script_paid(UNIT, paid.clone());

    let ad = create(&sdk);
    let mut events = ad.subscribe();
    ad.load().unwrap();
    assert_eq!(events.recv().await, Some(AdEvent::Loaded));

    ad.show().unwrap();
    assert_eq!(events.recv().await, Some(AdEvent::Opened));
    assert_eq!(events.recv().await, Some(AdEvent::Paid(paid)));

    assert!(sdk.close_latest(UNIT));
    assert_eq!(events.recv().await, Some(AdEvent::Closed));
}

// ── Listener accounting ─────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_dropping_subscription_detaches_listener() {
    let sdk = ScriptedSdk::new();
    let ad = create(&sdk);

    let first = ad.subscribe();
    let second = ad.subscribe();
    assert_eq!(sdk.live_listeners(), 2);

    drop(first);
    assert_eq!(sdk.live_listeners(), 1);
    drop(second);
    assert_eq!(sdk.live_listeners(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_destroy_blocks_further_calls() {
    let sdk = ScriptedSdk::new();
    let ad = create(&sdk);
    ad.destroy();
    ad.destroy();

    assert!(matches!(ad.load(), Err(Error::Destroyed { .. })));
    assert!(matches!(ad.show(), Err(Error::Destroyed { .. })));
    assert_eq!(
        sdk.stats(UNIT),
        UnitStats {
            created: 1,
            load_calls: 0,
            show_calls: 0,
            destroyed: 1,
            live_listeners: 0,
        }
    );
}

#[test]
fn test_rejected_unit_cannot_be_created() {
    let sdk = ScriptedSdk::new();
    sdk.reject_unit(UNIT);
    let result =
        sdk.create_for_ad_request(AdFormat::Interstitial, UNIT, &AdRequestOptions::default());
    assert!(matches!(result, Err(Error::InvalidUnit { .. })));
}
