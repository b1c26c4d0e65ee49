//! Deterministic in-process SDK.
//!
//! [`ScriptedSdk`] implements [`AdSdk`] without any network. Each ad unit
//! gets a script describing how its loads and shows resolve, and the SDK
//! records per-unit counters (objects created, load/show calls, destroyed
//! objects, live listeners) so callers can assert on how it was driven.
//!
//! Delayed outcomes are delivered from spawned tokio tasks using
//! `tokio::time::sleep`, so they follow a paused test clock exactly.
//!
//! ```rust,ignore
//! let sdk = ScriptedSdk::new();
//! sdk.script_loads("unit", [LoadScript::fail(Duration::from_millis(50)), LoadScript::succeed(Duration::ZERO)]);
//! sdk.script_show("unit", ShowScript::open_for(Duration::from_secs(5)));
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::trace;

use crate::{
    AdError, AdEvent, AdEventSubscription, AdFormat, AdHandle, AdRequestOptions, AdSdk, Error,
    PaidEvent, RequestConfiguration,
};

// ── Scripts ──────────────────────────────────────────────────────────

/// How a single `load()` call resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadScript {
    /// Emit `Loaded` after the delay.
    Succeed { after: Duration },
    /// Emit `Error` after the delay.
    Fail {
        after: Duration,
        code: i32,
        message: String,
    },
    /// Never emit anything.
    Hang,
    /// Return an error synchronously from `load()`.
    Reject,
}

impl LoadScript {
    pub fn succeed(after: Duration) -> Self {
        Self::Succeed { after }
    }

    pub fn fail(after: Duration) -> Self {
        Self::Fail {
            after,
            code: 3,
            message: "No fill".into(),
        }
    }
}

/// How a `show()` call resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShowScript {
    /// Emit `Opened` immediately, then `Closed` after `close_after`
    /// (or never, leaving the ad on screen until [`ScriptedSdk::close_latest`]).
    Open { close_after: Option<Duration> },
    /// Accept the call, then emit `Error` instead of `Opened`.
    FailToPresent,
    /// Return an error synchronously from `show()`.
    Reject,
}

impl ShowScript {
    pub fn open_for(duration: Duration) -> Self {
        Self::Open {
            close_after: Some(duration),
        }
    }

    pub fn stay_open() -> Self {
        Self::Open { close_after: None }
    }
}

/// Counters recorded per ad unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitStats {
    pub created: usize,
    pub load_calls: usize,
    pub show_calls: usize,
    pub destroyed: usize,
    pub live_listeners: usize,
}

// ── ScriptedSdk ──────────────────────────────────────────────────────

/// Scriptable [`AdSdk`] implementation. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct ScriptedSdk {
    state: Arc<Mutex<ScriptState>>,
}

#[derive(Default)]
struct ScriptState {
    initialized: Option<RequestConfiguration>,
    initialize_failure: Option<String>,
    units: HashMap<String, UnitScript>,
    ads: HashMap<u64, AdRecord>,
    next_ad_id: u64,
    next_listener_id: u64,
}

struct UnitScript {
    loads: VecDeque<LoadScript>,
    default_load: LoadScript,
    show: ShowScript,
    paid: Option<PaidEvent>,
    reject_create: bool,
    latest_ad: Option<u64>,
    stats: UnitStats,
}

impl Default for UnitScript {
    fn default() -> Self {
        Self {
            loads: VecDeque::new(),
            default_load: LoadScript::succeed(Duration::ZERO),
            show: ShowScript::open_for(Duration::from_secs(5)),
            paid: None,
            reject_create: false,
            latest_ad: None,
            stats: UnitStats::default(),
        }
    }
}

struct AdRecord {
    unit_id: String,
    listeners: Vec<(u64, mpsc::UnboundedSender<AdEvent>)>,
    loaded: bool,
    destroyed: bool,
}

impl ScriptedSdk {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Scripting ────────────────────────────────────────────────────

    /// Queue outcomes for the next `load()` calls on `unit_id`, in order.
    pub fn script_loads<I>(&self, unit_id: &str, loads: I) -> &Self
    where
        I: IntoIterator<Item = LoadScript>,
    {
        let mut state = self.lock();
        state
            .units
            .entry(unit_id.to_owned())
            .or_default()
            .loads
            .extend(loads);
        drop(state);
        self
    }

    /// Outcome used once the queued load scripts run out.
    pub fn set_default_load(&self, unit_id: &str, load: LoadScript) -> &Self {
        self.lock()
            .units
            .entry(unit_id.to_owned())
            .or_default()
            .default_load = load;
        self
    }

    pub fn script_show(&self, unit_id: &str, show: ShowScript) -> &Self {
        self.lock().units.entry(unit_id.to_owned()).or_default().show = show;
        self
    }

    /// Emit this revenue event right after every `Opened`.
    pub fn script_paid(&self, unit_id: &str, paid: PaidEvent) -> &Self {
        self.lock().units.entry(unit_id.to_owned()).or_default().paid = Some(paid);
        self
    }

    /// Make `create_for_ad_request` fail for this unit.
    pub fn reject_unit(&self, unit_id: &str) -> &Self {
        self.lock()
            .units
            .entry(unit_id.to_owned())
            .or_default()
            .reject_create = true;
        self
    }

    pub fn fail_initialization(&self, message: &str) -> &Self {
        self.lock().initialize_failure = Some(message.to_owned());
        self
    }

    // ── Observation ──────────────────────────────────────────────────

    pub fn stats(&self, unit_id: &str) -> UnitStats {
        self.lock()
            .units
            .get(unit_id)
            .map(|u| u.stats.clone())
            .unwrap_or_default()
    }

    /// Listeners still registered across every unit.
    pub fn live_listeners(&self) -> usize {
        self.lock()
            .units
            .values()
            .map(|u| u.stats.live_listeners)
            .sum()
    }

    pub fn initialized_with(&self) -> Option<RequestConfiguration> {
        self.lock().initialized.clone()
    }

    // ── Manual event injection ───────────────────────────────────────

    /// Deliver `event` to the most recently created ad of `unit_id`.
    /// Returns `false` if there is no live ad to deliver to.
    pub fn emit_to_latest(&self, unit_id: &str, event: AdEvent) -> bool {
        let ad_id = self.lock().units.get(unit_id).and_then(|u| u.latest_ad);
        match ad_id {
            Some(id) => self.emit(id, event),
            None => false,
        }
    }

    /// Dismiss the ad currently on screen for `unit_id`.
    pub fn close_latest(&self, unit_id: &str) -> bool {
        self.emit_to_latest(unit_id, AdEvent::Closed)
    }

    fn emit(&self, ad_id: u64, event: AdEvent) -> bool {
        let mut state = self.lock();
        let Some(ad) = state.ads.get_mut(&ad_id) else {
            return false;
        };
        if ad.destroyed {
            return false;
        }
        match event {
            AdEvent::Loaded => ad.loaded = true,
            AdEvent::Error(_) | AdEvent::Opened => ad.loaded = false,
            _ => {}
        }
        trace!(unit_id = %ad.unit_id, ad_id, event = event.kind(), "scripted event");
        // Closed receivers stay registered until their subscription runs
        // its unsubscribe hook; that is what the listener counters track.
        for (_, tx) in &ad.listeners {
            let _ = tx.send(event.clone());
        }
        true
    }

    /// Deliver after `delay`, on the runtime if one is available.
    fn emit_later(&self, ad_id: u64, delay: Duration, events: Vec<(Duration, AdEvent)>) {
        let sdk = self.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    for (gap, event) in events {
                        if !gap.is_zero() {
                            tokio::time::sleep(gap).await;
                        }
                        sdk.emit(ad_id, event);
                    }
                });
            }
            Err(_) => {
                for (_, event) in events {
                    sdk.emit(ad_id, event);
                }
            }
        }
    }

    fn unsubscribe(&self, ad_id: u64, listener_id: u64) {
        let mut state = self.lock();
        let Some(ad) = state.ads.get_mut(&ad_id) else {
            return;
        };
        let before = ad.listeners.len();
        ad.listeners.retain(|(id, _)| *id != listener_id);
        let removed = before.saturating_sub(ad.listeners.len());
        let unit_id = ad.unit_id.clone();
        if let Some(unit) = state.units.get_mut(&unit_id) {
            unit.stats.live_listeners = unit.stats.live_listeners.saturating_sub(removed);
        }
    }
}

impl AdSdk for ScriptedSdk {
    fn initialize(&self, config: &RequestConfiguration) -> Result<(), Error> {
        let mut state = self.lock();
        if let Some(message) = state.initialize_failure.clone() {
            return Err(Error::Initialization { message });
        }
        state.initialized = Some(config.clone());
        Ok(())
    }

    fn create_for_ad_request(
        &self,
        format: AdFormat,
        unit_id: &str,
        _options: &AdRequestOptions,
    ) -> Result<Box<dyn AdHandle>, Error> {
        let mut state = self.lock();
        let ad_id = state.next_ad_id;
        let unit = state.units.entry(unit_id.to_owned()).or_default();
        if unit.reject_create {
            return Err(Error::InvalidUnit {
                unit_id: unit_id.to_owned(),
                message: "unit rejected by script".into(),
            });
        }
        unit.stats.created += 1;
        unit.latest_ad = Some(ad_id);
        state.next_ad_id += 1;
        state.ads.insert(
            ad_id,
            AdRecord {
                unit_id: unit_id.to_owned(),
                listeners: Vec::new(),
                loaded: false,
                destroyed: false,
            },
        );

        Ok(Box::new(ScriptedAd {
            sdk: self.clone(),
            ad_id,
            unit_id: unit_id.to_owned(),
            format,
        }))
    }
}

// ── ScriptedAd ───────────────────────────────────────────────────────

struct ScriptedAd {
    sdk: ScriptedSdk,
    ad_id: u64,
    unit_id: String,
    format: AdFormat,
}

impl ScriptedAd {
    fn destroyed_error(&self) -> Error {
        Error::Destroyed {
            unit_id: self.unit_id.clone(),
        }
    }
}

impl AdHandle for ScriptedAd {
    fn unit_id(&self) -> &str {
        &self.unit_id
    }

    fn format(&self) -> AdFormat {
        self.format
    }

    fn subscribe(&self) -> AdEventSubscription {
        let mut state = self.sdk.lock();
        let listener_id = state.next_listener_id;
        state.next_listener_id += 1;

        let sdk = self.sdk.clone();
        let ad_id = self.ad_id;
        let (tx, subscription) =
            AdEventSubscription::channel(move || sdk.unsubscribe(ad_id, listener_id));

        if let Some(ad) = state.ads.get_mut(&self.ad_id) {
            ad.listeners.push((listener_id, tx));
        }
        if let Some(unit) = state.units.get_mut(&self.unit_id) {
            unit.stats.live_listeners += 1;
        }
        subscription
    }

    fn load(&self) -> Result<(), Error> {
        let mut state = self.sdk.lock();
        if state.ads.get(&self.ad_id).is_none_or(|ad| ad.destroyed) {
            return Err(self.destroyed_error());
        }
        let unit = state.units.entry(self.unit_id.clone()).or_default();
        unit.stats.load_calls += 1;
        let script = unit
            .loads
            .pop_front()
            .unwrap_or_else(|| unit.default_load.clone());
        drop(state);

        match script {
            LoadScript::Succeed { after } => {
                self.sdk
                    .emit_later(self.ad_id, after, vec![(Duration::ZERO, AdEvent::Loaded)]);
            }
            LoadScript::Fail {
                after,
                code,
                message,
            } => {
                let event = AdEvent::Error(AdError::new(code, message));
                self.sdk
                    .emit_later(self.ad_id, after, vec![(Duration::ZERO, event)]);
            }
            LoadScript::Hang => {}
            LoadScript::Reject => {
                return Err(Error::LoadRejected {
                    unit_id: self.unit_id.clone(),
                    message: "load rejected by script".into(),
                });
            }
        }
        Ok(())
    }

    fn show(&self) -> Result<(), Error> {
        let mut state = self.sdk.lock();
        let loaded = match state.ads.get(&self.ad_id) {
            Some(ad) if !ad.destroyed => ad.loaded,
            _ => return Err(self.destroyed_error()),
        };
        let unit = state.units.entry(self.unit_id.clone()).or_default();
        unit.stats.show_calls += 1;
        let script = unit.show.clone();
        let paid = unit.paid.clone();
        drop(state);

        if !loaded {
            return Err(Error::NotLoaded {
                unit_id: self.unit_id.clone(),
            });
        }

        match script {
            ShowScript::Open { close_after } => {
                let mut events = vec![(Duration::ZERO, AdEvent::Opened)];
                if let Some(paid) = paid {
                    events.push((Duration::ZERO, AdEvent::Paid(paid)));
                }
                if let Some(after) = close_after {
                    events.push((after, AdEvent::Closed));
                }
                self.sdk.emit_later(self.ad_id, Duration::ZERO, events);
            }
            ShowScript::FailToPresent => {
                let event = AdEvent::Error(AdError::new(4, "Ad failed to present"));
                self.sdk
                    .emit_later(self.ad_id, Duration::ZERO, vec![(Duration::ZERO, event)]);
            }
            ShowScript::Reject => {
                return Err(Error::ShowRejected {
                    unit_id: self.unit_id.clone(),
                    message: "show rejected by script".into(),
                });
            }
        }
        Ok(())
    }

    fn destroy(&self) {
        let mut state = self.sdk.lock();
        let newly_destroyed = match state.ads.get_mut(&self.ad_id) {
            Some(ad) if !ad.destroyed => {
                ad.destroyed = true;
                ad.loaded = false;
                true
            }
            _ => false,
        };
        if newly_destroyed {
            if let Some(unit) = state.units.get_mut(&self.unit_id) {
                unit.stats.destroyed += 1;
            }
        }
    }
}
