//! `simulate`: play a scripted scenario against the orchestrator.
//!
//! The scripted SDK runs in-process and tokio's clock is paused, so a
//! scenario spanning half an hour of cooldown finishes instantly and
//! every timestamp in the report is exact.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tabled::Tabled;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use adcadence_core::{
    AdOrchestrator, AdUnitController, AdUnitSnapshot, AdUnitState, AppState, CoreError,
    DenyReason, OrchestratorConfig, OrchestratorEvent, PlacementId, ShowOptions,
};
use adcadence_sdk::scripted::{LoadScript, ScriptedSdk};

use crate::cli::{GlobalOpts, OutputFormat, Scenario, SimulateArgs};
use crate::config;
use crate::error::CliError;
use crate::output;

/// Longest any single step may wait, in virtual time.
const STALL_LIMIT: Duration = Duration::from_secs(3600);

const PRIMARY: &str = "job_details";
const FALLBACK: &str = "categories";

// ── Report ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct SimulationReport {
    scenario: Scenario,
    profile: String,
    outcomes: Vec<Outcome>,
    timeline: Vec<TimelineEntry>,
    units: Vec<AdUnitSnapshot>,
    warnings: Vec<String>,
}

#[derive(Serialize)]
struct Outcome {
    step: String,
    result: String,
    as_expected: bool,
}

#[derive(Serialize)]
struct TimelineEntry {
    at_ms: u64,
    event: Arc<OrchestratorEvent>,
}

#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Step")]
    step: String,
    #[tabled(rename = "Result")]
    result: String,
    #[tabled(rename = "Check")]
    check: String,
}

#[derive(Tabled)]
struct TimelineRow {
    #[tabled(rename = "At")]
    at: String,
    #[tabled(rename = "Event")]
    event: String,
    #[tabled(rename = "Placement")]
    placement: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

#[derive(Tabled)]
struct UnitRow {
    #[tabled(rename = "Placement")]
    placement: String,
    #[tabled(rename = "Format")]
    format: String,
    #[tabled(rename = "Phase")]
    phase: String,
    #[tabled(rename = "Retries")]
    retries: u32,
    #[tabled(rename = "First launch")]
    first_launch: String,
}

// ── Handler ──────────────────────────────────────────────────────────

pub async fn handle(args: SimulateArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let (profile, mut orchestrator_config) = config::resolve(global)?;

    tokio::time::pause();
    let sdk = ScriptedSdk::new();
    prepare(args.scenario, args.load_delay, &sdk, &mut orchestrator_config);
    tracing::info!(scenario = args.scenario.name(), %profile, "starting simulation");

    let orchestrator = AdOrchestrator::new(orchestrator_config, Arc::new(sdk.clone()));
    let start = Instant::now();
    let recorder = Recorder::spawn(orchestrator.events(), start);
    let mut sim = Sim {
        scenario: args.scenario,
        events: orchestrator.events(),
        sdk,
        orchestrator,
        start,
        outcomes: Vec::new(),
    };

    sim.orchestrator.start().await?;
    let played = sim.play().await;
    let units = sim.orchestrator.snapshot();
    sim.orchestrator.shutdown().await;
    let timeline = recorder.finish().await;
    played?;

    let report = SimulationReport {
        scenario: args.scenario,
        profile,
        warnings: sim.orchestrator.take_warnings().await,
        outcomes: sim.outcomes,
        timeline,
        units,
    };
    let rendered = render(&report, global, args.timeline)?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}

/// Script the SDK (and adjust the configuration) before anything starts.
fn prepare(scenario: Scenario, load_delay: Duration, sdk: &ScriptedSdk, config: &mut OrchestratorConfig) {
    config.show_on_cold_start = scenario == Scenario::ColdStart;
    let app_open = config.app_open.unit_id.clone();
    let primary = config.interstitial.unit_for(&PlacementId::from(PRIMARY)).to_owned();

    match scenario {
        Scenario::ColdStart => {
            sdk.script_loads(&app_open, [LoadScript::succeed(load_delay)]);
        }
        Scenario::Cooldown | Scenario::ForegroundDebounce => {
            sdk.set_default_load(&app_open, LoadScript::succeed(load_delay));
        }
        Scenario::RetryExhausted => {
            sdk.set_default_load(&primary, LoadScript::fail(load_delay));
        }
        Scenario::Race => {
            sdk.set_default_load(&primary, LoadScript::succeed(load_delay));
        }
        Scenario::Fallback => {
            config
                .interstitial
                .placement_units
                .entry(FALLBACK.into())
                .or_insert_with(|| format!("{primary}#{FALLBACK}"));
            let fallback = config.interstitial.unit_for(&PlacementId::from(FALLBACK)).to_owned();
            sdk.set_default_load(&primary, LoadScript::Hang);
            sdk.set_default_load(&fallback, LoadScript::succeed(load_delay));
        }
    }
}

// ── Scenarios ────────────────────────────────────────────────────────

struct Sim {
    scenario: Scenario,
    sdk: ScriptedSdk,
    orchestrator: AdOrchestrator,
    events: broadcast::Receiver<Arc<OrchestratorEvent>>,
    start: Instant,
    outcomes: Vec<Outcome>,
}

impl Sim {
    async fn play(&mut self) -> Result<(), CliError> {
        match self.scenario {
            Scenario::ColdStart => self.cold_start().await,
            Scenario::Cooldown => self.cooldown().await,
            Scenario::RetryExhausted => self.retry_exhausted().await,
            Scenario::Race => self.race().await,
            Scenario::ForegroundDebounce => self.foreground_debounce().await,
            Scenario::Fallback => self.fallback().await,
        }
    }

    async fn cold_start(&mut self) -> Result<(), CliError> {
        let (shown, reason) = self.resolution().await?;
        let waited = self.elapsed();
        self.record("first-launch app-open", shown_text(shown, reason), shown);
        let bound = self.orchestrator.config().app_open.first_launch_wait;
        self.record("waited for the load", fmt_duration(waited), waited <= bound);

        if shown {
            self.until("app-open closed", |e| matches!(e, OrchestratorEvent::Closed { .. }))
                .await?;
        }
        let state = self.app_open()?.state();
        self.record(
            "first-launch exception used",
            state.has_shown_first_launch_ad.to_string(),
            state.has_shown_first_launch_ad == shown,
        );
        Ok(())
    }

    async fn cooldown(&mut self) -> Result<(), CliError> {
        let app_open = self.app_open()?;
        self.ready(&app_open, "app-open loaded").await?;

        self.foreground_attempt(true).await?;
        self.until("app-open closed", |e| matches!(e, OrchestratorEvent::Closed { .. }))
            .await?;
        self.ready(&app_open, "app-open reloaded").await?;

        tokio::time::sleep(Duration::from_secs(29 * 60)).await;
        self.foreground_attempt(false).await?;

        tokio::time::sleep(Duration::from_secs(2 * 60)).await;
        self.foreground_attempt(true).await?;
        Ok(())
    }

    async fn retry_exhausted(&mut self) -> Result<(), CliError> {
        let mount = self.orchestrator.mount_interstitial(PRIMARY)?;
        let placement = mount.placement().clone();
        let unit_id = mount.controller().unit_id().to_owned();

        let exhausted = self
            .until("retries exhausted", |e| {
                matches!(e, OrchestratorEvent::RetriesExhausted { .. })
            })
            .await?;
        if let OrchestratorEvent::RetriesExhausted { attempts, .. } = exhausted.as_ref() {
            let max = self.orchestrator.config().interstitial.max_retries;
            self.record("retries before giving up", attempts.to_string(), *attempts == max);
        }
        self.record("gave up at", fmt_duration(self.elapsed()), true);

        let asked = Instant::now();
        let shown = self
            .orchestrator
            .request_show(&placement, ShowOptions::default())
            .await;
        self.record(
            "show request while exhausted",
            format!("{} after {}", shown_text(shown, None), fmt_duration(asked.elapsed())),
            !shown,
        );
        let load_calls = self.sdk.stats(&unit_id).load_calls;
        self.record("sdk load calls", load_calls.to_string(), load_calls > 0);

        mount.unmount().await;
        Ok(())
    }

    async fn race(&mut self) -> Result<(), CliError> {
        let mount = self.orchestrator.mount_interstitial(PRIMARY)?;
        let placement = mount.placement().clone();
        let unit_id = mount.controller().unit_id().to_owned();
        let options = ShowOptions::default();

        let results = tokio::join!(
            self.orchestrator.request_show(&placement, options),
            self.orchestrator.request_show(&placement, options),
            self.orchestrator.request_show(&placement, options),
        );
        let shows = [results.0, results.1, results.2]
            .into_iter()
            .filter(|shown| *shown)
            .count();
        self.record("concurrent show requests", "3".into(), true);
        self.record("requests that showed an ad", shows.to_string(), shows == 1);

        let show_calls = self.sdk.stats(&unit_id).show_calls;
        self.record("sdk show calls", show_calls.to_string(), show_calls == 1);

        self.until("interstitial closed", |e| matches!(e, OrchestratorEvent::Closed { .. }))
            .await?;
        mount.unmount().await;
        Ok(())
    }

    async fn foreground_debounce(&mut self) -> Result<(), CliError> {
        let app_open = self.app_open()?;
        self.ready(&app_open, "app-open loaded").await?;

        self.orchestrator.on_app_state_change(AppState::Background);
        self.orchestrator.on_app_state_change(AppState::Active);
        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(300)).await;
            self.orchestrator.on_app_state_change(AppState::Inactive);
            self.orchestrator.on_app_state_change(AppState::Active);
        }
        let last_foreground = Instant::now();
        self.record("state transitions", "8".into(), true);

        let (shown, reason) = self.resolution().await?;
        let settle = self.orchestrator.config().foreground_settle_delay;
        let delay = last_foreground.elapsed();
        self.record("foreground attempt", shown_text(shown, reason), shown);
        self.record("fired after last transition", fmt_duration(delay), delay == settle);

        tokio::time::sleep(Duration::from_secs(30)).await;
        let show_calls = self.sdk.stats(app_open.unit_id()).show_calls;
        self.record("sdk show calls", show_calls.to_string(), show_calls == 1);
        Ok(())
    }

    async fn fallback(&mut self) -> Result<(), CliError> {
        let primary = self.orchestrator.mount_interstitial(PRIMARY)?;
        let fallback = self.orchestrator.mount_interstitial(FALLBACK)?;
        let placements = [primary.placement().clone(), fallback.placement().clone()];

        let shown = self
            .orchestrator
            .request_show_any(&placements, ShowOptions::default())
            .await;
        self.record("show with fallback", shown_text(shown, None), shown);
        if shown {
            let event = self
                .until("an ad on screen", |e| matches!(e, OrchestratorEvent::Shown { .. }))
                .await?;
            let served_by = event
                .placement()
                .map_or_else(String::new, ToString::to_string);
            let expected = served_by == FALLBACK;
            self.record("served by", served_by, expected);
        }

        primary.unmount().await;
        fallback.unmount().await;
        Ok(())
    }

    // ── Steps ────────────────────────────────────────────────────────

    /// Leave and re-enter the foreground, then wait for the attempt.
    async fn foreground_attempt(&mut self, expect_shown: bool) -> Result<(), CliError> {
        let at = fmt_duration(Duration::from_secs(self.elapsed().as_secs()));
        self.orchestrator.on_app_state_change(AppState::Background);
        self.orchestrator.on_app_state_change(AppState::Active);
        let (shown, reason) = self.resolution().await?;
        self.record(
            &format!("foreground at {at}"),
            shown_text(shown, reason),
            shown == expect_shown,
        );
        Ok(())
    }

    /// Wait for the next `ShowResolved`, remembering why it was skipped.
    async fn resolution(&mut self) -> Result<(bool, Option<DenyReason>), CliError> {
        let mut skipped = None;
        loop {
            let event = self
                .until("show request to resolve", |e| {
                    matches!(
                        e,
                        OrchestratorEvent::ShowSkipped { .. } | OrchestratorEvent::ShowResolved { .. }
                    )
                })
                .await?;
            match event.as_ref() {
                OrchestratorEvent::ShowSkipped { reason, .. } => skipped = Some(*reason),
                OrchestratorEvent::ShowResolved { shown, .. } => return Ok((*shown, skipped)),
                _ => {}
            }
        }
    }

    async fn until<F>(&mut self, what: &str, mut matches: F) -> Result<Arc<OrchestratorEvent>, CliError>
    where
        F: FnMut(&OrchestratorEvent) -> bool,
    {
        let events = &mut self.events;
        let found = tokio::time::timeout(STALL_LIMIT, async {
            loop {
                match events.recv().await {
                    Ok(event) if matches(&event) => return Some(event),
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .await;
        found.ok().flatten().ok_or_else(|| self.stalled(what))
    }

    async fn ready(&self, controller: &AdUnitController, what: &str) -> Result<(), CliError> {
        let mut state = controller.subscribe_state();
        let ready = tokio::time::timeout(STALL_LIMIT, state.wait_for(AdUnitState::is_ready)).await;
        match ready {
            Ok(Ok(_)) => Ok(()),
            _ => Err(self.stalled(what)),
        }
    }

    fn app_open(&self) -> Result<AdUnitController, CliError> {
        self.orchestrator
            .app_open()
            .ok_or(CliError::Orchestrator(CoreError::NotStarted))
    }

    fn record(&mut self, step: &str, result: String, as_expected: bool) {
        tracing::debug!(step, %result, as_expected, "scenario step");
        self.outcomes.push(Outcome {
            step: step.to_owned(),
            result,
            as_expected,
        });
    }

    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn stalled(&self, what: &str) -> CliError {
        CliError::Stalled {
            scenario: self.scenario.name().into(),
            waiting_for: what.into(),
        }
    }
}

// ── Timeline recorder ────────────────────────────────────────────────

/// Collects every orchestrator event with its virtual timestamp.
struct Recorder {
    stop: oneshot::Sender<()>,
    task: JoinHandle<Vec<TimelineEntry>>,
}

impl Recorder {
    fn spawn(mut rx: broadcast::Receiver<Arc<OrchestratorEvent>>, start: Instant) -> Self {
        let (stop, mut stopped) = oneshot::channel();
        let task = tokio::spawn(async move {
            let mut entries = Vec::new();
            loop {
                tokio::select! {
                    biased;
                    event = rx.recv() => match event {
                        Ok(event) => entries.push(TimelineEntry {
                            at_ms: millis(start.elapsed()),
                            event,
                        }),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "timeline dropped events");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = &mut stopped => break,
                }
            }
            entries
        });
        Self { stop, task }
    }

    async fn finish(self) -> Vec<TimelineEntry> {
        let _ = self.stop.send(());
        self.task.await.unwrap_or_default()
    }
}

// ── Rendering ────────────────────────────────────────────────────────

fn render(report: &SimulationReport, global: &GlobalOpts, timeline: bool) -> Result<String, CliError> {
    if let Some(rendered) = output::render_structured(global.output, report)? {
        return Ok(rendered);
    }
    if matches!(global.output, OutputFormat::Plain) {
        let lines: Vec<String> = report
            .outcomes
            .iter()
            .map(|o| format!("{}: {}", o.step, o.result))
            .collect();
        return Ok(lines.join("\n"));
    }

    let color = output::should_color(global.color);
    let mut sections = Vec::new();

    sections.push(output::heading(
        &format!("Scenario {} (profile {})", report.scenario.name(), report.profile),
        color,
    ));
    let rows: Vec<OutcomeRow> = report
        .outcomes
        .iter()
        .map(|o| OutcomeRow {
            step: o.step.clone(),
            result: o.result.clone(),
            check: output::verdict(if o.as_expected { "ok" } else { "unexpected" }, o.as_expected, color),
        })
        .collect();
    sections.push(output::render_table(&rows));

    if timeline {
        sections.push(output::heading("Timeline", color));
        let rows: Vec<TimelineRow> = report
            .timeline
            .iter()
            .map(|entry| TimelineRow {
                at: fmt_duration(Duration::from_millis(entry.at_ms)),
                event: entry.event.kind().into(),
                placement: entry
                    .event
                    .placement()
                    .map_or_else(String::new, ToString::to_string),
                detail: describe(&entry.event),
            })
            .collect();
        sections.push(output::render_table(&rows));
    }

    if !report.units.is_empty() {
        sections.push(output::heading("Units at the end", color));
        let rows: Vec<UnitRow> = report
            .units
            .iter()
            .map(|u| UnitRow {
                placement: u.placement.to_string(),
                format: u.format.to_string(),
                phase: u.phase.to_string(),
                retries: u.retry_count,
                first_launch: if u.has_shown_first_launch_ad { "used" } else { "-" }.into(),
            })
            .collect();
        sections.push(output::render_table(&rows));
    }

    for warning in &report.warnings {
        sections.push(output::verdict(&format!("warning: {warning}"), false, color));
    }
    Ok(sections.join("\n"))
}

fn describe(event: &OrchestratorEvent) -> String {
    match event {
        OrchestratorEvent::Loaded { format, .. } => format.to_string(),
        OrchestratorEvent::LoadFailed {
            code,
            message,
            attempt,
            retry_in,
            ..
        } => match retry_in {
            Some(delay) => format!(
                "attempt {attempt}: [{code}] {message}, retry in {}",
                fmt_duration(*delay)
            ),
            None => format!("attempt {attempt}: [{code}] {message}"),
        },
        OrchestratorEvent::RetriesExhausted { attempts, .. } => format!("after {attempts} attempts"),
        OrchestratorEvent::Shown { .. } | OrchestratorEvent::Closed { .. } => String::new(),
        OrchestratorEvent::ShowFailed { message, .. } => message.clone(),
        OrchestratorEvent::Paid {
            value_micros,
            currency_code,
            ..
        } => format!("{value_micros} micros {currency_code}"),
        OrchestratorEvent::ShowSkipped { reason, .. } => reason.to_string(),
        OrchestratorEvent::ShowResolved {
            shown,
            first_launch,
            waited,
            ..
        } => format!(
            "{} after {}{}",
            shown_text(*shown, None),
            fmt_duration(*waited),
            if *first_launch { " (first launch)" } else { "" }
        ),
        OrchestratorEvent::AppStateChanged { from, to } => format!("{from} -> {to}"),
    }
}

fn shown_text(shown: bool, skipped: Option<DenyReason>) -> String {
    match (shown, skipped) {
        (true, _) => "shown".into(),
        (false, Some(reason)) => format!("skipped ({reason})"),
        (false, None) => "not shown".into(),
    }
}

fn fmt_duration(d: Duration) -> String {
    if d.is_zero() {
        return "0s".into();
    }
    humantime::format_duration(d).to_string()
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
