//! Poll engine - drives a probe on a schedule until the result is published
//!
//! The engine:
//! - runs attempts strictly one after another
//! - notifies on success and every Nth attempt while still failing
//! - waits between attempts in single time units so a stop request is seen quickly
//! - reports everything it does as [`EngineEvent`]s on an unbounded channel
//!
//! ## Lifecycle
//! `Idle -> Running -> (Stopping) -> Stopped`. [`PollEngine::run`] consumes
//! the engine, so a stopped engine can never be restarted. Cancellation is
//! cooperative: [`CancelHandle::cancel`] only flips a flag that the loop
//! checks at the top of every iteration, after each attempt and once per
//! waited time unit.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::notifier::{Notifier, failure_summary, now_stamp, success_message};
use crate::policy::PollPolicy;
use crate::probe::{AttemptOutcome, Probe};

/// A "remaining time" status is emitted every this many waited units
pub const WAIT_STATUS_EVERY: u64 = 30;

/// Lifecycle phase of a [`PollEngine`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EnginePhase {
    Idle = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl EnginePhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => EnginePhase::Idle,
            1 => EnginePhase::Running,
            2 => EnginePhase::Stopping,
            _ => EnginePhase::Stopped,
        }
    }
}

/// Why a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Published,
    MaxAttemptsReached,
    Cancelled,
}

/// Everything a front end needs to render a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Log(String),
    Status(String),
    /// Display-only, cycles through 0..=99 and reads 100 on success
    Progress(u8),
    Succeeded { attempt: u32, payload: String },
    AttemptFailed { attempt: u32, outcome: AttemptOutcome },
    /// Always the last event of a run
    Finished(StopReason),
}

/// Result of [`PollEngine::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub attempts: u32,
    pub reason: StopReason,
    pub payload: Option<String>,
}

/// Controller side of a running engine
#[derive(Debug, Clone)]
pub struct CancelHandle {
    phase: Arc<AtomicU8>,
}

impl CancelHandle {
    /// Ask a running engine to stop. Returns false, and does nothing, when
    /// the engine is not running.
    ///
    /// Only the engine writes to the event stream, so the stop log it emits
    /// for this request still comes before [`EngineEvent::Finished`].
    pub fn cancel(&self) -> bool {
        let requested = self
            .phase
            .compare_exchange(
                EnginePhase::Running as u8,
                EnginePhase::Stopping as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if requested {
            info!("Stop requested");
        }
        requested
    }

    pub fn phase(&self) -> EnginePhase { EnginePhase::from_u8(self.phase.load(Ordering::Acquire)) }
}

/// Counters owned by the loop for the duration of one run
#[derive(Debug, Default)]
struct EngineState {
    attempt_count: u32,
    /// Bumped at the start of every attempt and never reset; drives the
    /// reminder cadence
    fail_count: u32,
}

impl EngineState {
    /// Count a new attempt and return its number. Saturates so an unbounded
    /// run on a tiny tick can never overflow.
    fn begin_attempt(&mut self) -> u32 {
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.fail_count = self.fail_count.saturating_add(1);
        self.attempt_count
    }
}

pub struct PollEngine {
    probe: Arc<dyn Probe>,
    notifier: Option<Arc<dyn Notifier>>,
    policy: PollPolicy,
    stage: String,
    phase: Arc<AtomicU8>,
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl PollEngine {
    /// Create an idle engine and the receiving end of its event stream
    ///
    /// Notifications are sent only when the policy enables them and a
    /// notifier is present.
    pub fn new(
        probe: Arc<dyn Probe>,
        notifier: Option<Arc<dyn Notifier>>,
        policy: PollPolicy,
        stage: impl Into<String>,
    ) -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        if policy.notify_enabled() && notifier.is_none() {
            warn!("Notifications enabled without a notifier, nothing will be sent");
        }

        let (events, rx) = mpsc::unbounded_channel();
        let engine = Self {
            probe,
            notifier,
            policy,
            stage: stage.into(),
            phase: Arc::new(AtomicU8::new(EnginePhase::Idle as u8)),
            events,
        };
        (engine, rx)
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle { phase: self.phase.clone() }
    }

    pub fn phase(&self) -> EnginePhase { EnginePhase::from_u8(self.phase.load(Ordering::Acquire)) }

    /// Drive the poll loop until success, exhaustion or cancellation
    pub async fn run(self) -> RunSummary {
        self.phase.store(EnginePhase::Running as u8, Ordering::Release);
        info!(stage = %self.stage, max_attempts = %self.policy.describe_cap(), "Poll run started");

        self.log(format!("Run started, max attempts: {}", self.policy.describe_cap()));
        self.log(format!(
            "Notifications: {}",
            if self.notifier().is_some() { "enabled" } else { "disabled" }
        ));

        let mut state = EngineState::default();
        let mut payload = None;

        let reason = loop {
            if !self.is_running() {
                break StopReason::Cancelled;
            }
            if self.policy.exhausted(state.attempt_count) {
                break StopReason::MaxAttemptsReached;
            }

            let attempt = state.begin_attempt();
            let attempted_at = now_stamp();

            self.log(format!("Attempt #{attempt} [{attempted_at}]"));
            self.status(format!("Attempt #{attempt}"));
            self.emit(EngineEvent::Progress((attempt % 100) as u8));
            self.log("Sending query request...");

            match self.probe.attempt().await {
                AttemptOutcome::Success { payload: found } => {
                    self.on_success(attempt, &found).await;
                    payload = Some(found);
                    break StopReason::Published;
                }
                outcome => {
                    self.on_failure(&state, outcome, &attempted_at).await;
                }
            }

            if !self.is_running() {
                break StopReason::Cancelled;
            }
            if self.policy.exhausted(state.attempt_count) {
                break StopReason::MaxAttemptsReached;
            }

            self.wait().await;
        };

        match reason {
            StopReason::MaxAttemptsReached => {
                self.log("Maximum attempts reached, stopping");
                self.status("Max attempts reached");
            }
            StopReason::Cancelled => {
                self.log("Stop requested...");
                self.log("Query stopped");
                self.status("Stopped by request");
            }
            StopReason::Published => {}
        }

        self.phase.store(EnginePhase::Stopped as u8, Ordering::Release);
        info!(attempts = state.attempt_count, ?reason, "Poll run finished");
        self.emit(EngineEvent::Finished(reason));

        RunSummary { attempts: state.attempt_count, reason, payload }
    }

    async fn on_success(&self, attempt: u32, payload: &str) {
        self.log("Result published!");
        self.log(format!("Result: {payload}"));
        self.emit(EngineEvent::Succeeded { attempt, payload: payload.to_string() });

        match self.notifier() {
            Some(notifier) => {
                self.log("Sending result notification...");
                let (subject, body) = success_message(payload);
                self.deliver(notifier, &subject, &body).await;
            }
            None => self.log("Notifications disabled, skipping result notification"),
        }

        self.status("Result published");
        self.emit(EngineEvent::Progress(100));
    }

    async fn on_failure(&self, state: &EngineState, outcome: AttemptOutcome, attempted_at: &str) {
        let reason = outcome.detail().to_string();
        debug!(attempt = state.attempt_count, %reason, "Attempt failed");
        self.log(format!("Query result: {reason}"));
        self.emit(EngineEvent::AttemptFailed { attempt: state.attempt_count, outcome });

        if !self.policy.reminder_due(state.fail_count) {
            return;
        }

        let every = self.policy.fail_notify_every();
        match self.notifier() {
            Some(notifier) => {
                self.log(format!("Reached failure reminder interval ({every}), sending reminder"));
                let (subject, body) =
                    failure_summary(&self.stage, state.attempt_count, &reason, attempted_at);
                self.deliver(notifier, &subject, &body).await;
            }
            None => self.log(format!(
                "Reached failure reminder interval ({every}), notifications disabled, skipping"
            )),
        }
    }

    /// Notification failures are logged and never stop the run
    async fn deliver(&self, notifier: &dyn Notifier, subject: &str, body: &str) {
        match notifier.notify(subject, body).await {
            Ok(()) => self.log(format!("Notification sent: {subject}")),
            Err(e) => {
                warn!(error = %e, subject, "Notification failed");
                self.log(format!("Notification failed: {e}"));
            }
        }
    }

    /// Sleep `interval` units one unit at a time, bailing out on cancellation
    async fn wait(&self) {
        let interval = self.policy.interval();
        let tick = self.policy.tick();
        let total = tick.saturating_mul(u32::try_from(interval).unwrap_or(u32::MAX));

        self.log(format!("Retrying in {total:?}..."));
        self.status(format!("Waiting... ({total:?})"));

        for elapsed in 0..interval {
            if !self.is_running() {
                return;
            }
            if elapsed % WAIT_STATUS_EVERY == 0 {
                let remaining = tick.saturating_mul(u32::try_from(interval - elapsed).unwrap_or(u32::MAX));
                self.status(format!("Waiting... ({remaining:?} remaining)"));
            }
            tokio::time::sleep(tick).await;
        }
    }

    fn notifier(&self) -> Option<&dyn Notifier> {
        if self.policy.notify_enabled() { self.notifier.as_deref() } else { None }
    }

    fn is_running(&self) -> bool { self.phase() == EnginePhase::Running }

    fn log(&self, text: impl Into<String>) { self.emit(EngineEvent::Log(text.into())); }

    fn status(&self, text: impl Into<String>) { self.emit(EngineEvent::Status(text.into())); }

    fn emit(&self, event: EngineEvent) {
        debug!(?event, "Engine event");
        // A dropped receiver must not stop the run
        let _ = self.events.send(event);
    }
}
