//! Poll engine integration tests
//!
//! All tests run on a paused tokio clock, so waits complete instantly while
//! keeping their ordering.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use pollwatch::{
    AttemptOutcome, CancelHandle, EngineEvent, EnginePhase, Notifier, NotifyError, PollEngine,
    PollPolicy, Probe, StopReason,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;

/// Plays back a script of outcomes, repeating the last one
struct ScriptedProbe {
    script: Vec<AttemptOutcome>,
    calls: AtomicU32,
    cancel_on_call: Option<(u32, OnceLock<CancelHandle>)>,
}

impl ScriptedProbe {
    fn new(script: Vec<AttemptOutcome>) -> Self {
        Self { script, calls: AtomicU32::new(0), cancel_on_call: None }
    }

    fn failing() -> Self { Self::new(vec![failure()]) }

    fn calls(&self) -> u32 { self.calls.load(Ordering::SeqCst) }
}

#[async_trait::async_trait]
impl Probe for ScriptedProbe {
    async fn attempt(&self) -> AttemptOutcome {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some((on_call, handle)) = &self.cancel_on_call {
            if *on_call == call {
                if let Some(handle) = handle.get() {
                    handle.cancel();
                }
            }
        }

        let index = (call as usize - 1).min(self.script.len() - 1);
        self.script[index].clone()
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingNotifier {
    fn subjects(&self) -> Vec<String> { self.sent.lock().unwrap().clone() }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, subject: &str, _body: &str) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(subject.to_string());
        if self.fail {
            return Err(NotifyError::Transport("connection reset".into()));
        }
        Ok(())
    }
}

fn failure() -> AttemptOutcome { AttemptOutcome::Failure { reason: "result not published: not yet".into() } }

fn drain(rx: &mut UnboundedReceiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn logs(events: &[EngineEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::Log(text) => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_success_on_third_attempt() {
    let _ = tracing_subscriber::fmt::try_init();

    let probe = Arc::new(ScriptedProbe::new(vec![
        failure(),
        AttemptOutcome::TransportError { reason: "request failed: timeout".into() },
        AttemptOutcome::Success { payload: "publish date 2025-07-01".into() },
    ]));
    let notifier = Arc::new(RecordingNotifier::default());
    let policy = PollPolicy::new(5, 0, 10, true).unwrap();

    let (engine, mut rx) = PollEngine::new(probe.clone(), Some(notifier.clone()), policy, "2025 H1");
    let handle = engine.cancel_handle();
    let summary = engine.run().await;

    assert_eq!(summary.reason, StopReason::Published);
    assert_eq!(summary.attempts, 3);
    assert_eq!(summary.payload.as_deref(), Some("publish date 2025-07-01"));
    assert_eq!(probe.calls(), 3);
    assert_eq!(notifier.subjects(), vec!["Result published".to_string()]);
    assert_eq!(handle.phase(), EnginePhase::Stopped);

    let events = drain(&mut rx);
    let tail = &events[events.len() - 3..];
    assert_eq!(
        tail,
        &[
            EngineEvent::Status("Result published".into()),
            EngineEvent::Progress(100),
            EngineEvent::Finished(StopReason::Published),
        ]
    );
    assert!(events.contains(&EngineEvent::Succeeded {
        attempt: 3,
        payload: "publish date 2025-07-01".into()
    }));
}

#[tokio::test(start_paused = true)]
async fn test_failure_reminders_follow_cadence() {
    let probe = Arc::new(ScriptedProbe::failing());
    let notifier = Arc::new(RecordingNotifier::default());
    let policy = PollPolicy::new(1, 10, 3, true).unwrap();

    let (engine, _rx) = PollEngine::new(probe.clone(), Some(notifier.clone()), policy, "2025 H1");
    let summary = engine.run().await;

    assert_eq!(summary.attempts, 10);
    assert_eq!(
        notifier.subjects(),
        vec![
            "Result query failure reminder - 3 attempts so far".to_string(),
            "Result query failure reminder - 6 attempts so far".to_string(),
            "Result query failure reminder - 9 attempts so far".to_string(),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_max_attempts_is_never_exceeded() {
    let probe = Arc::new(ScriptedProbe::failing());
    let policy = PollPolicy::new(2, 4, 1, false).unwrap();

    let (engine, mut rx) = PollEngine::new(probe.clone(), None, policy, "2025 H1");
    let summary = engine.run().await;

    assert_eq!(summary.reason, StopReason::MaxAttemptsReached);
    assert_eq!(summary.attempts, 4);
    assert_eq!(probe.calls(), 4);

    let events = drain(&mut rx);
    assert!(events.contains(&EngineEvent::Status("Max attempts reached".into())));
    assert_eq!(events.last(), Some(&EngineEvent::Finished(StopReason::MaxAttemptsReached)));

    let progress: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::Progress(value) => Some(*value),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![1, 2, 3, 4]);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_wait_stops_within_one_unit() {
    let _ = tracing_subscriber::fmt::try_init();

    let probe = Arc::new(ScriptedProbe::failing());
    let policy = PollPolicy::new(100, 0, 1, false).unwrap();

    let (engine, mut rx) = PollEngine::new(probe.clone(), None, policy, "2025 H1");
    let handle = engine.cancel_handle();
    let task = tokio::spawn(engine.run());

    loop {
        match rx.recv().await {
            Some(EngineEvent::Status(text)) if text.starts_with("Waiting") => break,
            Some(_) => continue,
            None => panic!("engine stopped before waiting"),
        }
    }

    let cancelled_at = Instant::now();
    assert!(handle.cancel());
    let summary = task.await.unwrap();

    assert!(cancelled_at.elapsed() <= Duration::from_secs(1));
    assert_eq!(summary.reason, StopReason::Cancelled);
    assert_eq!(probe.calls(), 1);

    let events = drain(&mut rx);
    assert!(events.contains(&EngineEvent::Status("Stopped by request".into())));
    assert_eq!(events.last(), Some(&EngineEvent::Finished(StopReason::Cancelled)));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_attempt_skips_wait() {
    let mut probe = ScriptedProbe::failing();
    probe.cancel_on_call = Some((2, OnceLock::new()));
    let probe = Arc::new(probe);
    let policy = PollPolicy::new(60, 0, 1, false).unwrap();

    let (engine, mut rx) = PollEngine::new(probe.clone(), None, policy, "2025 H1");
    if let Some((_, slot)) = &probe.cancel_on_call {
        let _ = slot.set(engine.cancel_handle());
    }

    let started = Instant::now();
    let summary = engine.run().await;

    assert_eq!(summary.reason, StopReason::Cancelled);
    assert_eq!(probe.calls(), 2);
    // One full wait after the first attempt, none after the second
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(60) && elapsed < Duration::from_secs(61), "{elapsed:?}");

    let events = drain(&mut rx);
    assert!(logs(&events).contains(&"Stop requested..."));
}

#[tokio::test(start_paused = true)]
async fn test_notifier_errors_do_not_stop_the_run() {
    let probe = Arc::new(ScriptedProbe::failing());
    let notifier = Arc::new(RecordingNotifier { fail: true, ..Default::default() });
    let policy = PollPolicy::new(1, 3, 1, true).unwrap();

    let (engine, mut rx) = PollEngine::new(probe.clone(), Some(notifier.clone()), policy, "2025 H1");
    let summary = engine.run().await;

    assert_eq!(summary.reason, StopReason::MaxAttemptsReached);
    assert_eq!(probe.calls(), 3);
    assert_eq!(notifier.subjects().len(), 3);

    let events = drain(&mut rx);
    let failed = logs(&events)
        .into_iter()
        .filter(|line| line.starts_with("Notification failed"))
        .count();
    assert_eq!(failed, 3);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_notifications_are_skipped() {
    let probe = Arc::new(ScriptedProbe::new(vec![
        failure(),
        AttemptOutcome::Success { payload: "done".into() },
    ]));
    let notifier = Arc::new(RecordingNotifier::default());
    let policy = PollPolicy::new(1, 0, 1, false).unwrap();

    let (engine, mut rx) = PollEngine::new(probe, Some(notifier.clone()), policy, "2025 H1");
    engine.run().await;

    assert!(notifier.subjects().is_empty());
    let events = drain(&mut rx);
    let lines = logs(&events);
    assert!(lines.contains(&"Notifications: disabled"));
    assert!(lines.iter().any(|line| line.contains("notifications disabled, skipping")));
    assert!(lines.contains(&"Notifications disabled, skipping result notification"));
}

#[tokio::test(start_paused = true)]
async fn test_run_survives_dropped_receiver() {
    let probe = Arc::new(ScriptedProbe::failing());
    let policy = PollPolicy::new(1, 2, 1, false).unwrap();

    let (engine, rx) = PollEngine::new(probe.clone(), None, policy, "2025 H1");
    drop(rx);
    let summary = engine.run().await;

    assert_eq!(summary.attempts, 2);
    assert_eq!(probe.calls(), 2);
}
