use std::time::Duration;

use crate::error::PolicyError;

/// Timing, counting and throttling rules for a poll run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    interval: u64,
    max_attempts: u32,
    fail_notify_every: u32,
    notify_enabled: bool,
    tick: Duration,
}

impl PollPolicy {
    /// Length of one time unit unless overridden with [`PollPolicy::with_tick`]
    pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

    /// Validate and build a policy.
    ///
    /// `interval` is counted in time units, `max_attempts == 0` means
    /// unbounded and `fail_notify_every` is the failure reminder divisor.
    pub fn new(
        interval: u64,
        max_attempts: u32,
        fail_notify_every: u32,
        notify_enabled: bool,
    ) -> Result<Self, PolicyError> {
        if interval == 0 {
            return Err(PolicyError::ZeroInterval);
        }
        if fail_notify_every == 0 {
            return Err(PolicyError::ZeroFailNotifyEvery);
        }

        Ok(Self { interval, max_attempts, fail_notify_every, notify_enabled, tick: Self::DEFAULT_TICK })
    }

    /// Change the length of one time unit
    pub fn with_tick(mut self, tick: Duration) -> Result<Self, PolicyError> {
        if tick.is_zero() {
            return Err(PolicyError::ZeroTick);
        }
        self.tick = tick;
        Ok(self)
    }

    pub fn interval(&self) -> u64 { self.interval }

    pub fn max_attempts(&self) -> u32 { self.max_attempts }

    pub fn fail_notify_every(&self) -> u32 { self.fail_notify_every }

    pub fn notify_enabled(&self) -> bool { self.notify_enabled }

    pub fn tick(&self) -> Duration { self.tick }

    /// True once `attempts` has reached a non-zero cap
    pub fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts > 0 && attempts >= self.max_attempts
    }

    /// True when attempt number `count` is due a failure reminder
    pub fn reminder_due(&self, count: u32) -> bool { count % self.fail_notify_every == 0 }

    /// Human readable attempt cap
    pub fn describe_cap(&self) -> String {
        match self.max_attempts {
            0 => "unbounded".to_string(),
            n => n.to_string(),
        }
    }
}
