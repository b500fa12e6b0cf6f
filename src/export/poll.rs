//! Bounded polling of an asynchronous export job

use std::time::Duration;

/// Polling configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Sleep before each status check, measured from the end of the previous one
    pub interval: Duration,
    /// Maximum number of status checks
    pub max_attempts: u32,
    /// Maximum total time spent waiting for completion
    pub max_wait: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_attempts: 360,
            max_wait: Duration::from_secs(3600),
        }
    }
}

impl PollPolicy {
    /// The default policy: every 10s, at most 360 checks or one hour
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sleep before each check
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the check limit; at least one check is always made
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the total wait limit
    pub fn max_wait(mut self, wait: Duration) -> Self {
        self.max_wait = wait;
        self
    }
}
