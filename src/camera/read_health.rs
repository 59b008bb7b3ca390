//! Backoff bookkeeping for a device read loop.

use std::time::Duration;

const BASE_BACKOFF: Duration = Duration::from_millis(20);
const MAX_BACKOFF: Duration = Duration::from_millis(500);
const LOG_EVERY: u32 = 50;
/// Consecutive failed reads after which the last good frame is withdrawn.
pub(crate) const STALL_AFTER: u32 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FailureStep {
    pub backoff: Duration,
    pub log: bool,
    /// Set once, on the read that crosses `STALL_AFTER`.
    pub just_stalled: bool,
}

#[derive(Debug, Default)]
pub(crate) struct ReadHealth {
    consecutive_failures: u32,
}

impl ReadHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_failure(&mut self) -> FailureStep {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let n = self.consecutive_failures;
        let backoff = BASE_BACKOFF
            .saturating_mul(1 << (n - 1).min(5))
            .min(MAX_BACKOFF);

        FailureStep {
            backoff,
            log: n == 1 || n % LOG_EVERY == 0,
            just_stalled: n == STALL_AFTER,
        }
    }

    /// True when this read ends a stall.
    pub fn record_success(&mut self) -> bool {
        let recovered = self.is_stalled();
        self.consecutive_failures = 0;
        recovered
    }

    pub fn is_stalled(&self) -> bool {
        self.consecutive_failures >= STALL_AFTER
    }
}
