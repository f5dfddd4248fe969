use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

/// Wall-clock budget for one invocation. The ceiling is set below the host's
/// hard execution limit so work can stop cleanly and hand back a cursor.
#[derive(Debug, Clone)]
pub struct TimeBudget {
    started: Instant,
    ceiling: Duration,
}

impl TimeBudget {
    pub fn new(ceiling: Duration) -> Self {
        Self {
            started: Instant::now(),
            ceiling,
        }
    }

    /// Ceiling derived from the host limit minus a safety margin.
    pub fn for_host(host_limit: Duration, margin: Duration) -> Self {
        Self::new(host_limit.saturating_sub(margin))
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left before the ceiling (zero once passed).
    pub fn remaining(&self) -> Duration {
        self.ceiling.saturating_sub(self.elapsed())
    }

    /// True once starting another step needing `reserve` would overrun.
    pub fn should_stop(&self, reserve: Duration) -> bool {
        self.elapsed() + reserve >= self.ceiling
    }

    pub fn is_exhausted(&self) -> bool {
        self.should_stop(Duration::ZERO)
    }

    pub fn log_status(&self) {
        info!(
            elapsed_secs = self.elapsed().as_secs(),
            remaining_secs = self.remaining().as_secs(),
            ceiling_secs = self.ceiling.as_secs(),
            "Time budget status"
        );
    }
}
