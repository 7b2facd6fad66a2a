use std::time::{Duration, Instant};

/// Coalesces bursts of change signals into one action after a quiet period.
#[derive(Debug, Clone)]
pub struct Debouncer {
    quiet: Duration,
    last_touch: Option<Instant>,
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            last_touch: None,
        }
    }

    /// Record a change; restarts the quiet period.
    pub fn touch(&mut self, now: Instant) {
        self.last_touch = Some(now);
    }

    pub fn is_pending(&self) -> bool {
        self.last_touch.is_some()
    }

    /// True exactly once per burst, after `quiet` has passed since the last
    /// touch.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.last_touch {
            Some(last) if now.saturating_duration_since(last) >= self.quiet => {
                self.last_touch = None;
                true
            }
            _ => false,
        }
    }
}
