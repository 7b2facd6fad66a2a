use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Enforces a minimum spacing between outbound requests. Callers block for
/// whatever is left of the interval since the previous request; bursts are
/// smoothed rather than queued.
#[derive(Debug)]
pub struct RequestThrottle {
    min_interval: Duration,
    last: Option<Instant>,
}

impl RequestThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    /// How long a request issued at `now` still has to wait.
    pub fn remaining(last: Option<Instant>, now: Instant, min_interval: Duration) -> Duration {
        match last {
            None => Duration::ZERO,
            Some(last) => min_interval.saturating_sub(now.saturating_duration_since(last)),
        }
    }

    /// Sleep until the next request may go out and record it as sent.
    /// Returns the time spent waiting.
    pub fn wait_turn(&mut self) -> Duration {
        let wait = Self::remaining(self.last, Instant::now(), self.min_interval);
        if !wait.is_zero() {
            debug!(wait_ms = wait.as_millis() as u64, "throttling remote request");
            thread::sleep(wait);
        }
        self.last = Some(Instant::now());
        wait
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_request_never_waits() {
        let now = Instant::now();
        assert_eq!(
            RequestThrottle::remaining(None, now, Duration::from_millis(350)),
            Duration::ZERO
        );
    }

    #[test]
    fn remaining_is_the_unelapsed_part_of_the_interval() {
        let last = Instant::now();
        let min = Duration::from_millis(350);
        assert_eq!(
            RequestThrottle::remaining(Some(last), last + Duration::from_millis(100), min),
            Duration::from_millis(250)
        );
        assert_eq!(
            RequestThrottle::remaining(Some(last), last + Duration::from_millis(500), min),
            Duration::ZERO
        );
    }

    #[test]
    fn consecutive_turns_are_spaced() {
        let mut throttle = RequestThrottle::new(Duration::from_millis(30));
        let started = Instant::now();
        assert_eq!(throttle.wait_turn(), Duration::ZERO);
        throttle.wait_turn();
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn zero_interval_disables_spacing() {
        let mut throttle = RequestThrottle::new(Duration::ZERO);
        throttle.wait_turn();
        assert_eq!(throttle.wait_turn(), Duration::ZERO);
    }
}
