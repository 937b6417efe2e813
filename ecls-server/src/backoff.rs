use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;

/// Backoff multiplier (1.5 which is 50% increase per backoff).
const DEFAULT_MULTIPLIER: f64 = 1.5;
/// Randomization factor (0 which is no randomization).
const DEFAULT_RANDOMIZATION: f64 = 0.0;

/// A retry interval generator for stream reconnects.
///
/// The first attempt is immediate. Every following attempt waits exponentially longer, capped at
/// the maximum interval. Once `max_retries` consecutive attempts have been handed out, the backoff
/// is exhausted and [`next_backoff`](Self::next_backoff) returns `None` until it is reset.
#[derive(Debug)]
pub struct ReconnectBackoff {
    backoff: ExponentialBackoff,
    attempt: u32,
    max_retries: Option<u32>,
}

impl ReconnectBackoff {
    /// Creates a new backoff without an upper bound on retries.
    pub fn new(initial_interval: Duration, max_interval: Duration) -> Self {
        Self {
            backoff: ExponentialBackoff {
                current_interval: initial_interval,
                initial_interval,
                randomization_factor: DEFAULT_RANDOMIZATION,
                multiplier: DEFAULT_MULTIPLIER,
                max_interval,
                max_elapsed_time: None,
                ..Default::default()
            },
            attempt: 0,
            max_retries: None,
        }
    }

    /// Limits the number of consecutive attempts. `None` retries forever.
    pub fn with_max_retries(mut self, max_retries: Option<u32>) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Resets this backoff to its initial state, after a connection succeeded.
    pub fn reset(&mut self) {
        self.backoff.reset();
        self.attempt = 0;
    }

    /// Returns the number of attempts handed out since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the delay before the next attempt, or `None` if the retries are exhausted.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.max_retries.is_some_and(|max| self.attempt >= max) {
            return None;
        }

        let delay = if self.attempt == 0 {
            Duration::ZERO
        } else {
            self.backoff
                .next_backoff()
                .unwrap_or(self.backoff.max_interval)
        };

        self.attempt += 1;
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_exponential_growth() {
        let mut backoff =
            ReconnectBackoff::new(Duration::from_millis(1000), Duration::from_millis(3000));

        let delays: Vec<_> = std::iter::from_fn(|| backoff.next_backoff())
            .take(5)
            .collect();

        assert_eq!(
            delays,
            vec![
                Duration::ZERO,
                Duration::from_millis(1000),
                Duration::from_millis(1500),
                Duration::from_millis(2250),
                Duration::from_millis(3000),
            ]
        );
    }

    #[test]
    fn test_max_retries() {
        let mut backoff = ReconnectBackoff::new(Duration::from_millis(10), Duration::from_secs(1))
            .with_max_retries(Some(2));

        assert_eq!(backoff.next_backoff(), Some(Duration::ZERO));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(10)));
        assert_eq!(backoff.next_backoff(), None);
        assert_eq!(backoff.attempt(), 2);

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_backoff(), Some(Duration::ZERO));
    }
}
