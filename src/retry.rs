//! Retry policy shared by session construction and request dispatch
//!
//! Exponential backoff with additive jitter and an optional attempt ceiling.
//! Jitter only ever lengthens a delay, so the first retry never fires before
//! `initial_delay`.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Upper bound for the un-jittered delay
    pub max_delay: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
    /// Extra random delay as a fraction of the base delay (0.0 disables)
    pub jitter: f64,
    /// Total attempts before giving up; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.1,
            max_attempts: Some(20),
        }
    }
}

impl RetryPolicy {
    /// Default backoff without an attempt ceiling
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            ..Self::default()
        }
    }

    /// Constant delay, no jitter, no ceiling
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            jitter: 0.0,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Base delay after `attempt` failures (1-based), before jitter
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
            .max(self.initial_delay.min(self.max_delay))
    }

    /// Delay before the next attempt, or `None` once `attempt` attempts have
    /// been made and the ceiling is reached
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if self.max_attempts.is_some_and(|max| attempt >= max) {
            return None;
        }

        let base = self.backoff(attempt);
        if self.jitter <= 0.0 {
            return Some(base);
        }
        let extra = rand::thread_rng().gen_range(0.0..=self.jitter);
        Some(base + base.mul_f64(extra))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(5));
        assert_eq!(policy.backoff(2), Duration::from_secs(10));
        assert_eq!(policy.backoff(3), Duration::from_secs(20));
        assert_eq!(policy.backoff(4), Duration::from_secs(40));
        assert_eq!(policy.backoff(5), Duration::from_secs(60));
        assert_eq!(policy.backoff(1_000), Duration::from_secs(60));
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let policy = RetryPolicy {
            max_attempts: None,
            ..RetryPolicy::default()
        };
        for attempt in 1..50 {
            let base = policy.backoff(attempt);
            let delay = policy.delay_for(attempt).unwrap();
            assert!(delay >= base, "jitter must not shorten the delay");
            assert!(delay <= base + base.mul_f64(policy.jitter));
        }
    }

    #[test]
    fn test_ceiling_stops_retries() {
        let policy = RetryPolicy::fixed(Duration::from_secs(1)).with_max_attempts(Some(3));
        assert_eq!(policy.delay_for(1), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for(2), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for(3), None);
    }

    #[test]
    fn test_unbounded_never_gives_up() {
        let policy = RetryPolicy::unbounded();
        assert!(policy.delay_for(u32::MAX - 1).is_some());
    }

    #[test]
    fn test_fixed_policy_matches_five_second_backoff() {
        let policy = RetryPolicy::fixed(Duration::from_secs(5));
        for attempt in 1..10 {
            assert_eq!(policy.delay_for(attempt), Some(Duration::from_secs(5)));
        }
    }
}
