use std::time::Duration;

use crate::config::WatcherSettings;

/// Retry schedule for one watched file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Attempts including the first one.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Wall-clock budget measured from detection.
    pub deadline: Duration,
}

/// What the supervisor does after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    Retry(Duration),
    Exhausted,
    DeadlineExceeded,
}

impl RetryPolicy {
    pub fn from_settings(settings: &WatcherSettings) -> Self {
        Self {
            max_attempts: settings.max_retries.max(1),
            backoff_base: secs_f64(settings.backoff_base_secs),
            backoff_max: secs_f64(settings.backoff_max_secs),
            deadline: Duration::from_secs(settings.deadline_secs),
        }
    }

    /// Delay after failed attempt `attempt` (1-based): `min(base * attempt, max)`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(attempt)
            .min(self.backoff_max)
    }

    /// Decides whether to retry after attempt `attempt` failed, `elapsed`
    /// after the file was detected.
    pub fn after_failure(&self, attempt: u32, elapsed: Duration) -> NextStep {
        if attempt >= self.max_attempts {
            return NextStep::Exhausted;
        }
        let delay = self.delay_after(attempt);
        if elapsed.saturating_add(delay) > self.deadline {
            return NextStep::DeadlineExceeded;
        }
        NextStep::Retry(delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&WatcherSettings::default())
    }
}

fn secs_f64(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            backoff_base: Duration::from_secs(2),
            backoff_max: Duration::from_secs(5),
            deadline: Duration::from_secs(300),
        }
    }

    #[test]
    fn test_delay_is_linear_and_capped() {
        let p = policy();
        let delays: Vec<u64> = (1..=4).map(|n| p.delay_after(n).as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 5, 5]);
    }

    #[test]
    fn test_no_retry_after_last_attempt() {
        let p = policy();
        assert_eq!(p.after_failure(4, Duration::ZERO), NextStep::Retry(Duration::from_secs(5)));
        assert_eq!(p.after_failure(5, Duration::ZERO), NextStep::Exhausted);
    }

    #[test]
    fn test_deadline_stops_early() {
        let p = RetryPolicy {
            deadline: Duration::from_secs(5),
            ..policy()
        };
        assert_eq!(p.after_failure(1, Duration::ZERO), NextStep::Retry(Duration::from_secs(2)));
        assert_eq!(
            p.after_failure(2, Duration::from_secs(2)),
            NextStep::DeadlineExceeded
        );
    }

    #[test]
    fn test_from_settings() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_attempts, 5);
        assert_eq!(p.backoff_base, Duration::from_secs(2));
        assert_eq!(p.backoff_max, Duration::from_secs(30));
        assert_eq!(p.deadline, Duration::from_secs(300));
    }
}
