//! Delays between submission attempts, and a cancellable sleep.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Growth of the pause between failed submission attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryBackoff {
    pub first_delay: Duration,
    /// Ceiling for any single pause.
    pub max_delay: Duration,
    pub factor: f64,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self {
            first_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            factor: 2.0,
        }
    }
}

impl RetryBackoff {
    /// Pauses to take after the first, second, ... failure. Never ends.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        let first = self.first_delay.min(self.max_delay);
        std::iter::successors(Some(first), move |prev| {
            Some(prev.mul_f64(self.factor.max(1.0)).min(self.max_delay))
        })
    }
}

/// Sleep for `delay` unless `cancel` fires first. Returns `false` when
/// cancelled.
pub async fn wait(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(delays: impl Iterator<Item = Duration>, n: usize) -> Vec<u64> {
        delays.take(n).map(|d| d.as_secs()).collect()
    }

    #[test]
    fn delays_grow_up_to_the_ceiling() {
        let backoff = RetryBackoff::default();
        assert_eq!(secs(backoff.delays(), 7), [1, 2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn first_delay_is_capped_too() {
        let backoff = RetryBackoff {
            first_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(10),
            factor: 3.0,
        };
        assert_eq!(secs(backoff.delays(), 2), [10, 10]);
    }

    #[test]
    fn shrinking_factor_keeps_the_delay() {
        let backoff = RetryBackoff {
            factor: 0.5,
            ..Default::default()
        };
        assert_eq!(secs(backoff.delays(), 3), [1, 1, 1]);
    }

    #[tokio::test]
    async fn cancelled_wait_returns_false() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!wait(Duration::from_secs(60), &cancel).await);
    }

    #[tokio::test(start_paused = true)]
    async fn uncancelled_wait_sleeps() {
        let cancel = CancellationToken::new();
        assert!(wait(Duration::from_millis(10), &cancel).await);
    }
}
