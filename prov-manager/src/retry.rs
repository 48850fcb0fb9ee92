//! Retry & recovery policy for connection failures

use std::num::NonZeroU32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Below the threshold; wait for another attempt
    Available,
    /// Threshold reached; the state machine must reset
    Exhausted,
}

/// Counts consecutive connection failures
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    threshold: Option<NonZeroU32>,
    count: u32,
}

impl RetryPolicy {
    /// `None` disables resets; failures are still counted
    pub fn new(threshold: Option<NonZeroU32>) -> Self {
        Self { threshold, count: 0 }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn on_failure(&mut self) -> RetryDecision {
        self.count = self.count.saturating_add(1);
        match self.threshold {
            Some(t) if self.count >= t.get() => {
                self.count = 0;
                RetryDecision::Exhausted
            }
            _ => RetryDecision::Available,
        }
    }

    pub fn on_success(&mut self) {
        self.count = 0;
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausts_at_threshold() {
        let mut policy = RetryPolicy::new(NonZeroU32::new(3));
        assert_eq!(policy.on_failure(), RetryDecision::Available);
        assert_eq!(policy.on_failure(), RetryDecision::Available);
        assert_eq!(policy.count(), 2);
        assert_eq!(policy.on_failure(), RetryDecision::Exhausted);
        assert_eq!(policy.count(), 0);
    }

    #[test]
    fn success_clears_count() {
        let mut policy = RetryPolicy::new(NonZeroU32::new(2));
        policy.on_failure();
        policy.on_success();
        assert_eq!(policy.on_failure(), RetryDecision::Available);
    }

    #[test]
    fn disabled_never_exhausts() {
        let mut policy = RetryPolicy::new(None);
        for _ in 0..100 {
            assert_eq!(policy.on_failure(), RetryDecision::Available);
        }
        assert_eq!(policy.count(), 100);
    }
}
