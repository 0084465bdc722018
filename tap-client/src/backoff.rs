//! Backoff strategies
//!
//! The job engine never hard-codes a sleep: retry delays after transport
//! failures and the pause between status polls both come from an injected
//! policy. Any cloneable `backon::BackoffBuilder` is a policy, so callers may
//! pass `backon::ExponentialBuilder` directly. Tests inject `NoDelay` to run
//! without waiting.

use backon::{BackoffBuilder, ConstantBuilder, ExponentialBuilder};
use std::fmt;
use std::time::Duration;

/// Delay schedule the client can share between clones
///
/// Implemented for every cloneable `backon::BackoffBuilder`.
pub trait BackoffPolicy: Send + Sync + fmt::Debug {
    /// A fresh schedule: one delay per retry, ending when no retry is left
    fn delays(&self) -> Delays;
}

impl<B> BackoffPolicy for B
where
    B: BackoffBuilder + Clone + fmt::Debug + Send + Sync + 'static,
    B::Backoff: Send + Sync + 'static,
{
    fn delays(&self) -> Delays {
        Delays(Box::new(self.clone().build()))
    }
}

/// One run of a policy's delays
pub struct Delays(Box<dyn Iterator<Item = Duration> + Send + Sync>);

impl Iterator for Delays {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        self.0.next()
    }
}

impl fmt::Debug for Delays {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Delays")
    }
}

/// Hands one run of a shared policy to `backon`
pub(crate) struct Schedule(Delays);

impl Schedule {
    pub(crate) fn of(policy: &dyn BackoffPolicy) -> Self {
        Self(policy.delays())
    }
}

impl fmt::Debug for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Schedule")
    }
}

impl BackoffBuilder for Schedule {
    type Backoff = Delays;

    fn build(self) -> Delays {
        self.0
    }
}

/// Retries left after the first attempt
fn retries(max_attempts: u32) -> usize {
    max_attempts.saturating_sub(1) as usize
}

/// Exponential backoff with a cap
///
/// `delay(n) = min(base * 2^(n-1), cap)`, so delays never decrease.
/// `max_attempts` counts the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            cap,
            max_attempts,
        }
    }

    /// The equivalent `backon` builder
    pub fn builder(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base)
            .with_max_delay(self.cap)
            .with_factor(2.0)
            .with_max_times(retries(self.max_attempts))
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30), 5)
    }
}

impl BackoffBuilder for ExponentialBackoff {
    type Backoff = backon::ExponentialBackoff;

    fn build(self) -> Self::Backoff {
        self.builder().build()
    }
}

/// The same delay between every attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantBackoff {
    pub delay: Duration,
    pub max_attempts: u32,
}

impl ConstantBackoff {
    pub fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts,
        }
    }
}

impl BackoffBuilder for ConstantBackoff {
    type Backoff = backon::ConstantBackoff;

    fn build(self) -> Self::Backoff {
        ConstantBuilder::default()
            .with_delay(self.delay)
            .with_max_times(retries(self.max_attempts))
            .build()
    }
}

/// Retry immediately
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoDelay {
    pub max_attempts: u32,
}

impl NoDelay {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }
}

impl BackoffBuilder for NoDelay {
    type Backoff = backon::ConstantBackoff;

    fn build(self) -> Self::Backoff {
        ConstantBackoff::new(Duration::ZERO, self.max_attempts).build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(policy: &dyn BackoffPolicy) -> Vec<u64> {
        policy.delays().map(|d| d.as_secs()).collect()
    }

    #[test]
    fn test_exponential_doubles_until_cap() {
        let policy = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(30), 8);
        assert_eq!(secs(&policy), vec![1, 2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn test_exponential_is_non_decreasing() {
        let policy = ExponentialBackoff::new(Duration::from_millis(250), Duration::from_secs(10), 50);
        let mut previous = Duration::ZERO;
        let mut count = 0;
        for delay in policy.delays() {
            assert!(delay >= previous);
            assert!(delay <= policy.cap);
            previous = delay;
            count += 1;
        }
        assert_eq!(count, 49);
    }

    #[test]
    fn test_max_attempts_counts_first_attempt() {
        assert_eq!(ExponentialBackoff::default().delays().count(), 4);
        assert_eq!(ConstantBackoff::new(Duration::from_millis(5), 1).delays().count(), 0);
    }

    #[test]
    fn test_each_run_starts_over() {
        let policy = ConstantBackoff::new(Duration::from_millis(20), 3);
        let first: Vec<Duration> = policy.delays().collect();
        assert_eq!(first, vec![Duration::from_millis(20); 2]);
        assert_eq!(policy.delays().collect::<Vec<_>>(), first);
    }

    #[test]
    fn test_no_delay() {
        let delays: Vec<Duration> = NoDelay::new(3).delays().collect();
        assert_eq!(delays, vec![Duration::ZERO, Duration::ZERO]);
    }

    #[test]
    fn test_backon_builders_are_policies() {
        let policy: &dyn BackoffPolicy = &ExponentialBuilder::default();
        assert_eq!(policy.delays().next(), Some(Duration::from_secs(1)));
    }
}
