//! Bounded readiness polling

use std::thread;
use std::time::{Duration, Instant};

/// Poll with a deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Give up after this long
    pub timeout: Duration,
    /// Sleep between attempts
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            interval: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    /// Policy with explicit bounds
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    /// A single attempt
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Call `attempt` until it yields a value or the timeout passes.
    ///
    /// Always makes at least one attempt, and one final attempt at the
    /// deadline.
    pub fn poll<T>(&self, mut attempt: impl FnMut() -> Option<T>) -> Result<T, Duration> {
        let start = Instant::now();
        let deadline = start + self.timeout;
        loop {
            if let Some(value) = attempt() {
                return Ok(value);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(now - start);
            }
            thread::sleep(self.interval.min(deadline - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_immediate_success() {
        assert_eq!(RetryPolicy::immediate().poll(|| Some(3)), Ok(3));
    }

    #[test]
    fn test_times_out() {
        let policy = RetryPolicy::new(Duration::from_millis(30), Duration::from_millis(5));
        let mut attempts = 0;
        let waited = policy
            .poll(|| {
                attempts += 1;
                None::<()>
            })
            .unwrap_err();
        assert!(waited >= Duration::from_millis(30));
        assert!(attempts >= 2);
    }

    #[test]
    fn test_eventual_success() {
        let policy = RetryPolicy::new(Duration::from_secs(5), Duration::from_millis(1));
        let mut n = 0;
        assert_eq!(
            policy.poll(|| {
                n += 1;
                (n == 4).then_some(n)
            }),
            Ok(4)
        );
    }
}
