//! Bounded polling
//!
//! The CPLD reports completion of erase/program/read commands only through
//! its busy flag. Every wait is expressed as a [`RetryPolicy`] handed to
//! [`poll_until`], so the bound is explicit and testable.

use crate::error::Result;
use crate::programmer::I2cMaster;

/// Default number of busy-flag reads before giving up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 15;
/// Default delay between busy-flag reads
pub const DEFAULT_BACKOFF_MS: u32 = 1000;

/// How often and how long to poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of checks
    pub max_attempts: u32,
    /// Delay between consecutive checks
    pub backoff_ms: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_ms: DEFAULT_BACKOFF_MS,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given bound and backoff
    pub fn new(max_attempts: u32, backoff_ms: u32) -> Self {
        Self {
            max_attempts,
            backoff_ms,
        }
    }

    /// Upper bound on the time spent sleeping while polling
    pub fn max_wait_ms(&self) -> u64 {
        u64::from(self.max_attempts.saturating_sub(1)) * u64::from(self.backoff_ms)
    }
}

/// Result of a bounded poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The condition held after this many checks
    Ready {
        /// Checks performed, including the successful one
        attempts: u32,
    },
    /// The condition never held
    TimedOut {
        /// Checks performed
        attempts: u32,
    },
}

impl PollOutcome {
    /// Number of checks performed
    pub fn attempts(&self) -> u32 {
        match *self {
            PollOutcome::Ready { attempts } | PollOutcome::TimedOut { attempts } => attempts,
        }
    }
}

/// Run `ready` until it returns `true` or the policy is exhausted
///
/// The master's `delay_ms` is called between checks, never after the last
/// one. Errors from `ready` abort the poll immediately.
pub fn poll_until<M, F>(master: &mut M, policy: &RetryPolicy, mut ready: F) -> Result<PollOutcome>
where
    M: I2cMaster + ?Sized,
    F: FnMut(&mut M) -> Result<bool>,
{
    for attempt in 1..=policy.max_attempts {
        if ready(master)? {
            return Ok(PollOutcome::Ready { attempts: attempt });
        }
        if attempt < policy.max_attempts {
            master.delay_ms(policy.backoff_ms);
        }
    }
    Ok(PollOutcome::TimedOut {
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, TransportFailure};

    /// Bus that only counts delays
    struct DelayCounter {
        delays: u32,
        slept_ms: u64,
    }

    impl I2cMaster for DelayCounter {
        fn address(&self) -> u8 {
            0x40
        }

        fn transfer(&mut self, _write_data: &[u8], _read_buf: &mut [u8]) -> Result<()> {
            Ok(())
        }

        fn delay_ms(&mut self, ms: u32) {
            self.delays += 1;
            self.slept_ms += u64::from(ms);
        }

        fn delay_us(&mut self, _us: u32) {}
    }

    fn counter() -> DelayCounter {
        DelayCounter {
            delays: 0,
            slept_ms: 0,
        }
    }

    #[test]
    fn test_ready_first_try() {
        let mut bus = counter();
        let outcome = poll_until(&mut bus, &RetryPolicy::default(), |_| Ok(true)).unwrap();
        assert_eq!(outcome, PollOutcome::Ready { attempts: 1 });
        assert_eq!(bus.delays, 0);
    }

    #[test]
    fn test_ready_after_some_polls() {
        let mut bus = counter();
        let mut remaining = 3;
        let outcome = poll_until(&mut bus, &RetryPolicy::new(15, 10), |_| {
            remaining -= 1;
            Ok(remaining < 0)
        })
        .unwrap();
        assert_eq!(outcome, PollOutcome::Ready { attempts: 4 });
        assert_eq!(bus.delays, 3);
        assert_eq!(bus.slept_ms, 30);
    }

    #[test]
    fn test_timeout_is_bounded() {
        let mut bus = counter();
        let mut checks = 0;
        let policy = RetryPolicy::default();
        let outcome = poll_until(&mut bus, &policy, |_| {
            checks += 1;
            Ok(false)
        })
        .unwrap();
        assert_eq!(outcome, PollOutcome::TimedOut { attempts: 15 });
        assert_eq!(checks, 15);
        assert_eq!(bus.delays, 14);
        assert_eq!(bus.slept_ms, policy.max_wait_ms());
    }

    #[test]
    fn test_error_aborts_poll() {
        let mut bus = counter();
        let mut checks = 0;
        let err = Error::Transport(TransportFailure {
            opcode: 0xF0,
            os_error: Some(6),
        });
        let result = poll_until(&mut bus, &RetryPolicy::default(), |_| {
            checks += 1;
            Err(err)
        });
        assert_eq!(result, Err(err));
        assert_eq!(checks, 1);
    }

    #[test]
    fn test_zero_attempts_times_out_immediately() {
        let mut bus = counter();
        let outcome = poll_until(&mut bus, &RetryPolicy::new(0, 1000), |_| Ok(true)).unwrap();
        assert_eq!(outcome, PollOutcome::TimedOut { attempts: 0 });
        assert_eq!(bus.delays, 0);
    }
}
