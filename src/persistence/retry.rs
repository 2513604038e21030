//! Retry policy for storage operations.
//!
//! Transient errors (pool exhaustion, I/O, SQLite `BUSY`/`LOCKED`) are
//! retried after a fixed delay. The default budget is unbounded; operators
//! can cap it so a wedged database surfaces as an error instead of a silent
//! stall.

use std::time::Duration;

/// Primary SQLite result code for a busy database.
const SQLITE_BUSY: i64 = 5;
/// Primary SQLite result code for a locked table.
const SQLITE_LOCKED: i64 = 6;

/// Fixed-delay retry policy for transient storage errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: Option<u32>,
    delay: Duration,
}

impl RetryPolicy {
    /// Retries transient errors forever, sleeping `delay` between attempts.
    #[must_use]
    pub const fn unbounded(delay: Duration) -> Self {
        Self {
            max_attempts: None,
            delay,
        }
    }

    /// Gives up after `max_attempts` total attempts.
    #[must_use]
    pub const fn bounded(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            delay,
        }
    }

    /// Builds a policy from config values where `0` attempts means unbounded.
    #[must_use]
    pub const fn from_config(max_attempts: u32, delay: Duration) -> Self {
        if max_attempts == 0 {
            Self::unbounded(delay)
        } else {
            Self::bounded(max_attempts, delay)
        }
    }

    /// Returns the attempt cap, if any.
    #[must_use]
    pub const fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Returns the fixed delay between attempts.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Decides whether to retry after `attempts` failed attempts ending in
    /// `err`. Returns the delay to wait, or `None` to give up.
    #[must_use]
    pub fn backoff(&self, attempts: u32, err: &sqlx::Error) -> Option<Duration> {
        if !is_transient(err) {
            return None;
        }
        match self.max_attempts {
            Some(max) if attempts >= max => None,
            _ => Some(self.delay),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::unbounded(Duration::from_secs(1))
    }
}

/// Classifies a driver error as transient (worth retrying) or fatal.
#[must_use]
pub fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i64>().ok())
            .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED)),
        _ => false,
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn io_error() -> sqlx::Error {
        sqlx::Error::Io(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"))
    }

    #[test]
    fn classifies_transient_errors() {
        assert!(is_transient(&sqlx::Error::PoolTimedOut));
        assert!(is_transient(&io_error()));
        assert!(!is_transient(&sqlx::Error::RowNotFound));
        assert!(!is_transient(&sqlx::Error::PoolClosed));
        assert!(!is_transient(&sqlx::Error::Protocol("bad".to_string())));
    }

    #[test]
    fn unbounded_policy_always_retries_transient() {
        let policy = RetryPolicy::unbounded(Duration::from_millis(5));
        assert_eq!(policy.backoff(1, &io_error()), Some(Duration::from_millis(5)));
        assert_eq!(policy.backoff(10_000, &io_error()), Some(Duration::from_millis(5)));
        assert_eq!(policy.backoff(1, &sqlx::Error::RowNotFound), None);
    }

    #[test]
    fn bounded_policy_gives_up() {
        let policy = RetryPolicy::bounded(3, Duration::from_millis(5));
        assert!(policy.backoff(1, &sqlx::Error::PoolTimedOut).is_some());
        assert!(policy.backoff(2, &sqlx::Error::PoolTimedOut).is_some());
        assert!(policy.backoff(3, &sqlx::Error::PoolTimedOut).is_none());
    }

    #[test]
    fn zero_attempts_from_config_is_unbounded() {
        let policy = RetryPolicy::from_config(0, Duration::from_millis(1));
        assert_eq!(policy.max_attempts(), None);
        let capped = RetryPolicy::from_config(4, Duration::from_millis(1));
        assert_eq!(capped.max_attempts(), Some(4));
    }

    #[test]
    fn default_is_unbounded_one_second() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), None);
        assert_eq!(policy.delay(), Duration::from_secs(1));
    }
}
