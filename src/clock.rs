//! Wall-clock time source, injected so the refresh/timeout math in
//! [`crate::authenticator`] can be driven deterministically in tests.

use std::time::{SystemTime, UNIX_EPOCH};

/// A source of unix-epoch seconds.
///
/// The real implementation ([`SystemClock`]) can only fail if the system
/// clock is set before the epoch, which the authenticator treats fail-safe
/// per the design spec (force a refresh, or fail the in-flight attempt).
pub trait Clock {
    /// Current time as unix seconds, or an error if it could not be read.
    fn now_unix_s(&self) -> Result<u64, ClockReadError>;
}

/// Opaque clock-read failure.
#[derive(Debug, Clone, thiserror::Error)]
#[error("system clock is not available")]
pub struct ClockReadError;

/// `Clock` backed by [`std::time::SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix_s(&self) -> Result<u64, ClockReadError> {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .map_err(|_| ClockReadError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_reads_plausible_time() {
        let now = SystemClock.now_unix_s().unwrap();
        // Anything after 2020-01-01T00:00:00Z.
        assert!(now > 1_577_836_800);
    }
}
