//! Session tuning knobs.

use std::time::Duration;

/// Configuration shared by every session on a hub.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Housekeeping period. Also the resume grace window and the maximum
    /// age of replayable history.
    ///
    /// Default: 45 seconds.
    pub ping_interval: Duration,

    /// Undelivered packets a session buffers before dropping the oldest.
    ///
    /// Default: 256.
    pub queue_capacity: usize,

    /// Delivered packets a session keeps for replay, regardless of age.
    ///
    /// Default: 1024.
    pub history_limit: usize,

    /// Upper bound on the random delay added to a session's first
    /// housekeeping tick, so sessions created together don't tick together.
    ///
    /// Default: 250 ms.
    pub housekeeping_jitter: Duration,

    /// How long a single write or ping to a connection may take before
    /// the connection is treated as dead and detached.
    ///
    /// Default: 10 seconds.
    pub write_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(45),
            queue_capacity: 256,
            history_limit: 1024,
            housekeeping_jitter: Duration::from_millis(250),
            write_timeout: Duration::from_secs(10),
        }
    }
}

impl SessionConfig {
    /// A default config with a different ping interval.
    pub fn with_ping_interval(ping_interval: Duration) -> Self {
        Self {
            ping_interval,
            ..Default::default()
        }
    }

    /// Clamps values that would make a session unusable.
    ///
    /// Zero capacities become one and a zero ping interval or write
    /// timeout becomes one millisecond.
    pub fn validated(mut self) -> Self {
        if self.ping_interval.is_zero() {
            tracing::warn!("ping_interval is zero, using 1ms");
            self.ping_interval = Duration::from_millis(1);
        }
        if self.write_timeout.is_zero() {
            tracing::warn!("write_timeout is zero, using 1ms");
            self.write_timeout = Duration::from_millis(1);
        }
        self.queue_capacity = self.queue_capacity.max(1);
        self.history_limit = self.history_limit.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = SessionConfig::default();
        assert_eq!(config.ping_interval, Duration::from_secs(45));
        assert_eq!(config.queue_capacity, 256);
        assert_eq!(config.history_limit, 1024);
        assert_eq!(config.write_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_validated_clamps_zeroes() {
        let config = SessionConfig {
            ping_interval: Duration::ZERO,
            queue_capacity: 0,
            history_limit: 0,
            housekeeping_jitter: Duration::ZERO,
            write_timeout: Duration::ZERO,
        }
        .validated();
        assert_eq!(config.ping_interval, Duration::from_millis(1));
        assert_eq!(config.queue_capacity, 1);
        assert_eq!(config.history_limit, 1);
        assert_eq!(config.write_timeout, Duration::from_millis(1));
    }
}
