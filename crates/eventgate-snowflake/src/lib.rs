//! Time-ordered 64-bit identifiers for Eventgate.
//!
//! A [`Snowflake`] packs three fields into a positive `i64`:
//!
//! ```text
//!  63   62                        22 21          11 10           0
//! ┌───┬────────────────────────────┬──────────────┬──────────────┐
//! │ 0 │ timestamp - epoch (41 bit) │ node (11 bit)│ incr (11 bit)│
//! └───┴────────────────────────────┴──────────────┴──────────────┘
//! ```
//!
//! Identifiers from one [`SnowflakeGenerator`] are strictly increasing.
//! Identifiers from different nodes are only roughly time-ordered, since
//! their clocks may disagree.
//!
//! # Clock regression
//!
//! The generator never moves its logical timestamp backwards. If the wall
//! clock reads earlier than the last timestamp it issued, it keeps issuing
//! from that last timestamp and, once the increment space is exhausted,
//! waits for the wall clock to catch up.

mod error;

pub use error::SnowflakeError;

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::warn;

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Default epoch: 2020-01-01T00:00:00Z in unix milliseconds.
pub const DEFAULT_EPOCH_MS: i64 = 1_577_836_800_000;

/// Bits reserved for the millisecond timestamp.
pub const TIMESTAMP_BITS: u32 = 41;
/// Bits reserved for the node identifier.
pub const NODE_ID_BITS: u32 = 11;
/// Bits reserved for the per-millisecond increment.
pub const INCREMENT_BITS: u32 = 11;

const TIMESTAMP_MASK: i64 = (1 << TIMESTAMP_BITS) - 1;
const NODE_ID_MASK: i64 = (1 << NODE_ID_BITS) - 1;
const INCREMENT_MASK: i64 = (1 << INCREMENT_BITS) - 1;

/// Largest node id that fits in the layout (2047).
pub const MAX_NODE_ID: u16 = NODE_ID_MASK as u16;
/// Largest increment within one millisecond (2047).
pub const MAX_INCREMENT: u16 = INCREMENT_MASK as u16;

// ---------------------------------------------------------------------------
// Snowflake
// ---------------------------------------------------------------------------

/// A 64-bit time-ordered identifier.
///
/// Serialized as the bare integer; wire formats that need a string (most
/// JSON clients) call [`to_string`](ToString::to_string) explicitly.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Snowflake(pub i64);

/// The decoded fields of a [`Snowflake`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnowflakeParts {
    /// Unix timestamp in milliseconds (epoch already added back).
    pub timestamp_ms: i64,
    /// The node that generated the id.
    pub node_id: u16,
    /// Position within the millisecond.
    pub increment: u16,
}

impl Snowflake {
    /// Packs the three fields into an identifier.
    pub fn compose(timestamp_ms: i64, epoch_ms: i64, node_id: u16, increment: u16) -> Self {
        let offset = (timestamp_ms - epoch_ms).max(0) & TIMESTAMP_MASK;
        Self(
            (offset << (NODE_ID_BITS + INCREMENT_BITS))
                | ((node_id as i64 & NODE_ID_MASK) << INCREMENT_BITS)
                | (increment as i64 & INCREMENT_MASK),
        )
    }

    /// The first possible identifier for a timestamp (node 0, increment 0).
    ///
    /// Useful as a range bound. A real id generated in the same millisecond
    /// on node 0 may be equal to it.
    pub fn lower_bound(timestamp_ms: i64) -> Self {
        Self::compose(timestamp_ms, DEFAULT_EPOCH_MS, 0, 0)
    }

    /// Decodes the identifier against [`DEFAULT_EPOCH_MS`].
    pub fn parts(self) -> SnowflakeParts {
        self.parts_with_epoch(DEFAULT_EPOCH_MS)
    }

    /// Decodes the identifier against a custom epoch.
    pub fn parts_with_epoch(self, epoch_ms: i64) -> SnowflakeParts {
        SnowflakeParts {
            timestamp_ms: ((self.0 >> (NODE_ID_BITS + INCREMENT_BITS)) & TIMESTAMP_MASK)
                + epoch_ms,
            node_id: ((self.0 >> INCREMENT_BITS) & NODE_ID_MASK) as u16,
            increment: (self.0 & INCREMENT_MASK) as u16,
        }
    }

    /// Shorthand for `self.parts().timestamp_ms`.
    pub fn timestamp_ms(self) -> i64 {
        self.parts().timestamp_ms
    }

    /// Returns the raw `i64`.
    pub fn into_inner(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Snowflake {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of wall-clock milliseconds.
pub trait Clock: Send + Sync + 'static {
    /// Current unix time in milliseconds.
    fn now_ms(&self) -> i64;
}

/// Reads [`SystemTime::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default()
    }
}

impl<K: Clock + ?Sized> Clock for Arc<K> {
    fn now_ms(&self) -> i64 {
        (**self).now_ms()
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

struct IncrementState {
    timestamp_ms: i64,
    increment: u16,
    /// Set while the wall clock reads behind `timestamp_ms`, so the
    /// regression is logged once rather than per id.
    regressed: bool,
}

/// Generates [`Snowflake`]s for one node.
///
/// Safe to share between threads; callers serialize on one mutex that is
/// held for at most the remainder of the current millisecond.
pub struct SnowflakeGenerator<K: Clock = SystemClock> {
    node_id: u16,
    epoch_ms: i64,
    clock: K,
    state: Mutex<IncrementState>,
}

impl SnowflakeGenerator<SystemClock> {
    /// Creates a generator on the system clock with the default epoch.
    ///
    /// # Errors
    /// Returns [`SnowflakeError::NodeIdOutOfRange`] for ids above
    /// [`MAX_NODE_ID`].
    pub fn new(node_id: u16) -> Result<Self, SnowflakeError> {
        Self::with_clock(node_id, SystemClock)
    }
}

impl<K: Clock> SnowflakeGenerator<K> {
    /// Creates a generator reading time from `clock`.
    pub fn with_clock(node_id: u16, clock: K) -> Result<Self, SnowflakeError> {
        if node_id > MAX_NODE_ID {
            return Err(SnowflakeError::NodeIdOutOfRange(node_id));
        }
        Ok(Self {
            node_id,
            epoch_ms: DEFAULT_EPOCH_MS,
            clock,
            state: Mutex::new(IncrementState {
                timestamp_ms: i64::MIN,
                increment: 0,
                regressed: false,
            }),
        })
    }

    /// Replaces the epoch. Ids from generators with different epochs are
    /// not comparable.
    pub fn with_epoch(mut self, epoch_ms: i64) -> Self {
        self.epoch_ms = epoch_ms;
        self
    }

    /// The node id baked into every generated identifier.
    pub fn node_id(&self) -> u16 {
        self.node_id
    }

    /// Decodes an identifier against this generator's epoch.
    pub fn extract(&self, id: Snowflake) -> SnowflakeParts {
        id.parts_with_epoch(self.epoch_ms)
    }

    /// Generates the next identifier.
    ///
    /// Blocks only when all 2048 increments of the current millisecond are
    /// used up: the calling thread spins on `yield_now` with the generator
    /// locked until the clock passes that millisecond, or for as long as
    /// the clock stays behind the last timestamp after a regression. Call
    /// it from a blocking context (e.g. `tokio::task::spawn_blocking`) when
    /// it may run on an async worker.
    pub fn generate(&self) -> Snowflake {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        loop {
            let mut now = self.clock.now_ms();

            if now < state.timestamp_ms {
                if !state.regressed {
                    warn!(
                        now_ms = now,
                        last_ms = state.timestamp_ms,
                        "system clock moved backwards, holding last timestamp"
                    );
                    state.regressed = true;
                }
                now = state.timestamp_ms;
            } else if now > state.timestamp_ms {
                state.regressed = false;
            }

            if now != state.timestamp_ms {
                state.timestamp_ms = now;
                state.increment = 0;
                break;
            }
            if state.increment < MAX_INCREMENT {
                state.increment += 1;
                break;
            }

            // Increment space exhausted: wait for the next millisecond.
            while self.clock.now_ms() <= state.timestamp_ms {
                std::thread::yield_now();
            }
        }

        Snowflake::compose(
            state.timestamp_ms,
            self.epoch_ms,
            self.node_id,
            state.increment,
        )
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, Ordering};

    use super::*;

    struct ManualClock(AtomicI64);

    impl ManualClock {
        fn at(ms: i64) -> Arc<Self> {
            Arc::new(Self(AtomicI64::new(ms)))
        }

        fn set(&self, ms: i64) {
            self.0.store(ms, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_ms(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    const T0: i64 = DEFAULT_EPOCH_MS + 123_456_789;

    #[test]
    fn test_compose_and_parts_recover_fields() {
        let id = Snowflake::compose(T0, DEFAULT_EPOCH_MS, 17, 300);
        let parts = id.parts();
        assert_eq!(parts.timestamp_ms, T0);
        assert_eq!(parts.node_id, 17);
        assert_eq!(parts.increment, 300);
        assert!(id.0 > 0, "sign bit must stay clear");
    }

    #[test]
    fn test_compose_layout_matches_shift_formula() {
        let id = Snowflake::compose(DEFAULT_EPOCH_MS + 5, DEFAULT_EPOCH_MS, 3, 9);
        assert_eq!(id.0, (5 << 22) | (3 << 11) | 9);
    }

    #[test]
    fn test_lower_bound_is_first_id_of_millisecond() {
        let bound = Snowflake::lower_bound(T0);
        let parts = bound.parts();
        assert_eq!(parts.timestamp_ms, T0);
        assert_eq!(parts.node_id, 0);
        assert_eq!(parts.increment, 0);
        assert!(bound <= Snowflake::compose(T0, DEFAULT_EPOCH_MS, 0, 1));
    }

    #[test]
    fn test_new_rejects_node_id_above_eleven_bits() {
        assert!(SnowflakeGenerator::new(MAX_NODE_ID).is_ok());
        assert!(matches!(
            SnowflakeGenerator::new(MAX_NODE_ID + 1),
            Err(SnowflakeError::NodeIdOutOfRange(2048))
        ));
    }

    #[test]
    fn test_generate_same_millisecond_increments() {
        let clock = ManualClock::at(T0);
        let generator = SnowflakeGenerator::with_clock(4, Arc::clone(&clock)).unwrap();

        let a = generator.generate();
        let b = generator.generate();
        assert_eq!(generator.extract(a).increment, 0);
        assert_eq!(generator.extract(b).increment, 1);
        assert_eq!(generator.extract(b).node_id, 4);
        assert!(b > a);
    }

    #[test]
    fn test_generate_new_millisecond_resets_increment() {
        let clock = ManualClock::at(T0);
        let generator = SnowflakeGenerator::with_clock(0, Arc::clone(&clock)).unwrap();
        generator.generate();
        generator.generate();

        clock.set(T0 + 1);
        let id = generator.generate();
        assert_eq!(id.parts().increment, 0);
        assert_eq!(id.parts().timestamp_ms, T0 + 1);
    }

    #[test]
    fn test_generate_clock_regression_stays_monotonic() {
        let clock = ManualClock::at(T0);
        let generator = SnowflakeGenerator::with_clock(0, Arc::clone(&clock)).unwrap();
        let before = generator.generate();

        clock.set(T0 - 50);
        let during = generator.generate();
        assert!(during > before);
        assert_eq!(during.parts().timestamp_ms, T0);

        clock.set(T0 + 1);
        let after = generator.generate();
        assert!(after > during);
    }

    #[test]
    fn test_serde_is_transparent_integer() {
        let json = serde_json::to_string(&Snowflake(42)).unwrap();
        assert_eq!(json, "42");
        assert_eq!(Snowflake(42).to_string(), "42");
    }
}
