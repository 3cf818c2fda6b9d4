//! Concurrency and exhaustion tests for `SnowflakeGenerator`.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use eventgate_snowflake::{Clock, MAX_INCREMENT, Snowflake, SnowflakeGenerator};

/// A clock that only moves when the test says so.
struct FrozenClock(AtomicI64);

impl Clock for FrozenClock {
    fn now_ms(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

const T0: i64 = 1_700_000_000_000;

#[test]
fn test_generate_concurrent_ids_are_unique_and_ordered_per_thread() {
    let generator = Arc::new(SnowflakeGenerator::new(7).expect("valid node"));

    let per_thread: Vec<Vec<Snowflake>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let generator = Arc::clone(&generator);
                scope.spawn(move || (0..500).map(|_| generator.generate()).collect())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let mut seen = HashSet::new();
    for ids in &per_thread {
        // Each thread observes a strictly increasing sequence.
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        for id in ids {
            assert!(seen.insert(*id), "duplicate id {id}");
            assert_eq!(id.parts().node_id, 7);
        }
    }
    assert_eq!(seen.len(), 8 * 500);
}

#[test]
fn test_generate_exhausted_millisecond_blocks_until_clock_advances() {
    let clock = Arc::new(FrozenClock(AtomicI64::new(T0)));
    let generator = Arc::new(
        SnowflakeGenerator::with_clock(1, Arc::clone(&clock)).expect("valid node"),
    );

    // Increments 0..=2047 all fit in the frozen millisecond.
    let ids: Vec<Snowflake> = (0..=MAX_INCREMENT).map(|_| generator.generate()).collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(ids.last().unwrap().parts().increment, MAX_INCREMENT);
    assert!(ids.iter().all(|id| id.parts().timestamp_ms == T0));

    // The next call must wait until the clock ticks over.
    let advancer = {
        let clock = Arc::clone(&clock);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            clock.0.store(T0 + 1, Ordering::SeqCst);
        })
    };

    let start = Instant::now();
    let next = generator.generate();
    assert!(start.elapsed() >= Duration::from_millis(40));
    advancer.join().unwrap();

    assert_eq!(next.parts().timestamp_ms, T0 + 1);
    assert_eq!(next.parts().increment, 0);
    assert!(next > *ids.last().unwrap());
}
