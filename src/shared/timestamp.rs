/// Batched timestamp source for the hot execution path.
///
/// Workers stamp every sampled request completion; going to the OS clock for
/// each of them is wasted work at scheduler throughput. Only every
/// `UPDATE_INTERVAL`-th call performs a real clock read, the rest return the
/// cached value. The timestamp log is consumed for completion order, not
/// wall-clock precision; callers that need a fresh reading use
/// [`precise_nanos`].
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static TIMESTAMP_CACHE: AtomicU64 = AtomicU64::new(0);

thread_local! {
    static UPDATE_COUNTER: std::cell::Cell<u32> = const { std::cell::Cell::new(0) };
}

const UPDATE_INTERVAL: u32 = 100;

/// Nanoseconds since the epoch, refreshed every `UPDATE_INTERVAL` calls per
/// thread.
#[inline]
pub fn cached_nanos() -> u64 {
    UPDATE_COUNTER.with(|counter| {
        let count = counter.get();
        if count >= UPDATE_INTERVAL || TIMESTAMP_CACHE.load(Ordering::Relaxed) == 0 {
            let now = precise_nanos();
            TIMESTAMP_CACHE.store(now, Ordering::Relaxed);
            counter.set(0);
            now
        } else {
            counter.set(count + 1);
            TIMESTAMP_CACHE.load(Ordering::Relaxed)
        }
    })
}

/// Uncached nanoseconds since the epoch.
#[inline]
pub fn precise_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_precise_always_advances() {
        let first = precise_nanos();
        thread::sleep(Duration::from_micros(100));
        let second = precise_nanos();
        assert!(second > first);
    }

    #[test]
    fn test_cached_mostly_hits_cache() {
        let first = cached_nanos();
        let mut hits = 0;
        for _ in 0..50 {
            if cached_nanos() == first {
                hits += 1;
            }
        }
        assert!(hits > 40, "expected the cache to serve most reads, got {hits}");
    }

    #[test]
    fn test_cached_is_never_zero() {
        assert!(cached_nanos() > 0);
    }
}
