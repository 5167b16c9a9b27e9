use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out message ids for placeholders.
///
/// Ids are a random per-process seed mixed with a counter, so they never
/// repeat within a process and are cheap to produce.
#[derive(Debug)]
pub struct RequestIdGenerator {
    seed: u128,
    counter: AtomicU64,
}

impl RequestIdGenerator {
    #[must_use]
    pub fn new() -> Self {
        let seed_hi = u128::from(fastrand::u64(..));
        let seed_lo = u128::from(fastrand::u64(..));
        Self::with_seed((seed_hi << 64) | seed_lo)
    }

    #[must_use]
    pub fn with_seed(seed: u128) -> Self {
        Self {
            seed,
            counter: AtomicU64::new(1),
        }
    }

    /// Next id. Successive calls never return the same value.
    pub fn next_id(&self) -> uuid::Uuid {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        uuid::Uuid::from_u128(self.seed ^ u128::from(seq))
    }
}

impl Default for RequestIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_seeded() {
        let ids = RequestIdGenerator::with_seed(0);
        assert_eq!(ids.next_id(), uuid::Uuid::from_u128(1));
        assert_eq!(ids.next_id(), uuid::Uuid::from_u128(2));

        let random = RequestIdGenerator::new();
        assert_ne!(random.next_id(), random.next_id());
    }
}
