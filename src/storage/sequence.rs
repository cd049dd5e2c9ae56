//! Identity sequences
//!
//! Reservation is atomic and strictly monotonic: concurrent callers
//! never observe the same value, and a reserved value is consumed even
//! when the work it was reserved for is discarded (gap-tolerant, never
//! a max+1 scan). Pending inserts rely on this: their identity must be
//! stable before any row exists, and a rejected insert simply wastes
//! the reservation.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Single monotonic counter
#[derive(Debug, Default)]
pub struct Sequence {
    next: AtomicU64,
}

impl Sequence {
    /// Create a sequence starting at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next value
    pub fn reserve(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Highest value reserved so far
    pub fn high_water(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}

/// Per-model monotonic counters
#[derive(Debug, Default)]
pub struct IdentitySequence {
    counters: Mutex<BTreeMap<String, u64>>,
}

impl IdentitySequence {
    /// Create an empty sequence set
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next identity for a model
    pub fn reserve(&self, model: &str) -> u64 {
        let mut counters = self.counters.lock().unwrap();
        let counter = counters.entry(model.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Highest identity reserved for a model so far
    pub fn high_water(&self, model: &str) -> u64 {
        self.counters
            .lock()
            .unwrap()
            .get(model)
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_sequence_monotonic() {
        let seq = Sequence::new();
        assert_eq!(seq.reserve(), 1);
        assert_eq!(seq.reserve(), 2);
        assert_eq!(seq.high_water(), 2);
    }

    #[test]
    fn test_identity_sequence_per_model() {
        let seq = IdentitySequence::new();
        assert_eq!(seq.reserve("tree"), 1);
        assert_eq!(seq.reserve("tree"), 2);
        assert_eq!(seq.reserve("plot"), 1);
        assert_eq!(seq.high_water("tree"), 2);
        assert_eq!(seq.high_water("plot"), 1);
        assert_eq!(seq.high_water("shrub"), 0);
    }

    #[test]
    fn test_concurrent_reservations_never_collide() {
        let seq = Arc::new(IdentitySequence::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let seq = Arc::clone(&seq);
            handles.push(thread::spawn(move || {
                (0..100).map(|_| seq.reserve("tree")).collect::<Vec<_>>()
            }));
        }
        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 800);
        assert_eq!(seq.high_water("tree"), 800);
    }
}
