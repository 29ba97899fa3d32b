//! Shared ID-sequence counter table.
//!
//! One table is created at root-context construction and shared by
//! reference across the whole derivation lineage, so sequence numbers for a
//! given id stay globally unique across the processed tree even when
//! sibling subtrees are walked from different threads.  Each read-modify-
//! write happens under a single lock acquisition.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Per-id monotonic sequence counters, shared by cloning.
///
/// `Clone` shares the underlying table; sibling contexts derived from the
/// same root draw from the same sequences.
#[derive(Debug, Clone, Default)]
pub struct SeqCounters {
    counts: Arc<Mutex<HashMap<String, u64>>>,
}

impl SeqCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current sequence number for `id` (first call returns 1), advancing
    /// the stored counter within the same critical section.
    pub fn take(&self, id: &str) -> u64 {
        let mut counts = self.lock();
        let count = counts.entry(id.to_owned()).or_insert(1);
        let current = *count;
        *count += 1;
        current
    }

    /// Sequence number the next [`take`](Self::take) would return, without
    /// advancing anything.
    pub fn peek(&self, id: &str) -> u64 {
        self.lock().get(id).copied().unwrap_or(1)
    }

    /// Last sequence number handed out for `id`, or `None` if `id` has
    /// never been assigned one.
    pub fn previous(&self, id: &str) -> Option<u64> {
        self.lock().get(id).map(|count| count - 1)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, u64>> {
        // A counter update is a single store, so a table poisoned by a
        // panicking sibling is still consistent and stays usable.
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_starts_at_one_and_advances() {
        let counters = SeqCounters::new();
        assert_eq!(counters.take("x"), 1);
        assert_eq!(counters.take("x"), 2);
        assert_eq!(counters.take("x"), 3);
    }

    #[test]
    fn ids_are_independent() {
        let counters = SeqCounters::new();
        assert_eq!(counters.take("x"), 1);
        assert_eq!(counters.take("y"), 1);
        assert_eq!(counters.take("x"), 2);
    }

    #[test]
    fn peek_does_not_advance() {
        let counters = SeqCounters::new();
        assert_eq!(counters.peek("x"), 1);
        assert_eq!(counters.peek("x"), 1);
        counters.take("x");
        assert_eq!(counters.peek("x"), 2);
    }

    #[test]
    fn previous_reports_last_handed_out() {
        let counters = SeqCounters::new();
        assert_eq!(counters.previous("x"), None);
        counters.take("x");
        counters.take("x");
        counters.take("x");
        assert_eq!(counters.previous("x"), Some(3));
    }

    #[test]
    fn clones_share_the_table() {
        let counters = SeqCounters::new();
        let shared = counters.clone();
        assert_eq!(counters.take("x"), 1);
        assert_eq!(shared.take("x"), 2);
        assert_eq!(counters.take("x"), 3);
    }

    #[test]
    fn takes_from_threads_never_collide() {
        let counters = SeqCounters::new();
        let mut seen = Vec::new();
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let counters = counters.clone();
                    scope.spawn(move || (0..50).map(|_| counters.take("id")).collect::<Vec<_>>())
                })
                .collect();
            for handle in handles {
                seen.extend(handle.join().unwrap());
            }
        });
        seen.sort_unstable();
        let expected: Vec<u64> = (1..=200).collect();
        assert_eq!(seen, expected);
    }
}
