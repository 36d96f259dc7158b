//! Response sequence cursor.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Lock-free position within a stub's response sequence.
///
/// Concurrent callers of [`SequenceCursor::advance`] each observe a distinct
/// slot; the position wraps back to zero after the last response.
#[derive(Default)]
pub struct SequenceCursor(AtomicUsize);

impl SequenceCursor {
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicUsize::new(0))
    }

    /// Current index without advancing
    #[must_use]
    pub fn current(&self, response_count: usize) -> usize {
        let index = self.0.load(Ordering::Acquire);
        index.min(response_count.saturating_sub(1))
    }

    /// Return the current index and move to the next one, wrapping at `response_count`
    #[must_use]
    pub fn advance(&self, response_count: usize) -> usize {
        if response_count <= 1 {
            return 0;
        }
        let previous = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |index| {
                let index = if index >= response_count { 0 } else { index };
                Some((index + 1) % response_count)
            })
            .unwrap_or_else(|e| {
                debug_assert!(false, "we never return None from fetch_update");
                e
            });
        if previous >= response_count {
            0
        } else {
            previous
        }
    }
}

impl fmt::Debug for SequenceCursor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("SequenceCursor")
            .field(&self.0.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_single_response_never_advances() {
        let cursor = SequenceCursor::new();
        for _ in 0..5 {
            assert_eq!(cursor.advance(1), 0);
        }
        assert_eq!(cursor.current(1), 0);
    }

    #[test]
    fn test_wraps_after_last_response() {
        let cursor = SequenceCursor::new();
        let seen: Vec<usize> = (0..7).map(|_| cursor.advance(3)).collect();
        assert_eq!(seen, vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(cursor.current(3), 1);
    }

    #[test]
    fn test_current_does_not_advance() {
        let cursor = SequenceCursor::new();
        assert_eq!(cursor.current(2), 0);
        assert_eq!(cursor.current(2), 0);
        assert_eq!(cursor.advance(2), 0);
        assert_eq!(cursor.current(2), 1);
    }

    #[test]
    fn test_concurrent_advances_hand_out_distinct_slots() {
        let cursor = Arc::new(SequenceCursor::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cursor = Arc::clone(&cursor);
                thread::spawn(move || (0..100).map(|_| cursor.advance(4)).collect::<Vec<_>>())
            })
            .collect();

        let mut counts: HashMap<usize, usize> = HashMap::new();
        for handle in handles {
            for index in handle.join().unwrap() {
                *counts.entry(index).or_default() += 1;
            }
        }

        // 400 advances over 4 slots hit every slot equally
        assert_eq!(counts.len(), 4);
        assert!(counts.values().all(|count| *count == 100));
    }
}
