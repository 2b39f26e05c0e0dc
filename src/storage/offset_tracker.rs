//! Batch-aligned offset window of a log.

use std::sync::atomic::{AtomicI64, Ordering};

use crate::types::Offset;

/// Tracks the lowest and highest batch-aligned offsets available in a log.
///
/// Every offset this type returns denotes a batch boundary; it never points
/// to a record inside a batch, because batches are made visible atomically.
/// The tracker is mutated only by the writer appending new batches and read
/// concurrently by readers.
#[derive(Debug)]
pub struct OffsetTracker {
    /// Base offset of the first tracked batch, -1 while the log is empty.
    first_base: AtomicI64,
    /// Base offset of the most recently appended batch, -1 while empty.
    last_base: AtomicI64,
    /// Offset of the last record of the most recently appended batch,
    /// -1 while empty.
    committed: AtomicI64,
}

impl OffsetTracker {
    pub fn new() -> Self {
        Self {
            first_base: AtomicI64::new(Offset::INVALID.value()),
            last_base: AtomicI64::new(Offset::INVALID.value()),
            committed: AtomicI64::new(Offset::INVALID.value()),
        }
    }

    /// Record a newly appended batch covering `[base, last]`.
    pub fn track_batch(&self, base: Offset, last: Offset) {
        let _ = self.first_base.compare_exchange(
            Offset::INVALID.value(),
            base.value(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        self.last_base.store(base.value(), Ordering::SeqCst);
        self.committed.store(last.value(), Ordering::SeqCst);
    }

    /// Base offset of the first available batch.
    /// [`Offset::INVALID`] while the log is empty.
    pub fn base_offset(&self) -> Offset {
        Offset::new(self.first_base.load(Ordering::SeqCst))
    }

    /// Base offset of the most recently appended batch.
    /// [`Offset::INVALID`] while the log is empty.
    pub fn last_base_offset(&self) -> Offset {
        Offset::new(self.last_base.load(Ordering::SeqCst))
    }

    /// Offset of the last committed record.
    /// [`Offset::INVALID`] while the log is empty.
    pub fn committed_offset(&self) -> Offset {
        Offset::new(self.committed.load(Ordering::SeqCst))
    }

    /// Offset the next appended batch will start at.
    pub fn next_offset(&self) -> Offset {
        self.committed_offset().next()
    }

    pub fn is_empty(&self) -> bool {
        !self.base_offset().is_valid()
    }
}

impl Default for OffsetTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tracker() {
        let tracker = OffsetTracker::new();
        assert!(tracker.is_empty());
        assert_eq!(tracker.base_offset(), Offset::INVALID);
        assert_eq!(tracker.committed_offset(), Offset::INVALID);
        assert_eq!(tracker.next_offset(), Offset::new(0));
    }

    #[test]
    fn test_track_single_batch() {
        let tracker = OffsetTracker::new();
        tracker.track_batch(Offset::new(0), Offset::new(4));
        assert_eq!(tracker.base_offset(), Offset::new(0));
        assert_eq!(tracker.last_base_offset(), Offset::new(0));
        assert_eq!(tracker.committed_offset(), Offset::new(4));
        assert_eq!(tracker.next_offset(), Offset::new(5));
    }

    #[test]
    fn test_first_base_is_sticky() {
        let tracker = OffsetTracker::new();
        tracker.track_batch(Offset::new(0), Offset::new(2));
        tracker.track_batch(Offset::new(3), Offset::new(3));
        tracker.track_batch(Offset::new(4), Offset::new(9));
        assert_eq!(tracker.base_offset(), Offset::new(0));
        assert_eq!(tracker.last_base_offset(), Offset::new(4));
        assert_eq!(tracker.committed_offset(), Offset::new(9));
    }
}
