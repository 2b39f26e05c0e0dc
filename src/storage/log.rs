//! A logical log: its segment set, offset tracker and append path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::BytesMut;
use tracing::{debug, info};

use crate::error::Result;
use crate::storage::batch::RecordBatch;
use crate::storage::log_reader::{LogReader, LogReaderConfig};
use crate::storage::offset_tracker::OffsetTracker;
use crate::storage::segment::{Segment, SegmentSet};
use crate::types::{Ntp, Offset};

#[derive(Debug)]
struct LogInner {
    sealed: Vec<Segment>,
    active_base: Offset,
    active_last: Offset,
    active: BytesMut,
    next_offset: Offset,
}

/// One logical log backed by an ordered, non-overlapping segment set.
///
/// Appends go to the active tail segment; [`Log::roll_segment`] seals it and
/// starts a new one. Readers operate on a snapshot of the segment set taken
/// when the reader is created.
#[derive(Debug)]
pub struct Log {
    inner: Mutex<LogInner>,
    tracker: Arc<OffsetTracker>,
}

impl Log {
    /// Create an empty log starting at `base_offset`.
    pub fn new(base_offset: Offset) -> Self {
        Self {
            inner: Mutex::new(LogInner {
                sealed: Vec::new(),
                active_base: base_offset,
                active_last: Offset::INVALID,
                active: BytesMut::new(),
                next_offset: base_offset,
            }),
            tracker: Arc::new(OffsetTracker::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LogInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a batch at the end of the log.
    ///
    /// The batch's base offset is rewritten to the log's next offset; record
    /// offset deltas are relative to the base and stay valid. Returns the
    /// assigned base offset.
    pub fn append(&self, mut batch: RecordBatch) -> Result<Offset> {
        let mut inner = self.lock();
        let base = inner.next_offset;
        batch.set_base_offset(base);
        let last = batch.last_offset();
        batch.encode(&mut inner.active)?;
        inner.active_last = last;
        inner.next_offset = last.next();
        self.tracker.track_batch(base, last);
        debug!(base = %base, last = %last, "appended batch");
        Ok(base)
    }

    /// Seal the active segment and start a new one at the next offset.
    /// No-op while the active segment is empty.
    pub fn roll_segment(&self) {
        let mut inner = self.lock();
        if inner.active.is_empty() {
            return;
        }
        let data = inner.active.split().freeze();
        let segment = Segment::new(inner.active_base, inner.active_last, data);
        debug!(
            base = %segment.base_offset(),
            last = %segment.last_offset(),
            size = segment.size_bytes(),
            "sealed segment"
        );
        inner.sealed.push(segment);
        inner.active_base = inner.next_offset;
        inner.active_last = Offset::INVALID;
    }

    /// Snapshot the current segment set, active tail included.
    fn segment_set(&self) -> SegmentSet {
        let inner = self.lock();
        let mut segments = inner.sealed.clone();
        if !inner.active.is_empty() {
            segments.push(Segment::new(
                inner.active_base,
                inner.active_last,
                // The active segment is snapshotted; later appends are not
                // visible to this reader.
                BytesMut::from(&inner.active[..]).freeze(),
            ));
        }
        SegmentSet::new(segments)
    }

    /// Open a lazy, forward-only reader over the log.
    pub fn make_reader(&self, config: LogReaderConfig) -> LogReader {
        LogReader::new(self.segment_set(), self.tracker.clone(), config)
    }

    /// The log's batch-aligned offset window.
    pub fn tracker(&self) -> Arc<OffsetTracker> {
        self.tracker.clone()
    }

    pub fn segment_count(&self) -> usize {
        let inner = self.lock();
        inner.sealed.len() + usize::from(!inner.active.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }
}

/// Registry of the logs hosted by this node, keyed by NTP.
#[derive(Debug, Default)]
pub struct LogManager {
    logs: Mutex<HashMap<Ntp, Arc<Log>>>,
}

impl LogManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// The log for `ntp`, creating an empty one on first use.
    pub fn get_or_create(&self, ntp: Ntp) -> Arc<Log> {
        let mut logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        logs.entry(ntp.clone())
            .or_insert_with(|| {
                info!(ntp = %ntp, "creating log");
                Arc::new(Log::new(Offset::new(0)))
            })
            .clone()
    }

    pub fn get(&self, ntp: &Ntp) -> Option<Arc<Log>> {
        self.logs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(ntp)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.logs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::batch::{BatchRecords, BatchType, Record, RecordBatch, RecordBatchHeader};
    use crate::types::PartitionIndex;
    use bytes::Bytes;

    fn batch(records: usize) -> RecordBatch {
        let records: Vec<Record> = (0..records)
            .map(|i| {
                Record::new(
                    i as i32,
                    i as i32,
                    Bytes::from(format!("key-{i}")),
                    Bytes::from(format!("value-{i}")),
                )
            })
            .collect();
        let header = RecordBatchHeader {
            base_offset: Offset::new(0),
            batch_length: 0,
            crc: 0,
            attributes: 0,
            batch_type: BatchType::Data as i8,
            last_offset_delta: records.len() as i32 - 1,
            first_timestamp: 0,
            max_timestamp: 0,
            record_count: records.len() as i32,
        };
        RecordBatch::from_parts(header, BatchRecords::Decoded(records))
    }

    #[test]
    fn test_append_assigns_offsets() {
        let log = Log::new(Offset::new(0));
        assert_eq!(log.append(batch(3)).unwrap(), Offset::new(0));
        assert_eq!(log.append(batch(2)).unwrap(), Offset::new(3));
        assert_eq!(log.tracker().committed_offset(), Offset::new(4));
        assert_eq!(log.tracker().last_base_offset(), Offset::new(3));
    }

    #[test]
    fn test_roll_segment_seals_active() {
        let log = Log::new(Offset::new(0));
        log.append(batch(2)).unwrap();
        assert_eq!(log.segment_count(), 1);
        log.roll_segment();
        assert_eq!(log.segment_count(), 1);
        log.append(batch(1)).unwrap();
        assert_eq!(log.segment_count(), 2);
        // Rolling an empty active segment is a no-op.
        log.roll_segment();
        log.roll_segment();
        assert_eq!(log.segment_count(), 2);
    }

    #[test]
    fn test_log_manager_creates_once() {
        let mgr = LogManager::new();
        let ntp = Ntp::new("default", "orders", PartitionIndex::new(0));
        let a = mgr.get_or_create(ntp.clone());
        let b = mgr.get_or_create(ntp.clone());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(mgr.len(), 1);
        assert!(mgr.get(&ntp).is_some());
        assert!(mgr
            .get(&Ntp::new("default", "missing", PartitionIndex::new(0)))
            .is_none());
    }
}
