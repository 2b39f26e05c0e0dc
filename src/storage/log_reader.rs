//! Continuous, offset-ordered batch sequence over a multi-segment log.

use std::collections::VecDeque;

use tracing::trace;

use crate::error::Result;
use crate::storage::batch::RecordBatch;
use crate::storage::offset_tracker::OffsetTracker;
use crate::storage::segment::{SegmentSelector, SegmentSet};
use crate::storage::segment_reader::SegmentReader;
use crate::types::{IoPriority, Offset};
use std::sync::Arc;

/// Configuration of one log read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogReaderConfig {
    /// First offset the caller wants to observe. Must be batch-aligned for
    /// exact positioning; an offset inside a batch yields the batch's
    /// post-start records, rebased.
    pub start_offset: Offset,
    /// Total byte budget across the whole read.
    pub max_bytes: u64,
    /// Minimum bytes accumulated before a slice is handed back, unless the
    /// stream ends first.
    pub min_bytes: u64,
    /// I/O priority class for the underlying segment reads.
    pub prio: IoPriority,
}

impl LogReaderConfig {
    /// Read everything from `start` with no byte budget.
    pub fn from_offset(start: Offset) -> Self {
        Self {
            start_offset: start,
            max_bytes: u64::MAX,
            min_bytes: 0,
            prio: IoPriority::Default,
        }
    }

    /// Controller recovery read: from offset zero, unbounded, empty log
    /// acceptable.
    pub fn controller_recovery() -> Self {
        Self {
            start_offset: Offset::new(0),
            max_bytes: u64::MAX,
            min_bytes: 0,
            prio: IoPriority::Controller,
        }
    }
}

/// Composes segment readers across a log's segment set into one continuous,
/// offset-ordered, forward-only batch sequence.
///
/// The reader advances the segment selector to open a new segment reader
/// whenever the current one reports completion, until the byte budget is
/// exhausted or no further segment exists. A segment is never re-opened once
/// exhausted.
///
/// The offset tracker only ever hands out base offsets, never an offset
/// inside a batch, because batches are made visible atomically; a tracker
/// offset used as `start_offset` lands exactly on a batch boundary.
#[derive(Debug)]
pub struct LogReader {
    selector: SegmentSelector,
    tracker: Arc<OffsetTracker>,
    config: LogReaderConfig,
    current: Option<SegmentReader>,
    pending: VecDeque<RecordBatch>,
    next_offset: Offset,
    bytes_consumed: u64,
}

impl LogReader {
    pub fn new(set: SegmentSet, tracker: Arc<OffsetTracker>, config: LogReaderConfig) -> Self {
        Self {
            selector: SegmentSelector::new(set),
            tracker,
            config,
            current: None,
            pending: VecDeque::new(),
            next_offset: config.start_offset,
            bytes_consumed: 0,
        }
    }

    /// Terminal condition: nothing buffered, no current segment reader, and
    /// no further segment available (or the byte budget is spent).
    pub fn is_done(&self) -> bool {
        if !self.pending.is_empty() {
            return false;
        }
        if self.bytes_consumed >= self.config.max_bytes {
            return true;
        }
        self.current.is_none() && !self.selector.has_segment_for(self.next_offset)
    }

    /// The next batch in offset order, or `None` once the log end or the
    /// byte budget is reached.
    pub async fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        loop {
            if let Some(batch) = self.pending.pop_front() {
                self.next_offset = batch.last_offset().next();
                return Ok(Some(batch));
            }
            if self.bytes_consumed >= self.config.max_bytes {
                return Ok(None);
            }

            if self.current.is_none() {
                match self.maybe_create_segment_reader() {
                    Some(reader) => self.current = Some(reader),
                    None => return Ok(None),
                }
            }
            let reader = match self.current.as_mut() {
                Some(reader) => reader,
                None => return Ok(None),
            };

            let slice = reader.next_slice().await?;
            if slice.is_empty() {
                // Current segment exhausted; account its bytes and move on.
                // Forward-only: the segment is never re-opened.
                self.bytes_consumed += reader.bytes_read();
                self.current = None;
                self.selector.advance();
                if !self.selector.has_segment_for(self.next_offset) {
                    return Ok(None);
                }
                continue;
            }
            self.pending.extend(slice);
        }
    }

    /// Open a reader over the segment containing `next_offset`, if any.
    fn maybe_create_segment_reader(&mut self) -> Option<SegmentReader> {
        let segment = self.selector.select(self.next_offset)?;
        let remaining = self.config.max_bytes - self.bytes_consumed;
        let config = LogReaderConfig {
            start_offset: self.next_offset,
            max_bytes: remaining,
            ..self.config
        };
        trace!(
            segment_base = %segment.base_offset(),
            start = %self.next_offset,
            "log reader advancing to next segment"
        );
        Some(SegmentReader::new(
            segment,
            self.tracker.committed_offset(),
            config,
        ))
    }

    pub fn config(&self) -> &LogReaderConfig {
        &self.config
    }
}
