//! Immutable log segments, the ordered segment set, and segment selection.

use bytes::Bytes;

use crate::error::Result;
use crate::types::Offset;

/// One immutable, offset-ranged slice of a log.
///
/// A segment covers the inclusive offset range `[base_offset, last_offset]`.
/// The physical file I/O behind a segment lives below this crate; here a
/// segment exposes its raw bytes as a chunked stream addressable from the
/// start of the segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    base_offset: Offset,
    last_offset: Offset,
    data: Bytes,
}

impl Segment {
    pub fn new(base_offset: Offset, last_offset: Offset, data: Bytes) -> Self {
        Self {
            base_offset,
            last_offset,
            data,
        }
    }

    /// Base offset of the first batch in the segment.
    pub fn base_offset(&self) -> Offset {
        self.base_offset
    }

    /// Offset of the last record in the segment (inclusive).
    pub fn last_offset(&self) -> Offset {
        self.last_offset
    }

    /// Exclusive upper bound of the segment's offset range.
    pub fn end_offset(&self) -> Offset {
        self.last_offset.next()
    }

    /// Whether `offset` falls inside this segment's range.
    pub fn contains(&self, offset: Offset) -> bool {
        offset >= self.base_offset && offset <= self.last_offset
    }

    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Open a chunked byte stream over the segment.
    pub fn stream(&self, chunk_size: usize) -> SegmentStream {
        SegmentStream {
            data: self.data.clone(),
            pos: 0,
            chunk_size: chunk_size.max(1),
        }
    }
}

/// Chunked byte stream over one segment, the suspension point for segment
/// reads.
#[derive(Debug)]
pub struct SegmentStream {
    data: Bytes,
    pos: usize,
    chunk_size: usize,
}

impl SegmentStream {
    /// Next byte span of the segment, or `None` at end of segment.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if self.pos >= self.data.len() {
            return Ok(None);
        }
        let end = self.pos.saturating_add(self.chunk_size).min(self.data.len());
        let chunk = self.data.slice(self.pos..end);
        self.pos = end;
        Ok(Some(chunk))
    }

    pub fn bytes_remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

/// The ordered, non-overlapping set of segments composing one log.
#[derive(Debug, Clone, Default)]
pub struct SegmentSet {
    segments: Vec<Segment>,
}

impl SegmentSet {
    /// Build a set from segments already ordered by base offset.
    pub fn new(segments: Vec<Segment>) -> Self {
        debug_assert!(
            segments
                .windows(2)
                .all(|w| w[0].end_offset() <= w[1].base_offset()),
            "segments must be ordered and non-overlapping"
        );
        Self { segments }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }

    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    fn get(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }
}

/// Picks the segment containing a requested offset, scanning the ordered
/// segment set forward only.
///
/// When a reader exhausts a segment it asks for the offset one past the
/// segment's inclusive range; the selector then yields the next segment.
/// A segment is never yielded twice.
#[derive(Debug)]
pub struct SegmentSelector {
    set: SegmentSet,
    next_index: usize,
}

impl SegmentSelector {
    pub fn new(set: SegmentSet) -> Self {
        Self { set, next_index: 0 }
    }

    /// The segment whose range contains `offset`, or the first later
    /// segment if `offset` precedes the remaining set. `None` once the
    /// offset is beyond the end of the log.
    pub fn select(&mut self, offset: Offset) -> Option<Segment> {
        while let Some(segment) = self.set.get(self.next_index) {
            if offset > segment.last_offset() {
                self.next_index += 1;
                continue;
            }
            return Some(segment.clone());
        }
        None
    }

    /// Mark the most recently selected segment exhausted; it will never be
    /// yielded again even for offsets inside its range.
    pub fn advance(&mut self) {
        self.next_index += 1;
    }

    /// Whether a future `select` call could still yield a segment for
    /// `offset`.
    pub fn has_segment_for(&self, offset: Offset) -> bool {
        self.set
            .iter()
            .skip(self.next_index)
            .any(|segment| offset <= segment.last_offset())
    }
}
