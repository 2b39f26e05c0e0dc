//! Drives the batch parser over one segment's byte stream.

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::constants::{MAX_READER_BUFFER_SIZE, SEGMENT_READ_CHUNK_SIZE};
use crate::error::{Error, Result};
use crate::storage::batch::{BatchRecords, Record, RecordBatch, RecordBatchHeader};
use crate::storage::batch_parser::{
    BatchConsumer, ContinuousBatchParser, ParseStatus, Skip, StopParser,
};
use crate::storage::log_reader::LogReaderConfig;
use crate::storage::segment::{Segment, SegmentStream};
use crate::types::Offset;

/// Record fields staged between the key and value events.
#[derive(Debug)]
struct StagedRecord {
    size_bytes: u32,
    timestamp_delta: i32,
    offset_delta: i32,
    key: Bytes,
}

/// Consumer enforcing the reader's start-offset, committed-offset and byte
/// budgets while assembling decoded batches.
///
/// Batches entirely before the start offset are skipped without
/// materialization. A batch straddling the start offset is decoded, its
/// pre-start records are suppressed and the surfaced batch is rebased to the
/// first kept record, so no exposed batch ever starts below the configured
/// start offset; the condition is tracked as `over_committed_offset`.
#[derive(Debug)]
pub(crate) struct SkippingConsumer {
    start_offset: Offset,
    /// Last offset this reader may surface; batches past it are not visible.
    max_offset: Offset,
    max_bytes: u64,
    min_slice_bytes: u64,

    header: Option<RecordBatchHeader>,
    staged: Option<StagedRecord>,
    records: Vec<Record>,
    compressed: Option<Bytes>,
    suppressed_records: i32,

    buffer: Vec<RecordBatch>,
    buffer_bytes: usize,
    bytes_consumed: u64,
    slice_bytes: u64,

    over_committed_offset: bool,
    past_end: bool,
}

impl SkippingConsumer {
    fn new(config: &LogReaderConfig, max_offset: Offset) -> Self {
        Self {
            start_offset: config.start_offset,
            max_offset,
            max_bytes: config.max_bytes,
            min_slice_bytes: config.min_bytes,
            header: None,
            staged: None,
            records: Vec::new(),
            compressed: None,
            suppressed_records: 0,
            buffer: Vec::new(),
            buffer_bytes: 0,
            bytes_consumed: 0,
            slice_bytes: 0,
            over_committed_offset: false,
            past_end: false,
        }
    }

    fn drain(&mut self) -> Vec<RecordBatch> {
        self.buffer_bytes = 0;
        self.slice_bytes = 0;
        std::mem::take(&mut self.buffer)
    }

    fn budget_exhausted(&self) -> bool {
        self.bytes_consumed >= self.max_bytes
    }

    /// Rebase a straddling batch to its first kept record: the surfaced
    /// batch starts at the first post-start record, never below the start
    /// offset.
    fn rebase(header: &mut RecordBatchHeader, records: &mut [Record]) {
        let shift = match records.first() {
            Some(first) => first.offset_delta,
            None => return,
        };
        header.base_offset = header.base_offset.add(shift as i64);
        header.record_count = records.len() as i32;
        header.last_offset_delta = records
            .last()
            .map(|r| r.offset_delta - shift)
            .unwrap_or(0);
        for record in records {
            record.offset_delta -= shift;
        }
    }
}

impl BatchConsumer for SkippingConsumer {
    fn consume_batch_start(&mut self, header: RecordBatchHeader, _num_records: i32) -> Skip {
        if header.base_offset > self.max_offset {
            // Past the visible end of the log; nothing further is surfaced.
            self.past_end = true;
            return Skip::Yes;
        }
        if header.last_offset() < self.start_offset {
            return Skip::Yes;
        }
        if header.compressed() && header.base_offset < self.start_offset {
            // An opaque payload cannot be split at the start offset; the
            // whole batch is suppressed rather than partially surfaced.
            self.over_committed_offset = true;
            return Skip::Yes;
        }
        self.records = Vec::with_capacity(header.record_count.max(0) as usize);
        self.compressed = None;
        self.suppressed_records = 0;
        self.header = Some(header);
        Skip::No
    }

    fn consume_record_key(
        &mut self,
        size_bytes: u32,
        timestamp_delta: i32,
        offset_delta: i32,
        key: Bytes,
    ) -> Skip {
        let base = match &self.header {
            Some(header) => header.base_offset,
            None => return Skip::Yes,
        };
        if base.add(offset_delta as i64) < self.start_offset {
            self.suppressed_records += 1;
            self.over_committed_offset = true;
            return Skip::Yes;
        }
        self.staged = Some(StagedRecord {
            size_bytes,
            timestamp_delta,
            offset_delta,
            key,
        });
        Skip::No
    }

    fn consume_record_value(&mut self, value: Bytes) {
        if let Some(staged) = self.staged.take() {
            self.records.push(Record {
                size_bytes: staged.size_bytes,
                timestamp_delta: staged.timestamp_delta,
                offset_delta: staged.offset_delta,
                key: staged.key,
                value,
            });
        }
    }

    fn consume_compressed_records(&mut self, payload: Bytes) {
        self.compressed = Some(payload);
    }

    fn consume_batch_end(&mut self) -> StopParser {
        let mut header = match self.header.take() {
            Some(header) => header,
            None => return StopParser::Yes,
        };
        let size = header.size_on_disk();
        let records = match self.compressed.take() {
            Some(payload) => BatchRecords::Compressed(payload),
            None => {
                let mut records = std::mem::take(&mut self.records);
                if self.suppressed_records > 0 {
                    Self::rebase(&mut header, &mut records);
                }
                BatchRecords::Decoded(records)
            }
        };
        self.buffer.push(RecordBatch::from_parts(header, records));
        self.buffer_bytes += size;
        self.bytes_consumed += size as u64;
        self.slice_bytes += size as u64;

        if self.budget_exhausted()
            || self.buffer_bytes >= MAX_READER_BUFFER_SIZE
            || self.slice_bytes >= self.min_slice_bytes.max(1)
        {
            StopParser::Yes
        } else {
            StopParser::No
        }
    }
}

/// Reads decoded batches from one segment under the configured budgets.
///
/// The internal batch buffer is bounded; once it fills, no further parsing
/// occurs until the caller drains it via [`SegmentReader::next_slice`].
#[derive(Debug)]
pub struct SegmentReader {
    segment: Segment,
    config: LogReaderConfig,
    stream: SegmentStream,
    parser: ContinuousBatchParser,
    consumer: SkippingConsumer,
    buf: BytesMut,
    end_of_stream: bool,
}

impl SegmentReader {
    /// Open a reader over `segment`. `max_offset` bounds what is visible,
    /// normally the log's committed offset.
    pub fn new(segment: Segment, max_offset: Offset, config: LogReaderConfig) -> Self {
        trace!(
            base = %segment.base_offset(),
            last = %segment.last_offset(),
            start = %config.start_offset,
            prio = config.prio.as_label(),
            "opening segment reader"
        );
        let consumer = SkippingConsumer::new(&config, max_offset);
        let stream = segment.stream(SEGMENT_READ_CHUNK_SIZE);
        Self {
            segment,
            config,
            stream,
            parser: ContinuousBatchParser::new(),
            consumer,
            buf: BytesMut::new(),
            end_of_stream: false,
        }
    }

    /// Total bytes of surfaced batches consumed so far.
    pub fn bytes_read(&self) -> u64 {
        self.consumer.bytes_consumed
    }

    /// Whether a batch straddling the start offset was suppressed or
    /// truncated to its post-start records.
    pub fn over_committed_offset(&self) -> bool {
        self.consumer.over_committed_offset
    }

    /// Whether this reader has nothing further to produce.
    pub fn is_done(&self) -> bool {
        self.end_of_stream || self.consumer.past_end || self.consumer.budget_exhausted()
    }

    /// Allow further reads on a reader that previously reached the end of
    /// the stream. Useful to implement cached readers that can continue a
    /// read where it left off: the stream position is kept, budgets restart.
    pub fn reset_state(&mut self) {
        self.end_of_stream = false;
        self.consumer.past_end = false;
        self.consumer.over_committed_offset = false;
        self.consumer.bytes_consumed = 0;
        self.consumer.slice_bytes = 0;
    }

    /// Decode the next run of batches. An empty slice means the reader is
    /// done (end of segment, past the visible end, or budget exhausted).
    pub async fn next_slice(&mut self) -> Result<Vec<RecordBatch>> {
        if self.is_done() {
            return Ok(self.consumer.drain());
        }
        loop {
            match self.parser.parse(&mut self.buf, &mut self.consumer)? {
                ParseStatus::Stopped => break,
                ParseStatus::NeedMore => {
                    if self.consumer.past_end {
                        self.end_of_stream = true;
                        break;
                    }
                    match self.stream.next_chunk().await? {
                        Some(chunk) => self.buf.extend_from_slice(&chunk),
                        None => {
                            if !self.buf.is_empty() || !self.parser.at_batch_boundary() {
                                return Err(Error::TruncatedData(format!(
                                    "segment [{}, {}] ended mid-batch",
                                    self.segment.base_offset(),
                                    self.segment.last_offset()
                                )));
                            }
                            self.end_of_stream = true;
                            break;
                        }
                    }
                }
            }
        }
        Ok(self.consumer.drain())
    }

    pub fn config(&self) -> &LogReaderConfig {
        &self.config
    }
}
