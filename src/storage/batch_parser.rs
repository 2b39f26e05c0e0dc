//! Incremental record batch parser with a skipping consumer.
//!
//! The parser is a state machine driven by incoming byte spans:
//! *awaiting batch header* → *awaiting record key* (repeated per record) →
//! *awaiting record value* → *batch complete*; a *compressed payload* state
//! substitutes for the per-record states when a batch is marked compressed.
//!
//! At each state boundary the owning [`BatchConsumer`] may signal **skip** to
//! discard the remaining bytes of the current batch or record without
//! materializing them, or **stop** (at a batch boundary) to end the stream
//! early. Malformed input is a hard decode error; no partial batch is ever
//! surfaced.

use bytes::{Buf, Bytes, BytesMut};
use nom::bytes::streaming::take;
use nom::number::streaming::{be_i16, be_i32, be_i64, be_i8, be_u32};

use crate::constants::{
    MAX_BATCH_PAYLOAD_SIZE, MAX_BATCH_RECORD_COUNT, RECORD_BATCH_HEADER_SIZE,
    RECORD_FRAMING_OVERHEAD,
};
use crate::error::{Error, Result};
use crate::storage::batch::{crc32c_finalize, crc32c_init, crc32c_update, RecordBatchHeader};
use crate::types::Offset;

/// Skip decision returned by a consumer at a batch or record boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    Yes,
    No,
}

/// Stop decision returned by a consumer once a batch completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopParser {
    Yes,
    No,
}

/// Outcome of feeding the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    /// The parser consumed what it could and needs more bytes.
    NeedMore,
    /// The consumer requested the stream to stop at a batch boundary.
    Stopped,
}

/// Receives decode events from the parser and steers it.
pub trait BatchConsumer {
    /// A batch header was decoded. Returning [`Skip::Yes`] discards the
    /// whole batch without materializing its records.
    fn consume_batch_start(&mut self, header: RecordBatchHeader, num_records: i32) -> Skip;

    /// A record's metadata and key were decoded. Returning [`Skip::Yes`]
    /// discards the record's value.
    fn consume_record_key(
        &mut self,
        size_bytes: u32,
        timestamp_delta: i32,
        offset_delta: i32,
        key: Bytes,
    ) -> Skip;

    /// The value completing the record last announced via
    /// `consume_record_key`.
    fn consume_record_value(&mut self, value: Bytes);

    /// The opaque payload of a compressed batch, in place of the per-record
    /// events.
    fn consume_compressed_records(&mut self, payload: Bytes);

    /// The current batch is fully consumed. Returning [`StopParser::Yes`]
    /// ends the stream at this batch boundary.
    fn consume_batch_end(&mut self) -> StopParser;
}

#[derive(Debug, Clone, Copy)]
enum ParseState {
    AwaitingHeader,
    SkippingBatch,
    CompressedPayload,
    AwaitingRecordKey { remaining: i32 },
    AwaitingRecordValue { remaining: i32 },
    SkippingRecordValue { remaining: i32, to_skip: usize },
}

/// Streaming parser producing batch/record events across byte span
/// boundaries. One instance parses one contiguous byte stream; batches never
/// straddle parser instances.
#[derive(Debug)]
pub struct ContinuousBatchParser {
    state: ParseState,
    /// CRC stored in the current batch header.
    expected_crc: u32,
    /// Running CRC over the records section consumed so far.
    crc: u32,
    /// Bytes of the current batch's records section not yet consumed.
    payload_remaining: usize,
}

impl ContinuousBatchParser {
    pub fn new() -> Self {
        Self {
            state: ParseState::AwaitingHeader,
            expected_crc: 0,
            crc: crc32c_init(),
            payload_remaining: 0,
        }
    }

    /// Whether the parser sits at a clean batch boundary. A byte stream may
    /// only end while this holds; anything else is a truncated batch.
    pub fn at_batch_boundary(&self) -> bool {
        matches!(self.state, ParseState::AwaitingHeader)
    }

    /// Drive the state machine over `buf`, emitting events into `consumer`.
    ///
    /// Consumes decoded bytes from the front of `buf`. Returns
    /// [`ParseStatus::NeedMore`] once the buffered bytes are exhausted
    /// mid-element, or [`ParseStatus::Stopped`] when the consumer ended the
    /// stream at a batch boundary.
    pub fn parse<C: BatchConsumer>(
        &mut self,
        buf: &mut BytesMut,
        consumer: &mut C,
    ) -> Result<ParseStatus> {
        loop {
            match self.state {
                ParseState::AwaitingHeader => {
                    if buf.len() < RECORD_BATCH_HEADER_SIZE {
                        return Ok(ParseStatus::NeedMore);
                    }
                    let header = decode_batch_header(&buf[..RECORD_BATCH_HEADER_SIZE])?;
                    validate_header(&header, buf)?;
                    buf.advance(RECORD_BATCH_HEADER_SIZE);

                    self.expected_crc = header.crc;
                    self.crc = crc32c_init();
                    self.payload_remaining = header.batch_length as usize;

                    let num_records = header.record_count;
                    let compressed = header.compressed();
                    match consumer.consume_batch_start(header, num_records) {
                        Skip::Yes => {
                            self.state = if self.payload_remaining == 0 {
                                ParseState::AwaitingHeader
                            } else {
                                ParseState::SkippingBatch
                            };
                        }
                        Skip::No if compressed => {
                            self.state = ParseState::CompressedPayload;
                        }
                        Skip::No => {
                            if num_records == 0 {
                                if let Some(status) = self.finish_batch(buf, consumer)? {
                                    return Ok(status);
                                }
                            } else {
                                self.state = ParseState::AwaitingRecordKey {
                                    remaining: num_records,
                                };
                            }
                        }
                    }
                }

                ParseState::SkippingBatch => {
                    let take_bytes = buf.len().min(self.payload_remaining);
                    buf.advance(take_bytes);
                    self.payload_remaining -= take_bytes;
                    if self.payload_remaining == 0 {
                        self.state = ParseState::AwaitingHeader;
                    } else {
                        return Ok(ParseStatus::NeedMore);
                    }
                }

                ParseState::CompressedPayload => {
                    if buf.len() < self.payload_remaining {
                        return Ok(ParseStatus::NeedMore);
                    }
                    let payload = buf.split_to(self.payload_remaining).freeze();
                    self.crc = crc32c_update(self.crc, &payload);
                    self.payload_remaining = 0;
                    consumer.consume_compressed_records(payload);
                    if let Some(status) = self.finish_batch(buf, consumer)? {
                        return Ok(status);
                    }
                }

                ParseState::AwaitingRecordKey { remaining } => {
                    let input: &[u8] = buf;
                    let (rest, (size_bytes, timestamp_delta, offset_delta, key_len)) =
                        match record_prelude(input) {
                            Ok(parsed) => parsed,
                            Err(nom::Err::Incomplete(_)) => return Ok(ParseStatus::NeedMore),
                            Err(_) => return Err(parse_error(buf)),
                        };
                    let size = size_bytes as usize;
                    let key_len_usize = key_len as usize;
                    if size < RECORD_FRAMING_OVERHEAD + key_len_usize
                        || size + 4 > self.payload_remaining
                    {
                        return Err(parse_error(buf));
                    }
                    let (rest, key_slice) = match take::<_, _, nom::error::Error<&[u8]>>(key_len_usize)(rest) {
                        Ok(parsed) => parsed,
                        Err(nom::Err::Incomplete(_)) => return Ok(ParseStatus::NeedMore),
                        Err(_) => return Err(parse_error(buf)),
                    };
                    let key = Bytes::copy_from_slice(key_slice);
                    let consumed = input.len() - rest.len();
                    self.crc = crc32c_update(self.crc, &buf[..consumed]);
                    buf.advance(consumed);
                    self.payload_remaining -= consumed;

                    match consumer.consume_record_key(
                        size_bytes,
                        timestamp_delta,
                        offset_delta,
                        key,
                    ) {
                        Skip::No => {
                            self.state = ParseState::AwaitingRecordValue { remaining };
                        }
                        Skip::Yes => {
                            // Everything after the prelude and key: the
                            // framed value.
                            let to_skip = size - 12 - key_len_usize;
                            self.state = ParseState::SkippingRecordValue { remaining, to_skip };
                        }
                    }
                }

                ParseState::AwaitingRecordValue { remaining } => {
                    let input: &[u8] = buf;
                    let (rest, value_slice) = match record_value(input) {
                        Ok(parsed) => parsed,
                        Err(nom::Err::Incomplete(_)) => return Ok(ParseStatus::NeedMore),
                        Err(_) => return Err(parse_error(buf)),
                    };
                    let consumed = input.len() - rest.len();
                    if consumed > self.payload_remaining {
                        return Err(parse_error(buf));
                    }
                    let value = Bytes::copy_from_slice(value_slice);
                    self.crc = crc32c_update(self.crc, &buf[..consumed]);
                    buf.advance(consumed);
                    self.payload_remaining -= consumed;

                    consumer.consume_record_value(value);
                    if let Some(status) = self.record_done(remaining, buf, consumer)? {
                        return Ok(status);
                    }
                }

                ParseState::SkippingRecordValue { remaining, to_skip } => {
                    let take_bytes = buf.len().min(to_skip);
                    if take_bytes > self.payload_remaining {
                        return Err(parse_error(buf));
                    }
                    self.crc = crc32c_update(self.crc, &buf[..take_bytes]);
                    buf.advance(take_bytes);
                    self.payload_remaining -= take_bytes;
                    let left = to_skip - take_bytes;
                    if left > 0 {
                        self.state = ParseState::SkippingRecordValue {
                            remaining,
                            to_skip: left,
                        };
                        return Ok(ParseStatus::NeedMore);
                    }
                    if let Some(status) = self.record_done(remaining, buf, consumer)? {
                        return Ok(status);
                    }
                }
            }
        }
    }

    /// One record of the current batch finished; move to the next record or
    /// close the batch.
    fn record_done<C: BatchConsumer>(
        &mut self,
        remaining: i32,
        buf: &BytesMut,
        consumer: &mut C,
    ) -> Result<Option<ParseStatus>> {
        let remaining = remaining - 1;
        if remaining > 0 {
            self.state = ParseState::AwaitingRecordKey { remaining };
            return Ok(None);
        }
        self.finish_batch(buf, consumer)
    }

    /// Validate the fully consumed batch and emit the batch-end event.
    fn finish_batch<C: BatchConsumer>(
        &mut self,
        buf: &BytesMut,
        consumer: &mut C,
    ) -> Result<Option<ParseStatus>> {
        if self.payload_remaining != 0 {
            return Err(parse_error(buf));
        }
        let computed = crc32c_finalize(self.crc);
        if computed != self.expected_crc {
            return Err(Error::CrcMismatch {
                stored: self.expected_crc,
                computed,
            });
        }
        self.state = ParseState::AwaitingHeader;
        match consumer.consume_batch_end() {
            StopParser::Yes => Ok(Some(ParseStatus::Stopped)),
            StopParser::No => Ok(None),
        }
    }
}

impl Default for ContinuousBatchParser {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_error(buf: &BytesMut) -> Error {
    Error::ParsingError(Bytes::copy_from_slice(&buf[..buf.len().min(64)]))
}

fn batch_header(input: &[u8]) -> nom::IResult<&[u8], RecordBatchHeader> {
    let (i, base_offset) = be_i64(input)?;
    let (i, batch_length) = be_u32(i)?;
    let (i, crc) = be_u32(i)?;
    let (i, attributes) = be_i16(i)?;
    let (i, batch_type) = be_i8(i)?;
    let (i, last_offset_delta) = be_i32(i)?;
    let (i, first_timestamp) = be_i64(i)?;
    let (i, max_timestamp) = be_i64(i)?;
    let (i, record_count) = be_i32(i)?;
    Ok((
        i,
        RecordBatchHeader {
            base_offset: Offset::new(base_offset),
            batch_length,
            crc,
            attributes,
            batch_type,
            last_offset_delta,
            first_timestamp,
            max_timestamp,
            record_count,
        },
    ))
}

fn decode_batch_header(input: &[u8]) -> Result<RecordBatchHeader> {
    match batch_header(input) {
        Ok((_, header)) => Ok(header),
        Err(_) => Err(Error::ParsingError(Bytes::copy_from_slice(input))),
    }
}

fn validate_header(header: &RecordBatchHeader, buf: &BytesMut) -> Result<()> {
    if header.batch_length as usize > MAX_BATCH_PAYLOAD_SIZE
        || header.record_count < 0
        || header.record_count > MAX_BATCH_RECORD_COUNT
        || header.last_offset_delta < 0
        || !header.base_offset.is_valid()
    {
        return Err(parse_error(buf));
    }
    Ok(())
}

fn record_prelude(input: &[u8]) -> nom::IResult<&[u8], (u32, i32, i32, u32)> {
    let (i, size_bytes) = be_u32(input)?;
    let (i, timestamp_delta) = be_i32(i)?;
    let (i, offset_delta) = be_i32(i)?;
    let (i, key_len) = be_u32(i)?;
    Ok((i, (size_bytes, timestamp_delta, offset_delta, key_len)))
}

fn record_value(input: &[u8]) -> nom::IResult<&[u8], &[u8]> {
    let (i, value_len) = be_u32(input)?;
    take(value_len as usize)(i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::batch::{BatchRecords, BatchType, Record, RecordBatch};
    use crate::encode::ToByte;
    use bytes::BufMut;

    /// Consumer collecting every event, optionally skipping and stopping.
    #[derive(Default)]
    struct CollectingConsumer {
        headers: Vec<RecordBatchHeader>,
        records: Vec<(i32, Bytes, Bytes)>,
        compressed: Vec<Bytes>,
        batches_done: usize,
        skip_batches_below: Option<i64>,
        stop_after: Option<usize>,
        pending: Option<(i32, Bytes)>,
    }

    impl BatchConsumer for CollectingConsumer {
        fn consume_batch_start(&mut self, header: RecordBatchHeader, _n: i32) -> Skip {
            if let Some(min) = self.skip_batches_below {
                if header.last_offset().value() < min {
                    return Skip::Yes;
                }
            }
            self.headers.push(header);
            Skip::No
        }

        fn consume_record_key(&mut self, _size: u32, _ts: i32, off: i32, key: Bytes) -> Skip {
            self.pending = Some((off, key));
            Skip::No
        }

        fn consume_record_value(&mut self, value: Bytes) {
            let (off, key) = self.pending.take().expect("value without key");
            self.records.push((off, key, value));
        }

        fn consume_compressed_records(&mut self, payload: Bytes) {
            self.compressed.push(payload);
        }

        fn consume_batch_end(&mut self) -> StopParser {
            self.batches_done += 1;
            match self.stop_after {
                Some(n) if self.batches_done >= n => StopParser::Yes,
                _ => StopParser::No,
            }
        }
    }

    fn encode_batch(base: i64, keys_values: &[(&str, &str)]) -> BytesMut {
        let records: Vec<Record> = keys_values
            .iter()
            .enumerate()
            .map(|(i, (k, v))| {
                Record::new(
                    i as i32,
                    i as i32,
                    Bytes::copy_from_slice(k.as_bytes()),
                    Bytes::copy_from_slice(v.as_bytes()),
                )
            })
            .collect();
        let header = RecordBatchHeader {
            base_offset: Offset::new(base),
            batch_length: 0,
            crc: 0,
            attributes: 0,
            batch_type: BatchType::Data as i8,
            last_offset_delta: (records.len() as i32 - 1).max(0),
            first_timestamp: 0,
            max_timestamp: 0,
            record_count: records.len() as i32,
        };
        let batch = RecordBatch::from_parts(header, BatchRecords::Decoded(records));
        let mut buf = BytesMut::new();
        batch.encode(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_parse_single_batch() {
        let mut buf = encode_batch(0, &[("a", "1"), ("b", "2")]);
        let mut parser = ContinuousBatchParser::new();
        let mut consumer = CollectingConsumer::default();

        let status = parser.parse(&mut buf, &mut consumer).unwrap();
        assert_eq!(status, ParseStatus::NeedMore);
        assert!(parser.at_batch_boundary());
        assert_eq!(consumer.batches_done, 1);
        assert_eq!(consumer.records.len(), 2);
        assert_eq!(consumer.records[0].1.as_ref(), b"a");
        assert_eq!(consumer.records[1].2.as_ref(), b"2");
    }

    #[test]
    fn test_parse_across_byte_spans() {
        let encoded = encode_batch(0, &[("key", "value"), ("other", "payload")]);
        let mut parser = ContinuousBatchParser::new();
        let mut consumer = CollectingConsumer::default();
        let mut buf = BytesMut::new();

        // Feed one byte at a time; the parser must resume at every boundary.
        for byte in encoded.iter() {
            buf.put_u8(*byte);
            parser.parse(&mut buf, &mut consumer).unwrap();
        }
        assert_eq!(consumer.batches_done, 1);
        assert_eq!(consumer.records.len(), 2);
    }

    #[test]
    fn test_skipped_batch_produces_no_events() {
        let mut buf = encode_batch(0, &[("a", "1")]);
        buf.extend_from_slice(&encode_batch(1, &[("b", "2")]));
        let mut parser = ContinuousBatchParser::new();
        let mut consumer = CollectingConsumer {
            skip_batches_below: Some(1),
            ..Default::default()
        };

        parser.parse(&mut buf, &mut consumer).unwrap();
        // Only the second batch surfaced; the skipped one saw no batch_end.
        assert_eq!(consumer.batches_done, 1);
        assert_eq!(consumer.records.len(), 1);
        assert_eq!(consumer.records[0].1.as_ref(), b"b");
    }

    #[test]
    fn test_stop_at_batch_boundary() {
        let mut buf = encode_batch(0, &[("a", "1")]);
        buf.extend_from_slice(&encode_batch(1, &[("b", "2")]));
        let mut parser = ContinuousBatchParser::new();
        let mut consumer = CollectingConsumer {
            stop_after: Some(1),
            ..Default::default()
        };

        let status = parser.parse(&mut buf, &mut consumer).unwrap();
        assert_eq!(status, ParseStatus::Stopped);
        assert_eq!(consumer.batches_done, 1);
        // The second batch stays in the buffer untouched.
        assert!(!buf.is_empty());
    }

    #[test]
    fn test_compressed_batch_event() {
        let payload = Bytes::from_static(b"opaque-compressed-blob");
        let header = RecordBatchHeader {
            base_offset: Offset::new(7),
            batch_length: 0,
            crc: 0,
            attributes: 0x1,
            batch_type: BatchType::Controller as i8,
            last_offset_delta: 2,
            first_timestamp: 0,
            max_timestamp: 0,
            record_count: 3,
        };
        let batch = RecordBatch::from_parts(header, BatchRecords::Compressed(payload.clone()));
        let mut buf = BytesMut::new();
        batch.encode(&mut buf).unwrap();

        let mut parser = ContinuousBatchParser::new();
        let mut consumer = CollectingConsumer::default();
        parser.parse(&mut buf, &mut consumer).unwrap();

        assert_eq!(consumer.compressed.len(), 1);
        assert_eq!(consumer.compressed[0], payload);
        assert!(consumer.records.is_empty());
    }

    #[test]
    fn test_corrupt_crc_is_decode_error() {
        let mut buf = encode_batch(0, &[("a", "1")]);
        // Flip a byte inside the records section.
        let last = buf.len() - 1;
        buf[last] ^= 0xFF;

        let mut parser = ContinuousBatchParser::new();
        let mut consumer = CollectingConsumer::default();
        let err = parser.parse(&mut buf, &mut consumer).unwrap_err();
        assert!(matches!(err, Error::CrcMismatch { .. }));
    }

    #[test]
    fn test_bogus_header_is_decode_error() {
        let mut buf = BytesMut::new();
        // A header claiming a negative record count.
        let header = RecordBatchHeader {
            base_offset: Offset::new(0),
            batch_length: 4,
            crc: 0,
            attributes: 0,
            batch_type: 1,
            last_offset_delta: 0,
            first_timestamp: 0,
            max_timestamp: 0,
            record_count: -2,
        };
        header.encode(&mut buf).unwrap();
        buf.extend_from_slice(&[0, 0, 0, 0]);

        let mut parser = ContinuousBatchParser::new();
        let mut consumer = CollectingConsumer::default();
        assert!(parser.parse(&mut buf, &mut consumer).is_err());
    }

    #[test]
    fn test_mid_batch_is_not_a_boundary() {
        let encoded = encode_batch(0, &[("abc", "def")]);
        let mut parser = ContinuousBatchParser::new();
        let mut consumer = CollectingConsumer::default();

        let mut buf = BytesMut::from(&encoded[..RECORD_BATCH_HEADER_SIZE + 3]);
        parser.parse(&mut buf, &mut consumer).unwrap();
        assert!(!parser.at_batch_boundary());
    }
}
