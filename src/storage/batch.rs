//! Record batch model and on-disk framing.
//!
//! Batches are the unit of atomic visibility in a log: a reader never
//! observes a partial batch, and every offset exposed outside the storage
//! layer denotes a batch boundary.
//!
//! # Record Batch Layout
//!
//! The batch header (first 43 bytes) contains:
//! ```text
//! Offset  Size  Field
//! 0       8     base_offset
//! 8       4     batch_length (records section length)
//! 12      4     crc (over the records section)
//! 16      2     attributes (bit 0: compressed)
//! 18      1     batch_type
//! 19      4     last_offset_delta
//! 23      8     first_timestamp
//! 31      8     max_timestamp
//! 39      4     record_count
//! ```
//!
//! The CRC excludes the header, so a broker can patch `base_offset` when a
//! batch built against offset zero is appended at its real position without
//! recomputing the checksum.

use bytes::{BufMut, Bytes, BytesMut};
use num_derive::FromPrimitive;

use crate::constants::{RECORD_BATCH_HEADER_SIZE, RECORD_FRAMING_OVERHEAD};
use crate::encode::ToByte;
use crate::error::Result;
use crate::types::Offset;

// CRC-32C polynomial (Castagnoli), the checksum used for record batch
// integrity verification.
const CRC32C_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0x82F63B78;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// Initial state for an incremental CRC-32C computation.
pub(crate) const fn crc32c_init() -> u32 {
    !0u32
}

/// Fold `data` into a running CRC-32C state.
pub(crate) fn crc32c_update(mut crc: u32, data: &[u8]) -> u32 {
    for &byte in data {
        let index = ((crc ^ byte as u32) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32C_TABLE[index];
    }
    crc
}

/// Finalize a running CRC-32C state.
pub(crate) const fn crc32c_finalize(crc: u32) -> u32 {
    !crc
}

/// Compute the CRC-32C checksum of `data` in one shot.
pub fn crc32c(data: &[u8]) -> u32 {
    crc32c_finalize(crc32c_update(crc32c_init(), data))
}

/// Type tag carried by every record batch.
///
/// Readers ignore batch types they are not interested in; the controller
/// only applies batches tagged [`BatchType::Controller`] during recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum BatchType {
    /// Regular data-path payload.
    Data = 1,
    /// Controller metadata records.
    Controller = 2,
}

/// Attribute bit marking the records section as compressed.
const COMPRESSED_ATTRIBUTE: i16 = 0x1;

/// Decoded record batch header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordBatchHeader {
    /// Offset of the first record in the batch.
    pub base_offset: Offset,
    /// Byte length of the records section following the header.
    pub batch_length: u32,
    /// CRC-32C over the records section.
    pub crc: u32,
    /// Attribute flags; bit 0 marks a compressed records section.
    pub attributes: i16,
    /// Raw batch type tag. See [`BatchType`].
    pub batch_type: i8,
    /// Offset delta of the last record relative to `base_offset`.
    pub last_offset_delta: i32,
    /// Timestamp of the first record (milliseconds).
    pub first_timestamp: i64,
    /// Largest record timestamp in the batch (milliseconds).
    pub max_timestamp: i64,
    /// Number of records in the batch.
    pub record_count: i32,
}

impl RecordBatchHeader {
    /// Whether the records section is compressed.
    pub fn compressed(&self) -> bool {
        self.attributes & COMPRESSED_ATTRIBUTE != 0
    }

    /// Offset of the last record in the batch.
    pub fn last_offset(&self) -> Offset {
        self.base_offset.add(self.last_offset_delta as i64)
    }

    /// Total encoded size of the batch, header included.
    pub fn size_on_disk(&self) -> usize {
        RECORD_BATCH_HEADER_SIZE + self.batch_length as usize
    }

    /// The batch type, if the tag is recognized.
    pub fn typed(&self) -> Option<BatchType> {
        num_traits::FromPrimitive::from_i8(self.batch_type)
    }
}

impl ToByte for RecordBatchHeader {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.base_offset.encode(buffer)?;
        self.batch_length.encode(buffer)?;
        self.crc.encode(buffer)?;
        self.attributes.encode(buffer)?;
        self.batch_type.encode(buffer)?;
        self.last_offset_delta.encode(buffer)?;
        self.first_timestamp.encode(buffer)?;
        self.max_timestamp.encode(buffer)?;
        self.record_count.encode(buffer)
    }
}

/// A single key/value record plus its per-record metadata.
///
/// A record is owned exclusively by its containing batch while being
/// decoded and is transferred to the consumer once decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Byte length of the record after the size field itself.
    pub size_bytes: u32,
    /// Timestamp delta relative to the batch's first timestamp.
    pub timestamp_delta: i32,
    /// Offset delta relative to the batch's base offset.
    pub offset_delta: i32,
    /// Record key.
    pub key: Bytes,
    /// Record value.
    pub value: Bytes,
}

impl Record {
    /// Create a record, computing its framed size.
    pub fn new(timestamp_delta: i32, offset_delta: i32, key: Bytes, value: Bytes) -> Self {
        let size_bytes = (RECORD_FRAMING_OVERHEAD + key.len() + value.len()) as u32;
        Self {
            size_bytes,
            timestamp_delta,
            offset_delta,
            key,
            value,
        }
    }
}

impl ToByte for Record {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.size_bytes.encode(buffer)?;
        self.timestamp_delta.encode(buffer)?;
        self.offset_delta.encode(buffer)?;
        (self.key.len() as u32).encode(buffer)?;
        buffer.put(self.key.clone());
        (self.value.len() as u32).encode(buffer)?;
        buffer.put(self.value.clone());
        Ok(())
    }
}

/// Records carried by a batch: either individually framed records or one
/// opaque compressed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchRecords {
    /// Individually decoded records.
    Decoded(Vec<Record>),
    /// Opaque compressed records section.
    Compressed(Bytes),
}

/// An atomically-visible, ordered sequence of records plus its header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordBatch {
    header: RecordBatchHeader,
    records: BatchRecords,
}

impl RecordBatch {
    /// Assemble a batch from a decoded header and records.
    pub fn from_parts(header: RecordBatchHeader, records: BatchRecords) -> Self {
        Self { header, records }
    }

    pub fn header(&self) -> &RecordBatchHeader {
        &self.header
    }

    pub fn base_offset(&self) -> Offset {
        self.header.base_offset
    }

    /// Offset of the last record in the batch.
    pub fn last_offset(&self) -> Offset {
        self.header.last_offset()
    }

    pub fn record_count(&self) -> i32 {
        self.header.record_count
    }

    pub fn compressed(&self) -> bool {
        self.header.compressed()
    }

    /// The batch type, if the tag is recognized.
    pub fn batch_type(&self) -> Option<BatchType> {
        self.header.typed()
    }

    pub fn records(&self) -> &BatchRecords {
        &self.records
    }

    /// The decoded records, or `None` for a compressed batch.
    pub fn decoded(&self) -> Option<&[Record]> {
        match &self.records {
            BatchRecords::Decoded(records) => Some(records),
            BatchRecords::Compressed(_) => None,
        }
    }

    /// Consume the batch, transferring record ownership to the caller.
    /// Returns an empty vector for a compressed batch.
    pub fn into_records(self) -> Vec<Record> {
        match self.records {
            BatchRecords::Decoded(records) => records,
            BatchRecords::Compressed(_) => Vec::new(),
        }
    }

    /// Rewrite the base offset, used when a batch built against offset zero
    /// is appended at its real position. Record offset deltas are relative
    /// to the base and need no adjustment; the CRC excludes the header.
    pub fn set_base_offset(&mut self, base: Offset) {
        self.header.base_offset = base;
    }

    /// Encode the records section.
    fn encoded_records(&self) -> Result<Bytes> {
        match &self.records {
            BatchRecords::Decoded(records) => {
                let mut section = BytesMut::new();
                for record in records {
                    record.encode(&mut section)?;
                }
                Ok(section.freeze())
            }
            BatchRecords::Compressed(payload) => Ok(payload.clone()),
        }
    }

    /// Encode the full batch, computing `batch_length` and `crc` from the
    /// records section.
    pub fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        let section = self.encoded_records()?;
        let header = RecordBatchHeader {
            batch_length: section.len() as u32,
            crc: crc32c(&section),
            ..self.header.clone()
        };
        header.encode(buffer)?;
        buffer.put(section);
        Ok(())
    }

    /// Total encoded size of this batch in bytes.
    pub fn size_on_disk(&self) -> Result<usize> {
        Ok(RECORD_BATCH_HEADER_SIZE + self.encoded_records()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_batch() -> RecordBatch {
        let records = vec![
            Record::new(0, 0, Bytes::from_static(b"k0"), Bytes::from_static(b"v0")),
            Record::new(5, 1, Bytes::from_static(b"k1"), Bytes::from_static(b"v1")),
        ];
        let header = RecordBatchHeader {
            base_offset: Offset::new(0),
            batch_length: 0,
            crc: 0,
            attributes: 0,
            batch_type: BatchType::Controller as i8,
            last_offset_delta: 1,
            first_timestamp: 1_000,
            max_timestamp: 1_005,
            record_count: 2,
        };
        RecordBatch::from_parts(header, BatchRecords::Decoded(records))
    }

    #[test]
    fn test_crc32c_known_vector() {
        // Standard CRC-32C check value for "123456789".
        assert_eq!(crc32c(b"123456789"), 0xE306_9283);
    }

    #[test]
    fn test_record_size_computation() {
        let r = Record::new(0, 0, Bytes::from_static(b"ab"), Bytes::from_static(b"cde"));
        assert_eq!(r.size_bytes, 16 + 2 + 3);
    }

    #[test]
    fn test_header_compressed_flag() {
        let mut header = sample_batch().header().clone();
        assert!(!header.compressed());
        header.attributes |= 0x1;
        assert!(header.compressed());
    }

    #[test]
    fn test_header_last_offset() {
        let header = sample_batch().header().clone();
        assert_eq!(header.last_offset(), Offset::new(1));
    }

    #[test]
    fn test_batch_type_tag() {
        let batch = sample_batch();
        assert_eq!(batch.batch_type(), Some(BatchType::Controller));

        let mut header = batch.header().clone();
        header.batch_type = 99;
        let unknown = RecordBatch::from_parts(header, BatchRecords::Decoded(vec![]));
        assert_eq!(unknown.batch_type(), None);
    }

    #[test]
    fn test_encode_layout() {
        let batch = sample_batch();
        let mut buf = BytesMut::new();
        batch.encode(&mut buf).unwrap();

        // base_offset
        assert_eq!(&buf[0..8], &0i64.to_be_bytes());
        // batch_length covers the records section
        let batch_length = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]) as usize;
        assert_eq!(buf.len(), RECORD_BATCH_HEADER_SIZE + batch_length);
        // crc matches the records section
        let crc = u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]);
        assert_eq!(crc, crc32c(&buf[RECORD_BATCH_HEADER_SIZE..]));
    }

    #[test]
    fn test_set_base_offset_keeps_crc_valid() {
        let mut batch = sample_batch();
        let mut before = BytesMut::new();
        batch.encode(&mut before).unwrap();

        batch.set_base_offset(Offset::new(42));
        let mut after = BytesMut::new();
        batch.encode(&mut after).unwrap();

        assert_eq!(batch.base_offset(), Offset::new(42));
        assert_eq!(batch.last_offset(), Offset::new(43));
        // Only the base_offset bytes changed.
        assert_eq!(&before[8..], &after[8..]);
    }

    #[test]
    fn test_into_records_transfers_ownership() {
        let records = sample_batch().into_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].key.as_ref(), b"k1");
    }

    #[test]
    fn test_compressed_batch_has_no_decoded_records() {
        let mut header = sample_batch().header().clone();
        header.attributes |= 0x1;
        let batch =
            RecordBatch::from_parts(header, BatchRecords::Compressed(Bytes::from_static(b"blob")));
        assert!(batch.compressed());
        assert!(batch.decoded().is_none());
        assert!(batch.into_records().is_empty());
    }
}
