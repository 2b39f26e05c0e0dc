//! Builder for controller metadata batches.

use bytes::Bytes;

use crate::cluster::types::encode_to_bytes;
use crate::encode::ToByte;
use crate::error::Result;
use crate::storage::{BatchRecords, BatchType, Record, RecordBatch, RecordBatchHeader};
use crate::types::Offset;

/// Accumulates key/value records into one record batch.
///
/// Batches are built against base offset zero; the log rewrites the base
/// when the batch is appended at its real position.
#[derive(Debug)]
pub struct SimpleBatchBuilder {
    batch_type: BatchType,
    base_offset: Offset,
    records: Vec<Record>,
}

impl SimpleBatchBuilder {
    pub fn new(batch_type: BatchType, base_offset: Offset) -> Self {
        Self {
            batch_type,
            base_offset,
            records: Vec::new(),
        }
    }

    /// Append one key/value record. The offset delta is the record's
    /// position in the batch; timestamp deltas are zero for metadata
    /// records.
    pub fn add_kv<K: ToByte, V: ToByte>(&mut self, key: &K, value: &V) -> Result<()> {
        let key = encode_to_bytes(key)?;
        let value = encode_to_bytes(value)?;
        self.add_raw_kv(key, value);
        Ok(())
    }

    /// Append one already-encoded key/value record.
    pub fn add_raw_kv(&mut self, key: Bytes, value: Bytes) {
        let offset_delta = self.records.len() as i32;
        self.records.push(Record::new(0, offset_delta, key, value));
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Finish the batch.
    pub fn build(self) -> RecordBatch {
        let record_count = self.records.len() as i32;
        let header = RecordBatchHeader {
            base_offset: self.base_offset,
            batch_length: 0,
            crc: 0,
            attributes: 0,
            batch_type: self.batch_type as i8,
            last_offset_delta: (record_count - 1).max(0),
            first_timestamp: 0,
            max_timestamp: 0,
            record_count,
        };
        RecordBatch::from_parts(header, BatchRecords::Decoded(self.records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::types::{LogRecordKey, TopicConfiguration};

    #[test]
    fn test_builder_assigns_offset_deltas() {
        let mut builder = SimpleBatchBuilder::new(BatchType::Controller, Offset::new(0));
        builder.add_raw_kv(Bytes::from_static(b"a"), Bytes::from_static(b"1"));
        builder.add_raw_kv(Bytes::from_static(b"b"), Bytes::from_static(b"2"));
        builder.add_raw_kv(Bytes::from_static(b"c"), Bytes::from_static(b"3"));
        let batch = builder.build();

        assert_eq!(batch.record_count(), 3);
        assert_eq!(batch.header().last_offset_delta, 2);
        assert_eq!(batch.batch_type(), Some(BatchType::Controller));
        let records = batch.into_records();
        assert_eq!(records[2].offset_delta, 2);
    }

    #[test]
    fn test_builder_encodes_typed_records() {
        let mut builder = SimpleBatchBuilder::new(BatchType::Controller, Offset::new(0));
        let cfg = TopicConfiguration::new("default", "orders", 2, 1);
        builder
            .add_kv(&LogRecordKey::TopicConfiguration, &cfg)
            .unwrap();
        let batch = builder.build();

        let records = batch.into_records();
        assert_eq!(
            LogRecordKey::decode(&records[0].key).unwrap(),
            LogRecordKey::TopicConfiguration
        );
        assert_eq!(
            TopicConfiguration::decode(records[0].value.clone()).unwrap(),
            cfg
        );
    }

    #[test]
    fn test_empty_builder_builds_empty_batch() {
        let batch = SimpleBatchBuilder::new(BatchType::Data, Offset::new(5)).build();
        assert_eq!(batch.record_count(), 0);
        assert_eq!(batch.header().last_offset_delta, 0);
        assert_eq!(batch.base_offset(), Offset::new(5));
    }
}
