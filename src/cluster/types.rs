//! Cluster metadata records and their wire codec.
//!
//! Every controller log entry is a key/value record: the key is a
//! [`LogRecordKey`] discriminator tag, the value the encoded metadata
//! record it announces. Decoding is strict; an unrecognized tag or a
//! malformed payload is a hard error, never silently ignored.

use bytes::{BufMut, Bytes};
use nom::number::complete::{be_i16, be_i32, be_i64, be_i8, be_u32};
use nombytes::NomBytes;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use std::fmt;

use crate::cluster::error::{ClusterError, ClusterResult};
use crate::encode::{encode_nullable_string, ToByte};
use crate::error::{Error, Result};
use crate::parser::{bytes_to_string, parse_nullable_string, parse_string};
use crate::types::{GroupId, NodeId, Ntp, PartitionIndex, ShardId};

/// Discriminator tag prefixed to every controller log record, used to
/// dispatch decoding.
///
/// The variant set is closed on purpose: a tag this build does not know is
/// an [`ClusterError::UnknownRecordKind`] decode error rather than a
/// silently ignored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum LogRecordKey {
    /// The value is a [`TopicConfiguration`].
    TopicConfiguration = 1,
    /// The value is a [`PartitionAssignment`].
    PartitionAssignment = 2,
}

impl LogRecordKey {
    /// Label used in logs and metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            LogRecordKey::TopicConfiguration => "topic_configuration",
            LogRecordKey::PartitionAssignment => "partition_assignment",
        }
    }

    /// Decode a record key payload.
    pub fn decode(buf: &Bytes) -> ClusterResult<Self> {
        if buf.len() != 1 {
            return Err(ClusterError::Decode(Error::ParsingError(buf.clone())));
        }
        let tag = buf[0] as i8;
        Self::from_i8(tag).ok_or(ClusterError::UnknownRecordKind(tag))
    }
}

impl ToByte for LogRecordKey {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        (*self as i8).encode(buffer)
    }
}

/// Compression codec configured for a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromPrimitive)]
pub enum Compression {
    #[default]
    None = 0,
    Lz4 = 1,
    Zstd = 2,
}

/// Log cleanup policy configured for a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromPrimitive)]
pub enum CompactionPolicy {
    /// Retention-based deletion only.
    #[default]
    Delete = 0,
    /// Key-based compaction.
    Compact = 1,
}

/// Topic configuration: immutable once its entry is appended; a later
/// record may supersede it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicConfiguration {
    pub ns: String,
    pub topic: String,
    pub partition_count: i32,
    pub replication_factor: i16,
    pub compression: Compression,
    pub compaction: CompactionPolicy,
    /// Retention size limit in bytes; 0 means unlimited.
    pub retention_bytes: u64,
    /// Retention time limit in milliseconds; 0 means unlimited.
    pub retention_ms: i64,
}

impl TopicConfiguration {
    pub fn new(
        ns: impl Into<String>,
        topic: impl Into<String>,
        partition_count: i32,
        replication_factor: i16,
    ) -> Self {
        Self {
            ns: ns.into(),
            topic: topic.into(),
            partition_count,
            replication_factor,
            compression: Compression::default(),
            compaction: CompactionPolicy::default(),
            retention_bytes: 0,
            retention_ms: 0,
        }
    }

    /// Decode a topic configuration record value.
    pub fn decode(buf: Bytes) -> ClusterResult<Self> {
        decode_exact(buf, topic_configuration)
    }
}

impl ToByte for TopicConfiguration {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.ns.encode(buffer)?;
        self.topic.encode(buffer)?;
        self.partition_count.encode(buffer)?;
        self.replication_factor.encode(buffer)?;
        (self.compression as i8).encode(buffer)?;
        (self.compaction as i8).encode(buffer)?;
        self.retention_bytes.encode(buffer)?;
        self.retention_ms.encode(buffer)
    }
}

/// A broker's identity and advertised address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Broker {
    pub id: NodeId,
    pub host: String,
    pub port: u32,
    pub rack: Option<String>,
}

impl Broker {
    pub fn new(id: NodeId, host: impl Into<String>, port: u32, rack: Option<String>) -> Self {
        Self {
            id,
            host: host.into(),
            port,
            rack,
        }
    }
}

impl fmt::Display for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.id, self.host, self.port)
    }
}

impl ToByte for Broker {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.id.encode(buffer)?;
        self.host.encode(buffer)?;
        self.port.encode(buffer)?;
        encode_nullable_string(buffer, self.rack.as_deref())
    }
}

/// The binding of one partition replica to a replication group, a local
/// shard and the owning broker.
///
/// Multiple assignments exist per NTP, one per replica; only assignments
/// whose broker is the local node are actionable locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionAssignment {
    /// Shard that owns the replica on the assigned broker.
    pub shard: ShardId,
    /// Replication group replicating this partition's log.
    pub group: GroupId,
    pub ntp: Ntp,
    pub broker: Broker,
}

impl PartitionAssignment {
    /// Decode a partition assignment record value.
    pub fn decode(buf: Bytes) -> ClusterResult<Self> {
        decode_exact(buf, partition_assignment)
    }
}

impl ToByte for PartitionAssignment {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.shard.encode(buffer)?;
        self.group.encode(buffer)?;
        self.ntp.encode(buffer)?;
        self.broker.encode(buffer)
    }
}

/// Per-topic outcome of a `create_topics` call.
///
/// The write path reports coarse results: one append carries the whole
/// request, so all topics in a request share the append's fate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromPrimitive)]
pub enum TopicErrorCode {
    #[default]
    NoError = 0,
    UnknownError = -1,
}

/// Result for one requested topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicResult {
    pub topic: String,
    pub error_code: TopicErrorCode,
}

impl TopicResult {
    pub fn new(topic: impl Into<String>, error_code: TopicErrorCode) -> Self {
        Self {
            topic: topic.into(),
            error_code,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error_code == TopicErrorCode::NoError
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Run a nom parser over the whole payload, requiring it to be consumed
/// exactly.
fn decode_exact<T, F>(buf: Bytes, parser: F) -> ClusterResult<T>
where
    F: Fn(NomBytes) -> nom::IResult<NomBytes, T>,
{
    match parser(NomBytes::new(buf.clone())) {
        Ok((rest, value)) => {
            if rest.into_bytes().is_empty() {
                Ok(value)
            } else {
                Err(ClusterError::Decode(Error::ParsingError(buf)))
            }
        }
        Err(_) => Err(ClusterError::Decode(Error::ParsingError(buf))),
    }
}

fn topic_configuration(s: NomBytes) -> nom::IResult<NomBytes, TopicConfiguration> {
    let (s, ns) = parse_string(s)?;
    let (s, topic) = parse_string(s)?;
    let (s, partition_count) = be_i32(s)?;
    let (s, replication_factor) = be_i16(s)?;
    let (s, compression) = enum_i8::<Compression>(s)?;
    let (s, compaction) = enum_i8::<CompactionPolicy>(s)?;
    let (s, retention_bytes) = nom::number::complete::be_u64(s)?;
    let (s, retention_ms) = be_i64(s)?;
    let ns = bytes_to_string(&ns)?;
    let topic = bytes_to_string(&topic)?;
    Ok((
        s,
        TopicConfiguration {
            ns,
            topic,
            partition_count,
            replication_factor,
            compression,
            compaction,
            retention_bytes,
            retention_ms,
        },
    ))
}

fn partition_assignment(s: NomBytes) -> nom::IResult<NomBytes, PartitionAssignment> {
    let (s, shard) = be_u32(s)?;
    let (s, group) = be_i64(s)?;
    let (s, ns) = parse_string(s)?;
    let (s, topic) = parse_string(s)?;
    let (s, partition) = be_i32(s)?;
    let (s, broker_id) = be_i32(s)?;
    let (s, host) = parse_string(s)?;
    let (s, port) = be_u32(s)?;
    let (s, rack) = parse_nullable_string(s)?;
    let ns = bytes_to_string(&ns)?;
    let topic = bytes_to_string(&topic)?;
    let host = bytes_to_string(&host)?;
    let rack = match rack {
        Some(r) => Some(bytes_to_string(&r)?),
        None => None,
    };
    Ok((
        s,
        PartitionAssignment {
            shard: ShardId::new(shard),
            group: GroupId::new(group),
            ntp: Ntp::new(ns, topic, PartitionIndex::new(partition)),
            broker: Broker::new(NodeId::new(broker_id), host, port, rack),
        },
    ))
}

/// Parse an i8 tag into a `FromPrimitive` enum, failing on unknown tags.
fn enum_i8<T: FromPrimitive>(s: NomBytes) -> nom::IResult<NomBytes, T> {
    let (rest, raw) = be_i8(s)?;
    match T::from_i8(raw) {
        Some(value) => Ok((rest, value)),
        None => Err(nom::Err::Failure(nom::error::Error::new(
            rest,
            nom::error::ErrorKind::Verify,
        ))),
    }
}

/// Encode a value through its [`ToByte`] impl into a standalone buffer.
pub(crate) fn encode_to_bytes<T: ToByte>(value: &T) -> Result<Bytes> {
    let mut buf = bytes::BytesMut::new();
    value.encode(&mut buf)?;
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_record_key_roundtrip() {
        for key in [
            LogRecordKey::TopicConfiguration,
            LogRecordKey::PartitionAssignment,
        ] {
            let encoded = encode_to_bytes(&key).unwrap();
            assert_eq!(LogRecordKey::decode(&encoded).unwrap(), key);
        }
    }

    #[test]
    fn test_unknown_record_kind_is_an_error() {
        let err = LogRecordKey::decode(&Bytes::from_static(&[0x7F])).unwrap_err();
        assert!(matches!(err, ClusterError::UnknownRecordKind(0x7F)));
    }

    #[test]
    fn test_empty_record_key_is_decode_error() {
        let err = LogRecordKey::decode(&Bytes::new()).unwrap_err();
        assert!(matches!(err, ClusterError::Decode(_)));
    }

    #[test]
    fn test_topic_configuration_roundtrip() {
        let cfg = TopicConfiguration {
            ns: "default".to_string(),
            topic: "orders".to_string(),
            partition_count: 4,
            replication_factor: 3,
            compression: Compression::Lz4,
            compaction: CompactionPolicy::Compact,
            retention_bytes: 1 << 30,
            retention_ms: 86_400_000,
        };
        let encoded = encode_to_bytes(&cfg).unwrap();
        assert_eq!(TopicConfiguration::decode(encoded).unwrap(), cfg);
    }

    #[test]
    fn test_topic_configuration_truncated_payload_fails() {
        let cfg = TopicConfiguration::new("default", "orders", 1, 1);
        let encoded = encode_to_bytes(&cfg).unwrap();
        let truncated = encoded.slice(..encoded.len() - 3);
        assert!(TopicConfiguration::decode(truncated).is_err());
    }

    #[test]
    fn test_topic_configuration_trailing_bytes_fail() {
        let cfg = TopicConfiguration::new("default", "orders", 1, 1);
        let mut encoded = bytes::BytesMut::from(&encode_to_bytes(&cfg).unwrap()[..]);
        encoded.extend_from_slice(&[0xAB]);
        assert!(TopicConfiguration::decode(encoded.freeze()).is_err());
    }

    #[test]
    fn test_partition_assignment_roundtrip() {
        let assignment = PartitionAssignment {
            shard: ShardId::new(3),
            group: GroupId::new(7),
            ntp: Ntp::new("default", "orders", PartitionIndex::new(1)),
            broker: Broker::new(NodeId::new(0), "localhost", 9092, None),
        };
        let encoded = encode_to_bytes(&assignment).unwrap();
        assert_eq!(PartitionAssignment::decode(encoded).unwrap(), assignment);
    }

    #[test]
    fn test_partition_assignment_with_rack_roundtrip() {
        let assignment = PartitionAssignment {
            shard: ShardId::new(0),
            group: GroupId::new(0),
            ntp: Ntp::new("default", "t", PartitionIndex::new(0)),
            broker: Broker::new(NodeId::new(2), "node-2", 9092, Some("rack-a".to_string())),
        };
        let encoded = encode_to_bytes(&assignment).unwrap();
        assert_eq!(PartitionAssignment::decode(encoded).unwrap(), assignment);
    }

    #[test]
    fn test_unknown_compression_tag_fails() {
        let cfg = TopicConfiguration::new("default", "orders", 1, 1);
        let mut encoded = bytes::BytesMut::from(&encode_to_bytes(&cfg).unwrap()[..]);
        // The compression tag sits after ns, topic, partition_count and
        // replication_factor.
        let tag_index = 2 + 7 + 2 + 6 + 4 + 2;
        encoded[tag_index] = 0x55;
        assert!(TopicConfiguration::decode(encoded.freeze()).is_err());
    }

    #[test]
    fn test_topic_result() {
        let ok = TopicResult::new("orders", TopicErrorCode::NoError);
        assert!(ok.is_ok());
        let failed = TopicResult::new("orders", TopicErrorCode::UnknownError);
        assert!(!failed.is_ok());
    }
}
