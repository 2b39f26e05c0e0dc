//! Type-safe wrappers for log and cluster primitives.
//!
//! These newtypes provide type safety to prevent mixing up different
//! integer types that have the same underlying representation but
//! different semantic meanings.

use bytes::BufMut;
use std::fmt;

use crate::encode::ToByte;
use crate::error::Result;

/// A record's position within a log.
///
/// Offsets are 64-bit signed integers, monotonically increasing within a
/// log. Offsets exposed outside the streaming pipeline are always
/// batch-aligned: they denote the base offset of a batch, never a position
/// inside one, because batches are made visible atomically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Offset(pub i64);

impl Offset {
    /// Invalid offset, used to indicate an unset value (e.g. an empty log).
    pub const INVALID: Self = Offset(-1);

    /// Create a new offset from a raw value.
    #[inline]
    pub const fn new(value: i64) -> Self {
        Offset(value)
    }

    /// Get the raw i64 value.
    #[inline]
    pub const fn value(self) -> i64 {
        self.0
    }

    /// Check if this is a valid (non-negative) offset.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }

    /// The offset `delta` records after this one.
    #[inline]
    pub const fn add(self, delta: i64) -> Self {
        Offset(self.0 + delta)
    }

    /// The offset immediately after this one.
    #[inline]
    pub const fn next(self) -> Self {
        Offset(self.0 + 1)
    }
}

impl From<i64> for Offset {
    fn from(value: i64) -> Self {
        Offset(value)
    }
}

impl From<Offset> for i64 {
    fn from(offset: Offset) -> Self {
        offset.0
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ToByte for Offset {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.0.encode(buffer)
    }
}

/// A cluster node identifier.
///
/// Node IDs are 32-bit signed integers that uniquely identify nodes
/// (brokers) within a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NodeId(pub i32);

impl NodeId {
    /// Invalid node ID, typically used to indicate no owner.
    pub const INVALID: Self = NodeId(-1);

    /// Create a new node ID from a raw value.
    #[inline]
    pub const fn new(value: i32) -> Self {
        NodeId(value)
    }

    /// Get the raw i32 value.
    #[inline]
    pub const fn value(self) -> i32 {
        self.0
    }

    /// Check if this is a valid (non-negative) node ID.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

impl From<i32> for NodeId {
    fn from(value: i32) -> Self {
        NodeId(value)
    }
}

impl From<NodeId> for i32 {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ToByte for NodeId {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.0.encode(buffer)
    }
}

/// A shard (core-affine worker) identifier.
///
/// Each shard runs a single-threaded cooperative scheduler and exclusively
/// owns its state; cross-shard effects are expressed as explicit
/// invocations routed to the target shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ShardId(pub u32);

impl ShardId {
    /// Create a new shard ID from a raw value.
    #[inline]
    pub const fn new(value: u32) -> Self {
        ShardId(value)
    }

    /// Get the raw u32 value.
    #[inline]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl From<u32> for ShardId {
    fn from(value: u32) -> Self {
        ShardId(value)
    }
}

impl From<ShardId> for u32 {
    fn from(id: ShardId) -> Self {
        id.0
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ToByte for ShardId {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.0.encode(buffer)
    }
}

/// A replication group identifier.
///
/// Each partition's log is replicated by one replication group; the group id
/// ties a partition replica to the consensus instance replicating it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct GroupId(pub i64);

impl GroupId {
    /// Create a new group ID from a raw value.
    #[inline]
    pub const fn new(value: i64) -> Self {
        GroupId(value)
    }

    /// Get the raw i64 value.
    #[inline]
    pub const fn value(self) -> i64 {
        self.0
    }
}

impl From<i64> for GroupId {
    fn from(value: i64) -> Self {
        GroupId(value)
    }
}

impl From<GroupId> for i64 {
    fn from(id: GroupId) -> Self {
        id.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ToByte for GroupId {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.0.encode(buffer)
    }
}

/// A partition index within a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PartitionIndex(pub i32);

impl PartitionIndex {
    /// Invalid partition index.
    pub const INVALID: Self = PartitionIndex(-1);

    /// Create a new partition index from a raw value.
    #[inline]
    pub const fn new(value: i32) -> Self {
        PartitionIndex(value)
    }

    /// Get the raw i32 value.
    #[inline]
    pub const fn value(self) -> i32 {
        self.0
    }

    /// Check if this is a valid (non-negative) partition index.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

impl From<i32> for PartitionIndex {
    fn from(value: i32) -> Self {
        PartitionIndex(value)
    }
}

impl From<PartitionIndex> for i32 {
    fn from(idx: PartitionIndex) -> Self {
        idx.0
    }
}

impl fmt::Display for PartitionIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ToByte for PartitionIndex {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.0.encode(buffer)
    }
}

// ============================================================================
// Ntp
// ============================================================================

/// Namespace/Topic/Partition: the addressing key for one partition of data.
///
/// NTPs are the primary key across topic configuration, assignment, and
/// shard routing.
///
/// # Usage
///
/// ```
/// use metalog::types::{Ntp, PartitionIndex};
///
/// let ntp = Ntp::new("default", "orders", PartitionIndex::new(0));
/// assert_eq!(ntp.path(), "default/orders/0");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ntp {
    /// The namespace the topic lives in.
    pub ns: String,
    /// The topic name.
    pub topic: String,
    /// The partition index.
    pub partition: PartitionIndex,
}

impl Ntp {
    /// Create a new NTP.
    pub fn new(
        ns: impl Into<String>,
        topic: impl Into<String>,
        partition: PartitionIndex,
    ) -> Self {
        Self {
            ns: ns.into(),
            topic: topic.into(),
            partition,
        }
    }

    /// Path form of this NTP, used for placement hashing and logging.
    pub fn path(&self) -> String {
        format!("{}/{}/{}", self.ns, self.topic, self.partition)
    }
}

impl fmt::Display for Ntp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.ns, self.topic, self.partition)
    }
}

impl ToByte for Ntp {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.ns.encode(buffer)?;
        self.topic.encode(buffer)?;
        self.partition.encode(buffer)
    }
}

// ============================================================================
// IoPriority
// ============================================================================

/// I/O priority class requested for a read.
///
/// The physical I/O scheduler lives below this crate; the priority is carried
/// through reader configuration so the storage layer can classify the
/// traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IoPriority {
    /// Regular data-path reads.
    #[default]
    Default,
    /// Controller metadata recovery reads.
    Controller,
}

impl IoPriority {
    /// Label used in logs and metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            IoPriority::Default => "default",
            IoPriority::Controller => "controller",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Offset tests
    #[test]
    fn test_offset_new_and_value() {
        let offset = Offset::new(42);
        assert_eq!(offset.value(), 42);
    }

    #[test]
    fn test_offset_invalid() {
        assert_eq!(Offset::INVALID.value(), -1);
        assert!(!Offset::INVALID.is_valid());
    }

    #[test]
    fn test_offset_arithmetic() {
        assert_eq!(Offset::new(5).next(), Offset::new(6));
        assert_eq!(Offset::new(5).add(10), Offset::new(15));
    }

    #[test]
    fn test_offset_ordering() {
        assert!(Offset::new(1) < Offset::new(2));
        assert!(Offset::new(10) > Offset::new(5));
        assert_eq!(Offset::new(3), Offset::new(3));
    }

    #[test]
    fn test_offset_encode() {
        let mut buf = Vec::new();
        Offset::new(0x0102030405060708).encode(&mut buf).unwrap();
        assert_eq!(buf, vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
    }

    // NodeId tests
    #[test]
    fn test_node_id_new_and_value() {
        let id = NodeId::new(5);
        assert_eq!(id.value(), 5);
    }

    #[test]
    fn test_node_id_invalid() {
        assert_eq!(NodeId::INVALID.value(), -1);
        assert!(!NodeId::INVALID.is_valid());
    }

    #[test]
    fn test_node_id_encode() {
        let mut buf = Vec::new();
        NodeId::new(0x01020304).encode(&mut buf).unwrap();
        assert_eq!(buf, vec![0x01, 0x02, 0x03, 0x04]);
    }

    // ShardId tests
    #[test]
    fn test_shard_id_new_and_value() {
        let id = ShardId::new(3);
        assert_eq!(id.value(), 3);
    }

    #[test]
    fn test_shard_id_display() {
        assert_eq!(format!("{}", ShardId::new(7)), "7");
    }

    // GroupId tests
    #[test]
    fn test_group_id_new_and_value() {
        let id = GroupId::new(12);
        assert_eq!(id.value(), 12);
    }

    #[test]
    fn test_group_id_encode() {
        let mut buf = Vec::new();
        GroupId::new(1).encode(&mut buf).unwrap();
        assert_eq!(buf, vec![0, 0, 0, 0, 0, 0, 0, 1]);
    }

    // PartitionIndex tests
    #[test]
    fn test_partition_index_is_valid() {
        assert!(PartitionIndex::new(0).is_valid());
        assert!(!PartitionIndex::INVALID.is_valid());
    }

    // Ntp tests
    #[test]
    fn test_ntp_path_and_display() {
        let ntp = Ntp::new("default", "orders", PartitionIndex::new(2));
        assert_eq!(ntp.path(), "default/orders/2");
        assert_eq!(format!("{ntp}"), "default/orders/2");
    }

    #[test]
    fn test_ntp_hash_and_eq() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(Ntp::new("a", "t", PartitionIndex::new(0)));
        set.insert(Ntp::new("a", "t", PartitionIndex::new(1)));
        set.insert(Ntp::new("a", "t", PartitionIndex::new(0)));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_ntp_encode() {
        let mut buf = Vec::new();
        Ntp::new("n", "t", PartitionIndex::new(1))
            .encode(&mut buf)
            .unwrap();
        assert_eq!(
            buf,
            vec![0x00, 0x01, b'n', 0x00, 0x01, b't', 0x00, 0x00, 0x00, 0x01]
        );
    }

    // IoPriority tests
    #[test]
    fn test_io_priority_labels() {
        assert_eq!(IoPriority::Default.as_label(), "default");
        assert_eq!(IoPriority::Controller.as_label(), "controller");
    }
}
