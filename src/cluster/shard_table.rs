//! Per-shard routing table from NTP and replication group to owning shard.

use dashmap::DashMap;

use crate::types::{GroupId, Ntp, ShardId};

/// Process-wide mapping from NTP (and replication-group id) to the owning
/// shard.
///
/// Every shard holds its own copy so lookups are always local. Copies are
/// kept consistent by mutating only through the controller's broadcast path
/// ([`Sharded::invoke_on_all`]); an NTP's entry is broadcast to all shards
/// *before* the owning shard is asked to manage the partition. Entries are
/// inserted on recovery and assignment and never removed.
///
/// [`Sharded::invoke_on_all`]: crate::cluster::Sharded::invoke_on_all
#[derive(Debug)]
pub struct ShardTable {
    shard: ShardId,
    by_ntp: DashMap<Ntp, ShardId>,
    by_group: DashMap<GroupId, ShardId>,
}

impl ShardTable {
    /// Create the copy owned by `shard`.
    pub fn new(shard: ShardId) -> Self {
        Self {
            shard,
            by_ntp: DashMap::new(),
            by_group: DashMap::new(),
        }
    }

    /// The shard owning this copy.
    pub fn owner(&self) -> ShardId {
        self.shard
    }

    pub fn insert_ntp(&self, ntp: Ntp, shard: ShardId) {
        self.by_ntp.insert(ntp, shard);
    }

    pub fn insert_group(&self, group: GroupId, shard: ShardId) {
        self.by_group.insert(group, shard);
    }

    pub fn shard_for_ntp(&self, ntp: &Ntp) -> Option<ShardId> {
        self.by_ntp.get(ntp).map(|entry| *entry.value())
    }

    pub fn shard_for_group(&self, group: GroupId) -> Option<ShardId> {
        self.by_group.get(&group).map(|entry| *entry.value())
    }

    pub fn len(&self) -> usize {
        self.by_ntp.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_ntp.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PartitionIndex;

    #[test]
    fn test_insert_and_lookup() {
        let table = ShardTable::new(ShardId::new(0));
        let ntp = Ntp::new("default", "orders", PartitionIndex::new(0));
        table.insert_ntp(ntp.clone(), ShardId::new(2));
        table.insert_group(GroupId::new(7), ShardId::new(2));

        assert_eq!(table.shard_for_ntp(&ntp), Some(ShardId::new(2)));
        assert_eq!(table.shard_for_group(GroupId::new(7)), Some(ShardId::new(2)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_missing_entries() {
        let table = ShardTable::new(ShardId::new(1));
        assert!(table.is_empty());
        assert_eq!(
            table.shard_for_ntp(&Ntp::new("default", "missing", PartitionIndex::new(0))),
            None
        );
        assert_eq!(table.shard_for_group(GroupId::new(99)), None);
    }

    #[test]
    fn test_reinsert_overwrites() {
        let table = ShardTable::new(ShardId::new(0));
        let ntp = Ntp::new("default", "orders", PartitionIndex::new(0));
        table.insert_ntp(ntp.clone(), ShardId::new(1));
        table.insert_ntp(ntp.clone(), ShardId::new(3));
        assert_eq!(table.shard_for_ntp(&ntp), Some(ShardId::new(3)));
    }
}
