//! Per-shard partition manager.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::cluster::error::{ClusterError, ClusterResult};
use crate::metrics;
use crate::storage::{Log, LogManager};
use crate::types::{GroupId, Ntp, ShardId};

/// A partition this shard manages: its replication group and log.
#[derive(Debug, Clone)]
struct ManagedPartition {
    group: GroupId,
    log: Arc<Log>,
}

/// Owns the set of locally-managed partitions of one shard.
///
/// Only the owning shard mutates its instance; the controller routes
/// `manage` calls to the target shard. Entries are created by [`manage`]
/// keyed by NTP and replication group.
///
/// [`manage`]: PartitionManager::manage
#[derive(Debug)]
pub struct PartitionManager {
    shard: ShardId,
    logs: Arc<LogManager>,
    partitions: DashMap<Ntp, ManagedPartition>,
}

impl PartitionManager {
    pub fn new(shard: ShardId, logs: Arc<LogManager>) -> Self {
        Self {
            shard,
            logs,
            partitions: DashMap::new(),
        }
    }

    /// The shard owning this manager.
    pub fn shard(&self) -> ShardId {
        self.shard
    }

    /// Begin managing `ntp` under `group`, attaching its log.
    ///
    /// Managing an already-managed NTP under the same group is idempotent;
    /// a conflicting group is an error.
    pub async fn manage(&self, ntp: Ntp, group: GroupId) -> ClusterResult<Arc<Log>> {
        if let Some(existing) = self.partitions.get(&ntp) {
            if existing.group != group {
                return Err(ClusterError::Config(format!(
                    "partition {ntp} already managed under group {} (requested {group})",
                    existing.group
                )));
            }
            debug!(shard = %self.shard, ntp = %ntp, group = %group, "partition already managed");
            return Ok(existing.log.clone());
        }

        let log = self.logs.get_or_create(ntp.clone());
        self.partitions.insert(
            ntp.clone(),
            ManagedPartition {
                group,
                log: log.clone(),
            },
        );
        metrics::MANAGED_PARTITIONS.inc();
        info!(shard = %self.shard, ntp = %ntp, group = %group, "managing partition");
        Ok(log)
    }

    /// The log of a managed partition.
    pub fn log(&self, ntp: &Ntp) -> Option<Arc<Log>> {
        self.partitions.get(ntp).map(|entry| entry.log.clone())
    }

    /// The replication group a managed partition belongs to.
    pub fn group_of(&self, ntp: &Ntp) -> Option<GroupId> {
        self.partitions.get(ntp).map(|entry| entry.group)
    }

    pub fn is_managed(&self, ntp: &Ntp) -> bool {
        self.partitions.contains_key(ntp)
    }

    pub fn managed_count(&self) -> usize {
        self.partitions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PartitionIndex;

    fn manager() -> PartitionManager {
        PartitionManager::new(ShardId::new(0), Arc::new(LogManager::new()))
    }

    #[tokio::test]
    async fn test_manage_creates_log() {
        let pm = manager();
        let ntp = Ntp::new("default", "orders", PartitionIndex::new(0));
        let log = pm.manage(ntp.clone(), GroupId::new(1)).await.unwrap();
        assert!(log.is_empty());
        assert!(pm.is_managed(&ntp));
        assert_eq!(pm.group_of(&ntp), Some(GroupId::new(1)));
        assert_eq!(pm.managed_count(), 1);
    }

    #[tokio::test]
    async fn test_manage_is_idempotent_for_same_group() {
        let pm = manager();
        let ntp = Ntp::new("default", "orders", PartitionIndex::new(0));
        let a = pm.manage(ntp.clone(), GroupId::new(1)).await.unwrap();
        let b = pm.manage(ntp.clone(), GroupId::new(1)).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pm.managed_count(), 1);
    }

    #[tokio::test]
    async fn test_manage_rejects_conflicting_group() {
        let pm = manager();
        let ntp = Ntp::new("default", "orders", PartitionIndex::new(0));
        pm.manage(ntp.clone(), GroupId::new(1)).await.unwrap();
        let err = pm.manage(ntp.clone(), GroupId::new(2)).await.unwrap_err();
        assert!(matches!(err, ClusterError::Config(_)));
    }

    #[tokio::test]
    async fn test_manage_attaches_existing_log() {
        let logs = Arc::new(LogManager::new());
        let ntp = Ntp::new("system", "controller", PartitionIndex::new(0));
        let pre_existing = logs.get_or_create(ntp.clone());

        let pm = PartitionManager::new(ShardId::new(0), logs);
        let attached = pm.manage(ntp, GroupId::new(0)).await.unwrap();
        assert!(Arc::ptr_eq(&pre_existing, &attached));
    }

    #[test]
    fn test_unmanaged_lookups() {
        let pm = manager();
        let ntp = Ntp::new("default", "missing", PartitionIndex::new(0));
        assert!(!pm.is_managed(&ntp));
        assert!(pm.log(&ntp).is_none());
        assert!(pm.group_of(&ntp).is_none());
    }
}
