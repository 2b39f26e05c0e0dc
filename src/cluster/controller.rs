//! The controller state machine.
//!
//! The controller derives authoritative cluster state from its own
//! dedicated, replicated metadata log. On [`Controller::start`] it replays
//! that log from offset zero, dispatching every decoded record into the
//! per-shard subsystems in strict log order. On the write path,
//! [`Controller::create_topics`] synthesizes metadata entries, appends them
//! in one call and reports success only once the consensus layer
//! acknowledges them as durably committed.
//!
//! The controller's state machine executes exclusively on its designated
//! owning shard ([`Controller::SHARD`]); every entry point asserts this
//! affinity and treats a violation as a fatal caller defect.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, error, info, warn};

use crate::cluster::batch_builder::SimpleBatchBuilder;
use crate::cluster::config::ControllerConfig;
use crate::cluster::consensus::{
    AppendEntriesRequest, CommitObserver, Entry, ReplicatedLog,
};
use crate::cluster::error::{ClusterError, ClusterResult};
use crate::cluster::partition_manager::PartitionManager;
use crate::cluster::shard::{current_shard, shard_of, ShardPool, Sharded};
use crate::cluster::shard_table::ShardTable;
use crate::cluster::types::{
    Broker, LogRecordKey, PartitionAssignment, TopicConfiguration, TopicErrorCode, TopicResult,
};
use crate::metrics;
use crate::storage::{BatchType, Log, LogReaderConfig, Record, RecordBatch};
use crate::types::{GroupId, NodeId, Ntp, Offset, PartitionIndex, ShardId};

/// Panics unless the calling thread is the controller's owning shard.
///
/// Controller state is owned by exactly one shard; calling an entry point
/// from anywhere else is a programming error, not a runtime condition to
/// recover from.
fn verify_shard() {
    let current = current_shard();
    if current != Some(Controller::SHARD) {
        panic!(
            "attempted to access controller on shard {:?}, owned by {}",
            current,
            Controller::SHARD
        );
    }
}

/// The cluster controller.
pub struct Controller {
    config: ControllerConfig,
    self_node: NodeId,
    pool: Arc<ShardPool>,
    pm: Sharded<PartitionManager>,
    st: Sharded<ShardTable>,
    raft0: Arc<dyn ReplicatedLog>,
}

impl Controller {
    /// The one shard that owns controller state.
    pub const SHARD: ShardId = ShardId(0);

    /// Replication group of the controller's own log.
    pub const GROUP: GroupId = GroupId(0);

    /// The well-known identity of the controller's own metadata log.
    pub fn ntp() -> Ntp {
        Ntp::new("system", "controller", PartitionIndex::new(0))
    }

    pub fn new(
        config: ControllerConfig,
        pool: Arc<ShardPool>,
        pm: Sharded<PartitionManager>,
        st: Sharded<ShardTable>,
        raft0: Arc<dyn ReplicatedLog>,
    ) -> Arc<Self> {
        let self_node = config.node_id;
        Arc::new(Self {
            config,
            self_node,
            pool,
            pm,
            st,
            raft0,
        })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Begin managing the controller's own log, then recover cluster state
    /// by replaying it from offset zero.
    ///
    /// Must be invoked on [`Controller::SHARD`]. A decode failure aborts
    /// recovery and keeps the node from becoming ready.
    pub async fn start(&self) -> ClusterResult<()> {
        verify_shard();
        debug!("starting cluster recovery");
        let pm = self.pm.local()?;
        let log = pm.manage(Self::ntp(), Self::GROUP).await?;
        self.bootstrap_from_log(log).await
    }

    /// Release controller resources. Idempotent.
    pub async fn stop(&self) {
        verify_shard();
    }

    /// A commit-pipeline hook asserting controller-shard affinity on every
    /// stage, for registration with the consensus layer.
    pub fn stage_hook(&self) -> StageHook {
        StageHook::new()
    }

    async fn bootstrap_from_log(&self, log: Arc<Log>) -> ClusterResult<()> {
        let mut reader = log.make_reader(LogReaderConfig::controller_recovery());
        while let Some(batch) = reader.next_batch().await? {
            self.recover_batch(batch).await?;
        }
        info!("finished recovering cluster state");
        Ok(())
    }

    /// Apply one replayed batch. Non-controller batches are ignored;
    /// compressed controller batches fail recovery outright, because
    /// skipping one would silently drop metadata.
    async fn recover_batch(&self, batch: RecordBatch) -> ClusterResult<()> {
        if batch.batch_type() != Some(BatchType::Controller) {
            return Ok(());
        }
        if batch.compressed() {
            return Err(ClusterError::CompressedBatch {
                offset: batch.base_offset(),
            });
        }
        metrics::RECOVERY_BATCHES.inc();
        for record in batch.into_records() {
            self.recover_record(record).await?;
        }
        Ok(())
    }

    async fn recover_record(&self, record: Record) -> ClusterResult<()> {
        let key = LogRecordKey::decode(&record.key)?;
        metrics::RECOVERY_RECORDS
            .with_label_values(&[key.as_label()])
            .inc();
        self.dispatch_record_recovery(key, record.value).await
    }

    async fn dispatch_record_recovery(
        &self,
        key: LogRecordKey,
        value: Bytes,
    ) -> ClusterResult<()> {
        match key {
            LogRecordKey::PartitionAssignment => {
                let assignment = PartitionAssignment::decode(value)?;
                self.recover_assignment(assignment).await
            }
            LogRecordKey::TopicConfiguration => {
                // TODO(metadata-cache): reflect replayed topic
                // configurations into a queryable metadata cache.
                let config = TopicConfiguration::decode(value)?;
                debug!(
                    ns = %config.ns,
                    topic = %config.topic,
                    partitions = config.partition_count,
                    "replayed topic configuration"
                );
                Ok(())
            }
        }
    }

    /// Apply one replayed partition assignment.
    ///
    /// The shard-table broadcast must complete on every shard *before* the
    /// owning shard's partition manager is asked to manage the NTP; the
    /// manage call itself runs in the background and its outcome is only
    /// logged.
    async fn recover_assignment(&self, assignment: PartitionAssignment) -> ClusterResult<()> {
        if assignment.broker.id != self.self_node {
            // TODO(metadata-cache): reflect remote assignments into the
            // metadata cache.
            debug!(
                ntp = %assignment.ntp,
                broker = %assignment.broker,
                "ignoring assignment for remote broker"
            );
            return Ok(());
        }

        let shard = assignment.shard;
        let group = assignment.group;

        // 1. update the shard table: broadcast to every shard.
        let ntp = assignment.ntp.clone();
        self.st
            .invoke_on_all(move |table| {
                let ntp = ntp.clone();
                async move {
                    table.insert_ntp(ntp, shard);
                    table.insert_group(group, shard);
                }
            })
            .await?;

        // 2. update the partition manager on the owning shard. Recovery
        // does not wait for the manage call; it proceeds to the next
        // entry while the partition comes up.
        let ntp = assignment.ntp;
        self.pm
            .invoke_on(shard, move |pm| async move {
                let label = format!("{ntp}, group: {group}");
                tokio::task::spawn_local(async move {
                    match pm.manage(ntp, group).await {
                        Ok(_) => {
                            metrics::record_background_manage("ok");
                            info!("recovered: {label}");
                        }
                        Err(e) => {
                            metrics::record_background_manage("error");
                            warn!(error = %e, "failed to recover: {label}");
                        }
                    }
                });
            })
            .await
    }

    /// Create topics by appending their configuration and assignments to
    /// the controller log.
    ///
    /// For each requested topic the synthesized entry holds one
    /// topic-configuration record followed by `partition_count ×
    /// replication_factor` partition-assignment records. All entries are
    /// appended in a single call; the per-topic results share the append's
    /// fate. A deadline expiry fails the request but does not abort the
    /// underlying append, which may still commit asynchronously.
    ///
    /// Must be invoked on [`Controller::SHARD`].
    pub async fn create_topics(
        &self,
        topics: Vec<TopicConfiguration>,
        timeout: Duration,
    ) -> Vec<TopicResult> {
        verify_shard();

        let entries: Result<Vec<Entry>, _> = topics
            .iter()
            .map(|config| self.create_topic_entry(config))
            .collect();
        let entries = match entries {
            Ok(entries) => entries,
            Err(e) => {
                error!(error = %e, "failed to encode create-topics entries");
                metrics::record_append("error");
                return Self::create_topic_results(topics, TopicErrorCode::UnknownError);
            }
        };

        let raft0 = self.raft0.clone();
        let node_id = self.self_node;
        let append = tokio::task::spawn_local(async move {
            raft0
                .append_entries(AppendEntriesRequest { node_id, entries })
                .await
        });

        let success = match tokio::time::timeout(timeout, append).await {
            Ok(Ok(Ok(reply))) => {
                metrics::record_append(if reply.success { "committed" } else { "rejected" });
                reply.success
            }
            Ok(Ok(Err(e))) => {
                error!(error = %e, "an error occurred while appending create topic entries");
                metrics::record_append("error");
                false
            }
            Ok(Err(e)) => {
                error!(error = %e, "create-topics append task failed");
                metrics::record_append("error");
                false
            }
            Err(_) => {
                warn!("create topics timed out waiting for replication");
                metrics::record_append("timeout");
                false
            }
        };

        let code = if success {
            TopicErrorCode::NoError
        } else {
            TopicErrorCode::UnknownError
        };
        Self::create_topic_results(topics, code)
    }

    fn create_topic_results(
        topics: Vec<TopicConfiguration>,
        code: TopicErrorCode,
    ) -> Vec<TopicResult> {
        topics
            .into_iter()
            .map(|config| TopicResult::new(config.topic, code))
            .collect()
    }

    /// Synthesize the log entry announcing one topic: its configuration,
    /// then one assignment per (partition, replica) pair. Each assignment
    /// places the replica on a shard derived from the NTP, in the
    /// replication group of its partition index, on the local node.
    fn create_topic_entry(&self, config: &TopicConfiguration) -> ClusterResult<Entry> {
        let mut builder = SimpleBatchBuilder::new(BatchType::Controller, Offset::new(0));
        builder.add_kv(&LogRecordKey::TopicConfiguration, config)?;

        for partition in 0..config.partition_count {
            let ntp = Ntp::new(
                config.ns.clone(),
                config.topic.clone(),
                PartitionIndex::new(partition),
            );
            for _replica in 0..config.replication_factor {
                let assignment = PartitionAssignment {
                    shard: shard_of(&ntp, self.pool.num_shards()),
                    group: GroupId::new(partition as i64),
                    ntp: ntp.clone(),
                    // Replica placement across brokers is not built out;
                    // the local node stands in for every replica.
                    broker: Broker::new(
                        self.self_node,
                        self.config.advertised_host.clone(),
                        self.config.advertised_port,
                        None,
                    ),
                };
                builder.add_kv(&LogRecordKey::PartitionAssignment, &assignment)?;
            }
        }
        Ok(Entry::new(BatchType::Controller, vec![builder.build()]))
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("self_node", &self.self_node)
            .field("num_shards", &self.pool.num_shards())
            .finish()
    }
}

/// Commit-pipeline observer guarding controller bookkeeping.
///
/// Each stage only asserts that it runs on the controller's owning shard;
/// a violation is a fatal caller defect.
#[derive(Debug, Default)]
pub struct StageHook {
    _private: (),
}

impl StageHook {
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl CommitObserver for StageHook {
    fn pre_commit(&self, _offset: Offset, _entries: &[Entry]) {
        verify_shard();
    }

    fn abort(&self, _begin: Offset) {
        verify_shard();
    }

    fn commit(&self, _begin: Offset, _committed: Offset) {
        verify_shard();
    }
}
