//! Interfaces to the replication/consensus layer.
//!
//! The consensus protocol itself lives outside this crate. It guarantees
//! that the controller log is totally ordered and durable once an append is
//! acknowledged. The controller only depends on the contracts here.

use async_trait::async_trait;

use crate::cluster::error::ClusterResult;
use crate::storage::{BatchType, RecordBatch};
use crate::types::{NodeId, Offset};

/// One replicated log entry: a typed run of record batches appended
/// atomically.
#[derive(Debug, Clone)]
pub struct Entry {
    pub batch_type: BatchType,
    pub batches: Vec<RecordBatch>,
}

impl Entry {
    pub fn new(batch_type: BatchType, batches: Vec<RecordBatch>) -> Self {
        Self {
            batch_type,
            batches,
        }
    }
}

/// An append request covering one or more entries.
#[derive(Debug)]
pub struct AppendEntriesRequest {
    pub node_id: NodeId,
    pub entries: Vec<Entry>,
}

/// Acknowledgment for an append.
///
/// `success` means the entries are durably committed in total order; the
/// caller may then report the operation as applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendEntriesReply {
    pub node_id: NodeId,
    /// Base offset of the last appended batch, [`Offset::INVALID`] when the
    /// append was rejected.
    pub last_offset: Offset,
    pub success: bool,
}

/// The replicated log the controller appends to.
///
/// May fail or return an unsuccessful reply; either is treated as append
/// failure by the caller.
#[async_trait]
pub trait ReplicatedLog: Send + Sync {
    async fn append_entries(&self, request: AppendEntriesRequest)
        -> ClusterResult<AppendEntriesReply>;
}

/// Observer of the commit pipeline.
///
/// Invoked at well-defined points of replication: before a run of entries
/// becomes locally visible, after an abort, and after a commit up to a
/// given offset. Implementations may assert execution context; the
/// controller's stage hook requires every call to originate on the
/// controller's owning shard.
pub trait CommitObserver: Send + Sync {
    /// Entries are about to become locally visible starting at `offset`.
    fn pre_commit(&self, offset: Offset, entries: &[Entry]);

    /// Replication of the run starting at `begin` was aborted.
    fn abort(&self, begin: Offset);

    /// Entries in `[begin, committed]` are durably committed.
    fn commit(&self, begin: Offset, committed: Offset);
}
