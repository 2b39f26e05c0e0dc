//! Controller state machine and per-shard cluster services.
//!
//! # Architecture
//!
//! ```text
//!                      ┌───────────────────┐
//!                      │  replicated log   │  ← consensus (external)
//!                      └─────────┬─────────┘
//!                                │ ordered, durable batches
//!                                ▼
//!                      ┌───────────────────┐
//!                      │    controller     │  shard 0 only
//!                      └─────────┬─────────┘
//!              broadcast (all)   │   targeted (owning shard)
//!            ┌───────────────────┼───────────────────┐
//!            ▼                   ▼                   ▼
//!      ┌──────────┐        ┌──────────┐        ┌──────────┐
//!      │ shard 0  │        │ shard 1  │        │ shard N  │
//!      │ table+pm │        │ table+pm │        │ table+pm │
//!      └──────────┘        └──────────┘        └──────────┘
//! ```
//!
//! Recovery replays the controller's metadata log in offset order. For each
//! local partition assignment the shard table entry is broadcast to every
//! shard first; only then is the owning shard's partition manager asked to
//! manage the NTP, in the background. The write path appends metadata
//! entries through the consensus layer and reports success only on durable
//! commit.

mod batch_builder;
mod config;
pub mod consensus;
mod controller;
mod error;
mod partition_manager;
mod shard;
mod shard_table;
mod types;

#[cfg(any(test, feature = "test-utilities"))]
pub mod mock_consensus;

pub use batch_builder::SimpleBatchBuilder;
pub use config::ControllerConfig;
pub use consensus::{
    AppendEntriesReply, AppendEntriesRequest, CommitObserver, Entry, ReplicatedLog,
};
pub use controller::{Controller, StageHook};
pub use error::{ClusterError, ClusterResult};
#[cfg(any(test, feature = "test-utilities"))]
pub use mock_consensus::{AppendFailure, MemoryReplicatedLog};
pub use partition_manager::PartitionManager;
pub use shard::{current_shard, shard_of, ShardPool, Sharded};
pub use shard_table::ShardTable;
pub use types::{
    Broker, CompactionPolicy, Compression, LogRecordKey, PartitionAssignment,
    TopicConfiguration, TopicErrorCode, TopicResult,
};
