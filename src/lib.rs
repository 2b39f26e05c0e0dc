//! # Metalog
//! Control-plane state machine for a log-structured storage cluster.
//!
//! Metalog treats cluster metadata (topics, partitions, replica placement) as
//! a replicated, ordered log. A node rebuilds its authoritative in-memory
//! state by replaying that log on startup, and mutates it by appending new
//! entries and waiting for the consensus layer to acknowledge them as
//! durably committed.
//!
//! The crate has two tightly coupled halves:
//!
//! - [`storage`]: the log streaming pipeline. It turns variable-length,
//!   possibly multi-segment on-disk log data into a lazily-produced sequence
//!   of atomic record batches, under strict byte and offset budgets.
//! - [`cluster`]: the controller. It consumes the streaming pipeline over a
//!   dedicated metadata log, dispatches every decoded record into per-shard
//!   subsystems (shard table, then partition manager, in that order), and
//!   drives the topic-creation write path.
//!
//! # Goals
//! - Easy to understand code
//! - Leverage best in class libraries such as [Tokio](https://tokio.rs/), [Nom](https://docs.rs/nom/latest/nom/)
//! - A thread-per-core shard model with message passing between shards
//! - Fail-fast recovery: malformed or unrecognized metadata aborts startup
//!   instead of being silently dropped
//!
//! ## Reading a log
//!
//! The streaming pipeline can be used on its own:
//!
//! ```rust,no_run
//! use metalog::storage::{Log, LogReaderConfig};
//! use metalog::types::Offset;
//!
//! #[tokio::main]
//! async fn main() -> metalog::error::Result<()> {
//!     let log = Log::new(Offset::new(0));
//!     let mut reader = log.make_reader(LogReaderConfig::from_offset(Offset::new(0)));
//!     while let Some(batch) = reader.next_batch().await? {
//!         println!("batch at {} with {} records", batch.base_offset(), batch.record_count());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Running the controller
//!
//! The controller is assembled from a shard pool, the per-shard services, and
//! a consensus handle:
//!
//! ```text
//! let pool = ShardPool::new(4)?;
//! let logs = Arc::new(LogManager::new());
//! let pm = Sharded::new(pool.clone(), |shard| PartitionManager::new(shard, logs.clone()));
//! let st = Sharded::new(pool.clone(), |shard| ShardTable::new(shard));
//! let controller = Controller::new(config, pool.clone(), pm, st, consensus);
//!
//! // All controller entry points must run on the controller's owning shard.
//! pool.invoke_on(Controller::SHARD, move || async move { controller.start().await })
//!     .await??;
//! ```

#![forbid(unsafe_code)]

pub mod constants;
pub mod encode;
pub mod error;
mod parser;
pub mod types;

pub mod cluster;
pub mod metrics;
pub mod storage;
pub mod telemetry;

pub mod prelude {
    //! Main exports of the controller and streaming pipeline.
    pub use crate::error::{Error, Result};
    pub use crate::types::{GroupId, IoPriority, NodeId, Ntp, Offset, PartitionIndex, ShardId};

    pub use crate::cluster::{
        Controller, ControllerConfig, PartitionAssignment, TopicConfiguration, TopicErrorCode,
        TopicResult,
    };
    pub use crate::storage::{Log, LogManager, LogReader, LogReaderConfig, Record, RecordBatch};

    pub use bytes;
}
