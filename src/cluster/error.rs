//! Error types for the controller and cluster services.
//!
//! # Error Handling Patterns
//!
//! The controller uses two patterns based on operation criticality:
//!
//! ## Fail-Fast (Propagate Errors)
//!
//! Used where failure indicates the replayed metadata cannot be trusted:
//! - Batch/record decoding during recovery
//! - Compressed controller batches (skipping one would silently drop
//!   metadata)
//! - Unrecognized record kinds
//!
//! A recovery error aborts `start()` and keeps the node from becoming
//! ready.
//!
//! ## Best-Effort (Log and Continue)
//!
//! Used where partial failure is acceptable:
//! - Background partition-manage calls after a committed assignment; each
//!   assignment is independently actionable, so one failure does not abort
//!   recovery of subsequent entries
//! - Metric collection
//!
//! ## Write Path
//!
//! Append failures and timeouts never cross the request boundary as errors;
//! they are folded into per-topic [`TopicErrorCode`] results.
//!
//! [`TopicErrorCode`]: crate::cluster::TopicErrorCode

use thiserror::Error;

use crate::types::{Ntp, Offset};

/// Result type for controller and cluster-service operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors surfaced by controller recovery, the write path and cross-shard
/// plumbing.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// A batch or record payload failed to decode.
    #[error("decode error: {0}")]
    Decode(#[from] crate::error::Error),

    /// Recovery met a compressed controller batch. Compressed metadata is
    /// not supported; skipping the batch would silently drop metadata, so
    /// recovery fails instead.
    #[error("compressed controller batch at offset {offset} cannot be replayed")]
    CompressedBatch { offset: Offset },

    /// A controller record carried a key tag this build does not recognize.
    #[error("unrecognized controller record kind: {0}")]
    UnknownRecordKind(i8),

    /// The replicated log rejected or failed an append.
    #[error("append failed: {0}")]
    Append(String),

    /// A replication round did not complete before the caller's deadline.
    #[error("timed out waiting for replication")]
    Timeout,

    /// A cross-shard invocation could not be delivered or completed.
    #[error("shard invocation failed: {0}")]
    Shard(String),

    /// A partition expected to be managed locally was not found.
    #[error("partition {ntp} is not managed on this shard")]
    NotManaged { ntp: Ntp },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}
