//! In-memory replicated log for testing.
//!
//! This provides a single-node stand-in for the consensus layer: appends
//! apply straight into the backing [`Log`] and acknowledge immediately.
//! Failure injection drives the controller's append-failure and timeout
//! paths.
//!
//! # Usage
//!
//! This module is available when the `test-utilities` feature is enabled,
//! or during unit tests:
//!
//! ```toml
//! [dev-dependencies]
//! metalog = { path = ".", features = ["test-utilities"] }
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::cluster::consensus::{
    AppendEntriesReply, AppendEntriesRequest, CommitObserver, ReplicatedLog,
};
use crate::cluster::error::{ClusterError, ClusterResult};
use crate::storage::Log;
use crate::types::{NodeId, Offset};

/// How the mock fails the next appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppendFailure {
    /// Appends apply and acknowledge.
    #[default]
    None,
    /// Appends are rejected: a reply with `success = false`.
    Reject,
    /// Appends error out, modeling a thrown exception in the consensus
    /// layer.
    Error,
}

/// In-memory [`ReplicatedLog`] applying entries to a local [`Log`].
pub struct MemoryReplicatedLog {
    node_id: NodeId,
    log: Arc<Log>,
    failure: Mutex<AppendFailure>,
    delay: Mutex<Option<Duration>>,
    observer: Mutex<Option<Arc<dyn CommitObserver>>>,
    appends: AtomicUsize,
    batches_appended: AtomicUsize,
}

impl MemoryReplicatedLog {
    /// Wrap `log` as the replicated controller log of `node_id`.
    pub fn new(node_id: NodeId, log: Arc<Log>) -> Self {
        Self {
            node_id,
            log,
            failure: Mutex::new(AppendFailure::None),
            delay: Mutex::new(None),
            observer: Mutex::new(None),
            appends: AtomicUsize::new(0),
            batches_appended: AtomicUsize::new(0),
        }
    }

    /// Inject a failure mode for subsequent appends.
    pub fn set_failure(&self, failure: AppendFailure) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = failure;
    }

    /// Delay every append, for driving deadline expiry.
    pub fn set_append_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// Register a commit observer invoked around each applied append.
    pub fn set_observer(&self, observer: Arc<dyn CommitObserver>) {
        *self.observer.lock().unwrap_or_else(PoisonError::into_inner) = Some(observer);
    }

    /// Number of append calls seen, failed ones included.
    pub fn append_calls(&self) -> usize {
        self.appends.load(Ordering::SeqCst)
    }

    /// Number of batches applied to the backing log.
    pub fn batches_appended(&self) -> usize {
        self.batches_appended.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> Arc<Log> {
        self.log.clone()
    }

    fn current_failure(&self) -> AppendFailure {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_delay(&self) -> Option<Duration> {
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_observer(&self) -> Option<Arc<dyn CommitObserver>> {
        self.observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ReplicatedLog for MemoryReplicatedLog {
    async fn append_entries(
        &self,
        request: AppendEntriesRequest,
    ) -> ClusterResult<AppendEntriesReply> {
        self.appends.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.current_delay() {
            tokio::time::sleep(delay).await;
        }
        match self.current_failure() {
            AppendFailure::Reject => {
                debug!("rejecting append");
                return Ok(AppendEntriesReply {
                    node_id: self.node_id,
                    last_offset: Offset::INVALID,
                    success: false,
                });
            }
            AppendFailure::Error => {
                return Err(ClusterError::Append("injected append failure".to_string()));
            }
            AppendFailure::None => {}
        }

        let observer = self.current_observer();
        let begin = self.log.tracker().next_offset();
        if let Some(observer) = &observer {
            observer.pre_commit(begin, &request.entries);
        }

        let mut last = Offset::INVALID;
        for entry in request.entries {
            for batch in entry.batches {
                last = self.log.append(batch)?;
                self.batches_appended.fetch_add(1, Ordering::SeqCst);
            }
        }

        if let Some(observer) = &observer {
            observer.commit(begin, self.log.tracker().committed_offset());
        }

        Ok(AppendEntriesReply {
            node_id: self.node_id,
            last_offset: last,
            success: true,
        })
    }
}
