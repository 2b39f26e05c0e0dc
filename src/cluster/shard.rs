//! Thread-per-core shard model.
//!
//! Each shard is one single-threaded cooperative scheduler pinned to its own
//! OS thread: no preemption within a shard, work proceeds via chained
//! asynchronous continuations. There is no shared mutable memory between
//! shards; any cross-shard effect is expressed as an explicit invocation
//! routed to the target shard and completes asynchronously.
//!
//! [`ShardPool`] owns the workers. [`Sharded`] holds one service instance
//! per shard and routes invocations to the owning worker:
//! [`Sharded::invoke_on`] is a targeted message, [`Sharded::invoke_on_all`]
//! a broadcast that acts as a barrier: it completes only once every shard
//! has run the closure.

use std::cell::Cell;
use std::future::Future;
use std::sync::Arc;

use conhash::{ConsistentHash, Node};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::cluster::error::{ClusterError, ClusterResult};
use crate::constants::VIRTUAL_NODES_PER_SHARD;
use crate::types::{Ntp, ShardId};

thread_local! {
    static CURRENT_SHARD: Cell<Option<ShardId>> = const { Cell::new(None) };
}

/// The shard the calling thread belongs to, or `None` when called from a
/// thread outside the pool.
pub fn current_shard() -> Option<ShardId> {
    CURRENT_SHARD.with(|c| c.get())
}

type ShardTask = Box<dyn FnOnce() + Send + 'static>;

/// A fixed set of shard workers, one single-threaded runtime per shard.
///
/// Workers exit when the pool is dropped; in-flight local tasks are
/// cancelled with their runtime.
pub struct ShardPool {
    senders: Vec<mpsc::UnboundedSender<ShardTask>>,
}

impl ShardPool {
    /// Spawn `num_shards` workers. Each worker thread runs a current-thread
    /// tokio runtime driving a `LocalSet`, so invoked futures need not be
    /// `Send`.
    pub fn new(num_shards: u32) -> ClusterResult<Arc<Self>> {
        if num_shards == 0 {
            return Err(ClusterError::Config(
                "shard pool requires at least one shard".to_string(),
            ));
        }
        let mut senders = Vec::with_capacity(num_shards as usize);
        for i in 0..num_shards {
            let (tx, mut rx) = mpsc::unbounded_channel::<ShardTask>();
            let id = ShardId::new(i);
            std::thread::Builder::new()
                .name(format!("shard-{i}"))
                .spawn(move || {
                    CURRENT_SHARD.with(|c| c.set(Some(id)));
                    let runtime = match tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                    {
                        Ok(runtime) => runtime,
                        Err(e) => {
                            tracing::error!(shard = %id, error = %e, "failed to build shard runtime");
                            return;
                        }
                    };
                    let local = tokio::task::LocalSet::new();
                    local.block_on(&runtime, async move {
                        while let Some(task) = rx.recv().await {
                            task();
                        }
                    });
                    debug!(shard = %id, "shard worker stopped");
                })
                .map_err(|e| ClusterError::Shard(format!("failed to spawn shard thread: {e}")))?;
            senders.push(tx);
        }
        Ok(Arc::new(Self { senders }))
    }

    pub fn num_shards(&self) -> u32 {
        self.senders.len() as u32
    }

    /// Run `f` on `shard` and await its result.
    ///
    /// The closure is invoked on the shard's thread; the future it returns
    /// is driven by the shard's scheduler and may hold non-`Send` state.
    pub async fn invoke_on<T, F, Fut>(&self, shard: ShardId, f: F) -> ClusterResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + 'static,
    {
        let sender = self.senders.get(shard.value() as usize).ok_or_else(|| {
            ClusterError::Shard(format!(
                "no such shard: {shard} (pool has {})",
                self.senders.len()
            ))
        })?;
        let (done_tx, done_rx) = oneshot::channel();
        let task: ShardTask = Box::new(move || {
            let future = f();
            tokio::task::spawn_local(async move {
                let _ = done_tx.send(future.await);
            });
        });
        sender
            .send(task)
            .map_err(|_| ClusterError::Shard(format!("shard {shard} worker stopped")))?;
        done_rx
            .await
            .map_err(|_| ClusterError::Shard(format!("shard {shard} dropped the invocation")))
    }

    /// Run `f` on every shard and wait for all of them.
    ///
    /// This is a barrier: it completes only once the closure has finished
    /// on every shard.
    pub async fn invoke_on_all<F, Fut>(&self, f: F) -> ClusterResult<()>
    where
        F: Fn() -> Fut + Clone + Send + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        let invocations: Vec<_> = (0..self.num_shards())
            .map(|i| self.invoke_on(ShardId::new(i), f.clone()))
            .collect();
        for result in futures::future::join_all(invocations).await {
            result?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ShardPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardPool")
            .field("num_shards", &self.num_shards())
            .finish()
    }
}

/// One service instance per shard.
///
/// Instances are only mutated through [`Sharded::invoke_on`] /
/// [`Sharded::invoke_on_all`], which route execution to the owning shard;
/// [`Sharded::local`] hands out the calling shard's own instance for local
/// reads.
pub struct Sharded<T> {
    pool: Arc<ShardPool>,
    instances: Vec<Arc<T>>,
}

impl<T> Clone for Sharded<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            instances: self.instances.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> Sharded<T> {
    /// Build one instance per shard of `pool`.
    pub fn new(pool: Arc<ShardPool>, mut build: impl FnMut(ShardId) -> T) -> Self {
        let instances = (0..pool.num_shards())
            .map(|i| Arc::new(build(ShardId::new(i))))
            .collect();
        Self { pool, instances }
    }

    pub fn num_shards(&self) -> u32 {
        self.instances.len() as u32
    }

    /// The calling shard's own instance.
    ///
    /// Fails when called from a thread outside the pool.
    pub fn local(&self) -> ClusterResult<Arc<T>> {
        let shard = current_shard().ok_or_else(|| {
            ClusterError::Shard("local() called from outside the shard pool".to_string())
        })?;
        self.get(shard)
    }

    /// The instance owned by `shard`, for read-only access.
    pub fn get(&self, shard: ShardId) -> ClusterResult<Arc<T>> {
        self.instances
            .get(shard.value() as usize)
            .cloned()
            .ok_or_else(|| ClusterError::Shard(format!("no such shard: {shard}")))
    }

    /// Run `f` against `shard`'s instance, on that shard.
    pub async fn invoke_on<R, F, Fut>(&self, shard: ShardId, f: F) -> ClusterResult<R>
    where
        R: Send + 'static,
        F: FnOnce(Arc<T>) -> Fut + Send + 'static,
        Fut: Future<Output = R> + 'static,
    {
        let instance = self.get(shard)?;
        self.pool.invoke_on(shard, move || f(instance)).await
    }

    /// Run `f` against every shard's instance, on the owning shards, and
    /// wait for all of them (broadcast barrier).
    pub async fn invoke_on_all<F, Fut>(&self, f: F) -> ClusterResult<()>
    where
        F: Fn(Arc<T>) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        let invocations: Vec<_> = (0..self.num_shards())
            .map(|i| self.invoke_on(ShardId::new(i), f.clone()))
            .collect();
        for result in futures::future::join_all(invocations).await {
            result?;
        }
        Ok(())
    }
}

impl<T> std::fmt::Debug for Sharded<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sharded")
            .field("num_shards", &self.instances.len())
            .finish()
    }
}

#[derive(Clone)]
struct ShardNode(u32);

impl Node for ShardNode {
    fn name(&self) -> String {
        format!("shard-{}", self.0)
    }
}

/// Deterministic shard placement for an NTP.
///
/// Uses a consistent hash ring over the shard set so placement is stable
/// for a given shard count and spreads partitions evenly.
pub fn shard_of(ntp: &Ntp, num_shards: u32) -> ShardId {
    if num_shards <= 1 {
        return ShardId::new(0);
    }
    let mut ring: ConsistentHash<ShardNode> = ConsistentHash::new();
    for shard in 0..num_shards {
        ring.add(&ShardNode(shard), VIRTUAL_NODES_PER_SHARD);
    }
    match ring.get_str(&ntp.path()) {
        Some(node) => ShardId::new(node.0),
        None => ShardId::new(0),
    }
}
