//! Controller configuration.

use std::time::Duration;

use crate::cluster::error::{ClusterError, ClusterResult};
use crate::types::NodeId;

/// Configuration for a controller node.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// This node's identity. Assignments whose broker equals this id are
    /// actionable locally.
    pub node_id: NodeId,

    /// Number of shards (core-affine workers) on this node.
    ///
    /// Default: number of CPU cores
    pub num_shards: u32,

    /// Host advertised in partition assignments synthesized by this node.
    ///
    /// Default: "localhost"
    pub advertised_host: String,

    /// Port advertised in partition assignments synthesized by this node.
    ///
    /// Default: 9092
    pub advertised_port: u32,

    /// Default deadline for `create_topics` when the caller does not
    /// provide one.
    ///
    /// Default: 30s
    pub create_topics_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            node_id: NodeId::new(0),
            num_shards: std::thread::available_parallelism()
                .map(|p| p.get() as u32)
                .unwrap_or(4),
            advertised_host: "localhost".to_string(),
            advertised_port: 9092,
            create_topics_timeout: Duration::from_secs(30),
        }
    }
}

impl ControllerConfig {
    /// Create configuration from environment variables.
    ///
    /// - `METALOG_NODE_ID`: This node's id (default: 0)
    /// - `METALOG_SHARDS`: Number of shards (default: num_cpus)
    /// - `METALOG_ADVERTISED_HOST`: Advertised host (default: "localhost")
    /// - `METALOG_ADVERTISED_PORT`: Advertised port (default: 9092)
    /// - `METALOG_CREATE_TOPICS_TIMEOUT_MS`: Default create-topics deadline
    ///   (default: 30000)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let node_id = std::env::var("METALOG_NODE_ID")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(NodeId::new)
            .unwrap_or(defaults.node_id);

        let num_shards = std::env::var("METALOG_SHARDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.num_shards);

        let advertised_host =
            std::env::var("METALOG_ADVERTISED_HOST").unwrap_or(defaults.advertised_host);

        let advertised_port = std::env::var("METALOG_ADVERTISED_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.advertised_port);

        let create_topics_timeout = std::env::var("METALOG_CREATE_TOPICS_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.create_topics_timeout);

        Self {
            node_id,
            num_shards,
            advertised_host,
            advertised_port,
            create_topics_timeout,
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ClusterResult<()> {
        if !self.node_id.is_valid() {
            return Err(ClusterError::Config(format!(
                "node_id must be non-negative, got {}",
                self.node_id
            )));
        }
        if self.num_shards == 0 {
            return Err(ClusterError::Config(
                "num_shards must be at least 1".to_string(),
            ));
        }
        if self.advertised_host.is_empty() {
            return Err(ClusterError::Config(
                "advertised_host must not be empty".to_string(),
            ));
        }
        if self.advertised_port == 0 || self.advertised_port > u16::MAX as u32 {
            return Err(ClusterError::Config(format!(
                "advertised_port must be a valid TCP port, got {}",
                self.advertised_port
            )));
        }
        Ok(())
    }
}
