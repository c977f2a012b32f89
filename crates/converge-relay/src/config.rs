//! Relay tunables.

use serde::Deserialize;

use crate::protocol::Topology;

/// Dissemination settings shared by every room of a registry.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Sessions a gossip message is forwarded to per relay.
    pub fanout: usize,
    /// How long a gossip message id is remembered, in milliseconds.
    pub seen_ttl_ms: u64,
    /// Sweep expired ids once more than this many are remembered.
    pub sweep_threshold: usize,
    /// Hard cap on remembered ids.
    pub seen_capacity: usize,
    /// Snapshot namespaces when the first joiner names none.
    pub default_namespaces: Vec<String>,
    /// Topology when the first joiner names none.
    pub default_topology: Topology,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            fanout: 3,
            seen_ttl_ms: 30_000,
            sweep_threshold: 1_000,
            seen_capacity: 10_000,
            default_namespaces: vec!["state".to_owned()],
            default_topology: Topology::Star,
        }
    }
}
