//! In-memory node inventory.
//!
//! Stands in for the external inventory when running standalone; seeded from
//! the `[[nodes]]` config table and re-seeded on reload.

use dashmap::DashMap;
use std::sync::Arc;

use crate::authority::{Node, NodeRegistry};
use crate::config::NodeConfig;

/// A thread-safe node inventory.
#[derive(Clone, Default)]
pub struct InMemoryNodeRegistry {
    inner: Arc<DashMap<String, Node>>,
}

impl InMemoryNodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from config seeds, storing each router URL under `annotation_key`.
    pub fn from_config(seeds: &[NodeConfig], annotation_key: &str) -> Self {
        let registry = Self::new();
        registry.reseed(seeds, annotation_key);
        registry
    }

    /// Insert or replace a node.
    pub fn upsert(&self, node: Node) {
        self.inner.insert(node.id.clone(), node);
    }

    pub fn remove(&self, node_id: &str) -> Option<Node> {
        self.inner.remove(node_id).map(|(_, node)| node)
    }

    /// Replace the whole inventory with the given seeds.
    pub fn reseed(&self, seeds: &[NodeConfig], annotation_key: &str) {
        self.inner.retain(|id, _| seeds.iter().any(|s| &s.id == id));
        for seed in seeds {
            self.upsert(Node::new(&seed.id).with_annotation(annotation_key, &seed.router_url));
        }
        tracing::info!(nodes = self.inner.len(), "Node inventory seeded");
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl NodeRegistry for InMemoryNodeRegistry {
    fn get_node(&self, node_id: &str) -> Option<Node> {
        self.inner.get(node_id).map(|entry| entry.value().clone())
    }
}
