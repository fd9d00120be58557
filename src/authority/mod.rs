//! Authority resolution.
//!
//! # Data Flow
//! ```text
//! node ID (first path segment)
//!     → NodeRegistry::get_node (external inventory, read-only)
//!     → annotation holding the authoritative router URL
//!     → compare with this instance's own router URL
//!     → Local | Remote(url) | Unknown
//! ```
//!
//! # Design Decisions
//! - The registry is consumed, never mutated, by the request path
//! - Comparison is by exact string value
//! - Missing node and missing/empty annotation are the same outcome (Unknown)

pub mod memory;

use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;

pub use memory::InMemoryNodeRegistry;

/// A managed node as seen by the inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    pub id: String,
    pub annotations: HashMap<String, String>,
}

impl Node {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            annotations: HashMap::new(),
        }
    }

    /// Builder-style annotation setter.
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}

/// External node inventory lookup.
pub trait NodeRegistry: Send + Sync {
    /// Returns the node if the inventory knows it.
    fn get_node(&self, node_id: &str) -> Option<Node>;
}

/// Who should serve a node's requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authority {
    /// This instance is authoritative.
    Local,
    /// Another instance is; carries its advertised base URL.
    Remote(String),
    /// Node unknown, or it advertises no router.
    Unknown,
}

/// Decides whether this instance is the authoritative router for a node.
pub struct AuthorityResolver {
    nodes: Arc<dyn NodeRegistry>,
    annotation_key: ArcSwap<String>,
    own_url: String,
}

impl AuthorityResolver {
    pub fn new(nodes: Arc<dyn NodeRegistry>, annotation_key: impl Into<String>, own_url: impl Into<String>) -> Self {
        Self {
            nodes,
            annotation_key: ArcSwap::from_pointee(annotation_key.into()),
            own_url: own_url.into(),
        }
    }

    /// Annotation currently read for the router URL.
    pub fn annotation_key(&self) -> Arc<String> {
        self.annotation_key.load_full()
    }

    /// Read router URLs from `key` for subsequent lookups.
    pub fn set_annotation_key(&self, key: impl Into<String>) {
        self.annotation_key.store(Arc::new(key.into()));
    }

    /// This instance's own router URL.
    pub fn own_url(&self) -> &str {
        &self.own_url
    }

    pub fn resolve(&self, node_id: &str) -> Authority {
        let key = self.annotation_key.load();
        let advertised = self
            .nodes
            .get_node(node_id)
            .and_then(|node| node.annotations.get(key.as_str()).cloned())
            .filter(|url| !url.is_empty());

        match advertised {
            None => Authority::Unknown,
            Some(url) if url == self.own_url => Authority::Local,
            Some(url) => Authority::Remote(url),
        }
    }
}
