//! Bus message model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Routing metadata carried by every message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRoute {
    /// Module that produced the message.
    pub source: String,
    /// Destination group.
    pub group: String,
    /// Operation (query, insert, update, delete, ...).
    pub operation: String,
    /// Resource path the operation applies to.
    pub resource: String,
}

/// Identity and correlation fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub id: String,
    /// For replies: the id of the message being answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

/// A unit of communication on the bus.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub header: MessageHeader,
    pub route: MessageRoute,
    #[serde(default)]
    pub content: Vec<u8>,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl Message {
    pub fn new(id: impl Into<String>, route: MessageRoute, content: Vec<u8>) -> Self {
        Self {
            header: MessageHeader {
                id: id.into(),
                parent_id: None,
                timestamp_ms: now_ms(),
            },
            route,
            content,
        }
    }

    /// Build a reply to this message with a fresh id.
    pub fn reply(&self, content: Vec<u8>) -> Self {
        Self {
            header: MessageHeader {
                id: uuid::Uuid::new_v4().to_string(),
                parent_id: Some(self.header.id.clone()),
                timestamp_ms: now_ms(),
            },
            route: self.route.clone(),
            content,
        }
    }

    pub fn id(&self) -> &str {
        &self.header.id
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.header.parent_id.as_deref()
    }
}

/// Structured HTTP reply a bus peer may put in a reply's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpReply {
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub body: String,
}

impl HttpReply {
    pub fn to_content(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}
