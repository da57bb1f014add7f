//! Node domain types
//!
//! Nodes are registered by the polling daemon; the execution engine itself
//! never reads them. The record lives here so the store schema is complete.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node_id: String,
    pub name: String,
    pub os: String,
    pub capabilities: Vec<String>,
    pub last_heartbeat: Option<chrono::DateTime<chrono::Utc>>,
    pub status: String,
}
