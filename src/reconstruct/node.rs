//! Trace node types.
//!
//! `NodeRecord` is the mutable bookkeeping entry owned by the tree;
//! `TraceNode` is the read-only nested snapshot handed to consumers.

use crate::protocol::EventKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Running,
    Completed,
}

/// Whether a record has seen its own `start` event yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOrigin {
    Observed,
    /// Created to hold children before the parent's `start` arrived
    Placeholder,
}

#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub id: String,
    pub name: String,
    pub kind: EventKind,
    pub status: NodeStatus,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub parent_id: Option<String>,
    /// Child ids in arrival order
    pub children: Vec<String>,
    pub origin: NodeOrigin,
    /// Arrival index, used to break timestamp ties
    pub seq: u64,
}

impl NodeRecord {
    pub fn is_placeholder(&self) -> bool {
        self.origin == NodeOrigin::Placeholder
    }

    /// Mark completed; the first end time wins and never precedes the start
    pub fn complete(&mut self, at: i64) -> bool {
        if self.status == NodeStatus::Completed {
            return false;
        }
        self.status = NodeStatus::Completed;
        self.end_time = Some(at.max(self.start_time));
        true
    }
}

/// Reconstructed activation with its nested children
///
/// **Public** - the snapshot shape consumed by visualizers and the CLI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceNode {
    pub id: String,
    pub name: String,
    pub kind: EventKind,
    pub status: NodeStatus,
    pub start_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub children: Vec<TraceNode>,
}

impl TraceNode {
    /// Number of nodes in this subtree
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(TraceNode::size).sum::<usize>()
    }

    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(TraceNode::depth).max().unwrap_or(0)
    }

    /// First node with this name, depth-first
    pub fn find(&self, name: &str) -> Option<&TraceNode> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(name))
    }

    pub fn is_completed(&self) -> bool {
        self.status == NodeStatus::Completed
    }

    pub fn duration(&self) -> Option<i64> {
        self.end_time.map(|end| end - self.start_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str) -> TraceNode {
        TraceNode {
            id: format!("{}#1", name),
            name: name.to_string(),
            kind: EventKind::Function,
            status: NodeStatus::Completed,
            start_time: 10,
            end_time: Some(15),
            parent_id: None,
            children: Vec::new(),
        }
    }

    #[test]
    fn test_tree_helpers() {
        let mut root = leaf("main");
        let mut child = leaf("child");
        child.children.push(leaf("grandchild"));
        root.children.push(child);

        assert_eq!(root.size(), 3);
        assert_eq!(root.depth(), 3);
        assert!(root.find("grandchild").is_some());
        assert_eq!(root.duration(), Some(5));
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(leaf("main")).unwrap();
        assert_eq!(json["startTime"], 10);
        assert_eq!(json["status"], "completed");
        assert!(json.get("parentId").is_none());
    }
}
