//! Single-run call tree built from lifecycle events.
//!
//! Events may arrive duplicated, reordered or not at all. The tree stays
//! structurally valid after every event: a child referencing an unknown
//! parent gets a placeholder parent that is merged in place once the real
//! `start` arrives, so children attached to it survive the merge.

use super::node::{NodeOrigin, NodeRecord, NodeStatus, TraceNode};
use crate::protocol::{EventKind, LifecycleEvent, Phase};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Anomaly and activity counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeStats {
    pub events_applied: u64,
    pub duplicate_starts: u64,
    pub duplicate_ends: u64,
    pub orphan_ends: u64,
    pub placeholders_created: u64,
    pub placeholders_merged: u64,
    pub self_parent_fixes: u64,
    pub cycles_refused: u64,
    pub swept: u64,
}

/// What applying one event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Started,
    /// The `start` of a node that existed as a placeholder
    Merged,
    Ended {
        /// The node was the current root
        root: bool,
    },
    Ignored,
}

pub struct TraceTree {
    nodes: HashMap<String, NodeRecord>,
    /// Ids in arrival order
    order: Vec<String>,
    entry_point: String,
    next_seq: u64,
    stats: TreeStats,
}

impl TraceTree {
    pub fn new(entry_point: impl Into<String>) -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
            entry_point: entry_point.into(),
            next_seq: 0,
            stats: TreeStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn stats(&self) -> &TreeStats {
        &self.stats
    }

    pub fn get(&self, id: &str) -> Option<&NodeRecord> {
        self.nodes.get(id)
    }

    /// Apply one lifecycle event
    ///
    /// **Public** - the only mutation entry point besides sweeping
    pub fn apply(&mut self, event: &LifecycleEvent) -> Applied {
        self.stats.events_applied += 1;
        match event.phase {
            Phase::Start => self.apply_start(event),
            Phase::End => self.apply_end(event),
        }
    }

    fn apply_start(&mut self, event: &LifecycleEvent) -> Applied {
        let applied = match self.nodes.get_mut(&event.id) {
            Some(existing) if !existing.is_placeholder() => {
                debug!("Ignoring duplicate start for {}", event.id);
                self.stats.duplicate_starts += 1;
                return Applied::Ignored;
            }
            Some(placeholder) => {
                placeholder.origin = NodeOrigin::Observed;
                placeholder.name = event.name.clone();
                placeholder.kind = event.kind;
                placeholder.start_time = event.timestamp;
                if let Some(end) = placeholder.end_time {
                    placeholder.end_time = Some(end.max(event.timestamp));
                }
                self.stats.placeholders_merged += 1;
                Applied::Merged
            }
            None => {
                self.insert(NodeRecord {
                    id: event.id.clone(),
                    name: event.name.clone(),
                    kind: event.kind,
                    status: NodeStatus::Running,
                    start_time: event.timestamp,
                    end_time: None,
                    parent_id: None,
                    children: Vec::new(),
                    origin: NodeOrigin::Observed,
                    seq: 0,
                });
                Applied::Started
            }
        };

        if let Some(parent_id) = self.resolve_parent(event) {
            if !self.nodes.contains_key(&parent_id) {
                self.insert_placeholder(&parent_id, event.timestamp);
            }
            self.attach(&event.id, &parent_id);
        }
        applied
    }

    fn apply_end(&mut self, event: &LifecycleEvent) -> Applied {
        let Some(node) = self.nodes.get_mut(&event.id) else {
            debug!("Ignoring end for unknown activation {}", event.id);
            self.stats.orphan_ends += 1;
            return Applied::Ignored;
        };
        if !node.complete(event.timestamp) {
            self.stats.duplicate_ends += 1;
            return Applied::Ignored;
        }
        let root = self.root_id().as_deref() == Some(event.id.as_str());
        Applied::Ended { root }
    }

    /// Parent named by the event, with self references corrected
    fn resolve_parent(&mut self, event: &LifecycleEvent) -> Option<String> {
        let parent_id = event.parent_id.as_ref()?;
        if parent_id != &event.id {
            return Some(parent_id.clone());
        }

        self.stats.self_parent_fixes += 1;
        let adopter = self
            .order
            .iter()
            .filter(|id| *id != &event.id)
            .find(|id| {
                self.nodes
                    .get(*id)
                    .is_some_and(|node| node.children.contains(&event.id))
            })
            .cloned();
        debug!(
            "Self-referential parent on {}, using {:?}",
            event.id, adopter
        );
        adopter
    }

    fn insert(&mut self, mut record: NodeRecord) {
        self.next_seq += 1;
        record.seq = self.next_seq;
        self.order.push(record.id.clone());
        self.nodes.insert(record.id.clone(), record);
    }

    fn insert_placeholder(&mut self, id: &str, approx_start: i64) {
        debug!("Creating placeholder parent {}", id);
        self.stats.placeholders_created += 1;
        self.insert(NodeRecord {
            id: id.to_string(),
            name: name_from_id(id),
            kind: EventKind::Function,
            status: NodeStatus::Running,
            start_time: approx_start,
            end_time: None,
            parent_id: None,
            children: Vec::new(),
            origin: NodeOrigin::Placeholder,
            seq: 0,
        });
    }

    /// Make `parent_id` the parent of `child_id`, refusing cycles
    fn attach(&mut self, child_id: &str, parent_id: &str) {
        if self.is_ancestor_or_self(child_id, parent_id) {
            warn!(
                "Refusing to attach {} under {}: would create a cycle",
                child_id, parent_id
            );
            self.stats.cycles_refused += 1;
            return;
        }

        let previous = self
            .nodes
            .get(child_id)
            .and_then(|child| child.parent_id.clone());
        match previous {
            Some(previous) if previous == parent_id => {}
            Some(previous) => {
                if let Some(old) = self.nodes.get_mut(&previous) {
                    old.children.retain(|c| c != child_id);
                }
            }
            None => {}
        }

        if let Some(child) = self.nodes.get_mut(child_id) {
            child.parent_id = Some(parent_id.to_string());
        }
        if let Some(parent) = self.nodes.get_mut(parent_id) {
            if !parent.children.iter().any(|c| c == child_id) {
                parent.children.push(child_id.to_string());
            }
        }
    }

    /// Whether `candidate` is `id` or one of its descendants
    fn is_ancestor_or_self(&self, id: &str, candidate: &str) -> bool {
        let mut current = Some(candidate.to_string());
        let mut steps = 0;
        while let Some(node_id) = current {
            if node_id == id {
                return true;
            }
            steps += 1;
            if steps > self.nodes.len() {
                return true;
            }
            current = self.nodes.get(&node_id).and_then(|n| n.parent_id.clone());
        }
        false
    }

    /// Root by priority among parentless nodes: exact entry-point name,
    /// then a name containing it, then any. Ties go to the earliest start.
    ///
    /// A nested activation is never the root, so the snapshot always
    /// shows the whole top-level subtree it lives in.
    pub fn root_id(&self) -> Option<String> {
        let earliest = |filter: &dyn Fn(&NodeRecord) -> bool| {
            self.nodes
                .values()
                .filter(|node| self.is_parentless(node) && filter(node))
                .min_by_key(|node| (node.start_time, node.seq))
                .map(|node| node.id.clone())
        };

        earliest(&|node: &NodeRecord| node.name == self.entry_point)
            .or_else(|| earliest(&|node: &NodeRecord| node.name.contains(self.entry_point.as_str())))
            .or_else(|| earliest(&|_: &NodeRecord| true))
    }

    fn is_parentless(&self, node: &NodeRecord) -> bool {
        match &node.parent_id {
            None => true,
            Some(parent) => !self.nodes.contains_key(parent),
        }
    }

    /// Complete every running descendant of `id`
    ///
    /// Returns the number of nodes changed.
    pub fn sweep_descendants(&mut self, id: &str, now_ms: i64) -> usize {
        let mut pending: Vec<String> = match self.nodes.get(id) {
            Some(node) => node.children.clone(),
            None => return 0,
        };
        let mut swept = 0;
        while let Some(next) = pending.pop() {
            if let Some(node) = self.nodes.get_mut(&next) {
                if node.complete(now_ms) {
                    swept += 1;
                }
                pending.extend(node.children.iter().cloned());
            }
        }
        if swept > 0 {
            debug!("Swept {} orphaned nodes under {}", swept, id);
        }
        self.stats.swept += swept as u64;
        swept
    }

    /// Sweep below the current root
    pub fn sweep_orphans(&mut self, now_ms: i64) -> usize {
        match self.root_id() {
            Some(root) => self.sweep_descendants(&root, now_ms),
            None => 0,
        }
    }

    /// Nested view: the root subtree plus every other parentless subtree
    pub fn snapshot(&self) -> (Option<TraceNode>, Vec<TraceNode>) {
        let Some(root_id) = self.root_id() else {
            return (None, Vec::new());
        };
        let mut parentless: Vec<&NodeRecord> = self
            .nodes
            .values()
            .filter(|node| self.is_parentless(node) && node.id != root_id)
            .collect();
        parentless.sort_by_key(|node| (node.start_time, node.seq));

        let detached = parentless.iter().map(|node| self.build(&node.id)).collect();
        (Some(self.build(&root_id)), detached)
    }

    fn build(&self, id: &str) -> TraceNode {
        let record = &self.nodes[id];
        let mut children: Vec<&NodeRecord> = record
            .children
            .iter()
            .filter_map(|child| self.nodes.get(child))
            .collect();
        children.sort_by_key(|child| (child.start_time, child.seq));

        TraceNode {
            id: record.id.clone(),
            name: record.name.clone(),
            kind: record.kind,
            status: record.status,
            start_time: record.start_time,
            end_time: record.end_time,
            parent_id: record.parent_id.clone(),
            children: children.iter().map(|child| self.build(&child.id)).collect(),
        }
    }
}

/// Display name guessed from an activation id (`name#seq`)
fn name_from_id(id: &str) -> String {
    match id.rsplit_once('#') {
        Some((name, _)) if !name.is_empty() => name.to_string(),
        _ => id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn start(id: &str, parent: Option<&str>, at: i64) -> LifecycleEvent {
        LifecycleEvent::start(id, name_from_id(id), EventKind::Function, parent.map(str::to_string), at)
    }

    fn end(id: &str, at: i64) -> LifecycleEvent {
        LifecycleEvent::end(id, name_from_id(id), EventKind::Function, None, at)
    }

    fn child_names(node: &TraceNode) -> Vec<&str> {
        node.children.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_nested_calls() {
        let mut tree = TraceTree::new("main");
        tree.apply(&start("main#1", None, 0));
        tree.apply(&start("a#2", Some("main#1"), 1));
        tree.apply(&end("a#2", 2));
        assert_eq!(tree.apply(&end("main#1", 3)), Applied::Ended { root: true });

        let (root, detached) = tree.snapshot();
        let root = root.unwrap();
        assert_eq!(root.name, "main");
        assert_eq!(child_names(&root), vec!["a"]);
        assert!(root.children[0].is_completed());
        assert!(detached.is_empty());
    }

    #[test]
    fn test_duplicate_start_is_ignored() {
        let mut tree = TraceTree::new("main");
        tree.apply(&start("main#1", None, 0));
        tree.apply(&start("a#2", Some("main#1"), 1));
        assert_eq!(tree.apply(&start("a#2", Some("main#1"), 1)), Applied::Ignored);

        assert_eq!(tree.len(), 2);
        assert_eq!(tree.get("main#1").unwrap().children.len(), 1);
        assert_eq!(tree.stats().duplicate_starts, 1);
    }

    #[test]
    fn test_placeholder_merge_keeps_children() {
        let mut tree = TraceTree::new("main");
        tree.apply(&start("child#2", Some("main#1"), 5));
        assert!(tree.get("main#1").unwrap().is_placeholder());

        assert_eq!(tree.apply(&start("main#1", None, 3)), Applied::Merged);
        let main = tree.get("main#1").unwrap();
        assert!(!main.is_placeholder());
        assert_eq!(main.start_time, 3);
        assert_eq!(main.children, vec!["child#2".to_string()]);
        assert_eq!(tree.stats().placeholders_merged, 1);
    }

    #[test]
    fn test_self_parent_is_corrected() {
        let mut tree = TraceTree::new("main");
        tree.apply(&start("helper#1", None, 0));
        tree.apply(&start("tick#2", Some("tick#2"), 1));

        let tick = tree.get("tick#2").unwrap();
        assert_eq!(tick.parent_id, None);
        assert!(tick.children.is_empty());
        assert_eq!(tree.stats().self_parent_fixes, 1);
        assert_eq!(tree.stats().placeholders_created, 0);
    }

    #[test]
    fn test_cycles_are_refused() {
        let mut tree = TraceTree::new("main");
        tree.apply(&start("b#2", Some("a#1"), 1));
        tree.apply(&start("a#1", Some("b#2"), 0));
        assert_eq!(tree.stats().cycles_refused, 1);
        assert_eq!(tree.get("a#1").unwrap().parent_id, None);
    }

    #[test]
    fn test_end_rules() {
        let mut tree = TraceTree::new("main");
        assert_eq!(tree.apply(&end("ghost#9", 1)), Applied::Ignored);
        tree.apply(&start("main#1", None, 10));
        tree.apply(&end("main#1", 5));
        tree.apply(&end("main#1", 50));

        let main = tree.get("main#1").unwrap();
        assert_eq!(main.end_time, Some(10));
        assert_eq!(tree.stats().orphan_ends, 1);
        assert_eq!(tree.stats().duplicate_ends, 1);
    }

    #[test]
    fn test_root_priority() {
        let mut tree = TraceTree::new("main");
        tree.apply(&start("setup#1", None, 0));
        tree.apply(&start("mainLoop#2", None, 1));
        assert_eq!(tree.root_id().as_deref(), Some("mainLoop#2"));
        tree.apply(&start("main#3", None, 2));
        assert_eq!(tree.root_id().as_deref(), Some("main#3"));

        let mut plain = TraceTree::new("main");
        plain.apply(&start("late#2", None, 9));
        plain.apply(&start("early#1", None, 3));
        assert_eq!(plain.root_id().as_deref(), Some("early#1"));
    }

    #[test]
    fn test_nested_entry_point_is_not_the_root() {
        let mut tree = TraceTree::new("main");
        tree.apply(&start("boot#1", None, 0));
        tree.apply(&start("main#2", Some("boot#1"), 1));
        tree.apply(&start("other#3", Some("boot#1"), 2));
        assert_eq!(tree.root_id().as_deref(), Some("boot#1"));

        let (root, detached) = tree.snapshot();
        let root = root.unwrap();
        assert_eq!(root.name, "boot");
        assert_eq!(child_names(&root), vec!["main", "other"]);
        assert!(detached.is_empty());
    }

    #[test]
    fn test_entry_point_under_placeholder_is_not_the_root() {
        let mut tree = TraceTree::new("main");
        tree.apply(&start("getDomain#2", Some("start#1"), 1));
        assert_eq!(tree.root_id().as_deref(), Some("start#1"));

        let (root, _) = tree.snapshot();
        assert_eq!(child_names(&root.unwrap()), vec!["getDomain"]);
    }

    #[test]
    fn test_sweep_completes_running_descendants() {
        let mut tree = TraceTree::new("main");
        tree.apply(&start("main#1", None, 0));
        tree.apply(&start("a#2", Some("main#1"), 1));
        tree.apply(&start("b#3", Some("a#2"), 2));
        tree.apply(&end("main#1", 3));

        assert_eq!(tree.sweep_orphans(100), 2);
        assert_eq!(tree.get("b#3").unwrap().end_time, Some(100));
        assert_eq!(tree.sweep_orphans(200), 0);
    }

    #[test]
    fn test_detached_subtrees() {
        let mut tree = TraceTree::new("main");
        tree.apply(&start("main#1", None, 0));
        tree.apply(&start("cb#2", None, 5));
        let (root, detached) = tree.snapshot();
        assert_eq!(root.unwrap().id, "main#1");
        assert_eq!(detached.len(), 1);
        assert_eq!(detached[0].id, "cb#2");
    }
}
