//! Best-effort call tree from log text alone.
//!
//! Used when a run produced output but no structured events. Three
//! heuristics are tried in order:
//! 1. explicit `X calling Y` phrases
//! 2. start / complete phrase pairs, nested by an open-activation stack
//! 3. distinct `name()` mentions in output order, taken as a linear chain
//!
//! Recovered trees are never merged with event-derived nodes. Line
//! indices stand in for timestamps.

pub mod patterns;

use crate::protocol::EventKind;
use crate::reconstruct::{NodeStatus, TraceNode};
use log::debug;
use patterns::Marker;
use std::collections::{HashMap, HashSet};

/// Name of the synthetic root used when several top-level nodes were found
pub const RECOVERED_ROOT: &str = "(program)";

/// Rebuild a tree from log lines
///
/// **Public** - fallback producer used by the trace session and the CLI
///
/// # Returns
/// `None` when no heuristic finds any structure
pub fn recover_from_logs(lines: &[String]) -> Option<TraceNode> {
    let tree = from_calls(lines)
        .or_else(|| from_markers(lines))
        .or_else(|| from_mentions(lines))?;
    debug!("Recovered {} nodes from {} log lines", tree.size(), lines.len());
    Some(tree)
}

/// Arena of provisional nodes
#[derive(Default)]
struct Draft {
    nodes: Vec<DraftNode>,
    per_name: HashMap<String, usize>,
}

struct DraftNode {
    name: String,
    parent: Option<usize>,
    start: i64,
    end: Option<i64>,
    children: Vec<usize>,
    id: String,
}

impl Draft {
    fn add(&mut self, name: &str, parent: Option<usize>, start: i64) -> usize {
        let count = self.per_name.entry(name.to_string()).or_insert(0);
        *count += 1;
        let index = self.nodes.len();
        self.nodes.push(DraftNode {
            name: name.to_string(),
            parent,
            start,
            end: None,
            children: Vec::new(),
            id: format!("recovered:{}#{}", name, count),
        });
        if let Some(parent) = parent {
            self.nodes[parent].children.push(index);
        }
        index
    }

    /// Single tree: the only top-level node, or a synthetic root above several
    fn finish(self) -> Option<TraceNode> {
        let roots: Vec<usize> = (0..self.nodes.len())
            .filter(|i| self.nodes[*i].parent.is_none())
            .collect();
        match roots.as_slice() {
            [] => None,
            [only] => Some(self.build(*only, None)),
            many => {
                let children: Vec<TraceNode> = many
                    .iter()
                    .map(|i| self.build(*i, Some(format!("recovered:{}#1", RECOVERED_ROOT))))
                    .collect();
                let start = children.iter().map(|c| c.start_time).min().unwrap_or(0);
                let end = children
                    .iter()
                    .map(|c| c.end_time.unwrap_or(c.start_time))
                    .max();
                Some(TraceNode {
                    id: format!("recovered:{}#1", RECOVERED_ROOT),
                    name: RECOVERED_ROOT.to_string(),
                    kind: EventKind::Function,
                    status: NodeStatus::Completed,
                    start_time: start,
                    end_time: end,
                    parent_id: None,
                    children,
                })
            }
        }
    }

    fn build(&self, index: usize, parent_id: Option<String>) -> TraceNode {
        let node = &self.nodes[index];
        TraceNode {
            id: node.id.clone(),
            name: node.name.clone(),
            kind: EventKind::Function,
            status: if node.end.is_some() {
                NodeStatus::Completed
            } else {
                NodeStatus::Running
            },
            start_time: node.start,
            end_time: node.end,
            parent_id: node.parent.map(|p| self.nodes[p].id.clone()).or(parent_id),
            children: node
                .children
                .iter()
                .map(|child| self.build(*child, None))
                .collect(),
        }
    }
}

/// Heuristic 1: `caller calling callee`
fn from_calls(lines: &[String]) -> Option<TraceNode> {
    let mut edges: Vec<(String, String)> = Vec::new();
    let mut first_seen: Vec<String> = Vec::new();
    let mut span: HashMap<String, (i64, i64)> = HashMap::new();

    for (line_no, line) in lines.iter().enumerate() {
        for (caller, callee) in patterns::calls(line) {
            for name in [&caller, &callee] {
                let at = line_no as i64;
                span.entry(name.clone())
                    .and_modify(|(_, last)| *last = at)
                    .or_insert((at, at));
                if !first_seen.contains(name) {
                    first_seen.push(name.clone());
                }
            }
            if !edges.contains(&(caller.clone(), callee.clone())) {
                edges.push((caller, callee));
            }
        }
    }
    if edges.is_empty() {
        return None;
    }

    let callees: HashSet<&String> = edges.iter().map(|(_, callee)| callee).collect();
    let roots: Vec<&String> = first_seen.iter().filter(|n| !callees.contains(n)).collect();

    // Each name is placed once, under the first caller that reaches it
    let mut draft = Draft::default();
    let mut placed: HashSet<String> = HashSet::new();
    let mut pending: Vec<(String, Option<usize>)> =
        roots.iter().rev().map(|name| ((*name).clone(), None)).collect();
    loop {
        while let Some((name, parent)) = pending.pop() {
            if !placed.insert(name.clone()) {
                continue;
            }
            let (first, last) = span.get(&name).copied().unwrap_or((0, 0));
            let index = draft.add(&name, parent, first);
            draft.nodes[index].end = Some(last);
            for (_, callee) in edges.iter().rev().filter(|(caller, _)| caller == &name) {
                pending.push((callee.clone(), Some(index)));
            }
        }
        // Names only reachable through a cycle seed their own top-level node
        match first_seen.iter().find(|name| !placed.contains(*name)) {
            Some(name) => pending.push((name.clone(), None)),
            None => break,
        }
    }
    draft.finish()
}

/// Heuristic 2: start / complete phrase pairs
fn from_markers(lines: &[String]) -> Option<TraceNode> {
    let mut draft = Draft::default();
    let mut open: Vec<usize> = Vec::new();

    for (line_no, line) in lines.iter().enumerate() {
        let at = line_no as i64;
        match patterns::marker(line) {
            Some(Marker::Start(name)) => {
                let index = draft.add(&name, open.last().copied(), at);
                open.push(index);
            }
            Some(Marker::Complete(name)) => {
                match open.iter().rposition(|i| draft.nodes[*i].name == name) {
                    Some(position) => {
                        let index = open.remove(position);
                        draft.nodes[index].end = Some(at);
                    }
                    None => debug!("Completion of '{}' without a start on line {}", name, line_no),
                }
            }
            None => {}
        }
    }
    draft.finish()
}

/// Heuristic 3: distinct `name()` mentions form a linear chain
fn from_mentions(lines: &[String]) -> Option<TraceNode> {
    let mut order: Vec<String> = Vec::new();
    let mut span: HashMap<String, (i64, i64)> = HashMap::new();
    for (line_no, line) in lines.iter().enumerate() {
        for name in patterns::mentions(line) {
            let at = line_no as i64;
            span.entry(name.clone())
                .and_modify(|(_, last)| *last = at)
                .or_insert((at, at));
            if !order.contains(&name) {
                order.push(name);
            }
        }
    }

    let mut draft = Draft::default();
    let mut parent = None;
    for name in &order {
        let (first, last) = span.get(name).copied().unwrap_or((0, 0));
        let index = draft.add(name, parent, first);
        draft.nodes[index].end = Some(last);
        parent = Some(index);
    }
    draft.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lines(text: &[&str]) -> Vec<String> {
        text.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_start_complete_pairs() {
        let tree = recover_from_logs(&lines(&[
            "first function starting",
            "second function starting",
            "first function completed",
        ]))
        .unwrap();

        assert_eq!(tree.name, "first");
        assert_eq!(tree.id, "recovered:first#1");
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].name, "second");
        assert_eq!(tree.children[0].parent_id.as_deref(), Some("recovered:first#1"));
        assert!(tree.is_completed());
        assert_eq!(tree.end_time, Some(2));
        assert_eq!(tree.size(), 2);
    }

    #[test]
    fn test_calling_phrases() {
        let tree = recover_from_logs(&lines(&[
            "main calling load",
            "load calling parse",
            "main calling render",
        ]))
        .unwrap();
        assert_eq!(tree.name, "main");
        let names: Vec<&str> = tree.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["load", "render"]);
        assert_eq!(tree.children[0].children[0].name, "parse");
    }

    #[test]
    fn test_calling_cycle_terminates() {
        let tree = recover_from_logs(&lines(&["ping calling pong", "pong calling ping"])).unwrap();
        assert_eq!(tree.size(), 2);
    }

    #[test]
    fn test_disconnected_cycles_are_all_placed() {
        let tree = recover_from_logs(&lines(&[
            "ping calling pong",
            "pong calling ping",
            "tick calling tock",
            "tock calling tick",
        ]))
        .unwrap();

        assert_eq!(tree.name, RECOVERED_ROOT);
        assert_eq!(tree.size(), 5);
        let names: Vec<&str> = tree.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["ping", "tick"]);
        assert_eq!(tree.children[1].children[0].name, "tock");
    }

    #[test]
    fn test_linear_chain_fallback() {
        let tree = recover_from_logs(&lines(&["init() ok", "load() ok", "init() again"])).unwrap();
        assert_eq!(tree.name, "init");
        assert_eq!(tree.children[0].name, "load");
        assert_eq!(tree.end_time, Some(2));
    }

    #[test]
    fn test_several_top_level_nodes_get_a_synthetic_root() {
        let tree = recover_from_logs(&lines(&[
            "alpha starting",
            "alpha done",
            "beta starting",
        ]))
        .unwrap();
        assert_eq!(tree.name, RECOVERED_ROOT);
        assert_eq!(tree.children.len(), 2);
        assert!(!tree.children[1].is_completed());
    }

    #[test]
    fn test_garbage_degrades_to_none() {
        assert_eq!(recover_from_logs(&lines(&["", "%%%", "\u{0}\u{ffff}", "42"])), None);
        assert_eq!(recover_from_logs(&[]), None);
    }
}
