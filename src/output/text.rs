//! Plain-text tree rendering for terminals.

use crate::reconstruct::{NodeStatus, TraceNode, TraceSnapshot, TraceSource};

/// Render a snapshot as an indented tree
///
/// **Public** - printed by the `run` and `recover` commands
pub fn render_snapshot(snapshot: &TraceSnapshot) -> String {
    let mut lines = Vec::new();

    let header = match snapshot.source {
        TraceSource::Events => "CALL TREE",
        TraceSource::Logs => "CALL TREE (recovered from logs)",
    };
    lines.push(header.to_string());

    match &snapshot.root {
        Some(root) => render_node(root, "", None, &mut lines),
        None => lines.push("  (no activations recorded)".to_string()),
    }

    if !snapshot.detached.is_empty() {
        lines.push(String::new());
        lines.push(format!("DETACHED ({})", snapshot.detached.len()));
        for node in &snapshot.detached {
            render_node(node, "", None, &mut lines);
        }
    }

    lines.join("\n")
}

/// `last` is `None` for a top-level node
fn render_node(node: &TraceNode, prefix: &str, last: Option<bool>, lines: &mut Vec<String>) {
    let (branch, extension) = match last {
        None => ("", ""),
        Some(true) => ("└─ ", "   "),
        Some(false) => ("├─ ", "│  "),
    };
    lines.push(format!("{}{}{}", prefix, branch, describe(node)));

    let child_prefix = format!("{}{}", prefix, extension);
    let count = node.children.len();
    for (i, child) in node.children.iter().enumerate() {
        render_node(child, &child_prefix, Some(i + 1 == count), lines);
    }
}

fn describe(node: &TraceNode) -> String {
    match (node.status, node.duration()) {
        (NodeStatus::Completed, Some(ms)) => format!("{} [{}] {}ms", node.name, node.kind, ms),
        _ => format!("{} [{}] running", node.name, node.kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::EventKind;
    use crate::reconstruct::{RunPhase, TreeStats};
    use pretty_assertions::assert_eq;

    fn node(name: &str, end: Option<i64>, children: Vec<TraceNode>) -> TraceNode {
        TraceNode {
            id: format!("{}#1", name),
            name: name.to_string(),
            kind: EventKind::Function,
            status: if end.is_some() {
                NodeStatus::Completed
            } else {
                NodeStatus::Running
            },
            start_time: 0,
            end_time: end,
            parent_id: None,
            children,
        }
    }

    #[test]
    fn test_render_tree() {
        let root = node(
            "main",
            Some(5),
            vec![node("a", Some(1), vec![node("b", None, vec![])]), node("c", Some(2), vec![])],
        );
        let snapshot = TraceSnapshot {
            run_id: None,
            phase: RunPhase::Finished,
            source: TraceSource::Events,
            root: Some(root),
            detached: vec![node("tick", Some(0), vec![])],
            stats: TreeStats::default(),
        };

        let expected = [
            "CALL TREE",
            "main [function] 5ms",
            "├─ a [function] 1ms",
            "│  └─ b [function] running",
            "└─ c [function] 2ms",
            "",
            "DETACHED (1)",
            "tick [function] 0ms",
        ]
        .join("\n");
        assert_eq!(render_snapshot(&snapshot), expected);
    }
}
