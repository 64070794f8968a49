use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use script_trace_studio::protocol::{EventKind, LifecycleEvent};
use script_trace_studio::reconstruct::{NodeStatus, TraceNode, TraceTree};

/// Events of a balanced call tree, in emission order
fn emission(depth: usize, fanout: usize) -> Vec<LifecycleEvent> {
    let mut events = Vec::new();
    let mut clock = 0;
    let mut next_id = 1;
    emit("main", None, depth, fanout, &mut clock, &mut next_id, &mut events);
    events
}

fn emit(
    name: &str,
    parent: Option<String>,
    depth: usize,
    fanout: usize,
    clock: &mut i64,
    next_id: &mut usize,
    events: &mut Vec<LifecycleEvent>,
) {
    let id = format!("{}#{}", name, next_id);
    *next_id += 1;
    *clock += 1;
    events.push(LifecycleEvent::start(&id, name, EventKind::Function, parent, *clock));
    if depth > 0 {
        for i in 0..fanout {
            emit(&format!("f{}_{}", depth, i), Some(id.clone()), depth - 1, fanout, clock, next_id, events);
        }
    }
    *clock += 1;
    events.push(LifecycleEvent::end(&id, name, EventKind::Function, None, *clock));
}

fn build(events: &[LifecycleEvent]) -> (Option<TraceNode>, Vec<TraceNode>) {
    let mut tree = TraceTree::new("main");
    for event in events {
        tree.apply(event);
    }
    tree.snapshot()
}

/// Shuffle, then move every `end` behind its own `start`
fn causal_shuffle(events: &[LifecycleEvent], rng: &mut StdRng) -> Vec<LifecycleEvent> {
    let mut shuffled = events.to_vec();
    shuffled.shuffle(rng);
    for i in 0..shuffled.len() {
        if !shuffled[i].is_start() {
            continue;
        }
        let id = shuffled[i].id.clone();
        if let Some(end_at) = shuffled[..i].iter().position(|e| e.id == id) {
            shuffled.swap(end_at, i);
        }
    }
    shuffled
}

#[test]
fn test_any_causal_order_gives_the_same_tree() {
    let events = emission(3, 3);
    let expected = build(&events);
    assert_eq!(expected.0.as_ref().unwrap().size(), 40);

    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..200 {
        let shuffled = causal_shuffle(&events, &mut rng);
        assert_eq!(build(&shuffled), expected);
    }
}

#[test]
fn test_child_before_parent() {
    let events = vec![
        LifecycleEvent::start("inner#2", "inner", EventKind::Function, Some("outer#1".into()), 2),
        LifecycleEvent::end("inner#2", "inner", EventKind::Function, None, 3),
        LifecycleEvent::start("outer#1", "outer", EventKind::Function, None, 1),
        LifecycleEvent::end("outer#1", "outer", EventKind::Function, None, 4),
    ];
    let (root, detached) = build(&events);
    let root = root.unwrap();

    assert_eq!(root.name, "outer");
    assert_eq!(root.status, NodeStatus::Completed);
    assert_eq!(root.children[0].name, "inner");
    assert!(detached.is_empty());
}

#[test]
fn test_end_before_start_does_not_crash() {
    let events = vec![
        LifecycleEvent::end("a#1", "a", EventKind::Function, None, 5),
        LifecycleEvent::start("a#1", "a", EventKind::Function, None, 1),
    ];
    let mut tree = TraceTree::new("main");
    for event in &events {
        tree.apply(event);
    }
    // The early end is dropped; the activation stays running
    assert_eq!(tree.get("a#1").unwrap().status, NodeStatus::Running);
    assert_eq!(tree.stats().orphan_ends, 1);
}

#[test]
fn test_lost_end_leaves_node_running() {
    let mut events = emission(1, 2);
    events.retain(|e| !(e.id == "f1_0#2" && !e.is_start()));
    let (root, _) = build(&events);
    let root = root.unwrap();

    assert!(root.is_completed());
    assert_eq!(root.children[0].status, NodeStatus::Running);
    assert!(root.children[1].is_completed());
}
