use pretty_assertions::assert_eq;
use script_trace_studio::reconstruct::{NodeStatus, RunPhase, TraceNode, TraceSource};
use script_trace_studio::{SessionConfig, TraceSession};
use std::collections::HashSet;
use std::time::Duration;

fn session() -> TraceSession {
    TraceSession::new(
        SessionConfig::new()
            .with_timeout(Duration::from_secs(5))
            .with_grace(Duration::from_millis(10)),
    )
}

fn collect_ids<'a>(node: &'a TraceNode, ids: &mut Vec<&'a str>) {
    ids.push(&node.id);
    for child in &node.children {
        collect_ids(child, ids);
    }
}

#[test]
fn test_outer_calls_inner() {
    let mut session = session();
    let snapshot = session
        .run_to_completion(
            "function inner() { return 1 }\nfunction outer() { return inner() }\nouter()",
        )
        .unwrap();

    assert_eq!(snapshot.phase, RunPhase::Finished);
    assert_eq!(snapshot.source, TraceSource::Events);

    let outer = snapshot.root.unwrap();
    assert_eq!(outer.name, "outer");
    assert_eq!(outer.children.len(), 1);

    let inner = &outer.children[0];
    assert_eq!(inner.name, "inner");
    assert_eq!(inner.parent_id.as_deref(), Some(outer.id.as_str()));
    assert_eq!(outer.status, NodeStatus::Completed);
    assert_eq!(inner.status, NodeStatus::Completed);
    assert!(inner.start_time >= outer.start_time);
    assert!(inner.end_time.unwrap() <= outer.end_time.unwrap());
}

#[test]
fn test_timer_callback_keeps_its_scheduler_as_parent() {
    let mut session = session();
    let snapshot = session
        .run_to_completion(
            "function main() { setTimeout(function tick() { console.log('tick') }, 5) }\nmain()",
        )
        .unwrap();

    let main = snapshot.root.unwrap();
    assert_eq!(main.name, "main");
    let tick = main.find("tick").expect("tick attributed to main");
    assert_eq!(tick.parent_id.as_deref(), Some(main.id.as_str()));
    assert!(tick.is_completed());
    assert!(tick.start_time >= main.end_time.unwrap());
    assert_eq!(session.log_lines(), ["tick"]);
}

#[test]
fn test_promise_reaction_keeps_its_registrant_as_parent() {
    let mut session = session();
    let snapshot = session
        .run_to_completion(
            "function main() { Promise.resolve(2).then(function step(v) { console.log('v=' + v) }) }\nmain()",
        )
        .unwrap();

    let main = snapshot.root.unwrap();
    let step = main.find("step").expect("step attributed to main");
    assert_eq!(step.parent_id.as_deref(), Some(main.id.as_str()));
    assert_eq!(session.log_lines(), ["v=2"]);
}

#[test]
fn test_thrown_exception_still_ends_each_activation_once() {
    let mut session = session();
    let snapshot = session
        .run_to_completion(
            "function boom() { throw new Error('bad') }\nfunction main() { try { boom() } catch (e) { console.log('caught ' + e.message) } }\nmain()",
        )
        .unwrap();

    let main = snapshot.root.unwrap();
    assert!(main.find("boom").unwrap().is_completed());
    assert_eq!(snapshot.stats.duplicate_ends, 0);
    assert_eq!(snapshot.stats.orphan_ends, 0);
    assert_eq!(snapshot.stats.events_applied, 4);
    assert_eq!(session.log_lines(), ["caught bad"]);
}

#[test]
fn test_uncaught_exception_is_a_log_line() {
    let mut session = session();
    let snapshot = session
        .run_to_completion("function main() { let o; return o.x }\nmain()")
        .unwrap();

    assert_eq!(snapshot.phase, RunPhase::Finished);
    assert!(snapshot.root.unwrap().is_completed());
    assert_eq!(session.log_lines().len(), 1);
    assert!(session.log_lines()[0].starts_with("Uncaught TypeError"));
}

#[test]
fn test_ids_are_unique() {
    let mut session = session();
    let snapshot = session
        .run_to_completion("function fib(n) { return n < 2 ? n : fib(n - 1) + fib(n - 2) }\nfib(5)")
        .unwrap();

    let root = snapshot.root.unwrap();
    let mut ids = Vec::new();
    collect_ids(&root, &mut ids);
    assert_eq!(ids.len(), 15);
    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 15);
    assert_eq!(root.depth(), 5);
}

#[test]
fn test_timeout_is_a_forced_completion() {
    let mut session = TraceSession::new(
        SessionConfig::new()
            .with_timeout(Duration::from_millis(200))
            .with_grace(Duration::from_millis(10)),
    );
    let snapshot = session
        .run_to_completion("function main() { while (true) {} }\nmain()")
        .unwrap();

    assert_eq!(snapshot.phase, RunPhase::Finished);
    assert_eq!(session.log_lines(), ["Execution timed out after 200ms"]);
    // The activation never returned
    assert_eq!(snapshot.root.unwrap().status, NodeStatus::Running);
}

#[test]
fn test_new_run_drops_previous_run_traffic() {
    let mut session = session();
    let first = session
        .start_run("function spin() { console.log('first'); while (true) {} }\nspin()")
        .unwrap();
    session.pump(Duration::from_millis(50));

    let snapshot = session
        .run_to_completion("function main() { console.log('second') }\nmain()")
        .unwrap();

    assert_ne!(snapshot.run_id.as_deref(), Some(first.as_str()));
    assert_eq!(snapshot.root.as_ref().unwrap().name, "main");
    assert_eq!(snapshot.node_count(), 1);
    assert_eq!(session.log_lines(), ["second"]);
}

#[test]
fn test_top_level_callback_is_detached() {
    let mut session = session();
    let snapshot = session
        .run_to_completion(
            "function main() { return 1 }\nmain()\nsetTimeout(function later() {}, 1)",
        )
        .unwrap();

    assert_eq!(snapshot.root.unwrap().name, "main");
    assert_eq!(snapshot.detached.len(), 1);
    assert_eq!(snapshot.detached[0].name, "later");
}

#[test]
fn test_falls_back_to_logs_without_events() {
    let mut session = session();
    let snapshot = session
        .run_to_completion("console.log('load calling parse')\nconsole.log('parse calling lex')")
        .unwrap();

    assert_eq!(snapshot.source, TraceSource::Logs);
    let root = snapshot.root.unwrap();
    assert_eq!(root.name, "load");
    assert_eq!(root.children[0].children[0].name, "lex");
}

#[test]
fn test_sync_before_finish_keeps_structured_tree() {
    let mut session = session();
    session
        .start_run("function main() { setTimeout(function later() {}, 50) }\nmain()")
        .unwrap();
    while session.snapshot().root.map_or(true, |r| !r.is_completed()) {
        session.pump(Duration::from_millis(10));
    }

    let synced = session.sync();
    assert_eq!(synced.source, TraceSource::Events);
    assert_eq!(synced.root.unwrap().name, "main");
}

#[test]
fn test_entry_point_called_from_another_function_is_not_the_root() {
    let mut session = session();
    let snapshot = session
        .run_to_completion(
            "function main() { return 1 }\nfunction helper() { return 2 }\nfunction boot() { main(); helper() }\nboot()",
        )
        .unwrap();

    let boot = snapshot.root.unwrap();
    assert_eq!(boot.name, "boot");
    let names: Vec<&str> = boot.children.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["main", "helper"]);
    assert!(snapshot.detached.is_empty());
}

#[test]
fn test_annotations_are_kept_apart_from_console_output() {
    let mut session = session();
    session
        .run_to_completion("function main() { console.log('hi') }\nmain()")
        .unwrap();

    assert_eq!(
        session.trace_lines(),
        ["[trace] start main#1 (function)", "[trace] end main#1 (function)"]
    );
    assert_eq!(
        session.transcript(),
        ["[trace] start main#1 (function)", "hi", "[trace] end main#1 (function)"]
    );
    assert_eq!(session.log_lines(), ["hi"]);
}

#[test]
fn test_awaited_call_is_a_completed_child() {
    let mut session = session();
    let snapshot = session
        .run_to_completion(
            "async function load() { return 1 }\nasync function main() { const v = await load(); console.log('v=' + v) }\nmain()",
        )
        .unwrap();

    assert_eq!(snapshot.source, TraceSource::Events);
    let main = snapshot.root.unwrap();
    assert_eq!(main.name, "main");
    assert_eq!(main.status, NodeStatus::Completed);
    assert_eq!(main.children.len(), 1);

    let load = &main.children[0];
    assert_eq!(load.name, "load");
    assert_eq!(load.parent_id.as_deref(), Some(main.id.as_str()));
    assert_eq!(load.status, NodeStatus::Completed);
    assert!(load.end_time.unwrap() <= main.end_time.unwrap());
    assert_eq!(session.log_lines(), ["v=1"]);
}

#[test]
fn test_parked_activation_does_not_adopt_later_calls() {
    let mut session = session();
    let snapshot = session
        .run_to_completion(
            "function other() {}\nasync function main() { await null; other() }\nfunction boot() { main(); other() }\nboot()",
        )
        .unwrap();

    let boot = snapshot.root.unwrap();
    assert_eq!(boot.name, "boot");
    let names: Vec<&str> = boot.children.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["main", "other"]);

    let main = &boot.children[0];
    assert!(main.is_completed());
    let resumed: Vec<&str> = main.children.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(resumed, ["other"]);
}
