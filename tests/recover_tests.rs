use script_trace_studio::reconstruct::NodeStatus;
use script_trace_studio::recover::recover_from_logs;

fn lines(text: &str) -> Vec<String> {
    text.lines().map(str::to_string).collect()
}

#[test]
fn test_nested_start_complete_pairs() {
    let tree = recover_from_logs(&lines(
        "boot starting\nload starting\nparse starting\nparse completed\nload completed\nrender starting\nrender done\nboot finished",
    ))
    .unwrap();

    assert_eq!(tree.name, "boot");
    let names: Vec<&str> = tree.children.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["load", "render"]);
    assert_eq!(tree.children[0].children[0].name, "parse");
    assert_eq!(tree.start_time, 0);
    assert_eq!(tree.end_time, Some(7));
    assert_eq!(tree.size(), 4);
}

#[test]
fn test_repeated_names_get_distinct_ids() {
    let tree = recover_from_logs(&lines(
        "step starting\nstep completed\nstep starting\nstep completed",
    ))
    .unwrap();

    let ids: Vec<&str> = tree.children.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["recovered:step#1", "recovered:step#2"]);
}

#[test]
fn test_missing_completion_stays_running() {
    let tree = recover_from_logs(&lines("main starting\nworker starting\nmain completed")).unwrap();
    assert_eq!(tree.status, NodeStatus::Completed);
    assert_eq!(tree.children[0].status, NodeStatus::Running);
}

#[test]
fn test_adversarial_input_never_panics() {
    let noisy = vec![
        "calling calling calling".to_string(),
        "() () ()".to_string(),
        "done done".to_string(),
        "x".repeat(10_000),
        "🦀 starting 🦀 completed".to_string(),
        "completed starting".to_string(),
    ];
    let _ = recover_from_logs(&noisy);
}
