use crossbeam_channel::unbounded;
use pretty_assertions::assert_eq;
use script_trace_studio::instrument::instrument;
use script_trace_studio::protocol::{decode, Message};
use script_trace_studio::sandbox::{SandboxExecutor, SandboxRequest};
use script_trace_studio::script;
use std::time::Duration;

/// Console output and event count of one sandbox run
fn execute(source: &str) -> (Vec<String>, usize) {
    let (tx, rx) = unbounded();
    let handle = SandboxExecutor::spawn(
        SandboxRequest {
            run_id: "run".to_string(),
            source: source.to_string(),
            timeout: Duration::from_secs(5),
        },
        tx,
    )
    .unwrap();

    let mut logs = Vec::new();
    let mut events = 0;
    while let Ok(raw) = rx.recv_timeout(Duration::from_secs(5)) {
        match decode(&raw, "run").unwrap() {
            Message::Log(line) => logs.push(line),
            Message::Event(_) => events += 1,
            Message::Done => break,
        }
    }
    handle.join();
    (logs, events)
}

const PROGRAM: &str = r#"
class Counter {
    constructor(start) { this.n = start }
    bump(by = 1) { this.n += by; return this }
}
const twice = f => x => f(f(x))
function label(v) { return `value:${v}` }
function main() {
    const c = new Counter(1).bump().bump(3)
    console.log(label(c.n), twice(x => x * 3)(2))
    setTimeout(() => console.log('later', [1, 2, 3].map(x => x + 1).join('|')), 1)
    Promise.resolve('p').then(v => v + '!').finally(() => console.log('settled')).then(v => console.log(v))
    try { JSON.parse('{') } catch (e) { console.log(e.name) }
}
main()
"#;

#[test]
fn test_instrumentation_preserves_behavior() {
    let instrumented = instrument(PROGRAM).unwrap();

    let (plain_logs, plain_events) = execute(PROGRAM);
    let (traced_logs, traced_events) = execute(&instrumented.source);

    assert_eq!(plain_events, 0);
    assert_eq!(traced_logs, plain_logs);
    assert_eq!(
        traced_logs,
        vec!["value:5 18", "SyntaxError", "settled", "p!", "later 2|3|4"]
    );
    // Every traced activation reports a start and an end
    assert!(traced_events > 0);
    assert_eq!(traced_events % 2, 0);
}

#[test]
fn test_printed_output_is_stable() {
    let once = instrument(PROGRAM).unwrap().source;
    let reprinted = script::print_program(&script::parse(&once).unwrap());
    assert_eq!(reprinted, once);
}

const ASYNC_PROGRAM: &str = r#"
async function fetchAll(ids) {
    const out = []
    for (const id of ids) out.push(await lookup(id))
    return out
}
const lookup = async id => ({ id, name: `n${id}` })
async function main() {
    const [first, ...others] = await fetchAll([1, 2, 3])
    const { name, ...rest } = first
    console.log(name, JSON.stringify(rest), others.length, 2 ** 3)
    console.log('a-b-c'.replace(/-/g, '+'), (1, 2))
}
main()
"#;

#[test]
fn test_async_and_destructuring_survive_instrumentation() {
    let instrumented = instrument(ASYNC_PROGRAM).unwrap();

    let (plain_logs, _) = execute(ASYNC_PROGRAM);
    let (traced_logs, traced_events) = execute(&instrumented.source);

    assert_eq!(traced_logs, plain_logs);
    assert_eq!(traced_logs, vec!["n1 {\"id\":1} 2 8", "a+b+c 2"]);
    // main, fetchAll and three lookups
    assert_eq!(traced_events, 10);
}
