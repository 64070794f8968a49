//! Runs instrumented programs on an isolated thread.
//!
//! Each run gets its own interpreter, globals and timers on a dedicated
//! thread. The only way out is the message bus. Whatever happens inside,
//! the thread finishes by posting exactly one `done` message.

use super::interpreter::{describe_thrown, Interpreter, Outcome};
use super::tracer::Emitter;
use super::value::HaltReason;
use crate::script;
use crate::utils::config::SANDBOX_STACK_SIZE;
use crate::utils::error::SandboxError;
use crossbeam_channel::Sender;
use log::{debug, info, warn};
use serde_json::Value as Json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// One program to execute
#[derive(Debug, Clone)]
pub struct SandboxRequest {
    pub run_id: String,

    /// Instrumented source
    pub source: String,

    /// Wall-clock budget, measured from thread start
    pub timeout: Duration,
}

/// Host-side handle to a running sandbox
///
/// **Public** - owned by the trace session
pub struct SandboxHandle {
    run_id: String,
    cancel: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    started: Instant,
}

impl SandboxHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Ask the sandbox to stop at its next checkpoint
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the thread. A panicking sandbox is logged, not propagated.
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Sandbox thread for run {} panicked", self.run_id);
            }
        }
    }
}

impl Drop for SandboxHandle {
    fn drop(&mut self) {
        // Detach: the thread observes the flag and winds down on its own
        self.cancel();
    }
}

pub struct SandboxExecutor;

impl SandboxExecutor {
    /// Start a sandbox thread for `request`
    ///
    /// **Public** - used by the trace session
    ///
    /// # Arguments
    /// * `request` - Run id, instrumented source and time budget
    /// * `bus` - Sender side of the host's message bus
    ///
    /// # Errors
    /// * `SandboxError::Spawn` - The OS refused to create the thread
    pub fn spawn(request: SandboxRequest, bus: Sender<Json>) -> Result<SandboxHandle, SandboxError> {
        let cancel = Arc::new(AtomicBool::new(false));
        let run_id = request.run_id.clone();
        let flag = cancel.clone();

        let thread = thread::Builder::new()
            .name(format!("sandbox-{}", short_id(&run_id)))
            .stack_size(SANDBOX_STACK_SIZE)
            .spawn(move || {
                let emitter = Emitter::new(request.run_id.clone(), bus);
                execute(&request, &emitter, flag);
                emitter.done();
            })?;

        info!("Started sandbox for run {}", run_id);

        Ok(SandboxHandle {
            run_id,
            cancel,
            thread: Some(thread),
            started: Instant::now(),
        })
    }
}

/// Body of the sandbox thread, minus the final `done`
fn execute(request: &SandboxRequest, emitter: &Emitter, cancel: Arc<AtomicBool>) {
    let program = match script::parse(&request.source) {
        Ok(program) => program,
        Err(e) => {
            emitter.log(format!("[error] Program failed to load: {}", e));
            return;
        }
    };

    let deadline = Instant::now() + request.timeout;
    let mut interpreter = Interpreter::new(emitter.clone(), deadline, cancel);

    match interpreter.run(&program) {
        Outcome::Completed => debug!("Run {} completed", request.run_id),
        Outcome::Uncaught(error) => {
            emitter.log(format!("Uncaught {}", describe_thrown(&error)));
        }
        Outcome::Halted(HaltReason::Timeout) => {
            emitter.log(format!(
                "Execution timed out after {}ms",
                request.timeout.as_millis()
            ));
        }
        Outcome::Halted(HaltReason::Cancelled) => debug!("Run {} cancelled", request.run_id),
    }
}

fn short_id(run_id: &str) -> &str {
    run_id.get(..8).unwrap_or(run_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode, Message};
    use crossbeam_channel::{unbounded, Receiver};

    fn collect(rx: &Receiver<Json>, run_id: &str) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Ok(raw) = rx.recv_timeout(Duration::from_secs(5)) {
            let message = decode(&raw, run_id).unwrap();
            let done = message == Message::Done;
            messages.push(message);
            if done {
                break;
            }
        }
        messages
    }

    fn logs(messages: &[Message]) -> Vec<String> {
        messages
            .iter()
            .filter_map(|m| match m {
                Message::Log(line) => Some(line.clone()),
                _ => None,
            })
            .collect()
    }

    fn run(source: &str, timeout: Duration) -> Vec<Message> {
        let (tx, rx) = unbounded();
        let handle = SandboxExecutor::spawn(
            SandboxRequest {
                run_id: "run-1".to_string(),
                source: source.to_string(),
                timeout,
            },
            tx,
        )
        .unwrap();
        let messages = collect(&rx, "run-1");
        handle.join();
        messages
    }

    #[test]
    fn test_console_and_done() {
        let messages = run(
            "console.log('a', 1, [1, 2]); console.error('bad'); console.log({ x: 'y' })",
            Duration::from_secs(5),
        );
        assert_eq!(
            logs(&messages),
            vec!["a 1 [ 1, 2 ]", "[error] bad", "{ x: 'y' }"]
        );
        assert_eq!(messages.last(), Some(&Message::Done));
    }

    #[test]
    fn test_uncaught_error_is_logged() {
        let messages = run("throw new TypeError('nope')", Duration::from_secs(5));
        assert_eq!(logs(&messages), vec!["Uncaught TypeError: nope"]);
    }

    #[test]
    fn test_timeout_stops_infinite_loop() {
        let messages = run("while (true) {}", Duration::from_millis(100));
        assert_eq!(logs(&messages), vec!["Execution timed out after 100ms"]);
        assert_eq!(messages.last(), Some(&Message::Done));
    }

    #[test]
    fn test_timers_and_promises_order() {
        let messages = run(
            "setTimeout(() => console.log('timer'), 0)\nPromise.resolve(1).then(v => console.log('micro', v))\nconsole.log('sync')",
            Duration::from_secs(5),
        );
        assert_eq!(logs(&messages), vec!["sync", "micro 1", "timer"]);
    }

    #[test]
    fn test_language_features() {
        let source = r#"
class Animal {
    constructor(name) { this.name = name }
    speak() { return `${this.name} makes a sound` }
}
class Dog extends Animal {
    speak() { return super.speak() + ' (woof)' }
}
const fns = []
for (let i = 0; i < 3; i++) { fns.push(() => i) }
let total = 0
for (const n of [1, 2, 3]) total += n
try { null.x } catch (e) { console.log(e instanceof TypeError) }
console.log(new Dog('Rex').speak(), fns.map(f => f()).join(','), total)
console.log(JSON.stringify({ a: [1, 'x'], b: null }), typeof missing, eval('2 * 21'))
"#;
        let messages = run(source, Duration::from_secs(5));
        assert_eq!(
            logs(&messages),
            vec![
                "true",
                "Rex makes a sound (woof) 0,1,2 6",
                "{\"a\":[1,\"x\"],\"b\":null} undefined 42",
            ]
        );
    }

    #[test]
    fn test_destructuring_spread_and_accessors() {
        let source = r#"
const { a, b: [x, y = 5], ...rest } = { a: 1, b: [2], c: 3, d: 4 }
function sum(first, ...others) { return others.reduce((s, n) => s + n, first) }
const nums = [1, ...[2, 3]]
let last = (0, 10)
const box = { v: 1, get double() { return this.v * 2 }, set double(n) { this.v = n / 2 } }
box.double = 8
class Temp {
    constructor() { this.c = 0 }
    get f() { return this.c * 9 / 5 + 32 }
    set f(v) { this.c = (v - 32) * 5 / 9 }
}
const t = new Temp()
t.f = 212
console.log(a, x, y, JSON.stringify(rest), sum(1, 2, 3), nums.length, 2 ** 10, last)
console.log(box.double, box.v, t.c, t.f)
"#;
        let messages = run(source, Duration::from_secs(5));
        assert_eq!(
            logs(&messages),
            vec!["1 2 5 {\"c\":3,\"d\":4} 6 3 1024 10", "8 4 100 212"]
        );
    }

    #[test]
    fn test_regular_expressions() {
        let source = r#"
const re = /(\d+)-(\d+)/
console.log(re.test('10-20'), '10-20'.replace(re, '$2-$1'), 'a1b22c333'.match(/\d+/g).join('|'))
console.log('a, b,c'.split(/,\s*/).join('|'), String(/x/gi), new RegExp('a+', 'g').flags)
try { new RegExp('(') } catch (e) { console.log(e.name) }
"#;
        let messages = run(source, Duration::from_secs(5));
        assert_eq!(
            logs(&messages),
            vec!["true 20-10 1|22|333", "a|b|c /x/gi g", "SyntaxError"]
        );
    }

    #[test]
    fn test_await_resumes_as_a_microtask() {
        let messages = run(
            "async function a() { console.log('a1'); await null; console.log('a2'); await null; console.log('a3') }\na()\nPromise.resolve().then(() => console.log('p1')).then(() => console.log('p2'))\nconsole.log('s')",
            Duration::from_secs(5),
        );
        assert_eq!(logs(&messages), vec!["a1", "s", "a2", "p1", "a3", "p2"]);
    }

    #[test]
    fn test_awaited_rejection_reaches_catch_and_finally() {
        let source = r#"
async function fail() { throw new Error('boom') }
async function run() {
    try { await fail() } catch (e) { console.log('caught', e.message) } finally { console.log('finally') }
    return 'done'
}
run().then(v => console.log(v))
"#;
        let messages = run(source, Duration::from_secs(5));
        assert_eq!(logs(&messages), vec!["caught boom", "finally", "done"]);
    }

    #[test]
    fn test_await_inside_loops_and_arguments() {
        let source = r#"
async function total(list) {
    let sum = 0
    for (const n of list) sum += await n
    let i = 0
    while (await (i < 2)) i++
    return sum + i
}
const obj = { async value() { return 5 } }
const twice = async x => (await x) * 2
async function main() {
    console.log('total', await total([1, Promise.resolve(2), 3]))
    console.log('twice', await twice(obj.value()))
}
main()
"#;
        let messages = run(source, Duration::from_secs(5));
        assert_eq!(logs(&messages), vec!["total 8", "twice 10"]);
    }

    #[test]
    fn test_deep_recursion_is_a_range_error() {
        let messages = run(
            "function f() { return f() }\ntry { f() } catch (e) { console.log(e.name) }",
            Duration::from_secs(5),
        );
        assert_eq!(logs(&messages), vec!["RangeError"]);
    }

    #[test]
    fn test_unparseable_source_still_finishes() {
        let messages = run("function (", Duration::from_secs(5));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages.last(), Some(&Message::Done));
    }

    #[test]
    fn test_cancel() {
        let (tx, rx) = unbounded();
        let handle = SandboxExecutor::spawn(
            SandboxRequest {
                run_id: "run-2".to_string(),
                source: "setInterval(() => {}, 1)".to_string(),
                timeout: Duration::from_secs(30),
            },
            tx,
        )
        .unwrap();
        handle.cancel();
        let messages = collect(&rx, "run-2");
        assert_eq!(messages, vec![Message::Done]);
        handle.join();
    }
}
