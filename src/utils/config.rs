//! Configuration and constants for the engine and the CLI.

use std::time::Duration;

/// Current snapshot schema version (JSON export)
pub const SCHEMA_VERSION: &str = "1.0.0";

// Wire protocol identity. Messages with any other tag or version are dropped.
pub const SANDBOX_SOURCE_TAG: &str = "script-trace-sandbox";
pub const PROTOCOL_VERSION: u32 = 1;

/// Hard wall-clock budget for one sandbox run
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay between the root's `end` event and the orphan sweep
pub const DEFAULT_SWEEP_GRACE: Duration = Duration::from_millis(500);

/// Conventional program entry point used for root selection
pub const DEFAULT_ENTRY_POINT: &str = "main";

/// Extra time the host grants past the sandbox's own deadline before it
/// gives up on the thread and synthesizes the completion sentinel
pub const HOST_TIMEOUT_SLACK: Duration = Duration::from_millis(250);

/// How long the host blocks on the message bus per pump iteration
pub const PUMP_INTERVAL: Duration = Duration::from_millis(20);

// Names injected by the instrumentor. The sandbox registers the hook object
// under TRACE_HOOK; TRACE_ID_BINDING is the per-activation local.
pub const TRACE_HOOK: &str = "__trace";
pub const TRACE_ID_BINDING: &str = "__trace_id";

/// Maximum interpreter call depth before a RangeError is thrown
pub const MAX_CALL_DEPTH: usize = 400;

/// Sandbox thread stack size (deep recursion runs on the Rust stack)
pub const SANDBOX_STACK_SIZE: usize = 256 * 1024 * 1024;

/// Longest single sleep of the sandbox event loop while waiting on a timer,
/// so cancellation is observed promptly.
pub const TIMER_SLICE: Duration = Duration::from_millis(10);

/// Timer callbacks scheduled with a delay below this are clamped up
pub const MIN_INTERVAL_MS: u64 = 1;

// Display names used when a callable has no name of its own
pub const ANONYMOUS_NAME: &str = "anonymous";

/// Timer registration functions intercepted by the instrumentor
pub const TIMER_FUNCTIONS: &[&str] = &["setTimeout", "setInterval"];

/// Promise reaction registrations intercepted by the instrumentor
pub const PROMISE_REACTIONS: &[&str] = &["then", "catch", "finally"];

/// Global receivers timers may be called through (`window.setTimeout(...)`)
pub const GLOBAL_RECEIVERS: &[&str] = &["window", "globalThis", "self"];
