//! Script Trace Studio
//!
//! Runtime instrumentation and execution-trace reconstruction for
//! single-threaded, event-loop scripts.
//!
//! A program is rewritten to report every activation, executed in an
//! isolated sandbox thread, and the resulting (possibly out-of-order,
//! possibly lossy) event stream is folded into a call tree. When no
//! structured events arrive, a best-effort tree is recovered from the
//! program's console output.
//!
//! ## Getting Started
//!
//! ```bash
//! script-trace run program.js --output trace.json
//! script-trace --help
//! ```
//!
//! Embedders drive [`session::TraceSession`] directly.

pub mod commands;
pub mod instrument;
pub mod output;
pub mod protocol;
pub mod reconstruct;
pub mod recover;
pub mod sandbox;
pub mod script;
pub mod session;
pub mod utils;

pub use session::{SessionConfig, TraceSession};
