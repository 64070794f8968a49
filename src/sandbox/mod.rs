//! Isolated execution of instrumented programs.
//!
//! A small interpreter for the script language runs each program on its
//! own thread with a fresh global environment. Lifecycle events, console
//! output and the final `done` leave the sandbox only as protocol
//! messages on the bus.

pub mod builtins;
mod coroutine;
pub mod event_loop;
pub mod executor;
pub mod interpreter;
mod lower;
mod methods;
mod promise;
pub mod regexp;
pub mod tracer;
pub mod value;

pub use executor::{SandboxExecutor, SandboxHandle, SandboxRequest};
pub use interpreter::{Interpreter, Outcome};
pub use tracer::Emitter;
