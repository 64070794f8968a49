//! Event protocol between the sandbox and the host.
//!
//! Three message types travel over the bus:
//! - `process-event` carrying a [`LifecycleEvent`]
//! - `log` carrying one line of program output
//! - `done`, the run-complete sentinel

pub mod event;
pub mod message;

pub use event::{EventKind, LifecycleEvent, Phase};
pub use message::{decode, encode, Envelope, Message};
