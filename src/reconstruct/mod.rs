//! Trace reconstruction from lifecycle events.
//!
//! This module turns an unordered, possibly lossy event stream into:
//! - A call tree rooted at the program's entry point
//! - Detached subtrees for activations with no traced parent
//! - Counters for every anomaly the heuristics absorbed

pub mod node;
pub mod reconstructor;
pub mod tree;

pub use node::{NodeStatus, TraceNode};
pub use reconstructor::{Reconstructor, RunPhase, TraceSnapshot, TraceSource};
pub use tree::{Applied, TraceTree, TreeStats};
