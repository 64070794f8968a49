//! Active-call stack and lifecycle event emission inside the sandbox.
//!
//! The stack lives in the interpreter's execution context, not in script
//! globals. Frames pushed by `enter` are owned activations; frames pushed
//! while a bound callback runs are "restored" parents captured at
//! scheduling time.

use crate::protocol::{encode, EventKind, LifecycleEvent, Message};
use chrono::Utc;
use crossbeam_channel::Sender;
use log::debug;
use serde_json::Value as Json;
use std::collections::HashMap;

/// Posts protocol messages for one run onto the bus
///
/// **Public** - shared by tracer, console and executor
#[derive(Clone)]
pub struct Emitter {
    run_id: String,
    bus: Sender<Json>,
}

impl Emitter {
    pub fn new(run_id: impl Into<String>, bus: Sender<Json>) -> Self {
        Self {
            run_id: run_id.into(),
            bus,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn send(&self, message: &Message) {
        // The host may already have dropped this run
        if self.bus.send(encode(&self.run_id, message)).is_err() {
            debug!("Bus closed, dropping {} message", message.type_tag());
        }
    }

    pub fn log(&self, line: impl Into<String>) {
        self.send(&Message::Log(line.into()));
    }

    pub fn done(&self) {
        self.send(&Message::Done);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: String,
    /// Pushed by a bound callback rather than by `enter`
    pub restored: bool,
}

/// Explicit stack of the current logical call chain
#[derive(Debug, Default)]
pub struct ActiveStack {
    frames: Vec<Frame>,
}

impl ActiveStack {
    pub fn top(&self) -> Option<&str> {
        self.frames.last().map(|f| f.id.as_str())
    }

    pub fn push(&mut self, id: String, restored: bool) {
        self.frames.push(Frame { id, restored });
    }

    /// Remove the innermost frame with this id, wherever it sits
    pub fn remove(&mut self, id: &str, restored: bool) -> bool {
        match self
            .frames
            .iter()
            .rposition(|f| f.id == id && f.restored == restored)
        {
            Some(index) => {
                self.frames.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Take every frame above `depth`, innermost last
    pub fn split_off(&mut self, depth: usize) -> Vec<Frame> {
        if depth >= self.frames.len() {
            return Vec::new();
        }
        self.frames.split_off(depth)
    }

    pub fn extend(&mut self, frames: Vec<Frame>) {
        self.frames.extend(frames);
    }
}

struct OpenActivation {
    name: String,
    kind: EventKind,
    parent_id: Option<String>,
}

/// Assigns activation ids and emits `start` / `end` events
pub struct Tracer {
    emitter: Emitter,
    stack: ActiveStack,
    seq: u64,
    open: HashMap<String, OpenActivation>,
}

impl Tracer {
    pub fn new(emitter: Emitter) -> Self {
        Self {
            emitter,
            stack: ActiveStack::default(),
            seq: 0,
            open: HashMap::new(),
        }
    }

    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    pub fn current(&self) -> Option<String> {
        self.stack.top().map(str::to_string)
    }

    /// Start an activation; the top of the stack becomes its parent
    pub fn enter(&mut self, name: &str, kind: EventKind) -> String {
        self.seq += 1;
        let id = format!("{}#{}", name, self.seq);
        let parent_id = self.current();

        self.emitter.send(&Message::Event(LifecycleEvent::start(
            id.clone(),
            name,
            kind,
            parent_id.clone(),
            now_ms(),
        )));

        self.open.insert(
            id.clone(),
            OpenActivation {
                name: name.to_string(),
                kind,
                parent_id,
            },
        );
        self.stack.push(id.clone(), false);
        id
    }

    /// Finish an activation. Unknown or already finished ids are ignored.
    pub fn exit(&mut self, id: &str) {
        let Some(activation) = self.open.remove(id) else {
            debug!("exit for unknown activation {}", id);
            return;
        };
        self.stack.remove(id, false);
        self.emitter.send(&Message::Event(LifecycleEvent::end(
            id,
            activation.name,
            activation.kind,
            activation.parent_id,
            now_ms(),
        )));
    }

    /// Make a captured parent current while a bound callback runs
    pub fn restore(&mut self, id: &str) {
        self.stack.push(id.to_string(), true);
    }

    pub fn release(&mut self, id: &str) {
        self.stack.remove(id, true);
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.depth()
    }

    /// Park the frames an activation pushed above `depth` while it waits
    pub fn suspend_from(&mut self, depth: usize) -> Vec<Frame> {
        self.stack.split_off(depth)
    }

    /// Put parked frames back on top when the activation continues
    pub fn resume(&mut self, frames: Vec<Frame>) {
        self.stack.extend(frames);
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode, Phase};
    use crossbeam_channel::unbounded;

    fn events(rx: &crossbeam_channel::Receiver<Json>) -> Vec<LifecycleEvent> {
        rx.try_iter()
            .filter_map(|v| match decode(&v, "run") {
                Ok(Message::Event(e)) => Some(e),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_nested_parents() {
        let (tx, rx) = unbounded();
        let mut tracer = Tracer::new(Emitter::new("run", tx));
        let outer = tracer.enter("outer", EventKind::Function);
        let inner = tracer.enter("inner", EventKind::Function);
        tracer.exit(&inner);
        tracer.exit(&outer);

        let events = events(&rx);
        assert_eq!(events.len(), 4);
        assert_eq!(events[1].parent_id.as_deref(), Some(outer.as_str()));
        assert_eq!(events[2].phase, Phase::End);
        assert_eq!(events[2].id, inner);
        assert_eq!(tracer.stack_depth(), 0);
    }

    #[test]
    fn test_ids_are_unique_per_activation() {
        let (tx, _rx) = unbounded();
        let mut tracer = Tracer::new(Emitter::new("run", tx));
        let a = tracer.enter("f", EventKind::Function);
        let b = tracer.enter("f", EventKind::Function);
        assert_ne!(a, b);
    }

    #[test]
    fn test_restored_parent() {
        let (tx, rx) = unbounded();
        let mut tracer = Tracer::new(Emitter::new("run", tx));
        let a = tracer.enter("A", EventKind::Function);
        tracer.exit(&a);

        tracer.restore(&a);
        let cb = tracer.enter("cb", EventKind::Callback);
        tracer.exit(&cb);
        tracer.release(&a);

        let events = events(&rx);
        assert_eq!(events[2].parent_id.as_deref(), Some(a.as_str()));
        assert_eq!(tracer.stack_depth(), 0);
    }

    #[test]
    fn test_exit_out_of_order_and_twice() {
        let (tx, rx) = unbounded();
        let mut tracer = Tracer::new(Emitter::new("run", tx));
        let a = tracer.enter("a", EventKind::Function);
        let b = tracer.enter("b", EventKind::Function);
        tracer.exit(&a);
        tracer.exit(&a);
        assert_eq!(tracer.current(), Some(b.clone()));
        tracer.exit(&b);
        assert_eq!(events(&rx).len(), 4);
    }

    #[test]
    fn test_parked_frames_are_not_parents() {
        let (tx, rx) = unbounded();
        let mut tracer = Tracer::new(Emitter::new("run", tx));
        let a = tracer.enter("a", EventKind::Function);
        let parked = tracer.suspend_from(0);
        assert_eq!(tracer.stack_depth(), 0);
        assert!(tracer.suspend_from(0).is_empty());

        let other = tracer.enter("other", EventKind::Function);
        tracer.exit(&other);

        tracer.resume(parked);
        let b = tracer.enter("b", EventKind::Function);
        tracer.exit(&b);
        tracer.exit(&a);

        let events = events(&rx);
        assert_eq!(events[1].parent_id, None);
        assert_eq!(events[3].parent_id.as_deref(), Some(a.as_str()));
        assert_eq!(tracer.stack_depth(), 0);
    }
}
