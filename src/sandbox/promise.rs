//! Promise settlement and reaction jobs.
//!
//! Reactions never run synchronously: settling a promise queues one job
//! per reaction on the microtask queue, and attaching a reaction to an
//! already settled promise queues it straight away.

use super::event_loop::Job;
use super::interpreter::{describe_thrown, Interpreter};
use super::value::*;
use log::debug;
use std::cell::RefCell;
use std::rc::Rc;

pub fn new_promise() -> PromiseRef {
    Rc::new(RefCell::new(PromiseState::default()))
}

impl Interpreter {
    /// Resolve `promise` with `value`, adopting the state of a thenable
    pub(crate) fn resolve_promise(&mut self, promise: &PromiseRef, value: Value) {
        if promise.borrow().settled.is_some() {
            return;
        }
        match value {
            Value::Promise(inner) if Rc::ptr_eq(&inner, promise) => {
                let error = self.make_error("TypeError", "Chaining cycle detected for promise");
                self.settle(promise, Settled::Rejected(error));
            }
            Value::Promise(inner) => self.add_reaction(
                &inner,
                Reaction {
                    kind: ReactionKind::Adopt,
                    target: promise.clone(),
                },
            ),
            other => self.settle(promise, Settled::Fulfilled(other)),
        }
    }

    /// The promise itself, or a new one already resolved with `value`
    pub(crate) fn promise_of(&mut self, value: Value) -> PromiseRef {
        match value {
            Value::Promise(promise) => promise,
            other => {
                let promise = new_promise();
                self.resolve_promise(&promise, other);
                promise
            }
        }
    }

    pub(crate) fn reject_promise(&mut self, promise: &PromiseRef, reason: Value) {
        self.settle(promise, Settled::Rejected(reason));
    }

    /// Fix the outcome once; later settlements are ignored
    pub(crate) fn settle(&mut self, promise: &PromiseRef, outcome: Settled) {
        let reactions = {
            let mut state = promise.borrow_mut();
            if state.settled.is_some() {
                return;
            }
            state.settled = Some(outcome.clone());
            std::mem::take(&mut state.reactions)
        };

        if reactions.is_empty() && matches!(outcome, Settled::Rejected(_)) {
            self.unhandled.push(promise.clone());
        }
        for reaction in reactions {
            self.event_loop.enqueue(Job {
                reaction,
                outcome: outcome.clone(),
            });
        }
    }

    pub(crate) fn add_reaction(&mut self, promise: &PromiseRef, reaction: Reaction) {
        let settled = {
            let mut state = promise.borrow_mut();
            state.handled = true;
            match &state.settled {
                Some(outcome) => Some(outcome.clone()),
                None => {
                    state.reactions.push(reaction.clone());
                    None
                }
            }
        };
        if let Some(outcome) = settled {
            self.event_loop.enqueue(Job { reaction, outcome });
        }
    }

    /// `promise.then(on_fulfilled, on_rejected)`
    pub(crate) fn promise_then(
        &mut self,
        promise: &PromiseRef,
        on_fulfilled: Option<Value>,
        on_rejected: Option<Value>,
    ) -> PromiseRef {
        let target = new_promise();
        self.add_reaction(
            promise,
            Reaction {
                kind: ReactionKind::Then {
                    on_fulfilled: on_fulfilled.filter(Value::is_callable),
                    on_rejected: on_rejected.filter(Value::is_callable),
                },
                target: target.clone(),
            },
        );
        target
    }

    /// Run one reaction job
    pub(crate) fn run_job(&mut self, job: Job) -> Result<(), Abrupt> {
        let Reaction { kind, target } = job.reaction;
        match kind {
            ReactionKind::Then {
                on_fulfilled,
                on_rejected,
            } => {
                let (handler, argument) = match &job.outcome {
                    Settled::Fulfilled(value) => (on_fulfilled, value.clone()),
                    Settled::Rejected(reason) => (on_rejected, reason.clone()),
                };
                match handler {
                    Some(handler) => {
                        match self.call_function(&handler, Value::Undefined, vec![argument]) {
                            Ok(value) => self.resolve_promise(&target, value),
                            Err(Abrupt::Throw(error)) => self.reject_promise(&target, error),
                            Err(halted) => return Err(halted),
                        }
                    }
                    // Pass the outcome through to the next link
                    None => self.settle(&target, job.outcome),
                }
            }
            ReactionKind::Finally(handler) => {
                if let Some(handler) = handler.filter(Value::is_callable) {
                    match self.call_function(&handler, Value::Undefined, Vec::new()) {
                        Ok(_) => {}
                        Err(Abrupt::Throw(error)) => {
                            self.reject_promise(&target, error);
                            return Ok(());
                        }
                        Err(halted) => return Err(halted),
                    }
                }
                self.settle(&target, job.outcome);
            }
            ReactionKind::Adopt => self.settle(&target, job.outcome),
            ReactionKind::AllElement {
                index,
                values,
                remaining,
            } => match job.outcome {
                Settled::Fulfilled(value) => {
                    values.borrow_mut()[index] = value;
                    let left = {
                        let mut remaining = remaining.borrow_mut();
                        *remaining -= 1;
                        *remaining
                    };
                    if left == 0 {
                        self.settle(&target, Settled::Fulfilled(Value::Array(values)));
                    }
                }
                Settled::Rejected(reason) => self.reject_promise(&target, reason),
            },
            ReactionKind::Resume(continuation) => {
                let parked = continuation.borrow_mut().take();
                if let Some(frame) = parked {
                    self.resume_async(frame, job.outcome)?;
                }
            }
        }
        Ok(())
    }

    /// Log rejections that still have no handler after a microtask drain
    pub(crate) fn report_unhandled(&mut self) {
        for promise in std::mem::take(&mut self.unhandled) {
            let state = promise.borrow();
            if state.handled {
                continue;
            }
            if let Some(Settled::Rejected(reason)) = &state.settled {
                debug!("Unhandled rejection in {}", self.emitter().run_id());
                self.emitter()
                    .log(format!("[error] Uncaught (in promise) {}", describe_thrown(reason)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::tracer::Emitter;
    use crossbeam_channel::unbounded;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn interpreter() -> Interpreter {
        let (tx, _rx) = unbounded();
        Interpreter::new(
            Emitter::new("run", tx),
            Instant::now() + Duration::from_secs(5),
            Arc::new(AtomicBool::new(false)),
        )
    }

    fn fulfilled(promise: &PromiseRef) -> Option<f64> {
        match &promise.borrow().settled {
            Some(Settled::Fulfilled(Value::Number(n))) => Some(*n),
            _ => None,
        }
    }

    #[test]
    fn test_reactions_run_as_microtasks() {
        let mut interp = interpreter();
        let source = new_promise();
        let chained = interp.promise_then(&source, None, None);
        interp.resolve_promise(&source, Value::Number(7.0));

        assert_eq!(fulfilled(&chained), None);
        assert!(interp.run_microtasks().is_ok());
        assert_eq!(fulfilled(&chained), Some(7.0));
    }

    #[test]
    fn test_adopts_inner_promise() {
        let mut interp = interpreter();
        let outer = new_promise();
        let inner = new_promise();
        interp.resolve_promise(&outer, Value::Promise(inner.clone()));
        interp.resolve_promise(&inner, Value::Number(3.0));
        assert!(interp.run_microtasks().is_ok());
        assert_eq!(fulfilled(&outer), Some(3.0));
    }

    #[test]
    fn test_settles_once() {
        let mut interp = interpreter();
        let promise = new_promise();
        interp.resolve_promise(&promise, Value::Number(1.0));
        interp.reject_promise(&promise, Value::Null);
        assert_eq!(fulfilled(&promise), Some(1.0));
        assert!(interp.unhandled.is_empty());
    }
}
