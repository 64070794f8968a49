//! Async activations.
//!
//! An async function runs on the ordinary evaluator until its first
//! `await`. Its lowered body is walked by an explicit stack of cursors, so
//! at an `await` the whole activation is a plain value: it is parked
//! together with the tracer frames it pushed, and a promise reaction picks
//! it up again as a microtask. While parked, its frames are off the active
//! stack and cannot become the parent of unrelated work.

use super::interpreter::{hoist_vars, BindMode, Completion, Ctx, Interpreter};
use super::lower::{self, Body, ForOfPlan, LoopPlan, Step, TryPlan, Unsupported};
use super::promise::new_promise;
use super::tracer::Frame;
use super::value::*;
use crate::script::ast::{FunctionBody, FunctionDef, Stmt, VarKind};
use log::trace;
use std::cell::RefCell;
use std::rc::Rc;

/// Parked activation, taken by whichever reaction resumes it
pub type Continuation = Rc<RefCell<Option<AsyncFrame>>>;

pub struct AsyncFrame {
    /// Promise returned to the caller
    promise: PromiseRef,
    stack: Vec<Cursor>,
    /// Tracer frames lifted off the active stack at the last `await`
    parked: Vec<Frame>,
    /// Temporary receiving the awaited value
    waiting: Option<String>,
}

struct Cursor {
    ctx: Ctx,
    state: State,
}

enum State {
    Seq {
        steps: Rc<[Step]>,
        pc: usize,
    },
    Loop {
        plan: Rc<LoopPlan>,
        phase: LoopPhase,
        iteration: Ctx,
    },
    ForOf {
        plan: Rc<ForOfPlan>,
        items: std::vec::IntoIter<Value>,
        started: bool,
    },
    Try {
        plan: Rc<TryPlan>,
        phase: TryPhase,
        /// Completion replayed once `finally` ends normally
        pending: Signal,
    },
}

#[derive(Clone, Copy)]
enum LoopPhase {
    Start,
    Test,
    Body,
    Update,
}

#[derive(Clone, Copy)]
enum TryPhase {
    Start,
    Block,
    Handler,
    Finally,
}

/// How the cursor just popped finished
enum Signal {
    Normal,
    Break,
    Continue,
    Return(Value),
    Throw(Value),
}

enum Action {
    Next,
    Push(Cursor),
    Pop(Signal),
    Suspend(String, Value),
}

enum Progress {
    Suspended(String, Value),
    Finished(Signal),
}

impl Cursor {
    fn seq(ctx: Ctx, steps: Rc<[Step]>) -> Self {
        Cursor {
            ctx,
            state: State::Seq { steps, pc: 0 },
        }
    }
}

impl From<Completion> for Signal {
    fn from(completion: Completion) -> Self {
        match completion {
            Completion::Normal => Signal::Normal,
            Completion::Break => Signal::Break,
            Completion::Continue => Signal::Continue,
            Completion::Return(value) => Signal::Return(value),
        }
    }
}

/// Script exceptions end the cursor; a halt unwinds everything
fn thrown(abrupt: Abrupt) -> Result<Action, Abrupt> {
    match abrupt {
        Abrupt::Throw(value) => Ok(Action::Pop(Signal::Throw(value))),
        halted => Err(halted),
    }
}

impl Interpreter {
    /// Start an async activation and return its promise
    pub(super) fn invoke_async(&mut self, def: &Rc<FunctionDef>, ctx: Ctx, args: Vec<Value>) -> EvalResult {
        let promise = new_promise();
        match self.bind_params(&def.params, args, &ctx) {
            Ok(()) => {}
            Err(Abrupt::Throw(error)) => {
                self.reject_promise(&promise, error);
                return Ok(Value::Promise(promise));
            }
            Err(halted) => return Err(halted),
        }
        let steps = match self.lowered_body(def) {
            Ok(steps) => steps,
            Err(Unsupported(what)) => {
                let error = self.make_error("SyntaxError", format!("{} is not supported", what));
                self.reject_promise(&promise, error);
                return Ok(Value::Promise(promise));
            }
        };
        if let FunctionBody::Block(body) = &def.body {
            hoist_vars(body, &ctx.scope);
            self.hoist_functions(body, &ctx)?;
        }

        let frame = AsyncFrame {
            promise: promise.clone(),
            stack: vec![Cursor::seq(ctx, steps)],
            parked: Vec::new(),
            waiting: None,
        };
        self.drive(frame, Signal::Normal)?;
        Ok(Value::Promise(promise))
    }

    /// Continue a parked activation with the outcome of what it awaited
    pub(crate) fn resume_async(&mut self, mut frame: AsyncFrame, outcome: Settled) -> Result<(), Abrupt> {
        let waiting = frame.waiting.take();
        let signal = match outcome {
            Settled::Fulfilled(value) => {
                if let (Some(temp), Some(cursor)) = (waiting, frame.stack.last()) {
                    cursor.ctx.scope.declare(&temp, value, true);
                }
                Signal::Normal
            }
            Settled::Rejected(reason) => Signal::Throw(reason),
        };
        self.drive(frame, signal)
    }

    fn lowered_body(&mut self, def: &Rc<FunctionDef>) -> Result<Rc<[Step]>, Unsupported> {
        let key = Rc::as_ptr(def);
        if let Some((_, steps)) = self.lowered.get(&key) {
            return Ok(steps.clone());
        }
        let steps = match &def.body {
            FunctionBody::Block(body) => lower::lower_body(body)?,
            FunctionBody::Expr(expr) => lower::lower_body(&[Stmt::Return(Some((**expr).clone()))])?,
        };
        // Holding the definition keeps the key from being reused
        self.lowered.insert(key, (def.clone(), steps.clone()));
        Ok(steps)
    }

    /// Run until the next `await` or the end of the body
    fn drive(&mut self, mut frame: AsyncFrame, signal: Signal) -> Result<(), Abrupt> {
        let base = self.tracer.stack_depth();
        self.tracer.resume(std::mem::take(&mut frame.parked));

        match self.run_frame(&mut frame, signal)? {
            Progress::Suspended(temp, value) => {
                frame.parked = self.tracer.suspend_from(base);
                frame.waiting = Some(temp);
                trace!("Async activation parked with {} frame(s)", frame.parked.len());
                let awaited = self.promise_of(value);
                self.add_reaction(
                    &awaited,
                    Reaction {
                        kind: ReactionKind::Resume(Rc::new(RefCell::new(Some(frame)))),
                        target: new_promise(),
                    },
                );
            }
            Progress::Finished(signal) => match signal {
                Signal::Return(value) => self.resolve_promise(&frame.promise, value),
                Signal::Throw(error) => self.reject_promise(&frame.promise, error),
                Signal::Normal | Signal::Break | Signal::Continue => {
                    self.resolve_promise(&frame.promise, Value::Undefined)
                }
            },
        }
        Ok(())
    }

    fn run_frame(&mut self, frame: &mut AsyncFrame, mut signal: Signal) -> Result<Progress, Abrupt> {
        loop {
            self.checkpoint()?;
            let Some(cursor) = frame.stack.last_mut() else {
                return Ok(Progress::Finished(signal));
            };
            let action = self.step(cursor, signal)?;
            signal = Signal::Normal;
            match action {
                Action::Next => {}
                Action::Push(cursor) => frame.stack.push(cursor),
                Action::Pop(finished) => {
                    frame.stack.pop();
                    signal = finished;
                }
                Action::Suspend(temp, value) => return Ok(Progress::Suspended(temp, value)),
            }
        }
    }

    /// Advance one cursor; `signal` is how its last child finished
    fn step(&mut self, cursor: &mut Cursor, signal: Signal) -> Result<Action, Abrupt> {
        let ctx = cursor.ctx.clone();
        match &mut cursor.state {
            State::Seq { steps, pc } => {
                if !matches!(signal, Signal::Normal) {
                    return Ok(Action::Pop(signal));
                }
                let steps = steps.clone();
                let Some(step) = steps.get(*pc) else {
                    return Ok(Action::Pop(Signal::Normal));
                };
                *pc += 1;
                self.run_step(step, &ctx)
            }
            State::Loop {
                plan,
                phase,
                iteration,
            } => {
                let plan = plan.clone();
                match (*phase, signal) {
                    (_, signal @ (Signal::Return(_) | Signal::Throw(_))) => Ok(Action::Pop(signal)),
                    (LoopPhase::Start, _) if !plan.test_first => {
                        *phase = LoopPhase::Body;
                        Ok(Action::Push(Cursor::seq(iteration.clone(), plan.body.clone())))
                    }
                    (LoopPhase::Start | LoopPhase::Update, _) => match &plan.test {
                        Some(test) => {
                            *phase = LoopPhase::Test;
                            Ok(Action::Push(Cursor::seq(iteration.clone(), test.prelude.clone())))
                        }
                        None => {
                            *phase = LoopPhase::Body;
                            Ok(Action::Push(Cursor::seq(iteration.clone(), plan.body.clone())))
                        }
                    },
                    (LoopPhase::Test, _) => {
                        let Some(test) = &plan.test else {
                            return Ok(Action::Pop(Signal::Normal));
                        };
                        match self.eval(&test.expr, iteration) {
                            Ok(value) if value.truthy() => {
                                *phase = LoopPhase::Body;
                                Ok(Action::Push(Cursor::seq(iteration.clone(), plan.body.clone())))
                            }
                            Ok(_) => Ok(Action::Pop(Signal::Normal)),
                            Err(abrupt) => thrown(abrupt),
                        }
                    }
                    (LoopPhase::Body, Signal::Break) => Ok(Action::Pop(Signal::Normal)),
                    (LoopPhase::Body, _) => {
                        if !plan.per_iteration.is_empty() {
                            let next = ctx.with_scope(ctx.scope.child(false));
                            for name in &plan.per_iteration {
                                let value = iteration.scope.lookup(name).unwrap_or(Value::Undefined);
                                next.scope.declare(name, value, true);
                            }
                            *iteration = next;
                        }
                        match &plan.update {
                            Some(update) => {
                                *phase = LoopPhase::Update;
                                Ok(Action::Push(Cursor::seq(iteration.clone(), update.clone())))
                            }
                            None => {
                                // Straight back to the test
                                *phase = LoopPhase::Update;
                                Ok(Action::Next)
                            }
                        }
                    }
                }
            }
            State::ForOf {
                plan,
                items,
                started,
            } => {
                if *started {
                    match signal {
                        Signal::Break => return Ok(Action::Pop(Signal::Normal)),
                        signal @ (Signal::Return(_) | Signal::Throw(_)) => return Ok(Action::Pop(signal)),
                        Signal::Normal | Signal::Continue => {}
                    }
                }
                *started = true;
                let Some(item) = items.next() else {
                    return Ok(Action::Pop(Signal::Normal));
                };
                let mode = match plan.binding {
                    Some(kind) => BindMode::Declare(kind),
                    None => BindMode::Assign,
                };
                let iteration = ctx.with_scope(ctx.scope.child(false));
                match self.bind_pattern(&plan.target, item, mode, &iteration) {
                    Ok(()) => Ok(Action::Push(Cursor::seq(iteration, plan.body.clone()))),
                    Err(abrupt) => thrown(abrupt),
                }
            }
            State::Try {
                plan,
                phase,
                pending,
            } => {
                let plan = plan.clone();
                match *phase {
                    TryPhase::Start => {
                        *phase = TryPhase::Block;
                        Ok(Action::Push(self.enter_body(&ctx, &plan.block)))
                    }
                    TryPhase::Block => match (signal, &plan.handler) {
                        (Signal::Throw(error), Some(handler)) => {
                            *phase = TryPhase::Handler;
                            let catch_ctx = ctx.with_scope(ctx.scope.child(false));
                            let bound = match &handler.param {
                                Some(param) => self.bind_pattern(
                                    param,
                                    error,
                                    BindMode::Declare(VarKind::Let),
                                    &catch_ctx,
                                ),
                                None => Ok(()),
                            };
                            match bound {
                                Ok(()) => Ok(Action::Push(self.enter_body(&catch_ctx, &handler.body))),
                                Err(Abrupt::Throw(error)) => {
                                    Ok(self.to_finally(&ctx, &plan, phase, pending, Signal::Throw(error)))
                                }
                                Err(halted) => Err(halted),
                            }
                        }
                        (signal, _) => Ok(self.to_finally(&ctx, &plan, phase, pending, signal)),
                    },
                    TryPhase::Handler => Ok(self.to_finally(&ctx, &plan, phase, pending, signal)),
                    TryPhase::Finally => match signal {
                        Signal::Normal => Ok(Action::Pop(std::mem::replace(pending, Signal::Normal))),
                        overriding => Ok(Action::Pop(overriding)),
                    },
                }
            }
        }
    }

    fn run_step(&mut self, step: &Step, ctx: &Ctx) -> Result<Action, Abrupt> {
        match step {
            Step::Run(stmt) => match self.exec_stmt(stmt, ctx) {
                Ok(Completion::Normal) => Ok(Action::Next),
                Ok(completion) => Ok(Action::Pop(completion.into())),
                Err(abrupt) => thrown(abrupt),
            },
            Step::Await { temp, arg } => match self.eval(arg, ctx) {
                Ok(value) => Ok(Action::Suspend(temp.clone(), value)),
                Err(abrupt) => thrown(abrupt),
            },
            Step::Block(body) => Ok(Action::Push(self.enter_body(ctx, body))),
            Step::If {
                test,
                consequent,
                alternate,
            } => match self.eval(test, ctx) {
                Ok(value) => {
                    let branch = if value.truthy() { consequent } else { alternate };
                    Ok(Action::Push(Cursor::seq(ctx.clone(), branch.clone())))
                }
                Err(abrupt) => thrown(abrupt),
            },
            Step::Loop(plan) => Ok(Action::Push(Cursor {
                ctx: ctx.clone(),
                state: State::Loop {
                    plan: plan.clone(),
                    phase: LoopPhase::Start,
                    iteration: ctx.clone(),
                },
            })),
            Step::ForOf(plan) => {
                let items = match self.eval(&plan.iterable, ctx).and_then(|v| self.iterate(&v)) {
                    Ok(items) => items,
                    Err(abrupt) => return thrown(abrupt),
                };
                Ok(Action::Push(Cursor {
                    ctx: ctx.clone(),
                    state: State::ForOf {
                        plan: plan.clone(),
                        items: items.into_iter(),
                        started: false,
                    },
                }))
            }
            Step::Try(plan) => Ok(Action::Push(Cursor {
                ctx: ctx.clone(),
                state: State::Try {
                    plan: plan.clone(),
                    phase: TryPhase::Start,
                    pending: Signal::Normal,
                },
            })),
        }
    }

    /// Block scope with its function declarations already bound
    fn enter_body(&self, ctx: &Ctx, body: &Body) -> Cursor {
        let inner = ctx.with_scope(ctx.scope.child(false));
        for def in &body.hoisted {
            let closure = self.make_closure(def, &inner, None);
            if let Some(name) = &def.name {
                inner.scope.declare(name, closure, true);
            }
        }
        Cursor::seq(inner, body.steps.clone())
    }

    /// Run `finally` if there is one, remembering how the try ended
    fn to_finally(
        &self,
        ctx: &Ctx,
        plan: &TryPlan,
        phase: &mut TryPhase,
        pending: &mut Signal,
        signal: Signal,
    ) -> Action {
        match &plan.finalizer {
            Some(finalizer) => {
                *phase = TryPhase::Finally;
                *pending = signal;
                Action::Push(self.enter_body(ctx, finalizer))
            }
            None => Action::Pop(signal),
        }
    }
}
