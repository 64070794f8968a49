//! Tree-walking evaluator for script programs.
//!
//! Runs on the sandbox thread only. Every statement and loop iteration
//! passes a checkpoint that observes the cancellation flag and the
//! wall-clock deadline; once either trips, evaluation unwinds with
//! `Abrupt::Halted`, which no `catch` or `finally` can intercept.

use super::builtins;
use super::event_loop::EventLoop;
use super::lower::Step;
use super::regexp::RegexValue;
use super::tracer::{Emitter, Tracer};
use super::value::*;
use crate::script::ast::*;
use crate::script::parser::number_key;
use crate::script::{self, print_expr};
use crate::utils::config::{MAX_CALL_DEPTH, TIMER_SLICE};
use log::debug;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// How a sandbox run ended
#[derive(Debug)]
pub enum Outcome {
    /// Script and event loop ran to exhaustion
    Completed,
    /// An exception escaped the main script or a timer callback
    Uncaught(Value),
    Halted(HaltReason),
}

impl From<Abrupt> for Outcome {
    fn from(abrupt: Abrupt) -> Self {
        match abrupt {
            Abrupt::Throw(value) => Outcome::Uncaught(value),
            Abrupt::Halted(reason) => Outcome::Halted(reason),
        }
    }
}

pub(super) enum Completion {
    Normal,
    Return(Value),
    Break,
    Continue,
}

pub(super) type ExecResult = Result<Completion, Abrupt>;

/// Evaluation context of the running code
#[derive(Clone)]
pub(super) struct Ctx {
    pub(super) scope: Scope,
    pub(super) this: Value,
    /// Class whose method is executing (target of `super`)
    pub(super) home: Option<Rc<ClassValue>>,
}

/// How a binding pattern stores what it destructures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum BindMode {
    Declare(VarKind),
    Assign,
}

impl Ctx {
    pub(super) fn with_scope(&self, scope: Scope) -> Self {
        Ctx {
            scope,
            this: self.this.clone(),
            home: self.home.clone(),
        }
    }
}

pub struct Interpreter {
    pub(crate) global: Scope,
    pub(crate) tracer: Tracer,
    pub(crate) event_loop: EventLoop,
    /// Rejected promises without a handler, checked after each microtask drain
    pub(crate) unhandled: Vec<PromiseRef>,
    pub(crate) error_classes: HashMap<&'static str, Rc<ClassValue>>,
    /// Async bodies already split at their `await` points, by definition
    pub(super) lowered: HashMap<*const FunctionDef, (Rc<FunctionDef>, Rc<[Step]>)>,
    deadline: Instant,
    cancel: Arc<AtomicBool>,
    depth: usize,
}

impl Interpreter {
    pub fn new(emitter: Emitter, deadline: Instant, cancel: Arc<AtomicBool>) -> Self {
        let mut interpreter = Self {
            global: Scope::global(),
            tracer: Tracer::new(emitter),
            event_loop: EventLoop::new(),
            unhandled: Vec::new(),
            error_classes: HashMap::new(),
            lowered: HashMap::new(),
            deadline,
            cancel,
            depth: 0,
        };
        builtins::install(&mut interpreter);
        interpreter
    }

    pub fn emitter(&self) -> &Emitter {
        self.tracer.emitter()
    }

    /// Run the program and then the event loop until nothing is pending
    ///
    /// **Public** - entry point used by the executor
    pub fn run(&mut self, program: &Program) -> Outcome {
        let ctx = self.global_ctx();
        hoist_vars(&program.body, &ctx.scope);
        let result = self
            .hoist_functions(&program.body, &ctx)
            .and_then(|_| self.exec_stmts(&program.body, &ctx));
        if let Err(abrupt) = result {
            return abrupt.into();
        }
        self.run_event_loop()
    }

    fn global_ctx(&self) -> Ctx {
        Ctx {
            scope: self.global.clone(),
            this: Value::Undefined,
            home: None,
        }
    }

    fn run_event_loop(&mut self) -> Outcome {
        loop {
            if let Err(abrupt) = self.run_microtasks() {
                return abrupt.into();
            }
            let Some(due) = self.event_loop.next_due() else {
                return Outcome::Completed;
            };
            if let Err(abrupt) = self.wait_until(due) {
                return abrupt.into();
            }
            let Some(timer) = self.event_loop.pop_due(Instant::now()) else {
                continue;
            };
            if let Err(abrupt) =
                self.call_function(&timer.callback, Value::Undefined, timer.args.clone())
            {
                return abrupt.into();
            }
            self.event_loop.reschedule(timer);
        }
    }

    fn wait_until(&self, due: Instant) -> Result<(), Abrupt> {
        loop {
            self.checkpoint()?;
            let now = Instant::now();
            if now >= due {
                return Ok(());
            }
            std::thread::sleep((due - now).min(TIMER_SLICE));
        }
    }

    pub(crate) fn run_microtasks(&mut self) -> Result<(), Abrupt> {
        while let Some(job) = self.event_loop.next_job() {
            self.checkpoint()?;
            self.run_job(job)?;
        }
        self.report_unhandled();
        Ok(())
    }

    /// Cancellation and deadline check
    pub(crate) fn checkpoint(&self) -> Result<(), Abrupt> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(Abrupt::Halted(HaltReason::Cancelled));
        }
        if Instant::now() >= self.deadline {
            return Err(Abrupt::Halted(HaltReason::Timeout));
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Errors
    // ---------------------------------------------------------------

    /// Build an error instance of a builtin error class
    pub(crate) fn make_error(&self, kind: &str, message: impl Into<String>) -> Value {
        let message = message.into();
        match self.error_classes.get(kind) {
            Some(class) => Value::Object(Rc::new(RefCell::new(JsObject {
                props: vec![
                    ("name".to_string(), Value::from(kind)),
                    ("message".to_string(), Value::from(message)),
                ],
                class: Some(class.clone()),
                ..JsObject::default()
            }))),
            None => Value::object(vec![
                ("name".to_string(), Value::from(kind)),
                ("message".to_string(), Value::from(message)),
            ]),
        }
    }

    pub(crate) fn throw(&self, kind: &str, message: impl Into<String>) -> Abrupt {
        Abrupt::Throw(self.make_error(kind, message))
    }

    // ---------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------

    pub(super) fn hoist_functions(&mut self, body: &[Stmt], ctx: &Ctx) -> Result<(), Abrupt> {
        for stmt in body {
            if let Stmt::Function(def) = stmt {
                let closure = self.make_closure(def, ctx, None);
                if let Some(name) = &def.name {
                    ctx.scope.declare(name, closure, true);
                }
            }
        }
        Ok(())
    }

    fn exec_stmts(&mut self, body: &[Stmt], ctx: &Ctx) -> ExecResult {
        for stmt in body {
            match self.exec_stmt(stmt, ctx)? {
                Completion::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_block(&mut self, body: &[Stmt], ctx: &Ctx) -> ExecResult {
        let inner = ctx.with_scope(ctx.scope.child(false));
        self.hoist_functions(body, &inner)?;
        self.exec_stmts(body, &inner)
    }

    pub(super) fn exec_stmt(&mut self, stmt: &Stmt, ctx: &Ctx) -> ExecResult {
        self.checkpoint()?;

        match stmt {
            Stmt::Var(kind, decls) => {
                self.declare_all(*kind, decls, ctx)?;
                Ok(Completion::Normal)
            }
            // Hoisted when the enclosing block was entered
            Stmt::Function(_) => Ok(Completion::Normal),
            Stmt::Class(def) => {
                let class = self.eval_class(def, ctx, None)?;
                if let Some(name) = &def.name {
                    ctx.scope.declare(name, class, true);
                }
                Ok(Completion::Normal)
            }
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, ctx)?,
                    None => Value::Undefined,
                };
                Ok(Completion::Return(value))
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, ctx)?.truthy() {
                    self.exec_stmt(consequent, ctx)
                } else if let Some(alternate) = alternate {
                    self.exec_stmt(alternate, ctx)
                } else {
                    Ok(Completion::Normal)
                }
            }
            Stmt::While { test, body } => {
                loop {
                    self.checkpoint()?;
                    if !self.eval(test, ctx)?.truthy() {
                        break;
                    }
                    match self.exec_stmt(body, ctx)? {
                        Completion::Break => break,
                        Completion::Return(v) => return Ok(Completion::Return(v)),
                        Completion::Normal | Completion::Continue => {}
                    }
                }
                Ok(Completion::Normal)
            }
            Stmt::DoWhile { body, test } => {
                loop {
                    self.checkpoint()?;
                    match self.exec_stmt(body, ctx)? {
                        Completion::Break => break,
                        Completion::Return(v) => return Ok(Completion::Return(v)),
                        Completion::Normal | Completion::Continue => {}
                    }
                    if !self.eval(test, ctx)?.truthy() {
                        break;
                    }
                }
                Ok(Completion::Normal)
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => self.exec_for(init.as_ref(), test.as_ref(), update.as_ref(), body, ctx),
            Stmt::ForOf {
                binding,
                target,
                iterable,
                body,
            } => {
                let iterable = self.eval(iterable, ctx)?;
                let items = self.iterate(&iterable)?;
                let mode = match binding {
                    Some(kind) => BindMode::Declare(*kind),
                    None => BindMode::Assign,
                };
                for item in items {
                    self.checkpoint()?;
                    let iteration = ctx.with_scope(ctx.scope.child(false));
                    self.bind_pattern(target, item, mode, &iteration)?;
                    match self.exec_stmt(body, &iteration)? {
                        Completion::Break => break,
                        Completion::Return(v) => return Ok(Completion::Return(v)),
                        Completion::Normal | Completion::Continue => {}
                    }
                }
                Ok(Completion::Normal)
            }
            Stmt::Break => Ok(Completion::Break),
            Stmt::Continue => Ok(Completion::Continue),
            Stmt::Block(body) => self.exec_block(body, ctx),
            Stmt::Try {
                block,
                handler,
                finalizer,
            } => {
                let mut result = self.exec_block(block, ctx);

                if let Some(handler) = handler {
                    let thrown = match &result {
                        Err(Abrupt::Throw(thrown)) => Some(thrown.clone()),
                        _ => None,
                    };
                    if let Some(thrown) = thrown {
                        let catch_ctx = ctx.with_scope(ctx.scope.child(false));
                        result = match &handler.param {
                            Some(param) => self
                                .bind_pattern(param, thrown, BindMode::Declare(VarKind::Let), &catch_ctx)
                                .and_then(|()| self.exec_block(&handler.body, &catch_ctx)),
                            None => self.exec_block(&handler.body, &catch_ctx),
                        };
                    }
                }

                if let Err(Abrupt::Halted(reason)) = &result {
                    return Err(Abrupt::Halted(*reason));
                }

                if let Some(finalizer) = finalizer {
                    match self.exec_block(finalizer, ctx)? {
                        Completion::Normal => {}
                        overriding => return Ok(overriding),
                    }
                }
                result
            }
            Stmt::Throw(value) => Err(Abrupt::Throw(self.eval(value, ctx)?)),
            Stmt::Expr(expr) => {
                self.eval(expr, ctx)?;
                Ok(Completion::Normal)
            }
            Stmt::Empty => Ok(Completion::Normal),
        }
    }

    fn declare_all(&mut self, kind: VarKind, decls: &[VarDecl], ctx: &Ctx) -> Result<(), Abrupt> {
        for decl in decls {
            let Pattern::Ident(name) = &decl.target else {
                let value = match &decl.init {
                    Some(init) => self.eval(init, ctx)?,
                    None => Value::Undefined,
                };
                self.bind_pattern(&decl.target, value, BindMode::Declare(kind), ctx)?;
                continue;
            };
            let value = match &decl.init {
                Some(init) => Some(self.eval_named(init, name, ctx)?),
                None => None,
            };
            match kind {
                VarKind::Var => ctx.scope.declare_var(name, value),
                VarKind::Let => ctx.scope.declare(name, value.unwrap_or(Value::Undefined), true),
                VarKind::Const => ctx.scope.declare(name, value.unwrap_or(Value::Undefined), false),
            }
        }
        Ok(())
    }

    /// Destructure `value` into `pattern`
    pub(super) fn bind_pattern(
        &mut self,
        pattern: &Pattern,
        value: Value,
        mode: BindMode,
        ctx: &Ctx,
    ) -> Result<(), Abrupt> {
        match pattern {
            Pattern::Ident(name) => self.bind_name(name, value, mode, ctx),
            Pattern::Expr(target) => self.assign_to(target, value, ctx),
            Pattern::Object { props, rest } => {
                if value.is_nullish() {
                    let shown = value.to_js_string();
                    return Err(self.throw(
                        "TypeError",
                        format!("Cannot destructure '{}' as it is {}.", shown, shown),
                    ));
                }
                let mut used = Vec::with_capacity(props.len());
                for prop in props {
                    let key = match &prop.key {
                        PropKey::Named(name) => name.clone(),
                        PropKey::Computed(expr) => property_key(&self.eval(expr, ctx)?),
                    };
                    let item = self.get_property(&value, &key)?;
                    self.bind_element(&prop.value, item, mode, ctx)?;
                    used.push(key);
                }
                if let Some(rest) = rest {
                    let remaining = self
                        .spread_entries(&value)?
                        .into_iter()
                        .filter(|(key, _)| !used.contains(key))
                        .collect();
                    self.bind_name(rest, Value::object(remaining), mode, ctx)?;
                }
                Ok(())
            }
            Pattern::Array { elements, rest } => {
                let items = self.iterate(&value)?;
                for (index, element) in elements.iter().enumerate() {
                    if let Some(element) = element {
                        let item = items.get(index).cloned().unwrap_or(Value::Undefined);
                        self.bind_element(element, item, mode, ctx)?;
                    }
                }
                if let Some(rest) = rest {
                    let tail = items.get(elements.len()..).unwrap_or_default().to_vec();
                    self.bind_pattern(rest, Value::array(tail), mode, ctx)?;
                }
                Ok(())
            }
        }
    }

    fn bind_name(&mut self, name: &str, value: Value, mode: BindMode, ctx: &Ctx) -> Result<(), Abrupt> {
        match mode {
            BindMode::Declare(VarKind::Var) => ctx.scope.declare_var(name, Some(value)),
            BindMode::Declare(kind) => ctx.scope.declare(name, value, kind != VarKind::Const),
            BindMode::Assign => self.assign_name(name, value, ctx)?,
        }
        Ok(())
    }

    fn bind_element(
        &mut self,
        element: &PatternElement,
        value: Value,
        mode: BindMode,
        ctx: &Ctx,
    ) -> Result<(), Abrupt> {
        let value = self.with_default(&element.target, element.default.as_ref(), value, ctx)?;
        self.bind_pattern(&element.target, value, mode, ctx)
    }

    /// Substitute the default for a missing value
    fn with_default(
        &mut self,
        target: &Pattern,
        default: Option<&Expr>,
        value: Value,
        ctx: &Ctx,
    ) -> EvalResult {
        match (default, &value) {
            (Some(default), Value::Undefined) => match target.as_ident() {
                Some(name) => self.eval_named(default, name, ctx),
                None => self.eval(default, ctx),
            },
            _ => Ok(value),
        }
    }

    pub(super) fn bind_params(&mut self, params: &[Param], args: Vec<Value>, ctx: &Ctx) -> Result<(), Abrupt> {
        let mut args = args.into_iter();
        for param in params {
            if param.rest {
                let rest = Value::array(args.by_ref().collect());
                return self.bind_pattern(&param.target, rest, BindMode::Declare(VarKind::Let), ctx);
            }
            let value = args.next().unwrap_or(Value::Undefined);
            let value = self.with_default(&param.target, param.default.as_ref(), value, ctx)?;
            self.bind_pattern(&param.target, value, BindMode::Declare(VarKind::Let), ctx)?;
        }
        Ok(())
    }

    fn exec_for(
        &mut self,
        init: Option<&ForInit>,
        test: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stmt,
        ctx: &Ctx,
    ) -> ExecResult {
        let loop_ctx = ctx.with_scope(ctx.scope.child(false));

        // `let` bindings get a fresh copy per iteration so closures see
        // the value of their own iteration.
        let mut per_iteration: Vec<String> = Vec::new();
        match init {
            Some(ForInit::Var(kind, decls)) => {
                self.declare_all(*kind, decls, &loop_ctx)?;
                if *kind == VarKind::Let {
                    per_iteration = decls.iter().flat_map(|d| d.target.bound_names()).collect();
                }
            }
            Some(ForInit::Expr(expr)) => {
                self.eval(expr, &loop_ctx)?;
            }
            None => {}
        }

        let mut iteration = loop_ctx.clone();
        loop {
            self.checkpoint()?;
            if let Some(test) = test {
                if !self.eval(test, &iteration)?.truthy() {
                    break;
                }
            }
            match self.exec_stmt(body, &iteration)? {
                Completion::Break => break,
                Completion::Return(v) => return Ok(Completion::Return(v)),
                Completion::Normal | Completion::Continue => {}
            }
            if !per_iteration.is_empty() {
                let next = loop_ctx.with_scope(ctx.scope.child(false));
                for name in &per_iteration {
                    let value = iteration.scope.lookup(name).unwrap_or(Value::Undefined);
                    next.scope.declare(name, value, true);
                }
                iteration = next;
            }
            if let Some(update) = update {
                self.eval(update, &iteration)?;
            }
        }
        Ok(Completion::Normal)
    }

    pub(super) fn iterate(&self, value: &Value) -> Result<Vec<Value>, Abrupt> {
        match value {
            Value::Array(items) => Ok(items.borrow().clone()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::from(c.to_string())).collect()),
            other => Err(self.throw(
                "TypeError",
                format!("{} is not iterable", inspect(other)),
            )),
        }
    }

    // ---------------------------------------------------------------
    // Functions and classes
    // ---------------------------------------------------------------

    pub(super) fn make_closure(&self, def: &Rc<FunctionDef>, ctx: &Ctx, hint: Option<&str>) -> Value {
        let name = def
            .name
            .clone()
            .or_else(|| hint.map(str::to_string))
            .unwrap_or_default();
        let (this_value, home) = if def.is_arrow {
            (
                Some(ctx.this.clone()),
                ctx.home.as_ref().map(Rc::downgrade),
            )
        } else {
            (None, None)
        };
        Value::Function(Rc::new(Closure {
            def: def.clone(),
            env: ctx.scope.clone(),
            name,
            this_value,
            home,
        }))
    }

    fn eval_class(&mut self, def: &ClassDef, ctx: &Ctx, hint: Option<&str>) -> EvalResult {
        let parent = match &def.parent {
            Some(expr) => match self.eval(expr, ctx)? {
                Value::Class(class) => Some(class),
                Value::Null => None,
                other => {
                    return Err(self.throw(
                        "TypeError",
                        format!(
                            "Class extends value {} is not a constructor or null",
                            inspect(&other)
                        ),
                    ))
                }
            },
            None => None,
        };

        let name = def
            .name
            .clone()
            .or_else(|| hint.map(str::to_string))
            .unwrap_or_default();
        let env = ctx.scope.child(false);

        let class = Rc::new_cyclic(|home: &std::rc::Weak<ClassValue>| {
            let method = |function: &Rc<FunctionDef>, method_name: &str| {
                Rc::new(Closure {
                    def: function.clone(),
                    env: env.clone(),
                    name: method_name.to_string(),
                    this_value: None,
                    home: Some(home.clone()),
                })
            };
            let mut accessors = JsObject::default();
            for m in def.methods.iter().filter(|m| m.kind != MethodKind::Method) {
                let function = Value::Function(method(&m.function, &m.name));
                match m.kind {
                    MethodKind::Getter => accessors.define_accessor(&m.name, Some(function), None),
                    _ => accessors.define_accessor(&m.name, None, Some(function)),
                }
            }
            ClassValue {
                name: name.clone(),
                parent,
                constructor: def
                    .constructor
                    .as_ref()
                    .map(|function| method(function, &name)),
                methods: def
                    .methods
                    .iter()
                    .filter(|m| !m.is_static && m.kind == MethodKind::Method)
                    .map(|m| (m.name.clone(), method(&m.function, &m.name)))
                    .collect(),
                accessors: accessors.accessors,
                statics: RefCell::new(
                    def.methods
                        .iter()
                        .filter(|m| m.is_static)
                        .map(|m| {
                            (
                                m.name.clone(),
                                Value::Function(method(&m.function, &m.name)),
                            )
                        })
                        .collect(),
                ),
                builtin_error: false,
            }
        });

        if let Some(own) = &def.name {
            env.declare(own, Value::Class(class.clone()), false);
        }
        Ok(Value::Class(class))
    }

    /// Call any callable value
    ///
    /// **Public** - used by builtins, timers and promise jobs
    pub fn call_function(&mut self, func: &Value, this: Value, args: Vec<Value>) -> EvalResult {
        match func {
            Value::Function(closure) => self.call_closure(closure, this, args),
            Value::Native(native) => (native.func)(
                self,
                NativeCall {
                    this,
                    args,
                    captures: native.captures.clone(),
                },
            ),
            Value::Class(class) => Err(self.throw(
                "TypeError",
                format!(
                    "Class constructor {} cannot be invoked without 'new'",
                    class.name
                ),
            )),
            other => Err(self.throw(
                "TypeError",
                format!("{} is not a function", inspect(other)),
            )),
        }
    }

    fn call_closure(&mut self, closure: &Rc<Closure>, this: Value, args: Vec<Value>) -> EvalResult {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(self.throw("RangeError", "Maximum call stack size exceeded"));
        }
        self.depth += 1;
        let result = self.invoke(closure, this, args);
        self.depth -= 1;
        result
    }

    fn invoke(&mut self, closure: &Rc<Closure>, this: Value, args: Vec<Value>) -> EvalResult {
        let ctx = Ctx {
            scope: closure.env.child(true),
            this: closure.this_value.clone().unwrap_or(this),
            home: closure.home_class(),
        };
        if closure.def.is_async {
            return self.invoke_async(&closure.def, ctx, args);
        }

        self.bind_params(&closure.def.params, args, &ctx)?;

        match &closure.def.body {
            FunctionBody::Block(body) => {
                hoist_vars(body, &ctx.scope);
                self.hoist_functions(body, &ctx)?;
                match self.exec_stmts(body, &ctx)? {
                    Completion::Return(value) => Ok(value),
                    _ => Ok(Value::Undefined),
                }
            }
            FunctionBody::Expr(expr) => self.eval(expr, &ctx),
        }
    }

    /// `new callee(...args)`
    pub fn construct(&mut self, callee: &Value, args: Vec<Value>) -> EvalResult {
        match callee {
            Value::Class(class) => {
                let instance = Value::Object(Rc::new(RefCell::new(JsObject {
                    class: Some(class.clone()),
                    ..JsObject::default()
                })));
                self.run_constructor(class, instance.clone(), args)?;
                Ok(instance)
            }
            Value::Function(closure) if !closure.def.is_arrow && !closure.def.is_async => {
                let instance = Value::object(Vec::new());
                let returned = self.call_closure(closure, instance.clone(), args)?;
                match returned {
                    Value::Object(_) | Value::Array(_) => Ok(returned),
                    _ => Ok(instance),
                }
            }
            Value::Native(_) => self.call_function(callee, Value::Undefined, args),
            other => Err(self.throw(
                "TypeError",
                format!("{} is not a constructor", inspect(other)),
            )),
        }
    }

    fn run_constructor(
        &mut self,
        class: &Rc<ClassValue>,
        this: Value,
        args: Vec<Value>,
    ) -> Result<(), Abrupt> {
        if let Some(constructor) = &class.constructor {
            self.call_closure(constructor, this, args)?;
        } else if class.builtin_error {
            if let Value::Object(obj) = &this {
                let mut obj = obj.borrow_mut();
                if !obj.has("name") {
                    obj.set("name", Value::from(class.name.as_str()));
                }
                let message = match args.first() {
                    Some(Value::Undefined) | None => String::new(),
                    Some(value) => value.to_js_string(),
                };
                obj.set("message", Value::from(message));
            }
        } else if let Some(parent) = &class.parent {
            self.run_constructor(parent, this, args)?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------

    /// Evaluate with a name hint for anonymous functions and classes
    fn eval_named(&mut self, expr: &Expr, name: &str, ctx: &Ctx) -> EvalResult {
        match expr {
            Expr::Function(def) if def.name.is_none() => Ok(self.make_closure(def, ctx, Some(name))),
            Expr::Class(def) if def.name.is_none() => self.eval_class(def, ctx, Some(name)),
            other => self.eval(other, ctx),
        }
    }

    pub(super) fn eval(&mut self, expr: &Expr, ctx: &Ctx) -> EvalResult {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::from(s.as_str())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Undefined => Ok(Value::Undefined),
            Expr::This => Ok(ctx.this.clone()),
            Expr::Ident(name) => self.lookup(name, ctx),
            Expr::Template(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Text(text) => out.push_str(text),
                        TemplatePart::Expr(expr) => out.push_str(&self.eval(expr, ctx)?.to_js_string()),
                    }
                }
                Ok(Value::from(out))
            }
            Expr::Regex { pattern, flags } => match RegexValue::compile(pattern, flags) {
                Ok(regex) => Ok(Value::Regex(Rc::new(regex))),
                Err(message) => Err(self.throw("SyntaxError", message)),
            },
            Expr::Array(elements) => Ok(Value::array(self.eval_args(elements, ctx)?)),
            Expr::Object(props) => {
                let mut obj = JsObject::default();
                for prop in props {
                    if prop.kind == PropKind::Spread {
                        let source = self.eval(&prop.value, ctx)?;
                        for (key, value) in self.spread_entries(&source)? {
                            obj.define(&key, value);
                        }
                        continue;
                    }
                    let key = match &prop.key {
                        PropKey::Named(name) => name.clone(),
                        PropKey::Computed(expr) => property_key(&self.eval(expr, ctx)?),
                    };
                    let value = self.eval_named(&prop.value, &key, ctx)?;
                    match prop.kind {
                        PropKind::Getter => obj.define_accessor(&key, Some(value), None),
                        PropKind::Setter => obj.define_accessor(&key, None, Some(value)),
                        _ => obj.define(&key, value),
                    }
                }
                Ok(Value::Object(Rc::new(RefCell::new(obj))))
            }
            Expr::Function(def) => match &def.name {
                // A named function expression can refer to itself
                Some(name) if !def.is_arrow => {
                    let own = ctx.with_scope(ctx.scope.child(false));
                    let closure = self.make_closure(def, &own, None);
                    own.scope.declare(name, closure.clone(), false);
                    Ok(closure)
                }
                _ => Ok(self.make_closure(def, ctx, None)),
            },
            Expr::Class(def) => self.eval_class(def, ctx, None),
            Expr::Unary { op, arg } => {
                if let (UnaryOp::TypeOf, Expr::Ident(name)) = (op, &**arg) {
                    let value = ctx.scope.lookup(name).unwrap_or(Value::Undefined);
                    return Ok(Value::from(value.type_of()));
                }
                let value = self.eval(arg, ctx)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!value.truthy()),
                    UnaryOp::Neg => Value::Number(-value.to_number()),
                    UnaryOp::Plus => Value::Number(value.to_number()),
                    UnaryOp::TypeOf => Value::from(value.type_of()),
                    UnaryOp::Void => Value::Undefined,
                })
            }
            Expr::Update { op, prefix, target } => {
                let old = self.eval(target, ctx)?.to_number();
                let new = match op {
                    UpdateOp::Increment => old + 1.0,
                    UpdateOp::Decrement => old - 1.0,
                };
                self.assign_to(target, Value::Number(new), ctx)?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, ctx)?;
                let right = self.eval(right, ctx)?;
                self.binary(*op, &left, &right)
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left, ctx)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.truthy(),
                    LogicalOp::Or => left.truthy(),
                    LogicalOp::Nullish => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval(right, ctx)
                }
            }
            Expr::Assign { op, target, value } => {
                let value = match op.binary() {
                    None => {
                        let hint = match &**target {
                            Expr::Ident(name) | Expr::Member { property: name, .. } => {
                                Some(name.as_str())
                            }
                            _ => None,
                        };
                        match hint {
                            Some(hint) => self.eval_named(value, hint, ctx)?,
                            None => self.eval(value, ctx)?,
                        }
                    }
                    Some(binary) => {
                        let current = self.eval(target, ctx)?;
                        let rhs = self.eval(value, ctx)?;
                        self.binary(binary, &current, &rhs)?
                    }
                };
                self.assign_to(target, value.clone(), ctx)?;
                Ok(value)
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, ctx)?.truthy() {
                    self.eval(consequent, ctx)
                } else {
                    self.eval(alternate, ctx)
                }
            }
            Expr::Call { callee, args } => self.eval_call(callee, args, ctx),
            Expr::New { callee, args } => {
                let constructor = self.eval(callee, ctx)?;
                let args = self.eval_args(args, ctx)?;
                self.construct(&constructor, args)
            }
            Expr::Member { object, property } => {
                let object = self.eval(object, ctx)?;
                self.get_property(&object, property)
            }
            Expr::Index { object, index } => {
                let object = self.eval(object, ctx)?;
                let key = property_key(&self.eval(index, ctx)?);
                self.get_property(&object, &key)
            }
            Expr::SuperCall(args) => {
                let parent = ctx.home.as_ref().and_then(|home| home.parent.clone());
                let Some(parent) = parent else {
                    return Err(self.throw("SyntaxError", "'super' keyword unexpected here"));
                };
                let args = self.eval_args(args, ctx)?;
                self.run_constructor(&parent, ctx.this.clone(), args)?;
                Ok(Value::Undefined)
            }
            Expr::SuperMember(name) => self.super_member(name, ctx),
            Expr::Spread(_) => Err(self.throw("SyntaxError", "Unexpected token '...'")),
            Expr::Await(_) => Err(self.throw(
                "SyntaxError",
                "await is only valid in async functions and the top level bodies of modules",
            )),
            Expr::Sequence(exprs) => {
                let mut last = Value::Undefined;
                for expr in exprs {
                    last = self.eval(expr, ctx)?;
                }
                Ok(last)
            }
            Expr::Destructure { target, value } => {
                let value = self.eval(value, ctx)?;
                self.bind_pattern(target, value.clone(), BindMode::Assign, ctx)?;
                Ok(value)
            }
        }
    }

    fn super_member(&self, name: &str, ctx: &Ctx) -> EvalResult {
        let parent = ctx.home.as_ref().and_then(|home| home.parent.clone());
        let Some(parent) = parent else {
            return Err(self.throw("SyntaxError", "'super' keyword unexpected here"));
        };
        if let Some(method) = parent.find_method(name) {
            return Ok(Value::Function(method));
        }
        Ok(parent.find_static(name).unwrap_or(Value::Undefined))
    }

    fn lookup(&self, name: &str, ctx: &Ctx) -> EvalResult {
        ctx.scope
            .lookup(name)
            .ok_or_else(|| self.throw("ReferenceError", format!("{} is not defined", name)))
    }

    /// Argument or element list, expanding `...spread` entries
    fn eval_args(&mut self, args: &[Expr], ctx: &Ctx) -> Result<Vec<Value>, Abrupt> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                Expr::Spread(source) => {
                    let source = self.eval(source, ctx)?;
                    values.extend(self.iterate(&source)?);
                }
                other => values.push(self.eval(other, ctx)?),
            }
        }
        Ok(values)
    }

    /// Own enumerable entries copied by `{ ...source }` and object rest
    fn spread_entries(&mut self, source: &Value) -> Result<Vec<(String, Value)>, Abrupt> {
        let Value::Object(obj) = source else {
            return Ok(builtins::own_entries(source));
        };
        let (mut entries, getters) = {
            let obj = obj.borrow();
            let getters: Vec<(String, Value)> = obj
                .accessors
                .iter()
                .filter_map(|(key, accessor)| accessor.get.clone().map(|get| (key.clone(), get)))
                .collect();
            (obj.props.clone(), getters)
        };
        for (key, getter) in getters {
            let value = self.call_function(&getter, source.clone(), Vec::new())?;
            entries.push((key, value));
        }
        Ok(entries)
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Expr], ctx: &Ctx) -> EvalResult {
        let (func, this) = match callee {
            Expr::Member { object, property } => {
                let object = self.eval(object, ctx)?;
                (self.get_property(&object, property)?, object)
            }
            Expr::Index { object, index } => {
                let object = self.eval(object, ctx)?;
                let key = property_key(&self.eval(index, ctx)?);
                (self.get_property(&object, &key)?, object)
            }
            Expr::SuperMember(name) => (self.super_member(name, ctx)?, ctx.this.clone()),
            other => (self.eval(other, ctx)?, Value::Undefined),
        };

        if !func.is_callable() && !matches!(func, Value::Class(_)) {
            return Err(self.throw(
                "TypeError",
                format!("{} is not a function", print_expr(callee)),
            ));
        }

        let args = self.eval_args(args, ctx)?;
        self.call_function(&func, this, args)
    }

    fn assign_name(&self, name: &str, value: Value, ctx: &Ctx) -> Result<(), Abrupt> {
        match ctx.scope.assign(name, value.clone()) {
            Ok(()) => Ok(()),
            Err(AssignError::Constant) => {
                Err(self.throw("TypeError", "Assignment to constant variable."))
            }
            // Sloppy-mode scripts create the global implicitly
            Err(AssignError::Undeclared) => {
                self.global.declare(name, value, true);
                Ok(())
            }
        }
    }

    fn assign_to(&mut self, target: &Expr, value: Value, ctx: &Ctx) -> Result<(), Abrupt> {
        match target {
            Expr::Ident(name) => self.assign_name(name, value, ctx),
            Expr::Member { object, property } => {
                let object = self.eval(object, ctx)?;
                self.set_property(&object, property, value)
            }
            Expr::Index { object, index } => {
                let object = self.eval(object, ctx)?;
                let key = property_key(&self.eval(index, ctx)?);
                self.set_property(&object, &key, value)
            }
            _ => Err(self.throw("SyntaxError", "Invalid assignment target")),
        }
    }

    // ---------------------------------------------------------------
    // Properties
    // ---------------------------------------------------------------

    /// Property read, running getters with the object as `this`
    pub(crate) fn get_property(&mut self, object: &Value, key: &str) -> EvalResult {
        if let Some(accessor) = accessor_of(object, key) {
            return match accessor.get {
                Some(getter) => self.call_function(&getter, object.clone(), Vec::new()),
                None => Ok(Value::Undefined),
            };
        }
        self.read_property(object, key)
    }

    fn read_property(&self, object: &Value, key: &str) -> EvalResult {
        let value = match object {
            Value::Undefined | Value::Null => {
                return Err(self.throw(
                    "TypeError",
                    format!(
                        "Cannot read properties of {} (reading '{}')",
                        object.to_js_string(),
                        key
                    ),
                ))
            }
            Value::Object(obj) => {
                let obj = obj.borrow();
                if let Some(value) = obj.get(key) {
                    value
                } else if let Some(class) = &obj.class {
                    match class.find_method(key) {
                        Some(method) => Value::Function(method),
                        None if key == "constructor" => Value::Class(class.clone()),
                        None => Value::Undefined,
                    }
                } else {
                    Value::Undefined
                }
            }
            Value::Array(items) => {
                if key == "length" {
                    Value::Number(items.borrow().len() as f64)
                } else if let Ok(index) = key.parse::<usize>() {
                    items.borrow().get(index).cloned().unwrap_or(Value::Undefined)
                } else {
                    builtins::array_method(key).unwrap_or(Value::Undefined)
                }
            }
            Value::Str(s) => {
                if key == "length" {
                    Value::Number(s.chars().count() as f64)
                } else if let Ok(index) = key.parse::<usize>() {
                    s.chars()
                        .nth(index)
                        .map(|c| Value::from(c.to_string()))
                        .unwrap_or(Value::Undefined)
                } else {
                    builtins::string_method(key).unwrap_or(Value::Undefined)
                }
            }
            Value::Number(_) => builtins::number_method(key).unwrap_or(Value::Undefined),
            Value::Bool(_) => Value::Undefined,
            Value::Function(closure) => match key {
                "name" => Value::from(closure.name.as_str()),
                "length" => Value::Number(
                    closure
                        .def
                        .params
                        .iter()
                        .take_while(|p| p.default.is_none() && !p.rest)
                        .count() as f64,
                ),
                _ => Value::Undefined,
            },
            Value::Native(native) => match key {
                "name" => Value::from(native.name.as_str()),
                _ => builtins::native_static(&native.name, key).unwrap_or(Value::Undefined),
            },
            Value::Class(class) => match key {
                "name" => Value::from(class.name.as_str()),
                _ => class.find_static(key).unwrap_or(Value::Undefined),
            },
            Value::Promise(_) => builtins::promise_method(key).unwrap_or(Value::Undefined),
            Value::Regex(regex) => match key {
                "source" => Value::from(regex.source.as_str()),
                "flags" => Value::from(regex.flags.as_str()),
                "global" => Value::Bool(regex.global()),
                "sticky" => Value::Bool(regex.sticky()),
                "ignoreCase" => Value::Bool(regex.flags.contains('i')),
                "multiline" => Value::Bool(regex.flags.contains('m')),
                "lastIndex" => Value::Number(regex.last_index.get() as f64),
                _ => builtins::regex_method(key).unwrap_or(Value::Undefined),
            },
        };
        Ok(value)
    }

    /// Property write, running setters with the object as `this`
    pub(crate) fn set_property(&mut self, object: &Value, key: &str, value: Value) -> Result<(), Abrupt> {
        if let Some(accessor) = accessor_of(object, key) {
            // Without a setter the write is dropped, as in sloppy mode
            if let Some(setter) = accessor.set {
                self.call_function(&setter, object.clone(), vec![value])?;
            }
            return Ok(());
        }
        match object {
            Value::Undefined | Value::Null => Err(self.throw(
                "TypeError",
                format!(
                    "Cannot set properties of {} (setting '{}')",
                    object.to_js_string(),
                    key
                ),
            )),
            Value::Object(obj) => {
                obj.borrow_mut().set(key, value);
                Ok(())
            }
            Value::Array(items) => {
                let mut items = items.borrow_mut();
                if key == "length" {
                    let len = value.to_number();
                    if len >= 0.0 && len.fract() == 0.0 {
                        items.resize(len as usize, Value::Undefined);
                        Ok(())
                    } else {
                        Err(self.throw("RangeError", "Invalid array length"))
                    }
                } else if let Ok(index) = key.parse::<usize>() {
                    if index >= items.len() {
                        items.resize(index + 1, Value::Undefined);
                    }
                    items[index] = value;
                    Ok(())
                } else {
                    Ok(())
                }
            }
            Value::Regex(regex) if key == "lastIndex" => {
                let index = value.to_number();
                regex
                    .last_index
                    .set(if index.is_finite() && index > 0.0 { index as usize } else { 0 });
                Ok(())
            }
            Value::Class(class) => {
                let mut statics = class.statics.borrow_mut();
                match statics.iter_mut().find(|(name, _)| name == key) {
                    Some(slot) => slot.1 = value,
                    None => statics.push((key.to_string(), value)),
                }
                Ok(())
            }
            // Primitives and functions silently ignore writes
            _ => Ok(()),
        }
    }

    // ---------------------------------------------------------------
    // Operators
    // ---------------------------------------------------------------

    fn binary(&self, op: BinaryOp, left: &Value, right: &Value) -> EvalResult {
        let value = match op {
            BinaryOp::Add => {
                let stringy = |v: &Value| !matches!(
                    v,
                    Value::Undefined | Value::Null | Value::Bool(_) | Value::Number(_)
                );
                if stringy(left) || stringy(right) {
                    Value::from(format!("{}{}", left.to_js_string(), right.to_js_string()))
                } else {
                    Value::Number(left.to_number() + right.to_number())
                }
            }
            BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
            BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
            BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
            BinaryOp::Rem => Value::Number(left.to_number() % right.to_number()),
            BinaryOp::Pow => Value::Number(power(left.to_number(), right.to_number())),
            BinaryOp::Eq => Value::Bool(left.loose_equals(right)),
            BinaryOp::NotEq => Value::Bool(!left.loose_equals(right)),
            BinaryOp::StrictEq => Value::Bool(left.strict_equals(right)),
            BinaryOp::StrictNotEq => Value::Bool(!left.strict_equals(right)),
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::LtEq | BinaryOp::GtEq => {
                let ordering = match (left, right) {
                    (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                    _ => left.to_number().partial_cmp(&right.to_number()),
                };
                let result = match ordering {
                    None => false,
                    Some(ordering) => match op {
                        BinaryOp::Lt => ordering.is_lt(),
                        BinaryOp::Gt => ordering.is_gt(),
                        BinaryOp::LtEq => ordering.is_le(),
                        _ => ordering.is_ge(),
                    },
                };
                Value::Bool(result)
            }
            BinaryOp::InstanceOf => Value::Bool(self.instance_of(left, right)?),
            BinaryOp::In => {
                let key = property_key(left);
                let found = match right {
                    Value::Object(obj) => {
                        let obj = obj.borrow();
                        obj.has(&key)
                            || obj.class.as_ref().is_some_and(|c| {
                                c.find_method(&key).is_some() || c.find_accessor(&key).is_some()
                            })
                    }
                    Value::Array(items) => {
                        key == "length"
                            || key
                                .parse::<usize>()
                                .is_ok_and(|i| i < items.borrow().len())
                    }
                    Value::Class(class) => class.find_static(&key).is_some(),
                    other => {
                        return Err(self.throw(
                            "TypeError",
                            format!(
                                "Cannot use 'in' operator to search for '{}' in {}",
                                key,
                                inspect(other)
                            ),
                        ))
                    }
                };
                Value::Bool(found)
            }
        };
        Ok(value)
    }

    fn instance_of(&self, left: &Value, right: &Value) -> Result<bool, Abrupt> {
        match right {
            Value::Class(class) => Ok(match left {
                Value::Object(obj) => obj
                    .borrow()
                    .class
                    .as_ref()
                    .is_some_and(|c| c.inherits_from(class)),
                _ => false,
            }),
            Value::Native(native) => Ok(match native.name.as_str() {
                "Promise" => matches!(left, Value::Promise(_)),
                "Array" => matches!(left, Value::Array(_)),
                "RegExp" => matches!(left, Value::Regex(_)),
                "Object" => matches!(
                    left,
                    Value::Object(_) | Value::Array(_) | Value::Promise(_) | Value::Regex(_)
                ),
                "Function" => left.is_callable() || matches!(left, Value::Class(_)),
                _ => false,
            }),
            Value::Function(_) => Ok(false),
            other => Err(self.throw(
                "TypeError",
                format!(
                    "Right-hand side of 'instanceof' is not callable: {}",
                    inspect(other)
                ),
            )),
        }
    }

    // ---------------------------------------------------------------
    // Dynamic code
    // ---------------------------------------------------------------

    /// Run source text in a fresh scope below the globals, returning the
    /// value of a trailing expression statement. Nothing here is traced.
    pub(crate) fn eval_source(&mut self, source: &str) -> EvalResult {
        let program = script::parse(source)
            .map_err(|e| self.throw("SyntaxError", e.to_string()))?;
        debug!("eval of {} statements (untraced)", program.body.len());

        let ctx = self.global_ctx().with_scope(self.global.child(true));
        hoist_vars(&program.body, &ctx.scope);
        self.hoist_functions(&program.body, &ctx)?;

        let Some((last, rest)) = program.body.split_last() else {
            return Ok(Value::Undefined);
        };
        if let Completion::Return(value) = self.exec_stmts(rest, &ctx)? {
            return Ok(value);
        }
        match last {
            Stmt::Expr(expr) => self.eval(expr, &ctx),
            other => match self.exec_stmt(other, &ctx)? {
                Completion::Return(value) => Ok(value),
                _ => Ok(Value::Undefined),
            },
        }
    }

    /// Build a function from parameter and body text (`Function(...)`)
    pub(crate) fn function_from_source(&mut self, params: &[String], body: &str) -> EvalResult {
        let source = format!("(function anonymous({}) {{\n{}\n}})", params.join(", "), body);
        let program = script::parse(&source)
            .map_err(|e| self.throw("SyntaxError", e.to_string()))?;
        match program.body.first() {
            Some(Stmt::Expr(expr)) if program.body.len() == 1 => {
                let ctx = self.global_ctx();
                self.eval(expr, &ctx)
            }
            _ => Err(self.throw("SyntaxError", "Invalid function body")),
        }
    }
}

/// Accessor pair that governs `key` on an object: own accessors, then the
/// class chain. Own data properties shadow both.
fn accessor_of(object: &Value, key: &str) -> Option<Accessor> {
    let Value::Object(obj) = object else {
        return None;
    };
    let obj = obj.borrow();
    if obj.get(key).is_some() {
        return None;
    }
    if let Some(accessor) = obj.accessor(key) {
        return Some(accessor.clone());
    }
    obj.class.as_ref()?.find_accessor(key)
}

/// `**`, keeping NaN where `powf` would answer 1
pub(crate) fn power(base: f64, exponent: f64) -> f64 {
    if exponent.is_nan() || (base.abs() == 1.0 && exponent.is_infinite()) {
        f64::NAN
    } else {
        base.powf(exponent)
    }
}

/// Declare every `var` of a body (not inside nested functions) up front
pub(super) fn hoist_vars(body: &[Stmt], scope: &Scope) {
    for stmt in body {
        hoist_stmt_vars(stmt, scope);
    }
}

fn hoist_stmt_vars(stmt: &Stmt, scope: &Scope) {
    match stmt {
        Stmt::Var(VarKind::Var, decls) | Stmt::For {
            init: Some(ForInit::Var(VarKind::Var, decls)),
            ..
        } => {
            for name in decls.iter().flat_map(|d| d.target.bound_names()) {
                scope.declare_var(&name, None);
            }
            if let Stmt::For { body, .. } = stmt {
                hoist_stmt_vars(body, scope);
            }
        }
        Stmt::If {
            consequent,
            alternate,
            ..
        } => {
            hoist_stmt_vars(consequent, scope);
            if let Some(alternate) = alternate {
                hoist_stmt_vars(alternate, scope);
            }
        }
        Stmt::While { body, .. } | Stmt::DoWhile { body, .. } | Stmt::For { body, .. } => {
            hoist_stmt_vars(body, scope)
        }
        Stmt::ForOf {
            binding,
            target,
            body,
            ..
        } => {
            if *binding == Some(VarKind::Var) {
                for name in target.bound_names() {
                    scope.declare_var(&name, None);
                }
            }
            hoist_stmt_vars(body, scope);
        }
        Stmt::Block(body) => hoist_vars(body, scope),
        Stmt::Try {
            block,
            handler,
            finalizer,
        } => {
            hoist_vars(block, scope);
            if let Some(handler) = handler {
                hoist_vars(&handler.body, scope);
            }
            if let Some(finalizer) = finalizer {
                hoist_vars(finalizer, scope);
            }
        }
        _ => {}
    }
}

/// Property key for a computed member access
pub fn property_key(value: &Value) -> String {
    match value {
        Value::Str(s) => s.to_string(),
        Value::Number(n) => number_key(*n),
        other => other.to_js_string(),
    }
}

/// Text of an uncaught exception: `Name: message` for errors
pub fn describe_thrown(value: &Value) -> String {
    if let Value::Object(obj) = value {
        if let Some((name, message)) = error_parts(&obj.borrow()) {
            return if message.is_empty() {
                name
            } else {
                format!("{}: {}", name, message)
            };
        }
    }
    inspect(value)
}
