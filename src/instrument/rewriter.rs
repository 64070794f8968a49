//! AST rewriting pass that injects lifecycle hooks.
//!
//! Every instrumented body becomes:
//!
//! ```text
//! { const __trace_id = __trace.enter("<name>", "<kind>");
//!   try { <body> } finally { __trace.exit(__trace_id); } }
//! ```
//!
//! Scheduling sites (timers and promise reactions) get their callbacks
//! wrapped in `__trace.bind(<callback>, "<label>")` so the scheduler's
//! activation can be restored as parent when the callback runs.

use crate::protocol::EventKind;
use crate::script::ast::*;
use crate::utils::config::{
    ANONYMOUS_NAME, GLOBAL_RECEIVERS, PROMISE_REACTIONS, TIMER_FUNCTIONS, TRACE_HOOK,
    TRACE_ID_BINDING,
};
use log::debug;
use std::rc::Rc;

/// Walks a program and rewrites it in place
///
/// **Private** - driven by `instrument()`
#[derive(Debug, Default)]
pub struct Rewriter {
    /// Function bodies wrapped
    pub functions: usize,
    /// Timer and promise registration sites wrapped
    pub schedulers: usize,
}

/// How a function literal is reached from its surroundings
#[derive(Clone, Copy)]
enum Site<'a> {
    /// Bound to a name (declaration, assignment, property)
    Named(&'a str),
    /// Written directly as a call argument
    Argument,
    /// Reached through a computed key; left untraced
    Computed,
    /// Anything else
    Bare,
}

impl Rewriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rewrite_program(&mut self, program: &mut Program) {
        self.statements(&mut program.body);
    }

    fn statements(&mut self, body: &mut [Stmt]) {
        for stmt in body {
            self.statement(stmt);
        }
    }

    fn statement(&mut self, stmt: &mut Stmt) {
        match stmt {
            Stmt::Var(_, decls) => self.declarators(decls),
            Stmt::Function(def) => {
                let name = def.name.clone().unwrap_or_else(|| ANONYMOUS_NAME.to_string());
                self.wrap_function(Rc::make_mut(def), &name, EventKind::Function);
            }
            Stmt::Class(class) => self.class(Rc::make_mut(class), None),
            Stmt::Return(value) => {
                if let Some(value) = value {
                    self.expr(value, Site::Bare);
                }
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                self.expr(test, Site::Bare);
                self.statement(consequent);
                if let Some(alternate) = alternate {
                    self.statement(alternate);
                }
            }
            Stmt::While { test, body } | Stmt::DoWhile { body, test } => {
                self.expr(test, Site::Bare);
                self.statement(body);
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                match init {
                    Some(ForInit::Var(_, decls)) => self.declarators(decls),
                    Some(ForInit::Expr(expr)) => self.expr(expr, Site::Bare),
                    None => {}
                }
                if let Some(test) = test {
                    self.expr(test, Site::Bare);
                }
                if let Some(update) = update {
                    self.expr(update, Site::Bare);
                }
                self.statement(body);
            }
            Stmt::ForOf {
                target,
                iterable,
                body,
                ..
            } => {
                self.pattern(target);
                self.expr(iterable, Site::Bare);
                self.statement(body);
            }
            Stmt::Block(body) => self.statements(body),
            Stmt::Try {
                block,
                handler,
                finalizer,
            } => {
                self.statements(block);
                if let Some(handler) = handler {
                    if let Some(param) = &mut handler.param {
                        self.pattern(param);
                    }
                    self.statements(&mut handler.body);
                }
                if let Some(finalizer) = finalizer {
                    self.statements(finalizer);
                }
            }
            Stmt::Throw(value) | Stmt::Expr(value) => self.expr(value, Site::Bare),
            Stmt::Break | Stmt::Continue | Stmt::Empty => {}
        }
    }

    fn declarators(&mut self, decls: &mut [VarDecl]) {
        for decl in decls {
            self.pattern(&mut decl.target);
            if let Some(init) = &mut decl.init {
                match decl.target.as_ident() {
                    Some(name) => self.expr(init, Site::Named(name)),
                    None => self.expr(init, Site::Bare),
                }
            }
        }
    }

    /// Defaults, computed keys and member targets inside a binding pattern
    fn pattern(&mut self, pattern: &mut Pattern) {
        match pattern {
            Pattern::Ident(_) => {}
            Pattern::Expr(target) => self.expr(target, Site::Bare),
            Pattern::Object { props, .. } => {
                for prop in props {
                    if let PropKey::Computed(key) = &mut prop.key {
                        self.expr(key, Site::Bare);
                    }
                    self.pattern_element(&mut prop.value);
                }
            }
            Pattern::Array { elements, rest } => {
                for element in elements.iter_mut().flatten() {
                    self.pattern_element(element);
                }
                if let Some(rest) = rest {
                    self.pattern(rest);
                }
            }
        }
    }

    fn pattern_element(&mut self, element: &mut PatternElement) {
        self.pattern(&mut element.target);
        let binding = element.target.as_ident().map(str::to_string);
        if let Some(default) = &mut element.default {
            match &binding {
                Some(name) => self.expr(default, Site::Named(name)),
                None => self.expr(default, Site::Bare),
            }
        }
    }

    fn expr(&mut self, expr: &mut Expr, site: Site<'_>) {
        match expr {
            Expr::Function(def) => {
                let def = Rc::make_mut(def);
                let (name, kind) = match (def.name.clone(), site) {
                    (_, Site::Computed) => {
                        self.function_body(def);
                        return;
                    }
                    (Some(own), Site::Argument) => (own, EventKind::Callback),
                    (Some(own), _) => (own, EventKind::Function),
                    (None, Site::Named(binding)) => (binding.to_string(), EventKind::Function),
                    (None, Site::Argument) => (ANONYMOUS_NAME.to_string(), EventKind::Callback),
                    (None, Site::Bare) => (ANONYMOUS_NAME.to_string(), EventKind::Function),
                };
                self.wrap_function(def, &name, kind);
            }
            Expr::Class(class) => {
                let binding = match site {
                    Site::Named(name) => Some(name),
                    _ => None,
                };
                self.class(Rc::make_mut(class), binding);
            }
            Expr::Template(parts) => {
                for part in parts {
                    if let TemplatePart::Expr(expr) = part {
                        self.expr(expr, Site::Bare);
                    }
                }
            }
            Expr::Array(elements) => {
                for element in elements {
                    self.expr(element, Site::Bare);
                }
            }
            Expr::Object(props) => {
                for prop in props {
                    if prop.kind == PropKind::Spread {
                        self.expr(&mut prop.value, Site::Bare);
                        continue;
                    }
                    match &mut prop.key {
                        PropKey::Named(key) => {
                            let key = key.clone();
                            self.expr(&mut prop.value, Site::Named(&key));
                        }
                        PropKey::Computed(key) => {
                            self.expr(key, Site::Bare);
                            self.expr(&mut prop.value, Site::Computed);
                        }
                    }
                }
            }
            Expr::Unary { arg, .. } => self.expr(arg, Site::Bare),
            Expr::Update { target, .. } => self.expr(target, Site::Bare),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.expr(left, Site::Bare);
                self.expr(right, Site::Bare);
            }
            Expr::Assign { target, value, .. } => {
                self.expr(target, Site::Bare);
                match &**target {
                    Expr::Ident(name) | Expr::Member { property: name, .. } => {
                        let name = name.clone();
                        self.expr(value, Site::Named(&name));
                    }
                    Expr::Index { .. } => self.expr(value, Site::Computed),
                    _ => self.expr(value, Site::Bare),
                }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.expr(test, Site::Bare);
                self.expr(consequent, Site::Bare);
                self.expr(alternate, Site::Bare);
            }
            Expr::Call { callee, args } => {
                let label = scheduling_label(callee);
                self.expr(callee, Site::Bare);
                self.call_arguments(args);
                if let Some((label, all_args)) = label {
                    self.schedulers += 1;
                    let count = if all_args { args.len() } else { args.len().min(1) };
                    for arg in args.iter_mut().take(count) {
                        if !matches!(arg, Expr::Spread(_)) {
                            bind_in_place(arg, label);
                        }
                    }
                }
            }
            Expr::New { callee, args } => {
                self.expr(callee, Site::Bare);
                self.call_arguments(args);
            }
            Expr::SuperCall(args) => self.call_arguments(args),
            Expr::Member { object, .. } => self.expr(object, Site::Bare),
            Expr::Index { object, index } => {
                self.expr(object, Site::Bare);
                self.expr(index, Site::Bare);
            }
            Expr::Spread(arg) | Expr::Await(arg) => self.expr(arg, Site::Bare),
            Expr::Sequence(exprs) => {
                for expr in exprs {
                    self.expr(expr, Site::Bare);
                }
            }
            Expr::Destructure { target, value } => {
                self.pattern(target);
                self.expr(value, Site::Bare);
            }
            Expr::Number(_)
            | Expr::Str(_)
            | Expr::Regex { .. }
            | Expr::Bool(_)
            | Expr::Null
            | Expr::Undefined
            | Expr::Ident(_)
            | Expr::This
            | Expr::SuperMember(_) => {}
        }
    }

    fn call_arguments(&mut self, args: &mut [Expr]) {
        for arg in args {
            self.expr(arg, Site::Argument);
        }
    }

    fn class(&mut self, class: &mut ClassDef, binding: Option<&str>) {
        let class_name = class
            .name
            .clone()
            .or_else(|| binding.map(str::to_string))
            .unwrap_or_else(|| ANONYMOUS_NAME.to_string());

        if let Some(parent) = &mut class.parent {
            self.expr(parent, Site::Bare);
        }
        if let Some(constructor) = &mut class.constructor {
            let name = format!("{}.constructor", class_name);
            self.wrap_function(Rc::make_mut(constructor), &name, EventKind::Function);
        }
        for method in &mut class.methods {
            let name = format!("{}.{}", class_name, method.name);
            self.wrap_function(Rc::make_mut(&mut method.function), &name, EventKind::Function);
        }
    }

    /// Rewrite nested code without wrapping this function itself
    fn function_body(&mut self, def: &mut FunctionDef) {
        for param in &mut def.params {
            self.pattern(&mut param.target);
            if let Some(default) = &mut param.default {
                self.expr(default, Site::Bare);
            }
        }
        match &mut def.body {
            FunctionBody::Block(body) => self.statements(body),
            FunctionBody::Expr(expr) => self.expr(expr, Site::Bare),
        }
    }

    fn wrap_function(&mut self, def: &mut FunctionDef, name: &str, kind: EventKind) {
        self.function_body(def);

        let body = match std::mem::replace(&mut def.body, FunctionBody::Block(Vec::new())) {
            FunctionBody::Block(body) => body,
            FunctionBody::Expr(expr) => vec![Stmt::Return(Some(*expr))],
        };

        let enter = Expr::call(
            Expr::member(Expr::ident(TRACE_HOOK), "enter"),
            vec![Expr::string(name), Expr::string(kind.as_str())],
        );
        let exit = Expr::call(
            Expr::member(Expr::ident(TRACE_HOOK), "exit"),
            vec![Expr::ident(TRACE_ID_BINDING)],
        );

        def.body = FunctionBody::Block(vec![
            Stmt::Var(
                VarKind::Const,
                vec![VarDecl {
                    target: Pattern::ident(TRACE_ID_BINDING),
                    init: Some(enter),
                }],
            ),
            Stmt::Try {
                block: body,
                handler: None,
                finalizer: Some(vec![Stmt::Expr(exit)]),
            },
        ]);

        self.functions += 1;
        debug!("Wrapped {} '{}'", kind, name);
    }
}

/// Scheduling sites: `(label, wrap every argument)`
fn scheduling_label(callee: &Expr) -> Option<(&'static str, bool)> {
    match callee {
        Expr::Ident(name) => timer_label(name).map(|label| (label, false)),
        Expr::Member { object, property } => {
            if let Expr::Ident(receiver) = &**object {
                if GLOBAL_RECEIVERS.contains(&receiver.as_str()) {
                    if let Some(label) = timer_label(property) {
                        return Some((label, false));
                    }
                }
            }
            PROMISE_REACTIONS
                .iter()
                .find(|reaction| **reaction == property.as_str())
                .map(|label| (*label, true))
        }
        _ => None,
    }
}

fn timer_label(name: &str) -> Option<&'static str> {
    TIMER_FUNCTIONS.iter().find(|timer| **timer == name).copied()
}

fn bind_in_place(arg: &mut Expr, label: &str) {
    let callback = std::mem::replace(arg, Expr::Undefined);
    *arg = Expr::call(
        Expr::member(Expr::ident(TRACE_HOOK), "bind"),
        vec![callback, Expr::string(label)],
    );
}
