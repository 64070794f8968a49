//! Splitting async function bodies at their `await` points.
//!
//! Statements without `await` stay whole and run on the ordinary
//! evaluator. Everything else becomes a flat list of steps: each `await`
//! gets its own step that stores the settled value in a temporary, and
//! operands evaluated before it are spilled to temporaries so they keep
//! their left-to-right order. Short-circuit operators and `?:` become
//! conditional steps. Nested functions and classes are never entered.

use crate::script::ast::*;
use std::rc::Rc;

/// Temporaries start with a character no identifier can contain
const TEMP_PREFIX: &str = "%await";

#[derive(Debug)]
pub(crate) enum Step {
    /// Await-free statement
    Run(Stmt),
    /// Suspend on `arg`, then bind the settled value to `temp`
    Await { temp: String, arg: Expr },
    /// Statements in a scope of their own
    Block(Rc<Body>),
    If {
        test: Expr,
        consequent: Rc<[Step]>,
        alternate: Rc<[Step]>,
    },
    Loop(Rc<LoopPlan>),
    ForOf(Rc<ForOfPlan>),
    Try(Rc<TryPlan>),
}

#[derive(Debug)]
pub(crate) struct Body {
    /// Function declarations to hoist on entry
    pub hoisted: Vec<Rc<FunctionDef>>,
    pub steps: Rc<[Step]>,
}

/// Loop condition with the steps computing its awaited operands
#[derive(Debug)]
pub(crate) struct LoopTest {
    pub prelude: Rc<[Step]>,
    pub expr: Expr,
}

/// `while`, `do ... while` and the loop part of `for`
#[derive(Debug)]
pub(crate) struct LoopPlan {
    pub test: Option<LoopTest>,
    pub body: Rc<[Step]>,
    pub update: Option<Rc<[Step]>>,
    /// `let` names copied into a fresh scope for every iteration
    pub per_iteration: Vec<String>,
    /// False for `do ... while`
    pub test_first: bool,
}

#[derive(Debug)]
pub(crate) struct ForOfPlan {
    pub binding: Option<VarKind>,
    pub target: Pattern,
    pub iterable: Expr,
    pub body: Rc<[Step]>,
}

#[derive(Debug)]
pub(crate) struct CatchPlan {
    pub param: Option<Pattern>,
    pub body: Body,
}

#[derive(Debug)]
pub(crate) struct TryPlan {
    pub block: Body,
    pub handler: Option<CatchPlan>,
    pub finalizer: Option<Body>,
}

/// `await` placed where the step form cannot express it
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Unsupported(pub &'static str);

/// Lower a function body
///
/// # Errors
/// `Unsupported` for `await` inside destructuring defaults or keys
pub(crate) fn lower_body(body: &[Stmt]) -> Result<Rc<[Step]>, Unsupported> {
    Lowerer::default().stmts(body).map(Rc::from)
}

#[derive(Default)]
struct Lowerer {
    temps: usize,
}

impl Lowerer {
    fn temp(&mut self) -> String {
        self.temps += 1;
        format!("{}{}", TEMP_PREFIX, self.temps)
    }

    fn stmts(&mut self, body: &[Stmt]) -> Result<Vec<Step>, Unsupported> {
        let mut out = Vec::with_capacity(body.len());
        for stmt in body {
            self.stmt(stmt, &mut out)?;
        }
        Ok(out)
    }

    fn branch(&mut self, stmt: &Stmt) -> Result<Rc<[Step]>, Unsupported> {
        let mut out = Vec::new();
        self.stmt(stmt, &mut out)?;
        Ok(Rc::from(out))
    }

    fn block(&mut self, body: &[Stmt]) -> Result<Body, Unsupported> {
        Ok(Body {
            hoisted: hoisted(body),
            steps: Rc::from(self.stmts(body)?),
        })
    }

    fn stmt(&mut self, stmt: &Stmt, out: &mut Vec<Step>) -> Result<(), Unsupported> {
        if !stmt_awaits(stmt) {
            out.push(Step::Run(stmt.clone()));
            return Ok(());
        }
        match stmt {
            Stmt::Var(kind, decls) => {
                for decl in decls {
                    if pattern_awaits(&decl.target) {
                        return Err(Unsupported("await inside a destructuring pattern"));
                    }
                    let init = match &decl.init {
                        Some(init) => Some(self.expr(init, out)?),
                        None => None,
                    };
                    out.push(Step::Run(Stmt::Var(
                        *kind,
                        vec![VarDecl {
                            target: decl.target.clone(),
                            init,
                        }],
                    )));
                }
            }
            Stmt::Expr(expr) => {
                let expr = self.expr(expr, out)?;
                out.push(Step::Run(Stmt::Expr(expr)));
            }
            Stmt::Return(Some(expr)) => {
                let expr = self.expr(expr, out)?;
                out.push(Step::Run(Stmt::Return(Some(expr))));
            }
            Stmt::Throw(expr) => {
                let expr = self.expr(expr, out)?;
                out.push(Step::Run(Stmt::Throw(expr)));
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                let test = self.expr(test, out)?;
                let consequent = self.branch(consequent)?;
                let alternate = match alternate {
                    Some(alternate) => self.branch(alternate)?,
                    None => Rc::from(Vec::new()),
                };
                out.push(Step::If {
                    test,
                    consequent,
                    alternate,
                });
            }
            Stmt::Block(body) => out.push(Step::Block(Rc::new(self.block(body)?))),
            Stmt::While { test, body } => {
                let plan = LoopPlan {
                    test: Some(self.loop_test(test)?),
                    body: self.branch(body)?,
                    update: None,
                    per_iteration: Vec::new(),
                    test_first: true,
                };
                out.push(Step::Loop(Rc::new(plan)));
            }
            Stmt::DoWhile { body, test } => {
                let plan = LoopPlan {
                    test: Some(self.loop_test(test)?),
                    body: self.branch(body)?,
                    update: None,
                    per_iteration: Vec::new(),
                    test_first: false,
                };
                out.push(Step::Loop(Rc::new(plan)));
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                // The initializer gets a scope around the loop
                let mut outer = Vec::new();
                let mut per_iteration = Vec::new();
                match init {
                    Some(ForInit::Var(kind, decls)) => {
                        if *kind == VarKind::Let {
                            per_iteration = decls.iter().flat_map(|d| d.target.bound_names()).collect();
                        }
                        self.stmt(&Stmt::Var(*kind, decls.clone()), &mut outer)?;
                    }
                    Some(ForInit::Expr(expr)) => self.stmt(&Stmt::Expr(expr.clone()), &mut outer)?,
                    None => {}
                }
                let test = match test {
                    Some(test) => Some(self.loop_test(test)?),
                    None => None,
                };
                let update = match update {
                    Some(update) => Some(self.branch(&Stmt::Expr(update.clone()))?),
                    None => None,
                };
                outer.push(Step::Loop(Rc::new(LoopPlan {
                    test,
                    body: self.branch(body)?,
                    update,
                    per_iteration,
                    test_first: true,
                })));
                out.push(Step::Block(Rc::new(Body {
                    hoisted: Vec::new(),
                    steps: Rc::from(outer),
                })));
            }
            Stmt::ForOf {
                binding,
                target,
                iterable,
                body,
            } => {
                if pattern_awaits(target) {
                    return Err(Unsupported("await inside a destructuring pattern"));
                }
                let iterable = self.expr(iterable, out)?;
                let plan = ForOfPlan {
                    binding: *binding,
                    target: target.clone(),
                    iterable,
                    body: self.branch(body)?,
                };
                out.push(Step::ForOf(Rc::new(plan)));
            }
            Stmt::Try {
                block,
                handler,
                finalizer,
            } => {
                let handler = match handler {
                    Some(handler) => {
                        if handler.param.as_ref().is_some_and(pattern_awaits) {
                            return Err(Unsupported("await inside a destructuring pattern"));
                        }
                        Some(CatchPlan {
                            param: handler.param.clone(),
                            body: self.block(&handler.body)?,
                        })
                    }
                    None => None,
                };
                let plan = TryPlan {
                    block: self.block(block)?,
                    handler,
                    finalizer: match finalizer {
                        Some(finalizer) => Some(self.block(finalizer)?),
                        None => None,
                    },
                };
                out.push(Step::Try(Rc::new(plan)));
            }
            // Nothing else can hold an `await` outside a nested function
            other => out.push(Step::Run(other.clone())),
        }
        Ok(())
    }

    fn loop_test(&mut self, test: &Expr) -> Result<LoopTest, Unsupported> {
        let mut prelude = Vec::new();
        let expr = self.expr(test, &mut prelude)?;
        Ok(LoopTest {
            prelude: Rc::from(prelude),
            expr,
        })
    }

    /// Await-free form of `expr`; the steps computing it go to `out`
    fn expr(&mut self, expr: &Expr, out: &mut Vec<Step>) -> Result<Expr, Unsupported> {
        if !expr_awaits(expr) {
            return Ok(expr.clone());
        }
        let lowered = match expr {
            Expr::Await(arg) => {
                let arg = self.expr(arg, out)?;
                let temp = self.temp();
                out.push(Step::Await {
                    temp: temp.clone(),
                    arg,
                });
                Expr::Ident(temp)
            }
            Expr::Unary { op, arg } => Expr::Unary {
                op: *op,
                arg: Box::new(self.expr(arg, out)?),
            },
            Expr::Update { op, prefix, target } => Expr::Update {
                op: *op,
                prefix: *prefix,
                target: Box::new(self.target(target, false, out)?),
            },
            Expr::Binary { op, left, right } => {
                let mut operands = self.list(&[(**left).clone(), (**right).clone()], out)?;
                let right = operands.pop();
                let left = operands.pop();
                match (left, right) {
                    (Some(left), Some(right)) => Expr::Binary {
                        op: *op,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    _ => return Err(Unsupported("malformed binary expression")),
                }
            }
            Expr::Logical { op, left, right } => {
                if !expr_awaits(right) {
                    Expr::Logical {
                        op: *op,
                        left: Box::new(self.expr(left, out)?),
                        right: right.clone(),
                    }
                } else {
                    let temp = self.temp();
                    let left = self.expr(left, out)?;
                    out.push(let_temp(&temp, left));
                    let held = Expr::ident(temp.as_str());
                    let test = match op {
                        LogicalOp::And => held,
                        LogicalOp::Or => Expr::Unary {
                            op: UnaryOp::Not,
                            arg: Box::new(held),
                        },
                        LogicalOp::Nullish => Expr::Binary {
                            op: BinaryOp::Eq,
                            left: Box::new(held),
                            right: Box::new(Expr::Null),
                        },
                    };
                    let consequent = self.assign_temp(&temp, right)?;
                    out.push(Step::If {
                        test,
                        consequent,
                        alternate: Rc::from(Vec::new()),
                    });
                    Expr::Ident(temp)
                }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                let test = self.expr(test, out)?;
                if !expr_awaits(consequent) && !expr_awaits(alternate) {
                    Expr::Conditional {
                        test: Box::new(test),
                        consequent: consequent.clone(),
                        alternate: alternate.clone(),
                    }
                } else {
                    let temp = self.temp();
                    out.push(let_temp(&temp, Expr::Undefined));
                    let consequent = self.assign_temp(&temp, consequent)?;
                    let alternate = self.assign_temp(&temp, alternate)?;
                    out.push(Step::If {
                        test,
                        consequent,
                        alternate,
                    });
                    Expr::Ident(temp)
                }
            }
            Expr::Assign { op, target, value } => {
                let spill = expr_awaits(value);
                let target = self.target(target, spill, out)?;
                match op.binary() {
                    None => Expr::Assign {
                        op: *op,
                        target: Box::new(target),
                        value: Box::new(self.expr(value, out)?),
                    },
                    Some(binary) => {
                        // The current value is read before the right side
                        let current = self.spill(target.clone(), out);
                        let value = self.expr(value, out)?;
                        Expr::Assign {
                            op: AssignOp::Assign,
                            target: Box::new(target),
                            value: Box::new(Expr::Binary {
                                op: binary,
                                left: Box::new(current),
                                right: Box::new(value),
                            }),
                        }
                    }
                }
            }
            Expr::Destructure { target, value } => {
                if pattern_awaits(target) {
                    return Err(Unsupported("await inside a destructuring pattern"));
                }
                Expr::Destructure {
                    target: target.clone(),
                    value: Box::new(self.expr(value, out)?),
                }
            }
            Expr::Call { callee, args } => {
                let spill = args.iter().any(expr_awaits);
                Expr::Call {
                    callee: Box::new(self.callee(callee, spill, out)?),
                    args: self.list(args, out)?,
                }
            }
            Expr::New { callee, args } => {
                let spill = args.iter().any(expr_awaits);
                let callee = self.expr(callee, out)?;
                let callee = if spill { self.spill(callee, out) } else { callee };
                Expr::New {
                    callee: Box::new(callee),
                    args: self.list(args, out)?,
                }
            }
            Expr::SuperCall(args) => Expr::SuperCall(self.list(args, out)?),
            Expr::Member { object, property } => Expr::Member {
                object: Box::new(self.expr(object, out)?),
                property: property.clone(),
            },
            Expr::Index { object, index } => {
                let mut parts = self.list(&[(**object).clone(), (**index).clone()], out)?;
                let index = parts.pop();
                let object = parts.pop();
                match (object, index) {
                    (Some(object), Some(index)) => Expr::Index {
                        object: Box::new(object),
                        index: Box::new(index),
                    },
                    _ => return Err(Unsupported("malformed member expression")),
                }
            }
            Expr::Array(elements) => Expr::Array(self.list(elements, out)?),
            Expr::Spread(inner) => Expr::Spread(Box::new(self.expr(inner, out)?)),
            Expr::Template(parts) => {
                let exprs: Vec<Expr> = parts
                    .iter()
                    .filter_map(|part| match part {
                        TemplatePart::Expr(expr) => Some(expr.clone()),
                        TemplatePart::Text(_) => None,
                    })
                    .collect();
                let mut lowered = self.list(&exprs, out)?.into_iter();
                let mut rebuilt = Vec::with_capacity(parts.len());
                for part in parts {
                    match part {
                        TemplatePart::Text(text) => rebuilt.push(TemplatePart::Text(text.clone())),
                        TemplatePart::Expr(_) => match lowered.next() {
                            Some(expr) => rebuilt.push(TemplatePart::Expr(expr)),
                            None => return Err(Unsupported("malformed template")),
                        },
                    }
                }
                Expr::Template(rebuilt)
            }
            Expr::Object(props) => {
                // Computed keys and values, in source order
                let mut exprs = Vec::new();
                for prop in props {
                    if let PropKey::Computed(key) = &prop.key {
                        exprs.push(key.clone());
                    }
                    exprs.push(prop.value.clone());
                }
                let mut lowered = self.list(&exprs, out)?.into_iter();
                let mut rebuilt = Vec::with_capacity(props.len());
                for prop in props {
                    let key = match &prop.key {
                        PropKey::Computed(_) => match lowered.next() {
                            Some(key) => PropKey::Computed(key),
                            None => return Err(Unsupported("malformed object literal")),
                        },
                        named => named.clone(),
                    };
                    let Some(value) = lowered.next() else {
                        return Err(Unsupported("malformed object literal"));
                    };
                    rebuilt.push(Property {
                        key,
                        value,
                        kind: prop.kind,
                    });
                }
                Expr::Object(rebuilt)
            }
            Expr::Sequence(exprs) => {
                let Some((last, rest)) = exprs.split_last() else {
                    return Ok(Expr::Undefined);
                };
                for expr in rest {
                    let expr = self.expr(expr, out)?;
                    out.push(Step::Run(Stmt::Expr(expr)));
                }
                self.expr(last, out)?
            }
            other => other.clone(),
        };
        Ok(lowered)
    }

    /// Lower a list evaluated left to right. Everything before the last
    /// awaiting entry is spilled so it is computed before that `await`.
    fn list(&mut self, exprs: &[Expr], out: &mut Vec<Step>) -> Result<Vec<Expr>, Unsupported> {
        let Some(last) = exprs.iter().rposition(expr_awaits) else {
            return Ok(exprs.to_vec());
        };
        let mut lowered = Vec::with_capacity(exprs.len());
        for (index, expr) in exprs.iter().enumerate() {
            let expr = match expr {
                Expr::Spread(inner) if index < last => {
                    let inner = self.expr(inner, out)?;
                    Expr::Spread(Box::new(self.spill(inner, out)))
                }
                _ if index < last => {
                    let expr = self.expr(expr, out)?;
                    self.spill(expr, out)
                }
                _ if index == last => self.expr(expr, out)?,
                _ => expr.clone(),
            };
            lowered.push(expr);
        }
        Ok(lowered)
    }

    /// Callee keeping its `this`: the object of a member callee is
    /// spilled, the member read stays in the call
    fn callee(&mut self, callee: &Expr, spill: bool, out: &mut Vec<Step>) -> Result<Expr, Unsupported> {
        match callee {
            Expr::Member { object, property } => {
                let object = self.expr(object, out)?;
                let object = if spill { self.spill(object, out) } else { object };
                Ok(Expr::Member {
                    object: Box::new(object),
                    property: property.clone(),
                })
            }
            Expr::Index { .. } => self.target(callee, spill, out),
            Expr::SuperMember(_) => Ok(callee.clone()),
            other => {
                let lowered = self.expr(other, out)?;
                Ok(if spill { self.spill(lowered, out) } else { lowered })
            }
        }
    }

    /// Assignment target whose object and key are fixed before the value
    fn target(&mut self, target: &Expr, spill: bool, out: &mut Vec<Step>) -> Result<Expr, Unsupported> {
        match target {
            Expr::Member { object, property } => {
                let object = self.expr(object, out)?;
                Ok(Expr::Member {
                    object: Box::new(if spill { self.spill(object, out) } else { object }),
                    property: property.clone(),
                })
            }
            Expr::Index { object, index } => {
                let mut parts = self.list(&[(**object).clone(), (**index).clone()], out)?;
                if spill {
                    parts = parts.into_iter().map(|part| self.spill(part, out)).collect();
                }
                let index = parts.pop();
                let object = parts.pop();
                match (object, index) {
                    (Some(object), Some(index)) => Ok(Expr::Index {
                        object: Box::new(object),
                        index: Box::new(index),
                    }),
                    _ => Err(Unsupported("malformed member expression")),
                }
            }
            other => self.expr(other, out),
        }
    }

    /// Steps assigning the lowered `expr` to an existing temporary
    fn assign_temp(&mut self, temp: &str, expr: &Expr) -> Result<Rc<[Step]>, Unsupported> {
        let mut steps = Vec::new();
        let value = self.expr(expr, &mut steps)?;
        steps.push(Step::Run(Stmt::Expr(Expr::Assign {
            op: AssignOp::Assign,
            target: Box::new(Expr::ident(temp)),
            value: Box::new(value),
        })));
        Ok(Rc::from(steps))
    }

    /// Evaluate `expr` now into a temporary; literals need no slot
    fn spill(&mut self, expr: Expr, out: &mut Vec<Step>) -> Expr {
        if is_constant(&expr) {
            return expr;
        }
        let temp = self.temp();
        out.push(let_temp(&temp, expr));
        Expr::Ident(temp)
    }
}

fn let_temp(temp: &str, value: Expr) -> Step {
    Step::Run(Stmt::Var(
        VarKind::Let,
        vec![VarDecl {
            target: Pattern::ident(temp),
            init: Some(value),
        }],
    ))
}

fn is_constant(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Number(_) | Expr::Str(_) | Expr::Bool(_) | Expr::Null | Expr::Undefined
    ) || matches!(expr, Expr::Ident(name) if name.starts_with(TEMP_PREFIX))
}

pub(crate) fn hoisted(body: &[Stmt]) -> Vec<Rc<FunctionDef>> {
    body.iter()
        .filter_map(|stmt| match stmt {
            Stmt::Function(def) => Some(def.clone()),
            _ => None,
        })
        .collect()
}

fn stmt_awaits(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Var(_, decls) => decls
            .iter()
            .any(|d| pattern_awaits(&d.target) || d.init.as_ref().is_some_and(expr_awaits)),
        Stmt::Return(Some(expr)) | Stmt::Throw(expr) | Stmt::Expr(expr) => expr_awaits(expr),
        Stmt::If {
            test,
            consequent,
            alternate,
        } => {
            expr_awaits(test)
                || stmt_awaits(consequent)
                || alternate.as_deref().is_some_and(stmt_awaits)
        }
        Stmt::While { test, body } | Stmt::DoWhile { body, test } => {
            expr_awaits(test) || stmt_awaits(body)
        }
        Stmt::For {
            init,
            test,
            update,
            body,
        } => {
            let init = match init {
                Some(ForInit::Var(_, decls)) => decls
                    .iter()
                    .any(|d| pattern_awaits(&d.target) || d.init.as_ref().is_some_and(expr_awaits)),
                Some(ForInit::Expr(expr)) => expr_awaits(expr),
                None => false,
            };
            init || test.as_ref().is_some_and(expr_awaits)
                || update.as_ref().is_some_and(expr_awaits)
                || stmt_awaits(body)
        }
        Stmt::ForOf {
            target,
            iterable,
            body,
            ..
        } => pattern_awaits(target) || expr_awaits(iterable) || stmt_awaits(body),
        Stmt::Block(body) => body.iter().any(stmt_awaits),
        Stmt::Try {
            block,
            handler,
            finalizer,
        } => {
            block.iter().any(stmt_awaits)
                || handler.as_ref().is_some_and(|h| {
                    h.param.as_ref().is_some_and(pattern_awaits) || h.body.iter().any(stmt_awaits)
                })
                || finalizer.as_ref().is_some_and(|f| f.iter().any(stmt_awaits))
        }
        Stmt::Return(None)
        | Stmt::Function(_)
        | Stmt::Class(_)
        | Stmt::Break
        | Stmt::Continue
        | Stmt::Empty => false,
    }
}

pub(crate) fn expr_awaits(expr: &Expr) -> bool {
    match expr {
        Expr::Await(_) => true,
        Expr::Template(parts) => parts.iter().any(|part| match part {
            TemplatePart::Expr(expr) => expr_awaits(expr),
            TemplatePart::Text(_) => false,
        }),
        Expr::Array(items) | Expr::SuperCall(items) | Expr::Sequence(items) => {
            items.iter().any(expr_awaits)
        }
        Expr::Object(props) => props.iter().any(|prop| {
            expr_awaits(&prop.value) || matches!(&prop.key, PropKey::Computed(key) if expr_awaits(key))
        }),
        Expr::Unary { arg, .. } | Expr::Spread(arg) => expr_awaits(arg),
        Expr::Update { target, .. } => expr_awaits(target),
        Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
            expr_awaits(left) || expr_awaits(right)
        }
        Expr::Assign { target, value, .. } => expr_awaits(target) || expr_awaits(value),
        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => expr_awaits(test) || expr_awaits(consequent) || expr_awaits(alternate),
        Expr::Call { callee, args } | Expr::New { callee, args } => {
            expr_awaits(callee) || args.iter().any(expr_awaits)
        }
        Expr::Member { object, .. } => expr_awaits(object),
        Expr::Index { object, index } => expr_awaits(object) || expr_awaits(index),
        Expr::Destructure { target, value } => pattern_awaits(target) || expr_awaits(value),
        Expr::Number(_)
        | Expr::Str(_)
        | Expr::Regex { .. }
        | Expr::Bool(_)
        | Expr::Null
        | Expr::Undefined
        | Expr::Ident(_)
        | Expr::This
        | Expr::Function(_)
        | Expr::Class(_)
        | Expr::SuperMember(_) => false,
    }
}

fn pattern_awaits(pattern: &Pattern) -> bool {
    let element = |e: &PatternElement| pattern_awaits(&e.target) || e.default.as_ref().is_some_and(expr_awaits);
    match pattern {
        Pattern::Ident(_) => false,
        Pattern::Expr(expr) => expr_awaits(expr),
        Pattern::Object { props, .. } => props.iter().any(|prop| {
            element(&prop.value) || matches!(&prop.key, PropKey::Computed(key) if expr_awaits(key))
        }),
        Pattern::Array { elements, rest } => {
            elements.iter().flatten().any(element) || rest.as_deref().is_some_and(pattern_awaits)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parse;
    use pretty_assertions::assert_eq;

    fn body_of(source: &str) -> Vec<Stmt> {
        let program = parse(source).unwrap();
        match program.body.into_iter().next() {
            Some(Stmt::Function(def)) => match &def.body {
                FunctionBody::Block(body) => body.clone(),
                FunctionBody::Expr(_) => panic!("expected a block body"),
            },
            _ => panic!("expected a function"),
        }
    }

    fn kinds(steps: &[Step]) -> Vec<&'static str> {
        steps
            .iter()
            .map(|step| match step {
                Step::Run(_) => "run",
                Step::Await { .. } => "await",
                Step::Block(_) => "block",
                Step::If { .. } => "if",
                Step::Loop(_) => "loop",
                Step::ForOf(_) => "for-of",
                Step::Try(_) => "try",
            })
            .collect()
    }

    #[test]
    fn test_await_free_statements_stay_whole() {
        let steps = lower_body(&body_of("async function f() { let a = 1; while (a) { a-- } }")).unwrap();
        assert_eq!(kinds(&steps), ["run", "run"]);
    }

    #[test]
    fn test_await_becomes_a_step_before_its_statement() {
        let steps = lower_body(&body_of("async function f() { const v = await load(); return v }")).unwrap();
        assert_eq!(kinds(&steps), ["await", "run", "run"]);
        let Step::Await { temp, arg } = &steps[0] else {
            panic!("expected an await step");
        };
        assert_eq!(temp, "%await1");
        assert_eq!(arg, &Expr::Call {
            callee: Box::new(Expr::ident("load")),
            args: Vec::new(),
        });
    }

    #[test]
    fn test_earlier_operands_are_spilled() {
        let steps = lower_body(&body_of("async function f() { return g() + await h() }")).unwrap();
        assert_eq!(kinds(&steps), ["run", "await", "run"]);
    }

    #[test]
    fn test_short_circuit_and_loops() {
        let steps = lower_body(&body_of(
            "async function f() { ok && await go(); for (let i = 0; await more(i); i++) {} try { await x } finally {} }",
        ))
        .unwrap();
        assert_eq!(kinds(&steps), ["run", "if", "run", "block", "try"]);
        let Step::Block(outer) = &steps[3] else {
            panic!("expected the loop scope");
        };
        assert_eq!(kinds(&outer.steps), ["run", "loop"]);
        let Step::Loop(plan) = &outer.steps[1] else {
            panic!("expected a loop");
        };
        assert_eq!(plan.per_iteration, ["i"]);
        assert_eq!(kinds(&plan.test.as_ref().unwrap().prelude), ["await"]);
    }

    #[test]
    fn test_await_in_destructuring_default_is_unsupported() {
        let err = lower_body(&body_of("async function f() { const { a = await g() } = o }")).unwrap_err();
        assert_eq!(err, Unsupported("await inside a destructuring pattern"));
    }
}
