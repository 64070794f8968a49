//! Deterministic source printer.
//!
//! Printing a parsed program and parsing the result again yields the same
//! tree. Parentheses are emitted only where precedence requires them.

use super::ast::*;
use super::lexer::{is_ident_continue, is_ident_start};

const INDENT: &str = "    ";

// Expression binding levels, loosest first
const PREC_SEQUENCE: u8 = 0;
const PREC_ASSIGN: u8 = 1;
const PREC_CONDITIONAL: u8 = 2;
const PREC_UNARY: u8 = 14;
const PREC_POSTFIX: u8 = 15;
const PREC_CALL: u8 = 17;
const PREC_MEMBER: u8 = 18;
const PREC_PRIMARY: u8 = 20;

/// Render a whole program as source text
pub fn print_program(program: &Program) -> String {
    let mut printer = Printer::default();
    let mut out = String::new();
    for stmt in &program.body {
        printer.statement(stmt, &mut out);
    }
    out
}

/// Render a single expression at top level
pub fn print_expr(expr: &Expr) -> String {
    Printer::default().expr(expr, 0)
}

#[derive(Default)]
struct Printer {
    indent: usize,
}

impl Printer {
    fn pad(&self) -> String {
        INDENT.repeat(self.indent)
    }

    fn statement(&mut self, stmt: &Stmt, out: &mut String) {
        out.push_str(&self.pad());
        let text = self.stmt_text(stmt);
        out.push_str(&text);
        out.push('\n');
    }

    fn block(&mut self, body: &[Stmt]) -> String {
        if body.is_empty() {
            return "{}".to_string();
        }
        let mut out = String::from("{\n");
        self.indent += 1;
        for stmt in body {
            self.statement(stmt, &mut out);
        }
        self.indent -= 1;
        out.push_str(&self.pad());
        out.push('}');
        out
    }

    /// Loop and branch bodies: braces stay on the header line
    fn nested(&mut self, stmt: &Stmt) -> String {
        match stmt {
            Stmt::Block(body) => format!(" {}", self.block(body)),
            other => {
                self.indent += 1;
                let text = format!("\n{}{}", self.pad(), self.stmt_text(other));
                self.indent -= 1;
                text
            }
        }
    }

    fn stmt_text(&mut self, stmt: &Stmt) -> String {
        match stmt {
            Stmt::Var(kind, decls) => format!("{};", self.declarations(*kind, decls)),
            Stmt::Function(def) => self.function(def, false),
            Stmt::Class(class) => self.class(class),
            Stmt::Return(None) => "return;".to_string(),
            Stmt::Return(Some(value)) => format!("return {};", self.expr(value, 0)),
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                let test = self.expr(test, 0);
                // Keep a nested else-less `if` from capturing our `else`
                let consequent = match (&**consequent, alternate) {
                    (Stmt::If { alternate: None, .. }, Some(_)) => {
                        self.nested(&Stmt::Block(vec![(**consequent).clone()]))
                    }
                    _ => self.nested(consequent),
                };
                let mut text = format!("if ({}){}", test, consequent);
                if let Some(alternate) = alternate {
                    if consequent_is_block(&text) {
                        text.push_str(" else");
                    } else {
                        text.push('\n');
                        text.push_str(&self.pad());
                        text.push_str("else");
                    }
                    match &**alternate {
                        Stmt::If { .. } => {
                            text.push(' ');
                            text.push_str(&self.stmt_text(alternate));
                        }
                        other => text.push_str(&self.nested(other)),
                    }
                }
                text
            }
            Stmt::While { test, body } => {
                format!("while ({}){}", self.expr(test, 0), self.nested(body))
            }
            Stmt::DoWhile { body, test } => {
                let body = self.nested(body);
                let separator = if body.ends_with('}') {
                    " ".to_string()
                } else {
                    format!("\n{}", self.pad())
                };
                format!("do{}{}while ({});", body, separator, self.expr(test, 0))
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                let init = match init {
                    None => String::new(),
                    Some(ForInit::Var(kind, decls)) => self.declarations(*kind, decls),
                    Some(ForInit::Expr(expr)) => self.expr(expr, 0),
                };
                let test = test
                    .as_ref()
                    .map(|t| format!(" {}", self.expr(t, 0)))
                    .unwrap_or_default();
                let update = update
                    .as_ref()
                    .map(|u| format!(" {}", self.expr(u, 0)))
                    .unwrap_or_default();
                format!(
                    "for ({};{};{}){}",
                    init,
                    test,
                    update,
                    self.nested(body)
                )
            }
            Stmt::ForOf {
                binding,
                target,
                iterable,
                body,
            } => {
                let binding = binding
                    .map(|kind| format!("{} ", kind.as_str()))
                    .unwrap_or_default();
                format!(
                    "for ({}{} of {}){}",
                    binding,
                    self.pattern(target),
                    self.expr(iterable, PREC_ASSIGN),
                    self.nested(body)
                )
            }
            Stmt::Break => "break;".to_string(),
            Stmt::Continue => "continue;".to_string(),
            Stmt::Block(body) => self.block(body),
            Stmt::Try {
                block,
                handler,
                finalizer,
            } => {
                let mut text = format!("try {}", self.block(block));
                if let Some(handler) = handler {
                    match &handler.param {
                        Some(param) => {
                            let param = self.pattern(param);
                            text.push_str(&format!(" catch ({}) ", param));
                        }
                        None => text.push_str(" catch "),
                    }
                    text.push_str(&self.block(&handler.body));
                }
                if let Some(finalizer) = finalizer {
                    text.push_str(" finally ");
                    text.push_str(&self.block(finalizer));
                }
                text
            }
            Stmt::Throw(value) => format!("throw {};", self.expr(value, 0)),
            Stmt::Expr(expr) => {
                let text = self.expr(expr, 0);
                if needs_statement_parens(&text) {
                    format!("({});", text)
                } else {
                    format!("{};", text)
                }
            }
            Stmt::Empty => ";".to_string(),
        }
    }

    fn declarations(&mut self, kind: VarKind, decls: &[VarDecl]) -> String {
        let parts: Vec<String> = decls
            .iter()
            .map(|decl| {
                let target = self.pattern(&decl.target);
                match &decl.init {
                    Some(init) => format!("{} = {}", target, self.expr(init, PREC_ASSIGN)),
                    None => target,
                }
            })
            .collect();
        format!("{} {}", kind.as_str(), parts.join(", "))
    }

    fn params(&mut self, params: &[Param]) -> String {
        let parts: Vec<String> = params
            .iter()
            .map(|param| {
                let target = self.pattern(&param.target);
                match (&param.default, param.rest) {
                    (_, true) => format!("...{}", target),
                    (Some(default), false) => {
                        format!("{} = {}", target, self.expr(default, PREC_ASSIGN))
                    }
                    (None, false) => target,
                }
            })
            .collect();
        parts.join(", ")
    }

    fn pattern(&mut self, pattern: &Pattern) -> String {
        match pattern {
            Pattern::Ident(name) => name.clone(),
            Pattern::Expr(target) => self.expr(target, PREC_CALL),
            Pattern::Array { elements, rest } => {
                let mut parts: Vec<String> = elements
                    .iter()
                    .map(|element| match element {
                        Some(element) => self.pattern_element(element),
                        None => String::new(),
                    })
                    .collect();
                match rest {
                    Some(rest) => parts.push(format!("...{}", self.pattern(rest))),
                    // A trailing hole needs its own comma
                    None if matches!(elements.last(), Some(None)) => parts.push(String::new()),
                    None => {}
                }
                format!("[{}]", parts.join(", "))
            }
            Pattern::Object { props, rest } => {
                let mut parts: Vec<String> = props
                    .iter()
                    .map(|prop| {
                        let shorthand = match (&prop.key, &prop.value.target) {
                            (PropKey::Named(key), Pattern::Ident(name)) => {
                                key == name && property_name(key) == *key
                            }
                            _ => false,
                        };
                        if shorthand {
                            return self.pattern_element(&prop.value);
                        }
                        let key = self.property_key(&prop.key);
                        format!("{}: {}", key, self.pattern_element(&prop.value))
                    })
                    .collect();
                if let Some(rest) = rest {
                    parts.push(format!("...{}", rest));
                }
                if parts.is_empty() {
                    "{}".to_string()
                } else {
                    format!("{{ {} }}", parts.join(", "))
                }
            }
        }
    }

    fn pattern_element(&mut self, element: &PatternElement) -> String {
        let target = self.pattern(&element.target);
        match &element.default {
            Some(default) => format!("{} = {}", target, self.expr(default, PREC_ASSIGN)),
            None => target,
        }
    }

    fn property_key(&mut self, key: &PropKey) -> String {
        match key {
            PropKey::Named(name) => property_name(name),
            PropKey::Computed(expr) => format!("[{}]", self.expr(expr, PREC_ASSIGN)),
        }
    }

    fn function(&mut self, def: &FunctionDef, method: bool) -> String {
        let params = self.params(&def.params);
        let prefix = if def.is_async { "async " } else { "" };
        if def.is_arrow {
            let body = match &def.body {
                FunctionBody::Block(body) => self.block(body),
                FunctionBody::Expr(expr) => {
                    let text = self.expr(expr, PREC_ASSIGN);
                    if text.starts_with('{') {
                        format!("({})", text)
                    } else {
                        text
                    }
                }
            };
            return format!("{}({}) => {}", prefix, params, body);
        }

        let body = match &def.body {
            FunctionBody::Block(body) => self.block(body),
            FunctionBody::Expr(expr) => {
                self.block(&[Stmt::Return(Some((**expr).clone()))])
            }
        };
        let name = def.name.as_deref().unwrap_or("");
        if method {
            format!("{}{}({}) {}", prefix, property_name(name), params, body)
        } else if name.is_empty() {
            format!("{}function ({}) {}", prefix, params, body)
        } else {
            format!("{}function {}({}) {}", prefix, name, params, body)
        }
    }

    /// Method shorthand under an already rendered key
    fn method(&mut self, kind: MethodKind, key: &str, def: &FunctionDef) -> String {
        let params = self.params(&def.params);
        let body = match &def.body {
            FunctionBody::Block(body) => self.block(body),
            FunctionBody::Expr(expr) => self.block(&[Stmt::Return(Some((**expr).clone()))]),
        };
        let prefix = if def.is_async { "async " } else { kind.prefix() };
        format!("{}{}({}) {}", prefix, key, params, body)
    }

    fn class(&mut self, class: &ClassDef) -> String {
        let mut header = String::from("class");
        if let Some(name) = &class.name {
            header.push(' ');
            header.push_str(name);
        }
        if let Some(parent) = &class.parent {
            header.push_str(" extends ");
            header.push_str(&self.expr(parent, PREC_CALL));
        }

        if class.constructor.is_none() && class.methods.is_empty() {
            return format!("{} {{}}", header);
        }

        let mut out = format!("{} {{\n", header);
        self.indent += 1;
        if let Some(constructor) = &class.constructor {
            out.push_str(&self.pad());
            out.push_str(&self.function(constructor, true));
            out.push('\n');
        }
        for method in &class.methods {
            out.push_str(&self.pad());
            if method.is_static {
                out.push_str("static ");
            }
            out.push_str(method.kind.prefix());
            let mut def = (*method.function).clone();
            def.name = Some(method.name.clone());
            out.push_str(&self.function(&def, true));
            out.push('\n');
        }
        self.indent -= 1;
        out.push_str(&self.pad());
        out.push('}');
        out
    }

    fn args(&mut self, args: &[Expr]) -> String {
        let parts: Vec<String> = args.iter().map(|a| self.expr(a, PREC_ASSIGN)).collect();
        parts.join(", ")
    }

    fn expr(&mut self, expr: &Expr, min_prec: u8) -> String {
        let prec = precedence(expr);
        let text = self.expr_inner(expr);
        if prec < min_prec {
            format!("({})", text)
        } else {
            text
        }
    }

    fn expr_inner(&mut self, expr: &Expr) -> String {
        match expr {
            Expr::Number(n) => format_number(*n),
            Expr::Str(s) => quote(s),
            Expr::Regex { pattern, flags } => format!("/{}/{}", pattern, flags),
            Expr::Template(parts) => {
                let mut out = String::from("`");
                for part in parts {
                    match part {
                        TemplatePart::Text(text) => out.push_str(&escape_template(text)),
                        TemplatePart::Expr(expr) => {
                            out.push_str("${");
                            out.push_str(&self.expr(expr, 0));
                            out.push('}');
                        }
                    }
                }
                out.push('`');
                out
            }
            Expr::Bool(b) => b.to_string(),
            Expr::Null => "null".to_string(),
            Expr::Undefined => "undefined".to_string(),
            Expr::Ident(name) => name.clone(),
            Expr::This => "this".to_string(),
            Expr::Array(elements) => format!("[{}]", self.args(elements)),
            Expr::Object(props) => {
                if props.is_empty() {
                    return "{}".to_string();
                }
                let parts: Vec<String> = props
                    .iter()
                    .map(|prop| {
                        if prop.kind == PropKind::Spread {
                            return format!("...{}", self.expr(&prop.value, PREC_ASSIGN));
                        }
                        let key = self.property_key(&prop.key);
                        let kind = match prop.kind {
                            PropKind::Getter => MethodKind::Getter,
                            PropKind::Setter => MethodKind::Setter,
                            _ => MethodKind::Method,
                        };
                        match (&prop.value, prop.kind) {
                            (Expr::Function(def), PropKind::Method | PropKind::Getter | PropKind::Setter)
                                if !def.is_arrow =>
                            {
                                self.method(kind, &key, def)
                            }
                            (value, _) => format!("{}: {}", key, self.expr(value, PREC_ASSIGN)),
                        }
                    })
                    .collect();
                format!("{{ {} }}", parts.join(", "))
            }
            Expr::Function(def) => self.function(def, false),
            Expr::Class(class) => self.class(class),
            Expr::Unary { op, arg } => {
                let arg_text = self.expr(arg, PREC_UNARY);
                let sign_clash = matches!(op, UnaryOp::Neg | UnaryOp::Plus)
                    && arg_text.starts_with(op.as_str());
                if sign_clash {
                    format!("{} {}", op.as_str(), arg_text)
                } else {
                    format!("{}{}", op.as_str(), arg_text)
                }
            }
            Expr::Update { op, prefix, target } => {
                if *prefix {
                    format!("{}{}", op.as_str(), self.expr(target, PREC_UNARY))
                } else {
                    format!("{}{}", self.expr(target, PREC_POSTFIX + 1), op.as_str())
                }
            }
            Expr::Binary { op, left, right } if op.is_right_associative() => {
                // A unary operand on the left must be parenthesized
                let prec = op.precedence();
                format!(
                    "{} {} {}",
                    self.expr(left, PREC_POSTFIX),
                    op.as_str(),
                    self.expr(right, prec)
                )
            }
            Expr::Binary { op, left, right } => {
                let prec = op.precedence();
                format!(
                    "{} {} {}",
                    self.expr(left, prec),
                    op.as_str(),
                    self.expr(right, prec + 1)
                )
            }
            Expr::Logical { op, left, right } => {
                let prec = op.precedence();
                format!(
                    "{} {} {}",
                    self.expr(left, prec),
                    op.as_str(),
                    self.expr(right, prec + 1)
                )
            }
            Expr::Assign { op, target, value } => format!(
                "{} {} {}",
                self.expr(target, PREC_CALL),
                op.as_str(),
                self.expr(value, PREC_ASSIGN)
            ),
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => format!(
                "{} ? {} : {}",
                self.expr(test, PREC_CONDITIONAL + 1),
                self.expr(consequent, PREC_ASSIGN),
                self.expr(alternate, PREC_ASSIGN)
            ),
            Expr::Call { callee, args } => {
                format!("{}({})", self.expr(callee, PREC_CALL), self.args(args))
            }
            Expr::New { callee, args } => {
                format!("new {}({})", self.expr(callee, PREC_MEMBER), self.args(args))
            }
            Expr::Member { object, property } => {
                format!("{}.{}", self.member_object(object), property)
            }
            Expr::Index { object, index } => {
                format!("{}[{}]", self.member_object(object), self.expr(index, 0))
            }
            Expr::SuperCall(args) => format!("super({})", self.args(args)),
            Expr::SuperMember(property) => format!("super.{}", property),
            Expr::Spread(arg) => format!("...{}", self.expr(arg, PREC_ASSIGN)),
            Expr::Await(arg) => format!("await {}", self.expr(arg, PREC_UNARY)),
            Expr::Sequence(exprs) => {
                let parts: Vec<String> = exprs.iter().map(|e| self.expr(e, PREC_ASSIGN)).collect();
                parts.join(", ")
            }
            Expr::Destructure { target, value } => {
                format!("{} = {}", self.pattern(target), self.expr(value, PREC_ASSIGN))
            }
        }
    }

    fn member_object(&mut self, object: &Expr) -> String {
        if let Expr::Number(_) = object {
            return format!("({})", self.expr_inner(object));
        }
        self.expr(object, PREC_CALL)
    }
}

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Sequence(_) => PREC_SEQUENCE,
        Expr::Function(def) if def.is_arrow => PREC_ASSIGN,
        Expr::Assign { .. } | Expr::Destructure { .. } | Expr::Spread(_) => PREC_ASSIGN,
        Expr::Await(_) => PREC_UNARY,
        Expr::Conditional { .. } => PREC_CONDITIONAL,
        Expr::Logical { op, .. } => op.precedence(),
        Expr::Binary { op, .. } => op.precedence(),
        Expr::Unary { .. } => PREC_UNARY,
        Expr::Update { prefix: true, .. } => PREC_UNARY,
        Expr::Update { prefix: false, .. } => PREC_POSTFIX,
        Expr::Call { .. } | Expr::New { .. } | Expr::SuperCall(_) => PREC_CALL,
        Expr::Member { .. } | Expr::Index { .. } | Expr::SuperMember(_) => PREC_MEMBER,
        _ => PREC_PRIMARY,
    }
}

/// Statement text that the parser would read as a declaration or block,
/// or whose leading `/` could lex as division after the previous token
fn needs_statement_parens(text: &str) -> bool {
    if text.starts_with('{') || text.starts_with('/') {
        return true;
    }
    ["function", "class", "async function"].iter().any(|word| {
        text.strip_prefix(word)
            .is_some_and(|rest| !rest.starts_with(is_ident_continue))
    })
}

fn consequent_is_block(text: &str) -> bool {
    text.ends_with('}')
}

pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == n.trunc() && n.abs() < 1e21 {
        format!("{}", n as i128)
    } else {
        format!("{}", n)
    }
}

fn property_name(name: &str) -> String {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(is_ident_start) && chars.all(is_ident_continue);
    if valid {
        name.to_string()
    } else if name.parse::<f64>().is_ok_and(|n| format_number(n) == name) && !name.starts_with('-')
    {
        name.to_string()
    } else {
        quote(name)
    }
}

fn escape_char(ch: char, out: &mut String) {
    match ch {
        '\\' => out.push_str("\\\\"),
        '\n' => out.push_str("\\n"),
        '\r' => out.push_str("\\r"),
        '\t' => out.push_str("\\t"),
        c if (c as u32) < 0x20 || c == '\u{7f}' => {
            out.push_str(&format!("\\u{:04x}", c as u32));
        }
        c => out.push(c),
    }
}

/// Double-quoted string literal
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        if ch == '"' {
            out.push_str("\\\"");
        } else {
            escape_char(ch, &mut out);
        }
    }
    out.push('"');
    out
}

fn escape_template(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '`' => out.push_str("\\`"),
            '$' if chars.peek() == Some(&'{') => out.push_str("\\$"),
            c => escape_char(c, &mut out),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parse;
    use pretty_assertions::assert_eq;

    fn round_trip(source: &str) -> String {
        let program = parse(source).unwrap();
        let printed = print_program(&program);
        let reparsed = parse(&printed).unwrap_or_else(|e| panic!("{}\n{}", e, printed));
        assert_eq!(program, reparsed, "printed:\n{}", printed);
        printed
    }

    #[test]
    fn test_prints_function_declaration() {
        let printed = round_trip("function add(a, b) { return a + b }");
        assert_eq!(printed, "function add(a, b) {\n    return a + b;\n}\n");
    }

    #[test]
    fn test_parenthesizes_by_precedence() {
        let printed = round_trip("x = (a + b) * c - (d - e)");
        assert_eq!(printed, "x = (a + b) * c - (d - e);\n");
    }

    #[test]
    fn test_statement_level_function_expression() {
        let printed = round_trip("(function () { run() })()");
        assert!(printed.starts_with("(function () {"));
    }

    #[test]
    fn test_arrow_returning_object() {
        let printed = round_trip("const f = () => ({ a: 1 })");
        assert_eq!(printed, "const f = () => ({ a: 1 });\n");
    }

    #[test]
    fn test_strings_and_templates() {
        round_trip(r#"log("a\"b\n", 'c', `x ${y + 1} \${z} \`q\``)"#);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(round_trip("(1).toString()"), "(1).toString();\n");
    }

    #[test]
    fn test_classes_and_control_flow() {
        round_trip(
            r#"
            class A extends B {
                constructor(x) { super(x); this.x = x }
                static make() { return new A(1) }
                run() { for (let i = 0; i < 3; i++) { if (i % 2) continue; else log(i) } }
            }
            try { a() } catch (e) { b(e) } finally { c() }
            do x++; while (x < 10)
            for (const v of [1, 2]) log(v)
            if (a) if (b) c(); else d()
            "#,
        );
    }

    #[test]
    fn test_async_functions_and_await() {
        let printed = round_trip(
            "async function main() { const v = await load(); return (await v) + 1 }\nconst f = async x => await x\nclass A { async run() {} static async make() {} }\no = { async go() { await -1 } }",
        );
        assert!(printed.starts_with("async function main() {\n    const v = await load();"));
        assert!(printed.contains("return await v + 1;"));
        assert!(printed.contains("const f = async (x) => await x;"));
        round_trip("(async function () {})()");
    }

    #[test]
    fn test_destructuring_rest_and_spread() {
        let printed = round_trip(
            "const { a, b: [c, , d = 2], ...others } = src;\nfunction f({ x = 1 }, ...more) { return g(...more, ...[x]) }\n[p, q] = [q, p];\n({ p, o: obj.field } = src)\nfor (const [k, v] of pairs) log(k, v)\ntry {} catch ({ message }) {}\nlet [e, , ] = y",
        );
        assert!(printed.contains("const { a, b: [c, , d = 2], ...others } = src;"));
        assert!(printed.contains("[p, q] = [q, p];"));
        assert!(printed.contains("({ p, o: obj.field } = src);"));
        assert!(printed.contains("let [e, , ] = y;"));
    }

    #[test]
    fn test_exponent_sequence_regex_and_accessors() {
        let printed = round_trip("x = (-2) ** (a ** b) ** c\ny = (a, b)\nf((1, 2))");
        assert!(printed.starts_with("x = (-2) ** (a ** b) ** c;\n"));
        assert!(printed.contains("y = (a, b);"));
        assert!(printed.contains("f((1, 2));"));

        let printed = round_trip("if (x) { /ab+c/gi.test(s) }\nr = s.replace(/[/]/g, '-')");
        assert!(printed.contains("(/ab+c/gi.test(s));"));
        assert!(printed.contains(r#"r = s.replace(/[/]/g, "-");"#));

        round_trip("o = { get size() { return 1 }, set size(v) {}, ...base }\nclass A { get id() { return 1 } set id(v) {} }");
    }

    #[test]
    fn test_unary_sign_spacing() {
        let printed = round_trip("x = - -y");
        assert_eq!(printed, "x = - -y;\n");
    }
}
