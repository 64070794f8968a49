//! Recursive descent parser for script source.
//!
//! Binary operators use precedence climbing; statements honour automatic
//! semicolon insertion at line breaks, before `}` and at end of input.

use super::ast::*;
use super::lexer::{Lexer, TemplateChunk, Token, TokenKind};
use crate::utils::error::ParseError;
use std::rc::Rc;

/// Words that can never be used as a binding or variable name
const RESERVED: &[&str] = &[
    "var", "let", "const", "function", "return", "if", "else", "while", "do", "for", "break",
    "continue", "new", "this", "class", "extends", "super", "try", "catch", "finally", "throw",
    "typeof", "void", "instanceof", "in", "true", "false", "null", "undefined", "async",
    "await", "yield", "switch", "case", "default", "delete",
];

pub fn is_reserved(word: &str) -> bool {
    RESERVED.contains(&word)
}

enum InfixOp {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

impl InfixOp {
    fn precedence(&self) -> u8 {
        match self {
            InfixOp::Binary(op) => op.precedence(),
            InfixOp::Logical(op) => op.precedence(),
        }
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// One entry per enclosing function body: whether it is async
    functions: Vec<bool>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            functions: Vec::new(),
        }
    }

    /// Parse a complete program
    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut body = Vec::new();
        while !self.at_eof() {
            body.push(self.parse_statement()?);
        }
        Ok(Program { body })
    }

    /// Parse a single expression that must span all remaining tokens
    pub fn parse_standalone_expression(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_expression()?;
        if !self.at_eof() {
            return Err(self.unexpected("end of expression"));
        }
        Ok(expr)
    }

    // ---------------------------------------------------------------
    // Token helpers
    // ---------------------------------------------------------------

    fn peek(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn peek_kind_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn check_punct(&self, punct: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Punct(p) if *p == punct)
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if self.check_punct(punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: &str) -> Result<(), ParseError> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", punct)))
        }
    }

    fn check_word(&self, word: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(w) if w == word)
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if self.check_word(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// A non-reserved identifier (binding or variable reference)
    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match &self.peek().kind {
            TokenKind::Ident(name) if !is_reserved(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    /// Any word, reserved or not (property names)
    fn expect_name(&mut self) -> Result<String, ParseError> {
        match &self.peek().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("property name")),
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let token = self.peek();
        ParseError::new(
            format!("Expected {} but found {}", expected, describe(&token.kind)),
            token.line,
            token.column,
        )
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        let token = self.peek();
        ParseError::new(message, token.line, token.column)
    }

    fn in_async(&self) -> bool {
        self.functions.last().copied().unwrap_or(false)
    }

    /// Run `parse` with a function body as the innermost scope
    fn function_body<T>(
        &mut self,
        is_async: bool,
        parse: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        self.functions.push(is_async);
        let result = parse(self);
        self.functions.pop();
        result
    }

    /// The next token could start a property key (after `get`, `set`, `async`)
    fn key_follows(&self) -> bool {
        matches!(
            self.peek_kind_at(1),
            Some(
                TokenKind::Ident(_)
                    | TokenKind::Str(_)
                    | TokenKind::Number(_)
                    | TokenKind::Punct("[")
            )
        )
    }

    fn consume_terminator(&mut self) -> Result<(), ParseError> {
        if self.eat_punct(";") {
            return Ok(());
        }
        let token = self.peek();
        if token.newline_before || self.check_punct("}") || self.at_eof() {
            return Ok(());
        }
        Err(self.unexpected("';'"))
    }

    // ---------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        if let TokenKind::Punct(p) = self.peek().kind {
            match p {
                "{" => return Ok(Stmt::Block(self.parse_block()?)),
                ";" => {
                    self.advance();
                    return Ok(Stmt::Empty);
                }
                _ => {}
            }
        }

        let word = match &self.peek().kind {
            TokenKind::Ident(w) => w.clone(),
            _ => return self.parse_expression_statement(),
        };

        match word.as_str() {
            "var" | "let" | "const" => {
                let kind = self.parse_var_kind()?;
                let decls = self.parse_declarators(kind)?;
                self.consume_terminator()?;
                Ok(Stmt::Var(kind, decls))
            }
            "function" => {
                self.advance();
                if self.check_punct("*") {
                    return Err(self.error_here("Generator functions are not supported"));
                }
                let name = self.expect_ident()?;
                let function = self.parse_function_rest(Some(name), false)?;
                Ok(Stmt::Function(Rc::new(function)))
            }
            "async"
                if matches!(self.peek_kind_at(1), Some(TokenKind::Ident(w)) if w == "function") =>
            {
                self.advance();
                self.advance();
                if self.check_punct("*") {
                    return Err(self.error_here("Async generator functions are not supported"));
                }
                let name = self.expect_ident()?;
                let function = self.parse_function_rest(Some(name), true)?;
                Ok(Stmt::Function(Rc::new(function)))
            }
            "class" => {
                self.advance();
                let class = self.parse_class_rest(true)?;
                Ok(Stmt::Class(Rc::new(class)))
            }
            "return" => {
                if self.functions.is_empty() {
                    return Err(self.error_here("Illegal return statement"));
                }
                self.advance();
                let value = if self.check_punct(";")
                    || self.check_punct("}")
                    || self.at_eof()
                    || self.peek().newline_before
                {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.consume_terminator()?;
                Ok(Stmt::Return(value))
            }
            "if" => {
                self.advance();
                self.expect_punct("(")?;
                let test = self.parse_expression()?;
                self.expect_punct(")")?;
                let consequent = Box::new(self.parse_statement()?);
                let alternate = if self.eat_word("else") {
                    Some(Box::new(self.parse_statement()?))
                } else {
                    None
                };
                Ok(Stmt::If {
                    test,
                    consequent,
                    alternate,
                })
            }
            "while" => {
                self.advance();
                self.expect_punct("(")?;
                let test = self.parse_expression()?;
                self.expect_punct(")")?;
                let body = Box::new(self.parse_statement()?);
                Ok(Stmt::While { test, body })
            }
            "do" => {
                self.advance();
                let body = Box::new(self.parse_statement()?);
                if !self.eat_word("while") {
                    return Err(self.unexpected("'while'"));
                }
                self.expect_punct("(")?;
                let test = self.parse_expression()?;
                self.expect_punct(")")?;
                self.eat_punct(";");
                Ok(Stmt::DoWhile { body, test })
            }
            "for" => self.parse_for(),
            "break" => {
                self.advance();
                self.consume_terminator()?;
                Ok(Stmt::Break)
            }
            "continue" => {
                self.advance();
                self.consume_terminator()?;
                Ok(Stmt::Continue)
            }
            "throw" => {
                self.advance();
                if self.peek().newline_before {
                    return Err(self.error_here("Illegal newline after throw"));
                }
                let value = self.parse_expression()?;
                self.consume_terminator()?;
                Ok(Stmt::Throw(value))
            }
            "try" => self.parse_try(),
            "switch" => Err(self.error_here("switch statements are not supported")),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_expression_statement(&mut self) -> Result<Stmt, ParseError> {
        let expr = self.parse_expression()?;
        self.consume_terminator()?;
        Ok(Stmt::Expr(expr))
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect_punct("{")?;
        let mut body = Vec::new();
        while !self.check_punct("}") {
            if self.at_eof() {
                return Err(self.unexpected("'}'"));
            }
            body.push(self.parse_statement()?);
        }
        self.advance();
        Ok(body)
    }

    fn parse_var_kind(&mut self) -> Result<VarKind, ParseError> {
        let kind = if self.eat_word("var") {
            VarKind::Var
        } else if self.eat_word("let") {
            VarKind::Let
        } else if self.eat_word("const") {
            VarKind::Const
        } else {
            return Err(self.unexpected("declaration"));
        };
        Ok(kind)
    }

    fn parse_declarators(&mut self, kind: VarKind) -> Result<Vec<VarDecl>, ParseError> {
        let mut decls = Vec::new();
        loop {
            let target = self.parse_binding_target()?;
            decls.push(self.parse_declarator_rest(kind, target)?);
            if !self.eat_punct(",") {
                break;
            }
        }
        Ok(decls)
    }

    /// Optional initializer after a declared target
    fn parse_declarator_rest(
        &mut self,
        kind: VarKind,
        target: Pattern,
    ) -> Result<VarDecl, ParseError> {
        let init = if self.eat_punct("=") {
            Some(self.parse_assignment()?)
        } else {
            None
        };
        if init.is_none() {
            match &target {
                Pattern::Ident(name) if kind == VarKind::Const => {
                    return Err(self.error_here(format!(
                        "Missing initializer in const declaration '{}'",
                        name
                    )));
                }
                Pattern::Ident(_) => {}
                _ => {
                    return Err(self.error_here("Missing initializer in destructuring declaration"))
                }
            }
        }
        Ok(VarDecl { target, init })
    }

    // ---------------------------------------------------------------
    // Binding patterns
    // ---------------------------------------------------------------

    fn parse_binding_target(&mut self) -> Result<Pattern, ParseError> {
        if self.check_punct("[") {
            self.parse_array_pattern()
        } else if self.check_punct("{") {
            self.parse_object_pattern()
        } else {
            Ok(Pattern::Ident(self.expect_ident()?))
        }
    }

    fn parse_binding_element(&mut self) -> Result<PatternElement, ParseError> {
        let target = self.parse_binding_target()?;
        let default = if self.eat_punct("=") {
            Some(self.parse_assignment()?)
        } else {
            None
        };
        Ok(PatternElement { target, default })
    }

    fn parse_array_pattern(&mut self) -> Result<Pattern, ParseError> {
        self.expect_punct("[")?;
        let mut elements = Vec::new();
        let mut rest = None;
        while !self.check_punct("]") {
            if self.eat_punct(",") {
                elements.push(None);
                continue;
            }
            if self.eat_punct("...") {
                rest = Some(Box::new(self.parse_binding_target()?));
                break;
            }
            elements.push(Some(self.parse_binding_element()?));
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct("]")?;
        Ok(Pattern::Array { elements, rest })
    }

    fn parse_object_pattern(&mut self) -> Result<Pattern, ParseError> {
        self.expect_punct("{")?;
        let mut props = Vec::new();
        let mut rest = None;
        while !self.check_punct("}") {
            if self.eat_punct("...") {
                rest = Some(self.expect_ident()?);
                break;
            }
            let (key, shorthand) = self.parse_property_key()?;
            let value = if self.eat_punct(":") {
                self.parse_binding_element()?
            } else {
                match shorthand {
                    Some(name) if !is_reserved(&name) => {
                        let default = if self.eat_punct("=") {
                            Some(self.parse_assignment()?)
                        } else {
                            None
                        };
                        PatternElement {
                            target: Pattern::Ident(name),
                            default,
                        }
                    }
                    _ => return Err(self.unexpected("':'")),
                }
            };
            props.push(PatternProp { key, value });
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct("}")?;
        Ok(Pattern::Object { props, rest })
    }

    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        self.advance();
        self.expect_punct("(")?;

        let mut init = None;
        if !self.check_punct(";") {
            if self.check_word("var") || self.check_word("let") || self.check_word("const") {
                let kind = self.parse_var_kind()?;
                let target = self.parse_binding_target()?;
                if self.eat_word("of") {
                    return self.parse_for_of_rest(Some(kind), target);
                }
                let mut decls = vec![self.parse_declarator_rest(kind, target)?];
                while self.eat_punct(",") {
                    let target = self.parse_binding_target()?;
                    decls.push(self.parse_declarator_rest(kind, target)?);
                }
                init = Some(ForInit::Var(kind, decls));
            } else if matches!(&self.peek().kind, TokenKind::Ident(w) if !is_reserved(w))
                && matches!(self.peek_kind_at(1), Some(TokenKind::Ident(w)) if w == "of")
            {
                let name = self.expect_ident()?;
                self.advance();
                return self.parse_for_of_rest(None, Pattern::Ident(name));
            } else {
                init = Some(ForInit::Expr(self.parse_expression()?));
            }
        }
        self.expect_punct(";")?;

        let test = if self.check_punct(";") {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_punct(";")?;

        let update = if self.check_punct(")") {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_punct(")")?;

        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::For {
            init,
            test,
            update,
            body,
        })
    }

    fn parse_for_of_rest(
        &mut self,
        binding: Option<VarKind>,
        target: Pattern,
    ) -> Result<Stmt, ParseError> {
        let iterable = self.parse_assignment()?;
        self.expect_punct(")")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::ForOf {
            binding,
            target,
            iterable,
            body,
        })
    }

    fn parse_try(&mut self) -> Result<Stmt, ParseError> {
        self.advance();
        let block = self.parse_block()?;

        let handler = if self.eat_word("catch") {
            let param = if self.eat_punct("(") {
                let target = self.parse_binding_target()?;
                self.expect_punct(")")?;
                Some(target)
            } else {
                None
            };
            let body = self.parse_block()?;
            Some(CatchClause { param, body })
        } else {
            None
        };

        let finalizer = if self.eat_word("finally") {
            Some(self.parse_block()?)
        } else {
            None
        };

        if handler.is_none() && finalizer.is_none() {
            return Err(self.unexpected("'catch' or 'finally'"));
        }

        Ok(Stmt::Try {
            block,
            handler,
            finalizer,
        })
    }

    // ---------------------------------------------------------------
    // Functions and classes
    // ---------------------------------------------------------------

    fn parse_params(&mut self) -> Result<Vec<Param>, ParseError> {
        self.expect_punct("(")?;
        let mut params = Vec::new();
        while !self.check_punct(")") {
            if self.eat_punct("...") {
                let target = self.parse_binding_target()?;
                params.push(Param {
                    target,
                    default: None,
                    rest: true,
                });
                if !self.check_punct(")") {
                    return Err(self.error_here("Rest parameter must be last formal parameter"));
                }
                break;
            }
            let PatternElement { target, default } = self.parse_binding_element()?;
            params.push(Param {
                target,
                default,
                rest: false,
            });
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok(params)
    }

    /// Parameters and body after `function name`
    fn parse_function_rest(
        &mut self,
        name: Option<String>,
        is_async: bool,
    ) -> Result<FunctionDef, ParseError> {
        let params = self.parse_params()?;
        let body = self.function_body(is_async, Self::parse_block)?;
        Ok(FunctionDef {
            name,
            params,
            body: FunctionBody::Block(body),
            is_arrow: false,
            is_async,
        })
    }

    /// Method body after its key, checking accessor arity
    fn parse_method(
        &mut self,
        name: Option<String>,
        kind: MethodKind,
        is_async: bool,
    ) -> Result<FunctionDef, ParseError> {
        let function = self.parse_function_rest(name, is_async)?;
        match kind {
            MethodKind::Getter if !function.params.is_empty() => {
                Err(self.error_here("Getter must not have any formal parameters"))
            }
            MethodKind::Setter
                if function.params.len() != 1 || function.params[0].rest =>
            {
                Err(self.error_here("Setter must have exactly one formal parameter"))
            }
            _ => Ok(function),
        }
    }

    /// `get` / `set` / `async` before a method key
    fn parse_method_modifiers(&mut self) -> (MethodKind, bool) {
        if self.check_word("async") && self.key_follows() {
            self.advance();
            return (MethodKind::Method, true);
        }
        let kind = if self.check_word("get") && self.key_follows() {
            MethodKind::Getter
        } else if self.check_word("set") && self.key_follows() {
            MethodKind::Setter
        } else {
            return (MethodKind::Method, false);
        };
        self.advance();
        (kind, false)
    }

    fn parse_class_rest(&mut self, require_name: bool) -> Result<ClassDef, ParseError> {
        let name = if require_name {
            Some(self.expect_ident()?)
        } else if matches!(&self.peek().kind, TokenKind::Ident(w) if !is_reserved(w)) {
            Some(self.expect_ident()?)
        } else {
            None
        };

        let parent = if self.eat_word("extends") {
            Some(self.parse_call_member()?)
        } else {
            None
        };

        self.expect_punct("{")?;
        let mut constructor = None;
        let mut methods = Vec::new();

        while !self.check_punct("}") {
            if self.at_eof() {
                return Err(self.unexpected("'}'"));
            }
            if self.eat_punct(";") {
                continue;
            }

            let is_static = self.check_word("static")
                && !matches!(self.peek_kind_at(1), Some(TokenKind::Punct("(")));
            if is_static {
                self.advance();
            }
            let (kind, is_async) = self.parse_method_modifiers();
            if is_static && kind != MethodKind::Method {
                return Err(self.error_here("Static accessors are not supported"));
            }

            let method_name = self.expect_name()?;
            if !self.check_punct("(") {
                return Err(self.error_here(format!(
                    "Class fields are not supported ('{}')",
                    method_name
                )));
            }
            let is_constructor = method_name == "constructor" && !is_static;
            if is_constructor && (is_async || kind != MethodKind::Method) {
                return Err(self.error_here("Class constructor may not be an accessor or async"));
            }
            let function = Rc::new(self.parse_method(Some(method_name.clone()), kind, is_async)?);

            if is_constructor {
                if constructor.is_some() {
                    return Err(self.error_here("A class may only have one constructor"));
                }
                constructor = Some(function);
            } else {
                methods.push(MethodDef {
                    name: method_name,
                    is_static,
                    kind,
                    function,
                });
            }
        }
        self.advance();

        Ok(ClassDef {
            name,
            parent,
            constructor,
            methods,
        })
    }

    /// Scan ahead from `(` to decide whether a parenthesized group is an
    /// arrow function parameter list.
    fn arrow_params_ahead(&self) -> bool {
        let mut depth = 0usize;
        let mut index = self.pos;
        while let Some(token) = self.tokens.get(index) {
            match &token.kind {
                TokenKind::Punct("(") => depth += 1,
                TokenKind::Punct(")") => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return matches!(
                            self.tokens.get(index + 1).map(|t| &t.kind),
                            Some(TokenKind::Punct("=>"))
                        );
                    }
                }
                TokenKind::Eof => return false,
                _ => {}
            }
            index += 1;
        }
        false
    }

    fn parse_arrow(&mut self, is_async: bool) -> Result<Expr, ParseError> {
        let params = if self.check_punct("(") {
            self.parse_params()?
        } else {
            vec![Param::named(self.expect_ident()?)]
        };
        self.expect_punct("=>")?;

        let body = self.function_body(is_async, |parser| {
            if parser.check_punct("{") {
                Ok(FunctionBody::Block(parser.parse_block()?))
            } else {
                Ok(FunctionBody::Expr(Box::new(parser.parse_assignment()?)))
            }
        })?;

        Ok(Expr::Function(Rc::new(FunctionDef {
            name: None,
            params,
            body,
            is_arrow: true,
            is_async,
        })))
    }

    // ---------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------

    /// Comma-separated expressions; a single one is returned as is
    fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        let first = self.parse_assignment()?;
        if !self.check_punct(",") {
            return Ok(first);
        }
        let mut exprs = vec![first];
        while self.eat_punct(",") {
            exprs.push(self.parse_assignment()?);
        }
        Ok(Expr::Sequence(exprs))
    }

    fn parse_assignment(&mut self) -> Result<Expr, ParseError> {
        match &self.peek().kind {
            TokenKind::Ident(w) if w == "async" => match self.peek_kind_at(1) {
                Some(TokenKind::Ident(next))
                    if !is_reserved(next)
                        && matches!(self.peek_kind_at(2), Some(TokenKind::Punct("=>"))) =>
                {
                    self.advance();
                    return self.parse_arrow(true);
                }
                Some(TokenKind::Punct("(")) => {
                    self.advance();
                    if !self.arrow_params_ahead() {
                        return Err(self.unexpected("arrow function after 'async'"));
                    }
                    return self.parse_arrow(true);
                }
                _ => {}
            },
            TokenKind::Ident(w)
                if !is_reserved(w)
                    && matches!(self.peek_kind_at(1), Some(TokenKind::Punct("=>"))) =>
            {
                return self.parse_arrow(false);
            }
            TokenKind::Punct("(") if self.arrow_params_ahead() => return self.parse_arrow(false),
            _ => {}
        }

        let target = self.parse_conditional()?;

        let op = match &self.peek().kind {
            TokenKind::Punct("=") => AssignOp::Assign,
            TokenKind::Punct("+=") => AssignOp::Add,
            TokenKind::Punct("-=") => AssignOp::Sub,
            TokenKind::Punct("*=") => AssignOp::Mul,
            TokenKind::Punct("/=") => AssignOp::Div,
            TokenKind::Punct("%=") => AssignOp::Rem,
            TokenKind::Punct("**=") => AssignOp::Pow,
            _ => return Ok(target),
        };

        if op == AssignOp::Assign && matches!(target, Expr::Array(_) | Expr::Object(_)) {
            let Some(pattern) = assignment_pattern(target) else {
                return Err(self.error_here("Invalid destructuring assignment target"));
            };
            self.advance();
            let value = self.parse_assignment()?;
            return Ok(Expr::Destructure {
                target: pattern,
                value: Box::new(value),
            });
        }

        if !is_assignable(&target) {
            return Err(self.error_here("Invalid assignment target"));
        }
        self.advance();
        let value = self.parse_assignment()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    fn parse_conditional(&mut self) -> Result<Expr, ParseError> {
        let test = self.parse_binary(1)?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let consequent = self.parse_assignment()?;
        self.expect_punct(":")?;
        let alternate = self.parse_assignment()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    fn peek_infix(&self) -> Option<InfixOp> {
        let op = match &self.peek().kind {
            TokenKind::Punct(p) => match *p {
                "+" => InfixOp::Binary(BinaryOp::Add),
                "-" => InfixOp::Binary(BinaryOp::Sub),
                "*" => InfixOp::Binary(BinaryOp::Mul),
                "/" => InfixOp::Binary(BinaryOp::Div),
                "%" => InfixOp::Binary(BinaryOp::Rem),
                "**" => InfixOp::Binary(BinaryOp::Pow),
                "==" => InfixOp::Binary(BinaryOp::Eq),
                "!=" => InfixOp::Binary(BinaryOp::NotEq),
                "===" => InfixOp::Binary(BinaryOp::StrictEq),
                "!==" => InfixOp::Binary(BinaryOp::StrictNotEq),
                "<" => InfixOp::Binary(BinaryOp::Lt),
                ">" => InfixOp::Binary(BinaryOp::Gt),
                "<=" => InfixOp::Binary(BinaryOp::LtEq),
                ">=" => InfixOp::Binary(BinaryOp::GtEq),
                "&&" => InfixOp::Logical(LogicalOp::And),
                "||" => InfixOp::Logical(LogicalOp::Or),
                "??" => InfixOp::Logical(LogicalOp::Nullish),
                _ => return None,
            },
            TokenKind::Ident(w) if w == "instanceof" => InfixOp::Binary(BinaryOp::InstanceOf),
            TokenKind::Ident(w) if w == "in" => InfixOp::Binary(BinaryOp::In),
            _ => return None,
        };
        Some(op)
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        while let Some(op) = self.peek_infix() {
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            self.advance();
            let next_min = match op {
                InfixOp::Binary(op) if op.is_right_associative() => prec,
                _ => prec + 1,
            };
            let right = self.parse_binary(next_min)?;
            left = match op {
                InfixOp::Binary(op) => Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                InfixOp::Logical(op) => Expr::Logical {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match &self.peek().kind {
            TokenKind::Punct("!") => Some(UnaryOp::Not),
            TokenKind::Punct("-") => Some(UnaryOp::Neg),
            TokenKind::Punct("+") => Some(UnaryOp::Plus),
            TokenKind::Ident(w) if w == "typeof" => Some(UnaryOp::TypeOf),
            TokenKind::Ident(w) if w == "void" => Some(UnaryOp::Void),
            TokenKind::Ident(w) if w == "await" => {
                if !self.in_async() {
                    return Err(self.error_here("await is only valid in async functions"));
                }
                self.advance();
                let arg = self.parse_unary()?;
                self.reject_exponent_after_unary()?;
                return Ok(Expr::Await(Box::new(arg)));
            }
            TokenKind::Ident(w) if w == "delete" => {
                return Err(self.error_here("delete is not supported"));
            }
            TokenKind::Punct(p @ ("++" | "--")) => {
                let op = if *p == "++" {
                    UpdateOp::Increment
                } else {
                    UpdateOp::Decrement
                };
                self.advance();
                let target = self.parse_unary()?;
                if !is_assignable(&target) {
                    return Err(self.error_here("Invalid update target"));
                }
                return Ok(Expr::Update {
                    op,
                    prefix: true,
                    target: Box::new(target),
                });
            }
            _ => None,
        };

        match op {
            Some(op) => {
                self.advance();
                let arg = self.parse_unary()?;
                self.reject_exponent_after_unary()?;
                Ok(Expr::Unary {
                    op,
                    arg: Box::new(arg),
                })
            }
            None => self.parse_postfix(),
        }
    }

    /// `-a ** b` is ambiguous and must be parenthesized
    fn reject_exponent_after_unary(&self) -> Result<(), ParseError> {
        if self.check_punct("**") {
            return Err(self.error_here(
                "Unary operator used immediately before exponentiation expression",
            ));
        }
        Ok(())
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_call_member()?;
        let op = match &self.peek().kind {
            TokenKind::Punct("++") => UpdateOp::Increment,
            TokenKind::Punct("--") => UpdateOp::Decrement,
            _ => return Ok(expr),
        };
        if self.peek().newline_before {
            return Ok(expr);
        }
        if !is_assignable(&expr) {
            return Err(self.error_here("Invalid update target"));
        }
        self.advance();
        Ok(Expr::Update {
            op,
            prefix: false,
            target: Box::new(expr),
        })
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect_punct("(")?;
        let mut args = Vec::new();
        while !self.check_punct(")") {
            args.push(self.parse_element()?);
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok(args)
    }

    /// Array element or call argument, possibly spread
    fn parse_element(&mut self) -> Result<Expr, ParseError> {
        if self.eat_punct("...") {
            return Ok(Expr::Spread(Box::new(self.parse_assignment()?)));
        }
        self.parse_assignment()
    }

    fn parse_call_member(&mut self) -> Result<Expr, ParseError> {
        let mut expr = if self.check_word("new") {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };

        loop {
            if self.eat_punct(".") {
                let property = self.expect_name()?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property,
                };
            } else if self.eat_punct("[") {
                let index = self.parse_expression()?;
                self.expect_punct("]")?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.check_punct("(") {
                let args = self.parse_arguments()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_new(&mut self) -> Result<Expr, ParseError> {
        self.advance();
        let mut callee = if self.check_word("new") {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };

        // Member accesses bind to the constructor reference, the first
        // argument list belongs to `new`.
        loop {
            if self.eat_punct(".") {
                let property = self.expect_name()?;
                callee = Expr::Member {
                    object: Box::new(callee),
                    property,
                };
            } else if self.eat_punct("[") {
                let index = self.parse_expression()?;
                self.expect_punct("]")?;
                callee = Expr::Index {
                    object: Box::new(callee),
                    index: Box::new(index),
                };
            } else {
                break;
            }
        }

        let args = if self.check_punct("(") {
            self.parse_arguments()?
        } else {
            Vec::new()
        };

        Ok(Expr::New {
            callee: Box::new(callee),
            args,
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Number(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            TokenKind::Regex { pattern, flags } => {
                self.advance();
                Ok(Expr::Regex { pattern, flags })
            }
            TokenKind::Template(chunks) => {
                self.advance();
                let mut parts = Vec::with_capacity(chunks.len());
                for chunk in chunks {
                    match chunk {
                        TemplateChunk::Text(text) => parts.push(TemplatePart::Text(text)),
                        TemplateChunk::Code {
                            source,
                            line,
                            column,
                        } => {
                            let tokens = Lexer::with_origin(&source, line, column).tokenize()?;
                            let mut inner = Parser::new(tokens);
                            inner.functions = self.functions.clone();
                            let expr = inner.parse_standalone_expression()?;
                            parts.push(TemplatePart::Expr(expr));
                        }
                    }
                }
                Ok(Expr::Template(parts))
            }
            TokenKind::Punct("(") => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            TokenKind::Punct("[") => {
                self.advance();
                let mut elements = Vec::new();
                while !self.check_punct("]") {
                    if self.check_punct(",") {
                        return Err(self.error_here("Array holes are not supported"));
                    }
                    elements.push(self.parse_element()?);
                    if !self.eat_punct(",") {
                        break;
                    }
                }
                self.expect_punct("]")?;
                Ok(Expr::Array(elements))
            }
            TokenKind::Punct("{") => self.parse_object_literal(),
            TokenKind::Ident(word) => match word.as_str() {
                "true" => {
                    self.advance();
                    Ok(Expr::Bool(true))
                }
                "false" => {
                    self.advance();
                    Ok(Expr::Bool(false))
                }
                "null" => {
                    self.advance();
                    Ok(Expr::Null)
                }
                "undefined" => {
                    self.advance();
                    Ok(Expr::Undefined)
                }
                "this" => {
                    self.advance();
                    Ok(Expr::This)
                }
                "function" => {
                    self.advance();
                    if self.check_punct("*") {
                        return Err(self.error_here("Generator functions are not supported"));
                    }
                    let name = if self.check_punct("(") {
                        None
                    } else {
                        Some(self.expect_ident()?)
                    };
                    Ok(Expr::Function(Rc::new(self.parse_function_rest(name, false)?)))
                }
                "async"
                    if matches!(self.peek_kind_at(1), Some(TokenKind::Ident(w)) if w == "function") =>
                {
                    self.advance();
                    self.advance();
                    if self.check_punct("*") {
                        return Err(self.error_here("Async generator functions are not supported"));
                    }
                    let name = if self.check_punct("(") {
                        None
                    } else {
                        Some(self.expect_ident()?)
                    };
                    Ok(Expr::Function(Rc::new(self.parse_function_rest(name, true)?)))
                }
                "class" => {
                    self.advance();
                    Ok(Expr::Class(Rc::new(self.parse_class_rest(false)?)))
                }
                "super" => {
                    self.advance();
                    if self.check_punct("(") {
                        Ok(Expr::SuperCall(self.parse_arguments()?))
                    } else if self.eat_punct(".") {
                        Ok(Expr::SuperMember(self.expect_name()?))
                    } else {
                        Err(self.unexpected("'(' or '.' after super"))
                    }
                }
                w if is_reserved(w) => Err(self.unexpected("expression")),
                _ => {
                    self.advance();
                    Ok(Expr::Ident(word.clone()))
                }
            },
            _ => Err(self.unexpected("expression")),
        }
    }

    /// Property key of an object literal or object pattern, plus the
    /// plain name when it could be shorthand
    fn parse_property_key(&mut self) -> Result<(PropKey, Option<String>), ParseError> {
        let token = self.advance();
        let key = match token.kind {
            TokenKind::Ident(name) => (PropKey::Named(name.clone()), Some(name)),
            TokenKind::Str(s) => (PropKey::Named(s), None),
            TokenKind::Number(n) => (PropKey::Named(number_key(n)), None),
            TokenKind::Punct("[") => {
                let expr = self.parse_assignment()?;
                self.expect_punct("]")?;
                (PropKey::Computed(expr), None)
            }
            other => {
                return Err(ParseError::new(
                    format!("Expected property name but found {}", describe(&other)),
                    token.line,
                    token.column,
                ))
            }
        };
        Ok(key)
    }

    fn parse_object_literal(&mut self) -> Result<Expr, ParseError> {
        self.expect_punct("{")?;
        let mut properties = Vec::new();

        while !self.check_punct("}") {
            if self.eat_punct("...") {
                properties.push(Property::spread(self.parse_assignment()?));
                if !self.eat_punct(",") {
                    break;
                }
                continue;
            }

            let (method_kind, is_async) = self.parse_method_modifiers();
            let (key, shorthand_name) = self.parse_property_key()?;
            let plain = method_kind == MethodKind::Method && !is_async;

            if plain && self.eat_punct(":") {
                let value = self.parse_assignment()?;
                properties.push(Property {
                    key,
                    value,
                    kind: PropKind::Init,
                });
            } else if self.check_punct("(") {
                let name = match &key {
                    PropKey::Named(n) => Some(n.clone()),
                    PropKey::Computed(_) => None,
                };
                let function = self.parse_method(name, method_kind, is_async)?;
                let kind = match method_kind {
                    MethodKind::Method => PropKind::Method,
                    MethodKind::Getter => PropKind::Getter,
                    MethodKind::Setter => PropKind::Setter,
                };
                properties.push(Property {
                    key,
                    value: Expr::Function(Rc::new(function)),
                    kind,
                });
            } else if !plain {
                return Err(self.unexpected("'('"));
            } else {
                match shorthand_name {
                    Some(name) if !is_reserved(&name) => properties.push(Property {
                        key,
                        value: Expr::Ident(name),
                        kind: PropKind::Init,
                    }),
                    _ => return Err(self.unexpected("':'")),
                }
            }

            if !self.eat_punct(",") {
                break;
            }
        }

        self.expect_punct("}")?;
        Ok(Expr::Object(properties))
    }
}

fn is_assignable(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Ident(_) | Expr::Member { .. } | Expr::Index { .. }
    )
}

/// Reinterpret an array or object literal on the left of `=` as a pattern
fn assignment_pattern(expr: Expr) -> Option<Pattern> {
    match expr {
        Expr::Ident(name) => Some(Pattern::Ident(name)),
        Expr::Member { .. } | Expr::Index { .. } => Some(Pattern::Expr(Box::new(expr))),
        Expr::Array(items) => {
            let count = items.len();
            let mut elements = Vec::with_capacity(count);
            let mut rest = None;
            for (i, item) in items.into_iter().enumerate() {
                match item {
                    Expr::Spread(inner) if i + 1 == count => {
                        rest = Some(Box::new(assignment_pattern(*inner)?));
                    }
                    Expr::Spread(_) => return None,
                    item => elements.push(Some(assignment_element(item)?)),
                }
            }
            Some(Pattern::Array { elements, rest })
        }
        Expr::Object(entries) => {
            let count = entries.len();
            let mut props = Vec::with_capacity(count);
            let mut rest = None;
            for (i, entry) in entries.into_iter().enumerate() {
                match entry.kind {
                    PropKind::Init => props.push(PatternProp {
                        key: entry.key,
                        value: assignment_element(entry.value)?,
                    }),
                    PropKind::Spread if i + 1 == count => match entry.value {
                        Expr::Ident(name) => rest = Some(name),
                        _ => return None,
                    },
                    _ => return None,
                }
            }
            Some(Pattern::Object { props, rest })
        }
        _ => None,
    }
}

fn assignment_element(expr: Expr) -> Option<PatternElement> {
    match expr {
        Expr::Assign {
            op: AssignOp::Assign,
            target,
            value,
        } => Some(PatternElement {
            target: assignment_pattern(*target)?,
            default: Some(*value),
        }),
        Expr::Destructure { target, value } => Some(PatternElement {
            target,
            default: Some(*value),
        }),
        other => Some(PatternElement {
            target: assignment_pattern(other)?,
            default: None,
        }),
    }
}

/// Canonical property key for a numeric literal key
pub fn number_key(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Number(n) => format!("number {}", n),
        TokenKind::Str(_) => "string literal".to_string(),
        TokenKind::Template(_) => "template literal".to_string(),
        TokenKind::Ident(w) => format!("'{}'", w),
        TokenKind::Punct(p) => format!("'{}'", p),
        TokenKind::Regex { .. } => "regular expression".to_string(),
        TokenKind::Eof => "end of input".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parse;

    #[test]
    fn test_precedence() {
        let program = parse("a + b * c").unwrap();
        let Stmt::Expr(Expr::Binary { op, right, .. }) = &program.body[0] else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(**right, Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn test_arrow_detection() {
        let program = parse("const f = (a, b = 2) => a + b\nconst g = x => { return x }").unwrap();
        assert_eq!(program.body.len(), 2);
        let Stmt::Var(_, decls) = &program.body[0] else {
            panic!("expected declaration");
        };
        let Some(Expr::Function(def)) = &decls[0].init else {
            panic!("expected arrow");
        };
        assert!(def.is_arrow);
        assert_eq!(def.params.len(), 2);
        assert!(def.params[1].default.is_some());
    }

    #[test]
    fn test_parenthesized_expression_is_not_arrow() {
        let program = parse("(a + b) * c").unwrap();
        assert!(matches!(
            &program.body[0],
            Stmt::Expr(Expr::Binary { op: BinaryOp::Mul, .. })
        ));
    }

    #[test]
    fn test_automatic_semicolons() {
        let program = parse("let a = 1\nlet b = 2\nf()\n(g)").unwrap();
        // `f()\n(g)` continues the call expression across the line break
        assert_eq!(program.body.len(), 3);
        let program = parse("function f() { return\n1 }").unwrap();
        let Stmt::Function(def) = &program.body[0] else {
            panic!("expected function");
        };
        let FunctionBody::Block(body) = &def.body else {
            panic!("expected block body");
        };
        assert_eq!(body[0], Stmt::Return(None));
    }

    #[test]
    fn test_missing_semicolon_on_same_line_is_error() {
        let err = parse("let a = 1 let b = 2").unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_class_with_extends() {
        let program = parse(
            "class B extends A { constructor(x) { super(x) } static make() { return new B(1) } run() { super.run() } }",
        )
        .unwrap();
        let Stmt::Class(class) = &program.body[0] else {
            panic!("expected class");
        };
        assert_eq!(class.name.as_deref(), Some("B"));
        assert!(class.parent.is_some());
        assert!(class.constructor.is_some());
        assert_eq!(class.methods.len(), 2);
        assert!(class.methods[0].is_static);
    }

    #[test]
    fn test_object_literal_forms() {
        let program = parse("x = { a: 1, b, 'c d': 2, 3: 4, [k]: 5, run() { return 1 } }").unwrap();
        let Stmt::Expr(Expr::Assign { value, .. }) = &program.body[0] else {
            panic!("expected assignment");
        };
        let Expr::Object(props) = &**value else {
            panic!("expected object");
        };
        assert_eq!(props.len(), 6);
        assert_eq!(props[3].key, PropKey::Named("3".into()));
        assert_eq!(props[5].kind, PropKind::Method);
    }

    #[test]
    fn test_member_names_may_be_keywords() {
        assert!(parse("p.then(f).catch(g).finally(h)").is_ok());
    }

    #[test]
    fn test_new_with_member_callee() {
        let program = parse("new a.B(1).run()").unwrap();
        let Stmt::Expr(Expr::Call { callee, .. }) = &program.body[0] else {
            panic!("expected call");
        };
        let Expr::Member { object, .. } = &**callee else {
            panic!("expected member");
        };
        assert!(matches!(**object, Expr::New { .. }));
    }

    #[test]
    fn test_async_forms() {
        let program = parse(
            "async function load() { return await fetch() }\nconst f = async x => await x\nconst g = async (a, b) => a\nconst o = { async run() { await 1 } }\nclass C { async go() {} static async make() {} }",
        )
        .unwrap();
        let Stmt::Function(load) = &program.body[0] else {
            panic!("expected function");
        };
        assert!(load.is_async);
        let FunctionBody::Block(body) = &load.body else {
            panic!("expected block body");
        };
        assert!(matches!(&body[0], Stmt::Return(Some(Expr::Await(_)))));
        let Stmt::Var(_, decls) = &program.body[1] else {
            panic!("expected declaration");
        };
        assert!(matches!(&decls[0].init, Some(Expr::Function(def)) if def.is_async && def.is_arrow));
        let Stmt::Class(class) = &program.body[4] else {
            panic!("expected class");
        };
        assert!(class.methods.iter().all(|m| m.function.is_async));
        assert!(class.methods[1].is_static);
    }

    #[test]
    fn test_await_outside_async_function_is_error() {
        let err = parse("function f() { await g() }").unwrap_err();
        assert!(err.message.contains("await is only valid"));
        assert!(parse("await g()").is_err());
        // Nested plain functions do not inherit the async context
        assert!(parse("async function f() { return () => await g() }").is_err());
        assert!(parse("async function f() { return `${await g()}` }").is_ok());
    }

    #[test]
    fn test_top_level_return_is_error() {
        let err = parse("let x = 1\nreturn x").unwrap_err();
        assert_eq!(err.message, "Illegal return statement");
        assert_eq!((err.line, err.column), (2, 1));
        assert!(parse("function f() { if (x) { return 1 } }").is_ok());
        assert!(parse("const f = () => { return 1 }").is_ok());
        assert!(parse("class A { run() { return 1 } }").is_ok());
    }

    #[test]
    fn test_destructuring_declarations_and_params() {
        let program =
            parse("const { a, b: [c, , d = 2], ...others } = src\nfunction f({ x }, [y], ...more) {}")
                .unwrap();
        let Stmt::Var(_, decls) = &program.body[0] else {
            panic!("expected declaration");
        };
        assert_eq!(decls[0].target.bound_names(), ["a", "c", "d", "others"]);
        let Stmt::Function(def) = &program.body[1] else {
            panic!("expected function");
        };
        assert_eq!(def.params.len(), 3);
        assert!(def.params[2].rest);
        assert!(parse("let [a, b]").is_err());
        assert!(parse("function f(...a, b) {}").is_err());
    }

    #[test]
    fn test_destructuring_assignment() {
        let program = parse("[a, b] = [b, a];\n({ x, y: o.y } = point)").unwrap();
        let Stmt::Expr(Expr::Destructure { target, .. }) = &program.body[0] else {
            panic!("expected destructuring assignment");
        };
        assert_eq!(target.bound_names(), ["a", "b"]);
        let Stmt::Expr(Expr::Destructure { target, .. }) = &program.body[1] else {
            panic!("expected destructuring assignment");
        };
        let Pattern::Object { props, .. } = target else {
            panic!("expected object pattern");
        };
        assert!(matches!(props[1].value.target, Pattern::Expr(_)));
        assert!(parse("[a + 1] = xs").is_err());
    }

    #[test]
    fn test_spread_sequence_and_exponent() {
        let program = parse("f(...xs, 1)\nx = [...a, ...b]\ny = (1, 2)\nz = 2 ** 3 ** 2").unwrap();
        assert!(matches!(&program.body[0], Stmt::Expr(Expr::Call { args, .. }) if matches!(args[0], Expr::Spread(_))));
        assert!(matches!(&program.body[2], Stmt::Expr(Expr::Assign { value, .. }) if matches!(**value, Expr::Sequence(_))));
        let Stmt::Expr(Expr::Assign { value, .. }) = &program.body[3] else {
            panic!("expected assignment");
        };
        let Expr::Binary { op, right, .. } = &**value else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::Pow);
        assert!(matches!(**right, Expr::Binary { op: BinaryOp::Pow, .. }));
        assert!(parse("-2 ** 2").is_err());
        assert!(parse("(-2) ** 2").is_ok());
    }

    #[test]
    fn test_accessors_and_regex_literals() {
        let program = parse(
            "o = { get size() { return 1 }, set size(v) {}, ...rest }\nclass A { get id() { return 1 } }\nr = /a+b/gi",
        )
        .unwrap();
        let Stmt::Expr(Expr::Assign { value, .. }) = &program.body[0] else {
            panic!("expected assignment");
        };
        let Expr::Object(props) = &**value else {
            panic!("expected object");
        };
        let kinds: Vec<PropKind> = props.iter().map(|p| p.kind).collect();
        assert_eq!(kinds, [PropKind::Getter, PropKind::Setter, PropKind::Spread]);
        let Stmt::Class(class) = &program.body[1] else {
            panic!("expected class");
        };
        assert_eq!(class.methods[0].kind, MethodKind::Getter);
        assert!(matches!(
            &program.body[2],
            Stmt::Expr(Expr::Assign { value, .. })
                if **value == Expr::Regex { pattern: "a+b".into(), flags: "gi".into() }
        ));
        assert!(parse("o = { get x(v) { } }").is_err());
        assert!(parse("o = { get: 1, set: 2 }").is_ok());
    }

    #[test]
    fn test_for_of_and_for() {
        assert!(parse("for (const x of xs) { log(x) }").is_ok());
        assert!(parse("for (let i = 0; i < 3; i++) {}").is_ok());
        assert!(parse("for (;;) { break }").is_ok());
        assert!(parse("for (const [k, v] of pairs) {}").is_ok());
        assert!(parse("for (let i = 0, j = 9; i < j; i++, j--) {}").is_ok());
    }
}
