//! Tokenizer for script source.
//!
//! Keywords are lexed as identifiers; the parser decides where a word is
//! reserved. This keeps member names like `.catch` and `.finally` legal.

use crate::utils::error::ParseError;

/// One raw piece of a template literal
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateChunk {
    /// Cooked text between interpolations
    Text(String),
    /// Source of a `${...}` interpolation and where it starts
    Code {
        source: String,
        line: usize,
        column: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Str(String),
    Template(Vec<TemplateChunk>),
    Ident(String),
    Punct(&'static str),
    /// Body and flags of a `/.../flags` literal, body kept as written
    Regex {
        pattern: String,
        flags: String,
    },
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
    /// A line break separates this token from the previous one
    pub newline_before: bool,
}

// Longest match first.
const PUNCTUATORS: &[&str] = &[
    "===", "!==", "**=", "...", "=>", "==", "!=", "<=", ">=", "&&", "||", "??", "++", "--",
    "**", "+=", "-=", "*=", "/=", "%=", "{", "}", "(", ")", "[", "]", ";", ",", "<", ">", "+",
    "-", "*", "/", "%", "!", "=", "?", ":", ".",
];

/// Words after which a `/` opens a regular expression rather than dividing
const REGEX_AFTER_WORDS: &[&str] = &[
    "return", "typeof", "case", "do", "else", "in", "instanceof", "new", "delete", "void",
    "throw", "await", "yield",
];

const REGEX_FLAGS: &str = "dgimsuy";

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    saw_newline: bool,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self::with_origin(source, 1, 1)
    }

    /// Lexer whose positions start at `line`/`column` (template interpolations)
    pub fn with_origin(source: &str, line: usize, column: usize) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line,
            column,
            saw_newline: false,
        }
    }

    /// Tokenize the whole input, always ending with `Eof`
    pub fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let line = self.line;
            let column = self.column;
            let newline_before = std::mem::take(&mut self.saw_newline);

            let Some(ch) = self.current() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    line,
                    column,
                    newline_before: true,
                });
                return Ok(tokens);
            };

            let kind = if ch.is_ascii_digit()
                || (ch == '.' && self.peek(1).is_some_and(|c| c.is_ascii_digit()))
            {
                self.read_number()?
            } else if ch == '"' || ch == '\'' {
                TokenKind::Str(self.read_string(ch)?)
            } else if ch == '`' {
                self.read_template()?
            } else if is_ident_start(ch) {
                TokenKind::Ident(self.read_identifier())
            } else if ch == '/' && regex_allowed(tokens.last()) {
                self.read_regex()?
            } else {
                self.read_punct()?
            };

            tokens.push(Token {
                kind,
                line,
                column,
                newline_before,
            });
        }
    }

    fn current(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.line, self.column)
    }

    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        while let Some(ch) = self.current() {
            match ch {
                '\n' => {
                    self.saw_newline = true;
                    self.advance();
                }
                c if c.is_whitespace() => {
                    self.advance();
                }
                '/' if self.peek(1) == Some('/') => {
                    while let Some(c) = self.current() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                '/' if self.peek(1) == Some('*') => {
                    self.advance();
                    self.advance();
                    loop {
                        match self.current() {
                            None => return Err(self.error("Unterminated block comment")),
                            Some('*') if self.peek(1) == Some('/') => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            Some('\n') => {
                                self.saw_newline = true;
                                self.advance();
                            }
                            Some(_) => {
                                self.advance();
                            }
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn read_number(&mut self) -> Result<TokenKind, ParseError> {
        let mut text = String::new();
        let mut seen_dot = false;
        let mut seen_exp = false;

        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() || ch == '_' {
                if ch != '_' {
                    text.push(ch);
                }
            } else if ch == '.' && !seen_dot && !seen_exp {
                seen_dot = true;
                text.push(ch);
            } else if (ch == 'e' || ch == 'E') && !seen_exp {
                seen_exp = true;
                text.push(ch);
                if let Some(sign @ ('+' | '-')) = self.peek(1) {
                    self.advance();
                    text.push(sign);
                }
            } else {
                break;
            }
            self.advance();
        }

        if self.current().is_some_and(is_ident_start) {
            return Err(self.error("Identifier starts immediately after numeric literal"));
        }

        text.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| self.error(format!("Invalid number literal '{}'", text)))
    }

    fn read_escape(&mut self) -> Result<char, ParseError> {
        let Some(ch) = self.advance() else {
            return Err(self.error("Unterminated escape sequence"));
        };
        Ok(match ch {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'v' => '\u{b}',
            'u' => {
                let mut code = String::new();
                for _ in 0..4 {
                    match self.advance() {
                        Some(c) if c.is_ascii_hexdigit() => code.push(c),
                        _ => return Err(self.error("Invalid unicode escape")),
                    }
                }
                u32::from_str_radix(&code, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| self.error("Invalid unicode escape"))?
            }
            other => other,
        })
    }

    fn read_string(&mut self, quote: char) -> Result<String, ParseError> {
        self.advance();
        let mut value = String::new();
        loop {
            match self.current() {
                None | Some('\n') => return Err(self.error("Unterminated string literal")),
                Some(c) if c == quote => {
                    self.advance();
                    return Ok(value);
                }
                Some('\\') => {
                    self.advance();
                    // Line continuation
                    if self.current() == Some('\n') {
                        self.advance();
                        continue;
                    }
                    value.push(self.read_escape()?);
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }
    }

    fn read_template(&mut self) -> Result<TokenKind, ParseError> {
        self.advance();
        let mut chunks = Vec::new();
        let mut text = String::new();

        loop {
            match self.current() {
                None => return Err(self.error("Unterminated template literal")),
                Some('`') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    text.push(self.read_escape()?);
                }
                Some('$') if self.peek(1) == Some('{') => {
                    self.advance();
                    self.advance();
                    if !text.is_empty() {
                        chunks.push(TemplateChunk::Text(std::mem::take(&mut text)));
                    }
                    let (line, column) = (self.line, self.column);
                    let source = self.read_interpolation()?;
                    chunks.push(TemplateChunk::Code {
                        source,
                        line,
                        column,
                    });
                }
                Some(c) => {
                    text.push(c);
                    self.advance();
                }
            }
        }

        if !text.is_empty() || chunks.is_empty() {
            chunks.push(TemplateChunk::Text(text));
        }
        Ok(TokenKind::Template(chunks))
    }

    /// Collect the raw source of `${ ... }` up to the matching brace
    fn read_interpolation(&mut self) -> Result<String, ParseError> {
        let mut depth = 0usize;
        let mut source = String::new();
        loop {
            let Some(ch) = self.current() else {
                return Err(self.error("Unterminated template interpolation"));
            };
            match ch {
                '{' => depth += 1,
                '}' if depth == 0 => {
                    self.advance();
                    return Ok(source);
                }
                '}' => depth -= 1,
                '"' | '\'' | '`' => {
                    // Copy nested literals verbatim so braces inside them don't count
                    source.push(ch);
                    self.advance();
                    while let Some(inner) = self.current() {
                        source.push(inner);
                        self.advance();
                        if inner == '\\' {
                            if let Some(escaped) = self.advance() {
                                source.push(escaped);
                            }
                        } else if inner == ch {
                            break;
                        }
                    }
                    continue;
                }
                _ => {}
            }
            source.push(ch);
            self.advance();
        }
    }

    fn read_regex(&mut self) -> Result<TokenKind, ParseError> {
        self.advance();
        let mut pattern = String::new();
        let mut in_class = false;
        loop {
            match self.current() {
                None | Some('\n') => return Err(self.error("Unterminated regular expression")),
                Some('\\') => {
                    pattern.push('\\');
                    self.advance();
                    match self.current() {
                        None | Some('\n') => {
                            return Err(self.error("Unterminated regular expression"))
                        }
                        Some(escaped) => {
                            pattern.push(escaped);
                            self.advance();
                        }
                    }
                }
                Some('/') if !in_class => {
                    self.advance();
                    break;
                }
                Some(c) => {
                    match c {
                        '[' => in_class = true,
                        ']' => in_class = false,
                        _ => {}
                    }
                    pattern.push(c);
                    self.advance();
                }
            }
        }

        let flags = self.read_identifier();
        let mut seen = String::new();
        for flag in flags.chars() {
            if !REGEX_FLAGS.contains(flag) || seen.contains(flag) {
                return Err(self.error(format!(
                    "Invalid regular expression flags '{}'",
                    flags
                )));
            }
            seen.push(flag);
        }
        Ok(TokenKind::Regex { pattern, flags })
    }

    fn read_identifier(&mut self) -> String {
        let mut name = String::new();
        while let Some(ch) = self.current() {
            if is_ident_continue(ch) {
                name.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        name
    }

    fn read_punct(&mut self) -> Result<TokenKind, ParseError> {
        for punct in PUNCTUATORS {
            let matches = punct
                .chars()
                .enumerate()
                .all(|(i, c)| self.peek(i) == Some(c));
            if matches {
                for _ in 0..punct.chars().count() {
                    self.advance();
                }
                return Ok(TokenKind::Punct(punct));
            }
        }
        let ch = self.current().unwrap_or('\0');
        Err(self.error(format!("Unexpected character '{}'", ch)))
    }
}

/// A `/` after an operand divides; anywhere else it starts a regex
fn regex_allowed(previous: Option<&Token>) -> bool {
    match previous.map(|t| &t.kind) {
        None => true,
        Some(TokenKind::Punct(p)) => !matches!(*p, ")" | "]" | "}" | "++" | "--"),
        Some(TokenKind::Ident(word)) => REGEX_AFTER_WORDS.contains(&word.as_str()),
        Some(_) => false,
    }
}

pub fn is_ident_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || ch == '$'
}

pub fn is_ident_continue(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$'
}

/// Tokenize a complete source text
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_punctuators_longest_match() {
        assert_eq!(
            kinds("a === b => c"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Punct("==="),
                TokenKind::Ident("b".into()),
                TokenKind::Punct("=>"),
                TokenKind::Ident("c".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#"'a\n\'b' "A""#),
            vec![
                TokenKind::Str("a\n'b".into()),
                TokenKind::Str("A".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_template_chunks() {
        let tokens = kinds("`x ${a + {b: 1}.b} y`");
        let TokenKind::Template(chunks) = &tokens[0] else {
            panic!("expected template");
        };
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], TemplateChunk::Text("x ".into()));
        assert!(matches!(&chunks[1], TemplateChunk::Code { source, .. } if source == "a + {b: 1}.b"));
        assert_eq!(chunks[2], TemplateChunk::Text(" y".into()));
    }

    #[test]
    fn test_newline_flag_and_comments() {
        let tokens = tokenize("a // note\n/* block\n */ b").unwrap();
        assert!(!tokens[0].newline_before);
        assert!(tokens[1].newline_before);
        assert_eq!(tokens[1].line, 3);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("1 2.5 .5 1e3 1_000"),
            vec![
                TokenKind::Number(1.0),
                TokenKind::Number(2.5),
                TokenKind::Number(0.5),
                TokenKind::Number(1000.0),
                TokenKind::Number(1000.0),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_regex_or_division_by_context() {
        assert_eq!(
            kinds("x = a / b / 2"),
            vec![
                TokenKind::Ident("x".into()),
                TokenKind::Punct("="),
                TokenKind::Ident("a".into()),
                TokenKind::Punct("/"),
                TokenKind::Ident("b".into()),
                TokenKind::Punct("/"),
                TokenKind::Number(2.0),
                TokenKind::Eof,
            ]
        );
        assert_eq!(
            kinds(r"s.split(/[/,]\s*/g)")[4],
            TokenKind::Regex {
                pattern: r"[/,]\s*".into(),
                flags: "g".into()
            }
        );
        assert!(matches!(kinds("return /x/")[1], TokenKind::Regex { .. }));
    }

    #[test]
    fn test_bad_regex_literals() {
        assert!(tokenize("x = /abc\n/").unwrap_err().message.contains("Unterminated"));
        assert!(tokenize("x = /abc/q").unwrap_err().message.contains("flags"));
    }

    #[test]
    fn test_spread_and_exponent_punctuators() {
        assert_eq!(
            kinds("...a ** b **= c"),
            vec![
                TokenKind::Punct("..."),
                TokenKind::Ident("a".into()),
                TokenKind::Punct("**"),
                TokenKind::Ident("b".into()),
                TokenKind::Punct("**="),
                TokenKind::Ident("c".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unterminated_string_is_error() {
        let err = tokenize("'abc").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("Unterminated"));
    }
}
