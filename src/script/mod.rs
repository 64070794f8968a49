//! Script language front end.
//!
//! Lexing, parsing and printing for the JavaScript-like language that
//! traced programs are written in. The sandbox interpreter and the
//! instrumentor both work on the tree produced here.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod printer;

pub use ast::Program;
pub use printer::{print_expr, print_program};

use crate::utils::error::ParseError;

/// Parse complete program source
///
/// # Errors
/// Returns the first lexing or syntax error with its line and column
pub fn parse(source: &str) -> Result<Program, ParseError> {
    let tokens = lexer::tokenize(source)?;
    parser::Parser::new(tokens).parse_program()
}
