//! Error types for the entire application.
//!
//! We use `thiserror` for library-style errors with custom types,
//! and `anyhow` for application-level error propagation in main.rs and commands.

use thiserror::Error;

/// A lexing or parsing failure in script source
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message} at line {line}, column {column}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

/// Errors that can occur while rewriting a program
#[derive(Error, Debug)]
pub enum InstrumentError {
    #[error("Failed to parse program: {0}")]
    Parse(#[from] ParseError),
}

/// Errors that can occur when starting a sandbox
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Failed to spawn sandbox thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Reasons a bus message is rejected. The session drops these silently.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected source tag: {0}")]
    WrongSource(String),

    #[error("Unsupported protocol version: {0}")]
    WrongVersion(u32),

    #[error("Message belongs to run {found}, current run is {expected}")]
    StaleRun { expected: String, found: String },

    #[error("Message of type '{0}' is missing its payload")]
    MissingPayload(&'static str),

    #[error("Unknown message type: {0}")]
    UnknownType(String),
}

/// Errors surfaced by a trace session to its caller
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Instrument(#[from] InstrumentError),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

/// Errors that can occur during file output
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to write file: {0}")]
    WriteFailed(#[from] std::io::Error),

    #[error("Failed to serialize JSON: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Invalid output path: {0}")]
    InvalidPath(String),
}
