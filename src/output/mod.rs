//! Output writers for reconstructed traces.
//!
//! - JSON trace documents (snapshot + logs)
//! - Indented text trees for the terminal

pub mod json;
pub mod text;

pub use json::{document_to_string, read_document, write_document, TraceDocument};
pub use text::render_snapshot;
