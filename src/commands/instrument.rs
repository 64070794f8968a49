//! Instrument command: print or save the rewritten program without running it.

use crate::instrument::instrument;
use anyhow::{Context, Result};
use log::info;
use std::path::{Path, PathBuf};

pub fn execute_instrument(file: &Path, output: Option<PathBuf>) -> Result<()> {
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read program {}", file.display()))?;

    let instrumented =
        instrument(&source).with_context(|| format!("Cannot instrument {}", file.display()))?;

    match output {
        Some(path) => {
            std::fs::write(&path, &instrumented.source)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(
                "✓ Instrumented program written to: {} ({} functions, {} scheduling sites)",
                path.display(),
                instrumented.functions,
                instrumented.schedulers
            );
        }
        None => println!("{}", instrumented.source),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instrument_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("prog.js");
        std::fs::write(&program, "function f() { return 1; }").unwrap();
        let out = dir.path().join("out.js");

        execute_instrument(&program, Some(out.clone())).unwrap();

        let written = std::fs::read_to_string(out).unwrap();
        assert!(written.contains("__trace.enter(\"f\", \"function\")"));
    }

    #[test]
    fn test_parse_error_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("bad.js");
        std::fs::write(&program, ")))").unwrap();

        let err = execute_instrument(&program, None).unwrap_err();
        assert!(format!("{:#}", err).contains("Cannot instrument"));
    }
}
