//! Run command implementation.
//!
//! The run command:
//! 1. Reads and instruments the program
//! 2. Executes it in the sandbox, streaming console output
//! 3. Waits for completion and the orphan sweep
//! 4. Prints the call tree and optionally writes it as JSON

use crate::output::{render_snapshot, write_document, TraceDocument};
use crate::session::{SessionConfig, TraceSession};
use crate::utils::config::PUMP_INTERVAL;
use anyhow::{Context, Result};
use log::{debug, info};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Arguments for the run command
///
/// **Public** - used by main.rs to construct from CLI args
#[derive(Debug, Clone)]
pub struct RunArgs {
    /// Program to execute
    pub file: PathBuf,

    /// Wall-clock budget in milliseconds
    pub timeout_ms: u64,

    /// Delay between the root's end and the orphan sweep
    pub grace_ms: u64,

    /// Preferred root name
    pub entry: String,

    /// Output path for the JSON trace (optional)
    pub output: Option<PathBuf>,

    /// Print the instrumented program before running it
    pub show_source: bool,

    /// Suppress program console output
    pub quiet: bool,

    /// Interleave event-trace annotations with console output
    pub annotate: bool,
}

/// Execute the run command
///
/// **Public** - main entry point called from main.rs
///
/// # Errors
/// * Unreadable program file
/// * Program does not parse (nothing is executed)
/// * Sandbox thread could not start
/// * JSON write errors
pub fn execute_run(args: RunArgs) -> Result<()> {
    let start_time = Instant::now();

    let source = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read program {}", args.file.display()))?;

    let config = SessionConfig::new()
        .with_timeout(Duration::from_millis(args.timeout_ms))
        .with_grace(Duration::from_millis(args.grace_ms))
        .with_entry_point(args.entry.clone());
    let mut session = TraceSession::new(config);

    let run_id = session
        .start_run(&source)
        .with_context(|| format!("Cannot run {}", args.file.display()))?;
    info!("Running {} as {}", args.file.display(), run_id);

    if args.show_source {
        if let Some(instrumented) = session.instrumented() {
            println!("{}", instrumented.source);
            println!("{}", "=".repeat(80));
        }
    }

    let mut printed = 0;
    loop {
        session.pump(PUMP_INTERVAL);
        let lines = if args.annotate {
            session.transcript()
        } else {
            session.log_lines()
        };
        if !args.quiet {
            for line in &lines[printed..] {
                println!("{}", line);
            }
        }
        printed = lines.len();
        if session.is_settled() {
            break;
        }
    }

    let snapshot = session.snapshot();
    debug!("Reconstruction stats: {:?}", snapshot.stats);

    println!();
    println!("{}", render_snapshot(&snapshot));

    if let Some(path) = &args.output {
        let document = TraceDocument::new(snapshot, session.log_lines().to_vec())
            .with_trace(session.trace_lines().to_vec());
        write_document(&document, path).context("Failed to write trace JSON")?;
        info!("✓ Trace written to: {}", path.display());
    }

    info!("Run completed in {:.2}s", start_time.elapsed().as_secs_f64());
    Ok(())
}

/// Validate run arguments
///
/// **Public** - can be called before execute_run for early validation
pub fn validate_args(args: &RunArgs) -> Result<()> {
    if !args.file.exists() {
        anyhow::bail!("Program file not found: {}", args.file.display());
    }

    if args.timeout_ms == 0 {
        anyhow::bail!("timeout must be greater than 0");
    }

    if args.timeout_ms > 10 * 60 * 1000 {
        anyhow::bail!("timeout is too large (max 10 minutes)");
    }

    if args.grace_ms > 60 * 1000 {
        anyhow::bail!("grace window is too large (max 60 seconds)");
    }

    if args.entry.trim().is_empty() {
        anyhow::bail!("entry point name cannot be empty");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(file: PathBuf) -> RunArgs {
        RunArgs {
            file,
            timeout_ms: 1000,
            grace_ms: 10,
            entry: "main".to_string(),
            output: None,
            show_source: false,
            quiet: true,
            annotate: false,
        }
    }

    #[test]
    fn test_validate_args() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(validate_args(&args(file.path().to_path_buf())).is_ok());

        let mut bad = args(file.path().to_path_buf());
        bad.timeout_ms = 0;
        assert!(validate_args(&bad).is_err());

        let mut bad = args(file.path().to_path_buf());
        bad.entry = "  ".to_string();
        assert!(validate_args(&bad).is_err());

        assert!(validate_args(&args(PathBuf::from("/definitely/not/here.js"))).is_err());
    }

    #[test]
    fn test_execute_run_writes_trace() {
        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("prog.js");
        std::fs::write(&program, "function main() { return 1; } main();").unwrap();
        let output = dir.path().join("out/trace.json");

        let mut run = args(program);
        run.output = Some(output.clone());
        execute_run(run).unwrap();

        let document = crate::output::read_document(&output).unwrap();
        assert_eq!(document.snapshot.root.unwrap().name, "main");
        assert_eq!(
            document.trace,
            vec!["[trace] start main#1 (function)", "[trace] end main#1 (function)"]
        );
    }
}
