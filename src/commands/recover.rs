//! Recover command: rebuild a call tree from a saved console log.

use crate::output::{render_snapshot, write_document, TraceDocument};
use crate::reconstruct::{RunPhase, TraceSnapshot, TraceSource, TreeStats};
use crate::recover::recover_from_logs;
use anyhow::{Context, Result};
use log::{info, warn};
use std::path::{Path, PathBuf};

pub fn execute_recover(file: &Path, output: Option<PathBuf>) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read log {}", file.display()))?;
    let lines: Vec<String> = text.lines().map(str::to_string).collect();

    let root = recover_from_logs(&lines);
    if root.is_none() {
        warn!("No call structure found in {} lines", lines.len());
    }

    let snapshot = TraceSnapshot {
        run_id: None,
        phase: RunPhase::Finished,
        source: TraceSource::Logs,
        root,
        detached: Vec::new(),
        stats: TreeStats::default(),
    };
    println!("{}", render_snapshot(&snapshot));

    if let Some(path) = output {
        let document = TraceDocument::new(snapshot, lines);
        write_document(&document, &path).context("Failed to write trace JSON")?;
        info!("✓ Recovered trace written to: {}", path.display());
    }

    Ok(())
}
