use crate::output::read_document;
use crate::reconstruct::TraceSource;
use crate::utils::config::{PROTOCOL_VERSION, SCHEMA_VERSION};
use anyhow::{Context, Result};
use std::path::Path;

/// Validate a trace JSON file
pub fn validate_trace_file(file_path: &Path) -> Result<()> {
    println!("Validating trace: {}", file_path.display());

    let document = read_document(file_path)
        .with_context(|| format!("Invalid trace file {}", file_path.display()))?;
    let snapshot = &document.snapshot;

    println!("✓ Valid trace JSON");
    println!("  Version: {}", document.version);
    println!("  Run: {}", snapshot.run_id.as_deref().unwrap_or("-"));
    println!(
        "  Source: {}",
        match snapshot.source {
            TraceSource::Events => "events",
            TraceSource::Logs => "logs",
        }
    );
    println!("  Root: {}", snapshot.root.as_ref().map_or("-", |r| r.name.as_str()));
    println!("  Nodes: {}", snapshot.node_count());
    println!("  Detached subtrees: {}", snapshot.detached.len());
    println!("  Log lines: {}", document.logs.len());
    println!("  Trace annotations: {}", document.trace.len());

    Ok(())
}

/// Display schema information
pub fn display_schema(show_details: bool) {
    println!("Script Trace Studio Trace Schema");
    println!("Current Version: {}", SCHEMA_VERSION);
    println!("Wire Protocol: v{}", PROTOCOL_VERSION);
    println!();

    if show_details {
        println!("Schema Structure:");
        println!("  version: string            - Schema version (e.g., '1.0.0')");
        println!("  generatedAt: string        - ISO 8601 timestamp");
        println!("  snapshot: object");
        println!("    runId: string?           - Run identifier (absent for recovered logs)");
        println!("    phase: string            - empty | building | finished");
        println!("    source: string           - events | logs");
        println!("    root: node?              - Root of the call tree");
        println!("    detached: node[]         - Other parentless subtrees");
        println!("    stats: object            - Anomalies absorbed during reconstruction");
        println!("  logs: string[]             - Console output in arrival order");
        println!();
        println!("Node:");
        println!("  id: string                 - Unique per run");
        println!("  name: string               - Function name or 'anonymous'");
        println!("  kind: string               - function | call | callback");
        println!("  status: string             - running | completed");
        println!("  startTime: number          - Milliseconds since epoch");
        println!("  endTime: number?           - Present once completed");
        println!("  parentId: string?          - Absent on top-level nodes");
        println!("  children: node[]           - Ordered by start time");
    } else {
        println!("Use --show for detailed schema information");
    }
}

/// Display version information
pub fn display_version() {
    println!("Script Trace Studio v{}", env!("CARGO_PKG_VERSION"));
    println!("Trace Schema: v{}", SCHEMA_VERSION);
    println!();
    println!("Source instrumentation, sandboxed execution and call-tree reconstruction.");
}
