//! JSON trace document writer.
//!
//! Writes a snapshot, wrapped with schema version, timestamp and the run's
//! console output, to a pretty-printed JSON file.

use crate::reconstruct::TraceSnapshot;
use crate::utils::config::SCHEMA_VERSION;
use crate::utils::error::OutputError;
use chrono::Utc;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// On-disk form of one reconstructed run
///
/// **Public** - written by `run` / `recover`, read back by `validate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceDocument {
    pub version: String,

    /// ISO 8601 timestamp
    pub generated_at: String,

    pub snapshot: TraceSnapshot,

    #[serde(default)]
    pub logs: Vec<String>,

    /// Event-trace annotations, when the run recorded them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<String>,
}

impl TraceDocument {
    pub fn new(snapshot: TraceSnapshot, logs: Vec<String>) -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            generated_at: Utc::now().to_rfc3339(),
            snapshot,
            logs,
            trace: Vec::new(),
        }
    }

    pub fn with_trace(mut self, trace: Vec<String>) -> Self {
        self.trace = trace;
        self
    }
}

/// Write a trace document to a JSON file
///
/// **Public** - main entry point for JSON output
///
/// # Arguments
/// * `document` - Snapshot plus metadata
/// * `output_path` - Path to output JSON file
///
/// # Errors
/// * `OutputError::WriteFailed` - I/O error during write
/// * `OutputError::SerializationFailed` - JSON serialization error
/// * `OutputError::InvalidPath` - Path cannot be created or is invalid
pub fn write_document(document: &TraceDocument, output_path: impl AsRef<Path>) -> Result<(), OutputError> {
    let output_path = output_path.as_ref();

    info!("Writing trace to: {}", output_path.display());

    validate_output_path(output_path)?;

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            debug!("Creating parent directories: {}", parent.display());
            std::fs::create_dir_all(parent).map_err(|e| {
                OutputError::InvalidPath(format!("Cannot create directory {}: {}", parent.display(), e))
            })?;
        }
    }

    let file = File::create(output_path).map_err(OutputError::WriteFailed)?;
    let writer = BufWriter::new(file);

    serde_json::to_writer_pretty(writer, document).map_err(OutputError::SerializationFailed)?;

    info!("Trace written successfully ({} bytes)", calculate_file_size(output_path));

    Ok(())
}

/// Serialize a document without touching the filesystem
pub fn document_to_string(document: &TraceDocument) -> Result<String, OutputError> {
    serde_json::to_string_pretty(document).map_err(OutputError::SerializationFailed)
}

/// Validate that output path is writable
///
/// **Private** - internal validation
fn validate_output_path(path: &Path) -> Result<(), OutputError> {
    if path.as_os_str().is_empty() {
        return Err(OutputError::InvalidPath("Path is empty".to_string()));
    }

    if path.is_dir() {
        return Err(OutputError::InvalidPath(format!(
            "Path is a directory: {}",
            path.display()
        )));
    }

    Ok(())
}

fn calculate_file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Read a trace document from a JSON file
///
/// **Public** - used by `validate` and tests
///
/// # Errors
/// * `OutputError::WriteFailed` - File read error (reusing WriteFailed for I/O)
/// * `OutputError::SerializationFailed` - JSON parse error
pub fn read_document(input_path: impl AsRef<Path>) -> Result<TraceDocument, OutputError> {
    let input_path = input_path.as_ref();

    debug!("Reading trace from: {}", input_path.display());

    let file = File::open(input_path).map_err(OutputError::WriteFailed)?;
    let document: TraceDocument =
        serde_json::from_reader(std::io::BufReader::new(file)).map_err(OutputError::SerializationFailed)?;

    debug!(
        "Trace loaded: version {}, {} nodes",
        document.version,
        document.snapshot.node_count()
    );

    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::EventKind;
    use crate::reconstruct::{NodeStatus, RunPhase, TraceNode, TraceSource, TreeStats};
    use pretty_assertions::assert_eq;
    use tempfile::NamedTempFile;

    fn create_test_document() -> TraceDocument {
        let root = TraceNode {
            id: "main#1".to_string(),
            name: "main".to_string(),
            kind: EventKind::Function,
            status: NodeStatus::Completed,
            start_time: 10,
            end_time: Some(20),
            parent_id: None,
            children: Vec::new(),
        };
        TraceDocument::new(
            TraceSnapshot {
                run_id: Some("run-1".to_string()),
                phase: RunPhase::Finished,
                source: TraceSource::Events,
                root: Some(root),
                detached: Vec::new(),
                stats: TreeStats::default(),
            },
            vec!["hello".to_string()],
        )
    }

    #[test]
    fn test_write_and_read_document() {
        let document = create_test_document();
        let temp_file = NamedTempFile::new().unwrap();

        write_document(&document, temp_file.path()).unwrap();
        let loaded = read_document(temp_file.path()).unwrap();

        assert_eq!(loaded, document);
    }

    #[test]
    fn test_validate_output_path_empty() {
        assert!(validate_output_path(Path::new("")).is_err());
    }

    #[test]
    fn test_validate_output_path_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(validate_output_path(temp_dir.path()).is_err());
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let temp_dir = tempfile::tempdir().unwrap();
        let nested_path = temp_dir.path().join("nested/dirs/trace.json");

        write_document(&create_test_document(), &nested_path).unwrap();

        assert!(nested_path.exists());
    }

    #[test]
    fn test_wire_field_names() {
        let text = document_to_string(&create_test_document()).unwrap();
        assert!(text.contains("\"generatedAt\""));
        assert!(text.contains("\"startTime\": 10"));
        assert!(text.contains("\"status\": \"completed\""));
        assert!(!text.contains("parentId"));
    }
}
