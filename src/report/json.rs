//! Whole-scan persistence: a `ScanResult` with its findings and aborted
//! checks as one pretty-printed JSON document

use crate::error::{JanusError, Result};
use crate::models::ScanResult;
use std::path::Path;
use tracing::{debug, info};

/// Writes `result` to `output_path`, replacing any existing file
pub fn export(result: &ScanResult, output_path: &Path) -> Result<()> {
    let mut document = serde_json::to_string_pretty(result)?;
    document.push('\n');
    std::fs::write(output_path, document)?;
    info!(
        "Scan {} of {} ({} findings) written to {}",
        result.scan_id,
        result.target,
        result.findings.len(),
        output_path.display()
    );
    Ok(())
}

/// Reads back a document written by [`export`]
pub fn load(input_path: &Path) -> Result<ScanResult> {
    let content = std::fs::read_to_string(input_path)?;
    let result: ScanResult = serde_json::from_str(&content).map_err(|e| {
        JanusError::Parse(format!("{} is not a scan result: {e}", input_path.display()))
    })?;
    debug!("Loaded scan {} from {}", result.scan_id, input_path.display());
    Ok(result)
}
