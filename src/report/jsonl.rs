//! JSONL (JSON Lines) alert output — one JSON object per line

use super::{Alert, AlertSink};
use crate::error::{JanusError, Result};
use crate::models::ScanResult;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

/// Writes each alert as one JSON line and flushes it immediately
pub struct JsonlSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonlSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Returns the underlying writer
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|_| JanusError::Config("alert sink lock poisoned".to_string()))
    }
}

impl JsonlSink<BufWriter<File>> {
    /// Creates (or truncates) `path` and writes alerts to it
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        info!("Writing alerts to {}", path.display());
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write + Send> AlertSink for JsonlSink<W> {
    fn raise(&self, alert: Alert) -> Result<()> {
        let line = serde_json::to_string(&alert)?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| JanusError::Config("alert sink lock poisoned".to_string()))?;
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}

/// Exports scan results as a JSONL file (one finding per line)
pub fn export(result: &ScanResult, output_path: &Path) -> Result<()> {
    let file = File::create(output_path)?;
    let mut writer = BufWriter::new(file);

    for finding in &result.findings {
        let line = serde_json::to_string(finding)?;
        writeln!(writer, "{}", line)?;
    }

    writer.flush()?;
    info!("JSONL report saved to {}", output_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Finding, FindingKind};

    fn alert(kind: FindingKind) -> Alert {
        Alert {
            target: "http://example.com".to_string(),
            finding: Finding::new(kind, "t", "d", "http://example.com/"),
        }
    }

    #[test]
    fn one_line_per_alert() {
        let sink = JsonlSink::new(Vec::new());
        sink.raise(alert(FindingKind::CorsReflection)).unwrap();
        sink.raise(alert(FindingKind::PolicyWildcard)).unwrap();

        let out = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: Alert = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.finding.kind, FindingKind::CorsReflection);
        assert_eq!(first.target, "http://example.com");
    }

    #[test]
    fn export_writes_findings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.jsonl");
        let mut result = ScanResult::new("http://example.com/");
        result.findings.push(alert(FindingKind::CorsReflection).finding);

        export(&result, &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
    }
}
