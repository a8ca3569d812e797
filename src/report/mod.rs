//! Finding reporting: forwarding to alert sinks and result export

pub mod json;
pub mod jsonl;

use crate::error::{JanusError, Result};
use crate::models::{Finding, ScanResult};
use crate::scanner::Outcome;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

pub use jsonl::JsonlSink;

/// A finding tagged with the target it was raised against
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub target: String,
    pub finding: Finding,
}

/// Destination for alerts. Storage, deduplication and presentation are the
/// sink's business.
pub trait AlertSink: Send + Sync {
    fn raise(&self, alert: Alert) -> Result<()>;
}

/// Forwards findings to a sink without altering them
pub struct Reporter {
    sink: Arc<dyn AlertSink>,
}

impl Reporter {
    pub fn new(sink: Arc<dyn AlertSink>) -> Self {
        Self { sink }
    }

    /// Forwards every finding among `outcomes`; clean and aborted outcomes
    /// are skipped. Returns how many alerts were raised.
    pub fn report<I>(&self, target: &str, outcomes: I) -> Result<usize>
    where
        I: IntoIterator<Item = Outcome>,
    {
        self.forward(target, outcomes.into_iter().filter_map(Outcome::into_finding))
    }

    /// Forwards the findings of a finished scan
    pub fn report_result(&self, result: &ScanResult) -> Result<usize> {
        self.forward(&result.target, result.findings.iter().cloned())
    }

    fn forward<I>(&self, target: &str, findings: I) -> Result<usize>
    where
        I: Iterator<Item = Finding>,
    {
        let mut raised = 0;
        for finding in findings {
            debug!("Raising {} alert for {target}", finding.kind);
            self.sink.raise(Alert {
                target: target.to_string(),
                finding,
            })?;
            raised += 1;
        }
        if raised > 0 {
            info!("Reported {raised} finding(s) for {target}");
        }
        Ok(raised)
    }
}

/// Keeps alerts in memory, in arrival order
#[derive(Debug, Default)]
pub struct CollectingSink {
    alerts: Mutex<Vec<Alert>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything raised so far
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts
            .lock()
            .map(|alerts| alerts.clone())
            .unwrap_or_default()
    }
}

impl AlertSink for CollectingSink {
    fn raise(&self, alert: Alert) -> Result<()> {
        self.alerts
            .lock()
            .map_err(|_| JanusError::Config("alert sink lock poisoned".to_string()))?
            .push(alert);
        Ok(())
    }
}
