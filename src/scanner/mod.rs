//! Check engine and trait definitions

pub mod cors;
pub mod policy;

use crate::error::{JanusError, Result};
use crate::http::{CancelToken, HttpClient};
use crate::models::{Finding, FindingKind, ScanConfig, ScanResult, ScanTarget};
use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

pub use cors::CorsProbe;
pub use policy::{PolicyAnalyzer, PolicyCheck};

/// Lifecycle of one check invocation against one target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeState {
    Idle,
    /// Request dispatch and response/document parsing
    Probing,
    Vulnerable,
    Clean,
    /// Transport failure, cancellation or unusable input
    Aborted,
}

impl ProbeState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProbeState::Vulnerable | ProbeState::Clean | ProbeState::Aborted
        )
    }
}

impl fmt::Display for ProbeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeState::Idle => write!(f, "idle"),
            ProbeState::Probing => write!(f, "probing"),
            ProbeState::Vulnerable => write!(f, "vulnerable"),
            ProbeState::Clean => write!(f, "clean"),
            ProbeState::Aborted => write!(f, "aborted"),
        }
    }
}

/// Terminal result of a check. `Clean` and `Aborted` both mean "no
/// finding"; the difference only matters for diagnostics.
#[derive(Debug, Clone)]
pub enum Outcome {
    Vulnerable(Finding),
    Clean,
    Aborted(String),
}

impl Outcome {
    /// Maps an error raised mid-probe to an abort
    pub fn aborted(err: &JanusError) -> Self {
        Outcome::Aborted(err.to_string())
    }

    pub fn state(&self) -> ProbeState {
        match self {
            Outcome::Vulnerable(_) => ProbeState::Vulnerable,
            Outcome::Clean => ProbeState::Clean,
            Outcome::Aborted(_) => ProbeState::Aborted,
        }
    }

    pub fn finding(&self) -> Option<&Finding> {
        match self {
            Outcome::Vulnerable(finding) => Some(finding),
            _ => None,
        }
    }

    pub fn into_finding(self) -> Option<Finding> {
        match self {
            Outcome::Vulnerable(finding) => Some(finding),
            _ => None,
        }
    }
}

/// A detection strategy. Implementations keep no mutable state between
/// calls and may run concurrently with each other.
#[async_trait]
pub trait Check: Send + Sync {
    /// Returns the check name used to enable or disable it
    fn name(&self) -> &str;

    /// Returns a description of what this check looks for
    fn description(&self) -> &str;

    /// The one kind of finding this check can produce
    fn kind(&self) -> FindingKind;

    /// Runs the check against `target`
    async fn detect(&self, client: &HttpClient, target: &ScanTarget, cancel: &CancelToken)
        -> Outcome;
}

/// Orchestrates the execution of all registered checks
pub struct ScanEngine {
    checks: Vec<Arc<dyn Check>>,
}

impl ScanEngine {
    /// Creates a new ScanEngine with no registered checks
    pub fn new() -> Self {
        Self { checks: Vec::new() }
    }

    /// Creates a ScanEngine with the CORS probe and the policy document check.
    /// Fails if the XML parser cannot be initialized safely.
    pub fn with_defaults(config: &ScanConfig) -> Result<Self> {
        let mut engine = Self::new();
        engine.register(Arc::new(CorsProbe::from_config(config)));
        engine.register(Arc::new(PolicyCheck::from_config(config)?));
        Ok(engine)
    }

    /// Registers a new check
    pub fn register(&mut self, check: Arc<dyn Check>) {
        self.checks.push(check);
    }

    /// Returns name and description of every registered check
    pub fn list_checks(&self) -> Vec<(&str, &str)> {
        self.checks
            .iter()
            .map(|c| (c.name(), c.description()))
            .collect()
    }

    /// Runs all enabled checks against `target` with a client built from
    /// `config`
    pub async fn run(&self, target: &ScanTarget, config: &ScanConfig) -> Result<ScanResult> {
        let client = HttpClient::from_config(config)?;
        Ok(self
            .run_with_client(&client, target, config, &CancelToken::new())
            .await)
    }

    /// Runs all enabled checks using an existing client. Cancelling `cancel`
    /// aborts in-flight requests; affected checks end as aborted.
    pub async fn run_with_client(
        &self,
        client: &HttpClient,
        target: &ScanTarget,
        config: &ScanConfig,
        cancel: &CancelToken,
    ) -> ScanResult {
        let mut result = ScanResult::new(target.uri());
        let requests_before = client.request_count();

        let enabled: Vec<Arc<dyn Check>> = self
            .checks
            .iter()
            .filter(|c| config.checks.iter().any(|name| name == c.name()))
            .cloned()
            .collect();

        info!(
            "Scanning {} with {} check(s)",
            target.uri(),
            enabled.len()
        );

        let outcomes = if config.concurrent {
            Self::run_concurrent(&enabled, client, target, cancel).await
        } else {
            Self::run_sequential(&enabled, client, target, cancel).await
        };

        // at most one finding per kind per target
        let mut seen_kinds = HashSet::new();
        for (name, outcome) in outcomes {
            match outcome {
                Outcome::Vulnerable(finding) => {
                    if seen_kinds.insert(finding.kind) {
                        result.findings.push(finding);
                    } else {
                        debug!("Dropping duplicate {} finding from '{name}'", finding.kind);
                    }
                    result.checks_executed.push(name);
                }
                Outcome::Clean => result.checks_executed.push(name),
                Outcome::Aborted(reason) => result.checks_aborted.push((name, reason)),
            }
        }

        result.total_requests = client.request_count() - requests_before;
        result.finish();
        result
    }

    async fn run_one(
        check: &dyn Check,
        client: &HttpClient,
        target: &ScanTarget,
        cancel: &CancelToken,
    ) -> Outcome {
        debug!("Check '{}': {} -> {}", check.name(), ProbeState::Idle, ProbeState::Probing);
        let outcome = check.detect(client, target, cancel).await;
        match outcome {
            Outcome::Aborted(ref reason) => {
                debug!("Check '{}' aborted: {reason}", check.name());
            }
            _ => info!("Check '{}' completed: {}", check.name(), outcome.state()),
        }
        outcome
    }

    /// Sequential execution in registration order
    async fn run_sequential(
        checks: &[Arc<dyn Check>],
        client: &HttpClient,
        target: &ScanTarget,
        cancel: &CancelToken,
    ) -> Vec<(String, Outcome)> {
        let mut outcomes = Vec::with_capacity(checks.len());
        for check in checks {
            let outcome = Self::run_one(check.as_ref(), client, target, cancel).await;
            outcomes.push((check.name().to_string(), outcome));
        }
        outcomes
    }

    /// Concurrent execution using JoinSet. Outcomes are returned in
    /// registration order regardless of completion order.
    async fn run_concurrent(
        checks: &[Arc<dyn Check>],
        client: &HttpClient,
        target: &ScanTarget,
        cancel: &CancelToken,
    ) -> Vec<(String, Outcome)> {
        let mut set = JoinSet::new();

        for (index, check) in checks.iter().enumerate() {
            let check = Arc::clone(check);
            let client = client.clone();
            let target = target.clone();
            let cancel = cancel.clone();

            set.spawn(async move {
                let outcome = Self::run_one(check.as_ref(), &client, &target, &cancel).await;
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<Outcome>> = vec![None; checks.len()];
        while let Some(join_result) = set.join_next().await {
            match join_result {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => error!("Check task panicked: {}", e),
            }
        }

        checks
            .iter()
            .zip(slots)
            .map(|(check, slot)| {
                let outcome =
                    slot.unwrap_or_else(|| Outcome::Aborted("check task panicked".to_string()));
                (check.name().to_string(), outcome)
            })
            .collect()
    }
}

impl Default for ScanEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProbeRequest;

    struct FixedCheck {
        name: &'static str,
        kind: FindingKind,
        vulnerable: bool,
    }

    #[async_trait]
    impl Check for FixedCheck {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "fixed outcome"
        }

        fn kind(&self) -> FindingKind {
            self.kind
        }

        async fn detect(
            &self,
            _client: &HttpClient,
            target: &ScanTarget,
            _cancel: &CancelToken,
        ) -> Outcome {
            if self.vulnerable {
                Outcome::Vulnerable(Finding::new(self.kind, self.name, "", target.uri()))
            } else {
                Outcome::Aborted("no network".to_string())
            }
        }
    }

    fn target() -> ScanTarget {
        ScanTarget::new(ProbeRequest::get("http://127.0.0.1:9/")).unwrap()
    }

    fn config(checks: &[&str], concurrent: bool) -> ScanConfig {
        ScanConfig {
            checks: checks.iter().map(|s| s.to_string()).collect(),
            concurrent,
            ..ScanConfig::default()
        }
    }

    fn engine() -> ScanEngine {
        let mut engine = ScanEngine::new();
        for (name, vulnerable) in [("first", true), ("second", true), ("broken", false)] {
            engine.register(Arc::new(FixedCheck {
                name,
                kind: FindingKind::CorsReflection,
                vulnerable,
            }));
        }
        engine
    }

    #[test]
    fn outcome_states() {
        assert_eq!(Outcome::Clean.state(), ProbeState::Clean);
        assert_eq!(
            Outcome::Aborted("x".into()).state(),
            ProbeState::Aborted
        );
        assert!(Outcome::Clean.finding().is_none());
        assert!(ProbeState::Aborted.is_terminal());
        assert!(!ProbeState::Probing.is_terminal());
    }

    #[tokio::test]
    async fn disabled_checks_do_not_run() {
        let engine = engine();
        let client = HttpClient::from_config(&ScanConfig::default()).unwrap();
        let result = engine
            .run_with_client(&client, &target(), &config(&["broken"], false), &CancelToken::new())
            .await;

        assert!(result.findings.is_empty());
        assert!(result.checks_executed.is_empty());
        assert_eq!(result.checks_aborted.len(), 1);
        assert_eq!(result.checks_aborted[0].0, "broken");
    }

    #[tokio::test]
    async fn one_finding_per_kind() {
        for concurrent in [false, true] {
            let engine = engine();
            let client = HttpClient::from_config(&ScanConfig::default()).unwrap();
            let result = engine
                .run_with_client(
                    &client,
                    &target(),
                    &config(&["first", "second", "broken"], concurrent),
                    &CancelToken::new(),
                )
                .await;

            assert_eq!(result.findings.len(), 1);
            assert_eq!(result.findings[0].title, "first");
            assert_eq!(result.checks_executed, vec!["first", "second"]);
            assert!(result.finished_at.is_some());
        }
    }

    #[test]
    fn list_checks_reports_registrations() {
        let engine = ScanEngine::with_defaults(&ScanConfig::default()).unwrap();
        let names: Vec<&str> = engine.list_checks().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["cors", "cross_domain_policy"]);
    }
}
