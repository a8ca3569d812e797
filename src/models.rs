//! Core data models for Janus

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::error::{JanusError, Result};

/// Attacker-controlled origin injected by the CORS probe
pub const DEFAULT_ATTACKER_ORIGIN: &str = "evil.com";

/// Adobe's cross domain policy file name
pub const ADOBE_POLICY_FILE: &str = "crossdomain.xml";

/// Silverlight's cross domain policy file name
pub const SILVERLIGHT_POLICY_FILE: &str = "clientaccesspolicy.xml";

/// CWE-264: Permissions, Privileges, and Access Controls
pub const CWE_PERMISSIONS: u32 = 264;

/// WASC-14: Server Misconfiguration
pub const WASC_SERVER_MISCONFIG: u32 = 14;

const OWASP_2021_A05: &str = "OWASP_2021_A05";
const OWASP_2017_A06: &str = "OWASP_2017_A06";

/// Response body bytes kept in a finding's response context
const RESPONSE_CONTEXT_BODY_LIMIT: usize = 4096;

/// Risk level for security findings
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Risk {
    Low,
    Medium,
    High,
}

impl fmt::Display for Risk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Risk::Low => write!(f, "LOW"),
            Risk::Medium => write!(f, "MEDIUM"),
            Risk::High => write!(f, "HIGH"),
        }
    }
}

/// Confidence level for a finding
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Confidence {
    Low,
    /// Single-sample network inference lands here
    Medium,
    High,
    /// Reserved for proofs; no check in this crate emits it
    Certain,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::Low => write!(f, "low"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::High => write!(f, "high"),
            Confidence::Certain => write!(f, "certain"),
        }
    }
}

/// What kind of cross-origin exposure a finding describes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FindingKind {
    /// The server wildcards or reflects an untrusted `Origin`
    CorsReflection,
    /// A cross-domain policy document grants access to any domain
    PolicyWildcard,
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FindingKind::CorsReflection => write!(f, "CORSReflection"),
            FindingKind::PolicyWildcard => write!(f, "PolicyWildcard"),
        }
    }
}

/// A security finding discovered during scanning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// Unique identifier
    pub id: String,
    pub kind: FindingKind,
    /// Name of the finding
    pub title: String,
    /// Detailed description
    pub description: String,
    pub risk: Risk,
    pub confidence: Confidence,
    /// Literal text from the response or document proving the issue
    pub evidence: String,
    /// Affected URI
    pub target_uri: String,
    /// Serialized request that demonstrates the issue
    pub request_context: Option<String>,
    /// Serialized response that demonstrates the issue
    pub response_context: Option<String>,
    /// Free-form detail (which grant matched, credentials flag, ...)
    pub other_info: String,
    pub cwe_id: u32,
    pub wasc_id: u32,
    pub tags: Vec<String>,
}

impl Finding {
    /// Creates a new Finding with a generated UUID and the defaults every
    /// cross-origin finding shares
    pub fn new(
        kind: FindingKind,
        title: impl Into<String>,
        description: impl Into<String>,
        target_uri: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            title: title.into(),
            description: description.into(),
            risk: Risk::High,
            confidence: Confidence::Medium,
            evidence: String::new(),
            target_uri: target_uri.into(),
            request_context: None,
            response_context: None,
            other_info: String::new(),
            cwe_id: CWE_PERMISSIONS,
            wasc_id: WASC_SERVER_MISCONFIG,
            tags: vec![OWASP_2021_A05.to_string(), OWASP_2017_A06.to_string()],
        }
    }

    pub fn with_risk(mut self, risk: Risk) -> Self {
        self.risk = risk;
        self
    }

    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = confidence;
        self
    }

    /// Sets the evidence for this finding
    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = evidence.into();
        self
    }

    pub fn with_other_info(mut self, info: impl Into<String>) -> Self {
        self.other_info = info.into();
        self
    }

    /// Attaches the request/response pair that produced the finding
    pub fn with_exchange(mut self, request: &ProbeRequest, response: &ProbeResponse) -> Self {
        self.request_context = Some(request.to_raw());
        self.response_context = Some(response.to_raw());
        self
    }

    /// Compares everything except the generated id
    pub fn same_content(&self, other: &Finding) -> bool {
        self.kind == other.kind
            && self.title == other.title
            && self.description == other.description
            && self.risk == other.risk
            && self.confidence == other.confidence
            && self.evidence == other.evidence
            && self.target_uri == other.target_uri
            && self.request_context == other.request_context
            && self.response_context == other.response_context
            && self.other_info == other.other_info
            && self.cwe_id == other.cwe_id
            && self.wasc_id == other.wasc_id
            && self.tags == other.tags
    }
}

/// An HTTP request description owned by the caller.
///
/// Probes never modify a `ProbeRequest` in place; they derive copies with
/// [`ProbeRequest::with_header`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeRequest {
    pub method: String,
    pub uri: String,
    /// Header name/value pairs in send order
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl ProbeRequest {
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            uri: uri.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Shorthand for a bodiless GET
    pub fn get(uri: impl Into<String>) -> Self {
        Self::new("GET", uri)
    }

    /// Builder-style header append, for constructing base requests
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Returns a copy with every header called `name` (any case) replaced by
    /// a single `name: value`. `self` is left untouched.
    pub fn with_header(&self, name: &str, value: &str) -> Self {
        let mut derived = self.clone();
        derived
            .headers
            .retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
        derived.headers.push((name.to_string(), value.to_string()));
        derived
    }

    /// First value of a header, by case-insensitive name
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Parses and validates the URI as an absolute http(s) URL
    pub fn url(&self) -> Result<Url> {
        let url = Url::parse(&self.uri)?;
        match url.scheme() {
            "http" | "https" if url.host_str().is_some() => Ok(url),
            _ => Err(JanusError::InvalidTarget(format!(
                "'{}' is not an absolute http(s) URI",
                self.uri
            ))),
        }
    }

    /// Serializes the request the way it would appear on the wire
    pub fn to_raw(&self) -> String {
        let mut raw = format!("{} {} HTTP/1.1\r\n", self.method, self.uri);
        for (name, value) in &self.headers {
            raw.push_str(&format!("{name}: {value}\r\n"));
        }
        raw.push_str("\r\n");
        if let Some(ref body) = self.body {
            raw.push_str(body);
        }
        raw
    }
}

/// Read-only snapshot of the response to a probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResponse {
    pub status: u16,
    /// Final URL the response came from
    pub url: String,
    /// Serialized header block, one `Name: value` line per header
    /// occurrence, `\r\n` terminated
    pub raw_headers: String,
    pub body: String,
}

impl ProbeResponse {
    /// Iterates `(name, value)` pairs parsed back out of the raw header block.
    /// Lines without a colon are skipped; values are trimmed.
    pub fn header_lines(&self) -> impl Iterator<Item = (&str, &str)> {
        self.raw_headers.lines().filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            Some((name.trim(), value.trim()))
        })
    }

    /// All values of a header, case-insensitive on the name
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.header_lines()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_lines()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Serializes status line, headers and a bounded slice of the body
    pub fn to_raw(&self) -> String {
        let mut raw = format!("HTTP/1.1 {}\r\n{}\r\n", self.status, self.raw_headers);
        let mut end = self.body.len().min(RESPONSE_CONTEXT_BODY_LIMIT);
        while !self.body.is_char_boundary(end) {
            end -= 1;
        }
        raw.push_str(&self.body[..end]);
        raw
    }
}

/// What the host hands to each check: a base request plus the origin it
/// belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanTarget {
    pub base_request: ProbeRequest,
    /// scheme://host[:port]
    pub origin: String,
}

impl ScanTarget {
    /// Wraps an existing request, deriving the origin from its URI
    pub fn new(base_request: ProbeRequest) -> Result<Self> {
        let url = base_request.url()?;
        let origin = url.origin().ascii_serialization();
        Ok(Self {
            base_request,
            origin,
        })
    }

    /// Builds a GET base request for `url`
    pub fn from_url(url: &str) -> Result<Self> {
        Self::new(ProbeRequest::get(url))
    }

    pub fn uri(&self) -> &str {
        &self.base_request.uri
    }
}

/// Result of a complete scan of one target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    /// Target URI
    pub target: String,
    /// Unique scan identifier
    pub scan_id: String,
    /// Scan start time (local timezone)
    pub started_at: DateTime<Local>,
    /// Scan end time (local timezone)
    pub finished_at: Option<DateTime<Local>>,
    /// All findings discovered
    pub findings: Vec<Finding>,
    /// Names of checks that reached a terminal success state
    pub checks_executed: Vec<String>,
    /// Names of checks that aborted, with the reason
    pub checks_aborted: Vec<(String, String)>,
    /// Total HTTP requests made
    pub total_requests: u64,
}

impl ScanResult {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            scan_id: uuid::Uuid::new_v4().to_string(),
            started_at: Local::now(),
            finished_at: None,
            findings: Vec::new(),
            checks_executed: Vec::new(),
            checks_aborted: Vec::new(),
            total_requests: 0,
        }
    }

    /// Returns findings of one kind
    pub fn findings_of(&self, kind: FindingKind) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.kind == kind)
    }

    /// Marks the scan as finished
    pub fn finish(&mut self) {
        self.finished_at = Some(Local::now());
    }
}

/// Configuration for a scan session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Request timeout in seconds; exceeding it counts as a transport failure
    pub timeout_secs: u64,
    /// User-Agent header value
    pub user_agent: String,
    /// Whether to follow HTTP redirects
    pub follow_redirects: bool,
    /// HTTP/HTTPS proxy URL
    pub proxy: Option<String>,
    /// Run checks concurrently
    pub concurrent: bool,
    /// Origin injected by the CORS probe
    pub attacker_origin: String,
    /// Relative policy document paths fetched against the target origin
    pub policy_paths: Vec<String>,
    /// Names of enabled checks
    pub checks: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: "Janus/0.1.0".to_string(),
            follow_redirects: false,
            proxy: None,
            concurrent: true,
            attacker_origin: DEFAULT_ATTACKER_ORIGIN.to_string(),
            policy_paths: vec![
                ADOBE_POLICY_FILE.to_string(),
                SILVERLIGHT_POLICY_FILE.to_string(),
            ],
            checks: vec!["cors".to_string(), "cross_domain_policy".to_string()],
        }
    }
}
