//! Cross-domain policy document analysis (Adobe crossdomain.xml and
//! Silverlight clientaccesspolicy.xml)

use super::{Check, Outcome};
use crate::error::{JanusError, Result};
use crate::http::{CancelToken, HttpClient};
use crate::models::{
    Finding, FindingKind, ProbeRequest, ProbeResponse, ScanConfig, ScanTarget, ADOBE_POLICY_FILE,
    SILVERLIGHT_POLICY_FILE,
};
use crate::xml::{Document, PathQuery, SafeXmlParser};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Which plugin runtime a policy file belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyKind {
    Adobe,
    Silverlight,
    /// Unrecognized file name: every grant query runs
    Unknown,
}

impl PolicyKind {
    /// Derives the kind from the last path segment
    pub fn from_path(path: &str) -> Self {
        let file = path.rsplit('/').next().unwrap_or(path);
        if file.eq_ignore_ascii_case(ADOBE_POLICY_FILE) {
            PolicyKind::Adobe
        } else if file.eq_ignore_ascii_case(SILVERLIGHT_POLICY_FILE) {
            PolicyKind::Silverlight
        } else {
            PolicyKind::Unknown
        }
    }
}

/// A grant element query and what access it confers
struct GrantQuery {
    kind: PolicyKind,
    query: PathQuery,
    access: &'static str,
}

const GRANTS: &[(PolicyKind, &str, &str)] = &[
    (
        PolicyKind::Adobe,
        "/cross-domain-policy/allow-access-from/@domain",
        "read data from this site (Adobe Flash/PDF)",
    ),
    (
        PolicyKind::Adobe,
        "/cross-domain-policy/allow-http-request-headers-from/@domain",
        "send custom request headers to this site (Adobe Flash/PDF)",
    ),
    (
        PolicyKind::Silverlight,
        "/access-policy/cross-domain-access/policy/allow-from/domain/@uri",
        "read data from and send requests to this site (Silverlight)",
    ),
];

/// A grant to an overly broad domain found in a policy document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyGrant {
    /// The granted domain pattern
    pub domain: String,
    /// The matching element, serialized
    pub element: String,
    pub access: &'static str,
    pub query: String,
}

/// Fetches and evaluates policy documents. The parser is built once and
/// shared; it holds no per-document state.
#[derive(Clone)]
pub struct PolicyAnalyzer {
    parser: Arc<SafeXmlParser>,
    grants: Arc<Vec<GrantQuery>>,
}

impl PolicyAnalyzer {
    /// Builds the analyzer with a freshly initialized safe parser
    pub fn new() -> Result<Self> {
        Self::with_parser(Arc::new(SafeXmlParser::new()?))
    }

    /// Builds the analyzer around an existing parser, e.g. one per worker
    pub fn with_parser(parser: Arc<SafeXmlParser>) -> Result<Self> {
        let grants = GRANTS
            .iter()
            .map(|(kind, expr, access)| {
                PathQuery::compile(expr)
                    .map(|query| GrantQuery {
                        kind: *kind,
                        query,
                        access: *access,
                    })
                    .map_err(|e| JanusError::Initialization(e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            parser,
            grants: Arc::new(grants),
        })
    }

    /// Fetches `{target_origin}/{policy_path}` and reports a wildcard grant.
    ///
    /// A failed fetch aborts. A non-2xx answer, a non-document content type
    /// or malformed XML are clean: a missing or broken policy file is not a
    /// finding.
    pub async fn analyze_policy(
        &self,
        client: &HttpClient,
        target_origin: &str,
        policy_path: &str,
        cancel: &CancelToken,
    ) -> Outcome {
        let request = ProbeRequest::get(policy_url(target_origin, policy_path));
        let response = match client.send_cancellable(&request, cancel).await {
            Ok(response) => response,
            Err(e) => {
                debug!("Caught '{e}' when accessing {}", request.uri);
                return Outcome::aborted(&e);
            }
        };

        if !response.is_success() {
            debug!("No policy at {} (status {})", request.uri, response.status);
            return Outcome::Clean;
        }
        if !is_document_content_type(response.content_type()) {
            debug!(
                "Ignoring {}: content type {:?} is not a policy document",
                request.uri,
                response.content_type()
            );
            return Outcome::Clean;
        }

        let doc = match self.parser.parse(&response.body) {
            Ok(doc) => doc,
            Err(e) => {
                debug!("Policy at {} did not parse: {e}", request.uri);
                return Outcome::Clean;
            }
        };

        match self.evaluate(&doc, PolicyKind::from_path(policy_path)) {
            Some(grant) => {
                warn!(
                    "Policy at {} grants {} to '{}'",
                    request.uri, grant.access, grant.domain
                );
                Outcome::Vulnerable(policy_finding(&request, &response, policy_path, &grant))
            }
            None => Outcome::Clean,
        }
    }

    /// Returns the first overly broad grant in `doc`, checking the queries
    /// that apply to `kind`
    pub fn evaluate(&self, doc: &Document, kind: PolicyKind) -> Option<PolicyGrant> {
        self.grants
            .iter()
            .filter(|g| kind == PolicyKind::Unknown || g.kind == kind)
            .find_map(|grant| {
                doc.select(&grant.query).into_iter().find_map(|m| {
                    let domain = m.value?;
                    is_overly_broad(domain).then(|| PolicyGrant {
                        domain: domain.to_string(),
                        element: m.element.to_string(),
                        access: grant.access,
                        query: grant.query.to_string(),
                    })
                })
            })
    }
}

fn policy_finding(
    request: &ProbeRequest,
    response: &ProbeResponse,
    policy_path: &str,
    grant: &PolicyGrant,
) -> Finding {
    Finding::new(
        FindingKind::PolicyWildcard,
        "Cross-Domain Misconfiguration: Policy Grants Any Domain",
        format!(
            "The cross-domain policy file allows content from any domain to {}.",
            grant.access
        ),
        &request.uri,
    )
    .with_evidence(&grant.element)
    .with_other_info(format!(
        "Policy file: {policy_path}\nGranted domain: {}\nMatched by: {}",
        grant.domain, grant.query
    ))
    .with_exchange(request, response)
}

/// `origin` + `/` + `path`, without doubled slashes
pub fn policy_url(origin: &str, path: &str) -> String {
    format!(
        "{}/{}",
        origin.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Adobe's registered media type for `crossdomain.xml`
const ADOBE_POLICY_MIME: &str = "text/x-cross-domain-policy";

/// Soft-404 HTML pages and other media are not policy documents
fn is_document_content_type(content_type: Option<&str>) -> bool {
    let Some(content_type) = content_type else {
        return true;
    };
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    mime.is_empty()
        || mime.contains("xml")
        || mime == ADOBE_POLICY_MIME
        || mime == "text/plain"
        || mime == "application/octet-stream"
}

/// True when a domain pattern admits more than one explicit host: a bare
/// `*`, a scheme-only restriction such as `http://*`, or a wildcard over a
/// single label such as `*.com`. Subdomain wildcards of a registrable host
/// (`*.example.com`) pass.
pub fn is_overly_broad(domain: &str) -> bool {
    let domain = domain.trim();
    let rest = domain
        .strip_prefix("http://")
        .or_else(|| domain.strip_prefix("https://"))
        .unwrap_or(domain);
    let authority = rest.split('/').next().unwrap_or(rest);
    let host = match authority.rsplit_once(':') {
        Some((host, port)) if port == "*" || port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => authority,
    };

    if host == "*" {
        return true;
    }
    match host.strip_prefix("*.") {
        Some(suffix) => suffix.is_empty() || !suffix.contains('.'),
        None => false,
    }
}

/// Runs the policy analyzer over every configured policy path, stopping at
/// the first vulnerable document
pub struct PolicyCheck {
    analyzer: PolicyAnalyzer,
    paths: Vec<String>,
}

impl PolicyCheck {
    pub fn new(analyzer: PolicyAnalyzer, paths: Vec<String>) -> Self {
        Self { analyzer, paths }
    }

    /// Fails with [`JanusError::Initialization`] if the parser cannot be set
    /// up safely
    pub fn from_config(config: &ScanConfig) -> Result<Self> {
        Ok(Self::new(PolicyAnalyzer::new()?, config.policy_paths.clone()))
    }
}

#[async_trait]
impl Check for PolicyCheck {
    fn name(&self) -> &str {
        "cross_domain_policy"
    }

    fn description(&self) -> &str {
        "Detects crossdomain.xml and clientaccesspolicy.xml files granting access to any domain"
    }

    fn kind(&self) -> FindingKind {
        FindingKind::PolicyWildcard
    }

    async fn detect(&self, client: &HttpClient, target: &ScanTarget, cancel: &CancelToken) -> Outcome {
        let mut last_abort = None;
        let mut any_clean = false;

        for path in &self.paths {
            match self
                .analyzer
                .analyze_policy(client, &target.origin, path, cancel)
                .await
            {
                Outcome::Vulnerable(finding) => return Outcome::Vulnerable(finding),
                Outcome::Clean => any_clean = true,
                Outcome::Aborted(reason) => {
                    if cancel.is_cancelled() {
                        return Outcome::Aborted(reason);
                    }
                    last_abort = Some(reason);
                }
            }
        }

        match last_abort {
            Some(reason) if !any_clean => Outcome::Aborted(reason),
            _ => Outcome::Clean,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> PolicyAnalyzer {
        PolicyAnalyzer::new().expect("analyzer")
    }

    fn parse(text: &str) -> Document {
        SafeXmlParser::new().unwrap().parse(text).unwrap()
    }

    #[test]
    fn kind_from_path() {
        assert_eq!(PolicyKind::from_path("crossdomain.xml"), PolicyKind::Adobe);
        assert_eq!(PolicyKind::from_path("/sub/CrossDomain.xml"), PolicyKind::Adobe);
        assert_eq!(
            PolicyKind::from_path("clientaccesspolicy.xml"),
            PolicyKind::Silverlight
        );
        assert_eq!(PolicyKind::from_path("policy.xml"), PolicyKind::Unknown);
    }

    #[test]
    fn broad_domains() {
        for domain in ["*", " * ", "http://*", "https://*", "*:*", "http://*:80", "*.com", "*."] {
            assert!(is_overly_broad(domain), "{domain}");
        }
        for domain in [
            "example.com",
            "*.example.com",
            "https://partner.example.com",
            "http://*.example.com",
            "",
        ] {
            assert!(!is_overly_broad(domain), "{domain}");
        }
    }

    #[test]
    fn policy_urls() {
        assert_eq!(
            policy_url("http://example.com/", "/crossdomain.xml"),
            "http://example.com/crossdomain.xml"
        );
        assert_eq!(
            policy_url("http://example.com:8080", "clientaccesspolicy.xml"),
            "http://example.com:8080/clientaccesspolicy.xml"
        );
    }

    #[test]
    fn content_types() {
        assert!(is_document_content_type(None));
        assert!(is_document_content_type(Some("text/xml; charset=utf-8")));
        assert!(is_document_content_type(Some("application/xml")));
        assert!(is_document_content_type(Some("text/x-cross-domain-policy")));
        assert!(is_document_content_type(Some("Text/X-Cross-Domain-Policy; charset=UTF-8")));
        assert!(is_document_content_type(Some("text/plain")));
        assert!(!is_document_content_type(Some("text/html")));
        assert!(!is_document_content_type(Some("application/json")));
    }

    #[test]
    fn adobe_read_wildcard() {
        let doc = parse(
            r#"<cross-domain-policy><allow-access-from domain="*.example.com"/><allow-access-from domain="*" secure="false"/></cross-domain-policy>"#,
        );
        let grant = analyzer().evaluate(&doc, PolicyKind::Adobe).unwrap();
        assert_eq!(grant.domain, "*");
        assert_eq!(grant.element, r#"<allow-access-from domain="*" secure="false"/>"#);
    }

    #[test]
    fn adobe_send_wildcard() {
        let doc = parse(
            r#"<cross-domain-policy><allow-http-request-headers-from domain="*" headers="SOAPAction"/></cross-domain-policy>"#,
        );
        let grant = analyzer().evaluate(&doc, PolicyKind::Adobe).unwrap();
        assert!(grant.access.contains("send"));
    }

    #[test]
    fn silverlight_wildcard() {
        let doc = parse(
            r#"<access-policy><cross-domain-access><policy><allow-from><domain uri="http://*"/></allow-from><grant-to><resource path="/"/></grant-to></policy></cross-domain-access></access-policy>"#,
        );
        assert!(analyzer().evaluate(&doc, PolicyKind::Silverlight).is_some());
        // the Adobe queries don't apply to a Silverlight document
        assert!(analyzer().evaluate(&doc, PolicyKind::Adobe).is_none());
        assert!(analyzer().evaluate(&doc, PolicyKind::Unknown).is_some());
    }

    #[test]
    fn restrictive_policy_is_clean() {
        let doc = parse(
            r#"<cross-domain-policy><site-control permitted-cross-domain-policies="none"/><allow-access-from domain="www.example.com"/></cross-domain-policy>"#,
        );
        assert!(analyzer().evaluate(&doc, PolicyKind::Adobe).is_none());
    }
}
