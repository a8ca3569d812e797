//! CORS misconfiguration detection module

use super::{Check, Outcome};
use crate::error::JanusError;
use crate::http::{CancelToken, HttpClient};
use crate::models::{Finding, FindingKind, ProbeRequest, ProbeResponse, ScanConfig, ScanTarget};
use async_trait::async_trait;
use tracing::{debug, warn};

const ACAO: &str = "Access-Control-Allow-Origin";
const ACAC: &str = "Access-Control-Allow-Credentials";

/// Sends the base request once with a foreign `Origin` and flags a wildcard
/// or reflected `Access-Control-Allow-Origin`
#[derive(Debug, Clone)]
pub struct CorsProbe {
    attacker_origin: String,
}

/// An `Access-Control-Allow-Origin` line that grants the untrusted origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsMatch {
    /// Header value as sent, trimmed
    pub value: String,
    pub wildcard: bool,
}

impl CorsMatch {
    /// Header text proving the match
    pub fn evidence(&self) -> String {
        format!("{ACAO}: {}", self.value)
    }
}

impl CorsProbe {
    pub fn new(attacker_origin: impl Into<String>) -> Self {
        Self {
            attacker_origin: attacker_origin.into(),
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(config.attacker_origin.clone())
    }

    pub fn attacker_origin(&self) -> &str {
        &self.attacker_origin
    }

    /// Dispatches a copy of `base_request` carrying
    /// `Origin: <attacker origin>` and inspects the response.
    /// `base_request` itself is never modified.
    pub async fn probe(
        &self,
        client: &HttpClient,
        base_request: &ProbeRequest,
        cancel: &CancelToken,
    ) -> Outcome {
        if let Err(e) = validate_origin(base_request, &self.attacker_origin) {
            debug!("CORS probe skipped: {e}");
            return Outcome::aborted(&e);
        }

        let request = base_request.with_header("Origin", &self.attacker_origin);
        let response = match client.send_cancellable(&request, cancel).await {
            Ok(response) => response,
            Err(e) => {
                debug!(
                    "Caught '{e}' when accessing {} for the CORS probe",
                    request.uri
                );
                return Outcome::aborted(&e);
            }
        };

        match evaluate(&response, &self.attacker_origin) {
            Some(found) => {
                warn!("CORS allows untrusted origin at {}: {}", request.uri, found.evidence());
                Outcome::Vulnerable(self.finding(&request, &response, &found))
            }
            None => Outcome::Clean,
        }
    }

    fn finding(&self, request: &ProbeRequest, response: &ProbeResponse, found: &CorsMatch) -> Finding {
        let credentials = response
            .header_values(ACAC)
            .any(|v| v.eq_ignore_ascii_case("true"));
        let varies_on_origin = response
            .header_values("Vary")
            .flat_map(|v| v.split(','))
            .any(|v| v.trim().eq_ignore_ascii_case("origin"));

        let how = if found.wildcard {
            "allows any origin with a wildcard"
        } else {
            "reflects the untrusted request origin"
        };
        let other_info = format!(
            "Injected Origin: {}\nThe response {how}.\n{ACAC}: {credentials}\nVary: Origin present: {varies_on_origin}",
            self.attacker_origin
        );

        Finding::new(
            FindingKind::CorsReflection,
            "Cross-Domain Misconfiguration: CORS Allows Untrusted Origin",
            "The server answered a request from an untrusted origin with an \
             Access-Control-Allow-Origin header that grants it access, so pages \
             on other sites can read this resource through the browser.",
            &request.uri,
        )
        .with_evidence(found.evidence())
        .with_other_info(other_info)
        .with_exchange(request, response)
    }
}

/// Applies the decision rule to the raw response header block: the first
/// `Access-Control-Allow-Origin` line whose value is `*` or exactly
/// `untrusted_origin` is a match. Header names compare case-insensitively;
/// every occurrence is considered, not just the first.
pub fn evaluate(response: &ProbeResponse, untrusted_origin: &str) -> Option<CorsMatch> {
    response.header_values(ACAO).find_map(|value| {
        if value == "*" {
            Some(CorsMatch {
                value: value.to_string(),
                wildcard: true,
            })
        } else if value == untrusted_origin {
            Some(CorsMatch {
                value: value.to_string(),
                wildcard: false,
            })
        } else {
            None
        }
    })
}

/// The injected origin must be a plausible header value and must not be
/// the target's own origin
fn validate_origin(base_request: &ProbeRequest, untrusted_origin: &str) -> Result<(), JanusError> {
    let url = base_request.url()?;
    if untrusted_origin.is_empty()
        || untrusted_origin != untrusted_origin.trim()
        || untrusted_origin.chars().any(|c| c.is_control())
    {
        return Err(JanusError::Config(format!(
            "attacker origin '{untrusted_origin}' is not a valid Origin value"
        )));
    }

    let own_origin = url.origin().ascii_serialization();
    let same_as_target = own_origin.eq_ignore_ascii_case(untrusted_origin)
        || url
            .host_str()
            .is_some_and(|host| host.eq_ignore_ascii_case(untrusted_origin));
    if same_as_target {
        return Err(JanusError::Config(format!(
            "attacker origin '{untrusted_origin}' is the target's own origin"
        )));
    }
    Ok(())
}

#[async_trait]
impl Check for CorsProbe {
    fn name(&self) -> &str {
        "cors"
    }

    fn description(&self) -> &str {
        "Detects CORS responses that wildcard or reflect an untrusted Origin"
    }

    fn kind(&self) -> FindingKind {
        FindingKind::CorsReflection
    }

    async fn detect(&self, client: &HttpClient, target: &ScanTarget, cancel: &CancelToken) -> Outcome {
        self.probe(client, &target.base_request, cancel).await
    }
}
