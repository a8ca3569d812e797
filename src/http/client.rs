//! HTTP client wrapper with request tracking and cancellation

use crate::error::{JanusError, Result};
use crate::http::CancelToken;
use crate::models::{ProbeRequest, ProbeResponse, ScanConfig};
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, Response};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Upper bound on the response body kept per request. Policy files are a few
/// KB and probe contexts keep far less; the rest of a larger body is never
/// read.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// HTTP client wrapper with request counting.
///
/// Each `send` is exactly one round trip: no retries, no backoff. Retrying a
/// probe is the caller's decision.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    request_count: Arc<AtomicU64>,
}

impl HttpClient {
    /// Creates a new HttpClient from scan configuration
    pub fn from_config(config: &ScanConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::limited(10)
            } else {
                reqwest::redirect::Policy::none()
            })
            .danger_accept_invalid_certs(false)
            // accept the lax header syntax browsers accept
            .http1_allow_spaces_after_header_name_in_responses(true)
            .http1_allow_obsolete_multiline_headers_in_responses(true)
            .http1_ignore_invalid_headers_in_responses(true);

        if let Some(ref proxy_url) = config.proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| JanusError::Config(format!("Invalid proxy URL: {e}")))?;
            builder = builder.proxy(proxy);
        }

        Ok(Self {
            client: builder.build()?,
            request_count: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Sends a bodiless GET
    pub async fn get(&self, url: &str) -> Result<ProbeResponse> {
        self.send(&ProbeRequest::get(url)).await
    }

    /// Dispatches `request` once and snapshots the response
    pub async fn send(&self, request: &ProbeRequest) -> Result<ProbeResponse> {
        let method = Method::from_bytes(request.method.as_bytes()).map_err(|_| {
            JanusError::InvalidTarget(format!("invalid HTTP method '{}'", request.method))
        })?;

        let mut req = self.client.request(method, request.url()?);
        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        if let Some(ref body) = request.body {
            req = req.body(body.clone());
        }

        self.request_count.fetch_add(1, Ordering::Relaxed);

        let response = req.send().await?;
        let status = response.status().as_u16();
        let url = response.url().to_string();
        let raw_headers = serialize_headers(response.headers());
        debug!("Response: {status} for {url}");

        let body = read_body(response, &url).await;

        Ok(ProbeResponse {
            status,
            url,
            raw_headers,
            body,
        })
    }

    /// Like [`HttpClient::send`], but gives up as soon as `cancel` fires.
    /// Dropping the in-flight future closes its connection.
    pub async fn send_cancellable(
        &self,
        request: &ProbeRequest,
        cancel: &CancelToken,
    ) -> Result<ProbeResponse> {
        if cancel.is_cancelled() {
            return Err(JanusError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Request to {} cancelled", request.uri);
                Err(JanusError::Cancelled)
            }
            res = self.send(request) => res,
        }
    }

    /// Returns the total number of requests made
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }
}

/// Reads at most [`MAX_BODY_BYTES`] of the body. The status line and headers
/// are already captured, so a body cut short by the peer or the deadline
/// keeps whatever arrived instead of failing the request.
async fn read_body(mut response: Response, url: &str) -> String {
    let mut body = Vec::new();
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let room = MAX_BODY_BYTES - body.len();
                if chunk.len() > room {
                    body.extend_from_slice(&chunk[..room]);
                    debug!("Body of {url} truncated at {MAX_BODY_BYTES} bytes");
                    break;
                }
                body.extend_from_slice(&chunk);
            }
            Ok(None) => break,
            Err(e) => {
                debug!("Body of {url} ended after {} bytes: {e}", body.len());
                break;
            }
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

/// Renders a header map as a wire-style block: one `Name: value\r\n` line per
/// occurrence, names in canonical capitalization, values byte-for-byte
/// (lossy for non-UTF-8).
pub fn serialize_headers(headers: &HeaderMap) -> String {
    let mut block = String::new();
    for (name, value) in headers {
        block.push_str(&canonical_name(name.as_str()));
        block.push_str(": ");
        block.push_str(&String::from_utf8_lossy(value.as_bytes()));
        block.push_str("\r\n");
    }
    block
}

/// `access-control-allow-origin` -> `Access-Control-Allow-Origin`
fn canonical_name(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}
