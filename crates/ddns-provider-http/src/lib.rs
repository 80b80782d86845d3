// # HTTP Template Provider
//
// This crate provides a DNS provider for update endpoints that take the new
// address in a single GET request (Sitelutions `dnsup`, dyndns-style
// `nic/update` and compatible services).
//
// ## Behavior
//
// - One GET request per update, URL rendered from the configured template
// - No retry logic (owned by UpdateDispatcher)
// - No access to the settings store (owned by UpdateEngine)
// - Dry-run mode renders and logs the request without sending it
//
// ## Response classification
//
// | Response                                      | Result                  |
// |-----------------------------------------------|-------------------------|
// | 2xx, body starts with a rejection marker      | `Error::Rejected`       |
// | 2xx otherwise                                 | success                 |
// | 401, 403                                      | `Error::Authentication` |
// | 408                                           | `Error::Timeout`        |
// | 429                                           | `Error::RateLimited`    |
// | other 4xx                                     | `Error::Rejected`       |
// | 5xx                                           | `Error::Http`           |
//
// Markers are matched case-insensitively against the start of the trimmed
// body, so a provider answering `badauth` with `200 OK` is still a refusal.
//
// ## Security Requirements
//
// - The credential NEVER appears in logs or error messages: logged URLs are
//   rendered with the credential masked, and transport errors are stripped of
//   their URL

pub mod presets;
pub mod template;

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderResponse, UpdateRequest};
use ddns_core::{Error, Result};
use reqwest::StatusCode;
use std::time::Duration;

/// Default HTTP timeout for update requests (10 seconds)
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest response excerpt kept in messages
const MAX_MESSAGE_CHARS: usize = 200;

/// Bytes of a response body read; classification only looks at the start
const MAX_BODY_BYTES: usize = 4096;

/// Template-driven HTTP provider
///
/// Stateless: endpoint and credentials come with each [`UpdateRequest`].
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the provider will:
/// - Render the request URL (so template errors still surface)
/// - Log the request with the credential masked
/// - **NOT** send anything, and report success
#[derive(Debug, Clone)]
pub struct HttpTemplateProvider {
    /// HTTP client for update requests
    client: reqwest::Client,

    /// Dry-run mode: render and log, but skip the request
    dry_run: bool,
}

impl HttpTemplateProvider {
    /// Create a new provider
    ///
    /// # Parameters
    ///
    /// - `timeout`: Upper bound for one update request
    /// - `dry_run`: If true, log requests instead of sending them
    pub fn new(timeout: Duration, dry_run: bool) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ddns-provider-http/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, dry_run })
    }

    /// Create a provider in live mode with the default timeout
    pub fn new_live() -> Result<Self> {
        Self::new(DEFAULT_HTTP_TIMEOUT, false)
    }

    /// Create a provider in dry-run mode with the default timeout
    pub fn new_dry_run() -> Result<Self> {
        Self::new(DEFAULT_HTTP_TIMEOUT, true)
    }

    /// Whether requests are only logged
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

#[async_trait]
impl DnsProvider for HttpTemplateProvider {
    /// Publish the request's address
    ///
    /// # Returns
    ///
    /// - `Ok(ProviderResponse)`: The endpoint accepted the update
    /// - `Err(Error)`: Classified per the table in the crate docs
    async fn update_record(&self, request: &UpdateRequest) -> Result<ProviderResponse> {
        let template = &request.provider.endpoint_template;
        let url = template::render(template, request)?;
        let shown = template::redacted(template, request)?;

        tracing::info!(
            "Updating {} -> {} via {} [mode: {}]",
            request.hostname,
            request.address,
            shown,
            if self.dry_run { "DRY-RUN" } else { "LIVE" }
        );

        if self.dry_run {
            tracing::info!("[DRY-RUN] Would send GET {}", shown);
            return Ok(ProviderResponse {
                status: StatusCode::OK.as_u16(),
                message: "dry-run".to_string(),
            });
        }

        let response = self.client.get(&url).send().await.map_err(|e| {
            let timed_out = e.is_timeout();
            let e = e.without_url();
            if timed_out {
                Error::timeout(format!("GET {}: {}", shown, e))
            } else {
                Error::http(format!("GET {} failed: {}", shown, e))
            }
        })?;

        let status = response.status();
        let body = read_body(response).await?;

        let result = classify(status, &body, &request.provider.rejection_markers);
        match &result {
            Ok(response) => tracing::debug!("Update endpoint answered {}: {}", status, response.message),
            Err(e) => tracing::debug!("Update endpoint answered {}: {}", status, e),
        }
        result
    }

    fn provider_name(&self) -> &'static str {
        "http"
    }
}

/// Map an endpoint answer to success or a classified error
pub fn classify(status: StatusCode, body: &str, rejection_markers: &[String]) -> Result<ProviderResponse> {
    let message = truncate(body.trim(), MAX_MESSAGE_CHARS);

    if status.is_success() {
        let lowered = message.to_lowercase();
        if let Some(marker) = rejection_markers
            .iter()
            .find(|marker| !marker.is_empty() && lowered.starts_with(&marker.to_lowercase()))
        {
            return Err(Error::rejected(format!(
                "endpoint answered '{}' (matched '{}')",
                message, marker
            )));
        }

        return Ok(ProviderResponse {
            status: status.as_u16(),
            message,
        });
    }

    match status.as_u16() {
        401 | 403 => Err(Error::auth(format!(
            "Invalid credentials or insufficient permissions. Status: {} - {}",
            status, message
        ))),
        408 => Err(Error::timeout(format!("Endpoint timed out. Status: {}", status))),
        429 => Err(Error::rate_limited(format!(
            "Rate limit exceeded. Please retry later. Status: {}",
            status
        ))),
        400..=499 => Err(Error::rejected(format!("Status: {} - {}", status, message))),
        500..=599 => Err(Error::http(format!(
            "Server error (transient): {} - {}",
            status, message
        ))),
        _ => Err(Error::provider(
            "http",
            format!("Unexpected status: {} - {}", status, message),
        )),
    }
}

/// Read at most [`MAX_BODY_BYTES`] of the body
async fn read_body(mut response: reqwest::Response) -> Result<String> {
    let mut bytes = Vec::new();

    while bytes.len() < MAX_BODY_BYTES {
        let chunk = response
            .chunk()
            .await
            .map_err(|e| Error::http(format!("Failed to read response: {}", e.without_url())))?;
        match chunk {
            Some(chunk) => bytes.extend_from_slice(&chunk),
            None => break,
        }
    }

    bytes.truncate(MAX_BODY_BYTES);
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => format!("{}...", &text[..index]),
        None => text.to_string(),
    }
}
