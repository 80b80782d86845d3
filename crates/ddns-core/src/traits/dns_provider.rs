// # DNS Provider Trait
//
// Defines the interface for calling a provider's update endpoint.
//
// ## Implementations
//
// - URL-template HTTP endpoints (Sitelutions and compatible): `ddns-provider-http` crate
//
// ## Usage
//
// ```rust,ignore
// use ddns_core::traits::{DnsProvider, UpdateRequest};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* DnsProvider implementation */;
//
//     let request = UpdateRequest::new("home.example.net", address, provider_config);
//     let response = provider.update_record(&request).await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::IpAddr;

use crate::config::ProviderConfig;

/// One provider update call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    /// Hostname being updated
    pub hostname: String,
    /// Address to publish
    pub address: IpAddr,
    /// Endpoint and credentials, snapshotted at the start of the cycle
    pub provider: ProviderConfig,
}

impl UpdateRequest {
    /// Create a new update request
    pub fn new(hostname: impl Into<String>, address: IpAddr, provider: ProviderConfig) -> Self {
        Self {
            hostname: hostname.into(),
            address,
            provider,
        }
    }
}

/// Successful provider answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResponse {
    /// HTTP status code
    pub status: u16,
    /// Trimmed response body
    pub message: String,
}

/// Trait for DNS provider implementations
///
/// # Contract
///
/// Providers are stateless and single-shot:
/// - One update call per invocation
/// - No retry logic or backoff (owned by `UpdateDispatcher`)
/// - No access to the settings store (owned by `UpdateEngine`)
/// - No decision about whether an update is needed (owned by the change detector)
/// - The credential never appears in logs or error messages
///
/// # Error mapping
///
/// The dispatcher classifies the returned error:
/// - [`crate::Error::Rejected`] / [`crate::Error::Authentication`]: the provider
///   refused the update; surfaced to the user, not retried automatically
/// - [`crate::Error::Config`]: no request can be built from the configuration;
///   handled like a rejection
/// - anything else: transient, retried on the next cycle
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Publish `request.address` for `request.hostname`
    async fn update_record(&self, request: &UpdateRequest) -> Result<ProviderResponse, crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}
