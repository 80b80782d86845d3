//! Update dispatcher
//!
//! Wraps a [`DnsProvider`] with the retry policy and turns its result into a
//! [`DispatchOutcome`]:
//!
//! | Provider result                         | Outcome            | Retried in-cycle |
//! |-----------------------------------------|--------------------|------------------|
//! | `Ok(response)`                          | `Success`          | -                |
//! | `Error::Rejected` / `Error::Authentication` / `Error::Config` | `Rejected` | never |
//! | timeout, network, 5xx, 429, anything else | `TransientFailure` | up to `max_retries` |
//!
//! With the default `max_retries = 0` a transient failure simply ends the
//! cycle and the next scheduled cycle retries the same change.

use std::time::Duration;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::traits::{DnsProvider, ProviderResponse, UpdateRequest};

/// Classified result of one dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The provider accepted the address
    Success(ProviderResponse),
    /// The provider refused the update (credentials, unknown record, ...)
    Rejected(String),
    /// Network, timeout or server-side failure
    TransientFailure(String),
}

/// Provider call with timeout and retry policy
pub struct UpdateDispatcher {
    provider: Box<dyn DnsProvider>,
    timeout: Duration,
    max_retries: usize,
    retry_delay: Duration,
}

impl UpdateDispatcher {
    /// Create a dispatcher for the given provider
    pub fn new(provider: Box<dyn DnsProvider>, config: &EngineConfig) -> Self {
        Self {
            provider,
            timeout: config.dispatch_timeout(),
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
        }
    }

    /// Name of the wrapped provider
    pub fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }

    /// Call the provider and classify the result
    pub async fn dispatch(&self, request: &UpdateRequest) -> DispatchOutcome {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            match self.attempt(request).await {
                Ok(response) => {
                    debug!(
                        "Provider {} accepted {} -> {} (status {})",
                        self.provider_name(),
                        request.hostname,
                        request.address,
                        response.status
                    );
                    return DispatchOutcome::Success(response);
                }
                Err(e) if e.is_rejection() => {
                    return DispatchOutcome::Rejected(e.to_string());
                }
                Err(e) => {
                    warn!(
                        "Update attempt {} failed for {}: {}",
                        attempt, request.hostname, e
                    );
                    last_error = Some(e);

                    if attempt < self.max_retries {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        let error = last_error.unwrap_or_else(|| Error::other("Unknown error"));
        DispatchOutcome::TransientFailure(error.to_string())
    }

    /// Perform a single bounded provider call
    async fn attempt(&self, request: &UpdateRequest) -> Result<ProviderResponse> {
        match tokio::time::timeout(self.timeout, self.provider.update_record(request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(format!(
                "provider {} did not answer within {:?}",
                self.provider_name(),
                self.timeout
            ))),
        }
    }
}
