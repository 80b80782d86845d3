// # HTTP Address Resolver
//
// This crate provides an HTTP-based address resolver for the DDNS client.
//
// ## Architecture
//
// Asks "what is my IP" services for the host's public address. Services are
// tried in order; the first one that answers with a usable address wins.
// The body is expected to be the bare address, surrounding whitespace is
// ignored.
//
// One resolution per cycle. Caching, polling and retries are not this
// crate's business: the scheduler decides when to ask again.

use ddns_core::config::{IpVersion, ResolverConfig};
use ddns_core::traits::AddressResolver;
use ddns_core::{Error, Result};

use std::net::IpAddr;
use std::time::Duration;

/// Default request timeout for discovery services
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Largest answer accepted from a discovery service; an address is far shorter
const MAX_BODY_BYTES: usize = 256;

/// Added on top of the summed per-request timeouts in [`failover_bound`]
const FAILOVER_SLACK: Duration = Duration::from_secs(1);

/// Default discovery services, in failover order
pub const DEFAULT_IP_SERVICES: &[&str] = &[
    "https://api2.sitelutions.com/myip", // Plain-text address, Sitelutions' own service
    "https://api.ipify.org",             // Plain-text address
    "https://icanhazip.com",             // Plain-text address, trailing newline
];

/// Resolver querying HTTP discovery services
#[derive(Debug, Clone)]
pub struct HttpAddressResolver {
    /// Services, tried in order
    urls: Vec<String>,

    /// Accepted address family
    version: IpVersion,

    /// Upper bound for each request
    timeout: Duration,

    /// HTTP client (carries the request timeout)
    client: reqwest::Client,
}

/// Longest a full failover pass can take: every service timing out in turn
///
/// Whoever bounds [`AddressResolver::resolve`] from outside must allow at
/// least this much, or later services are never asked.
pub fn failover_bound(per_request: Duration, services: usize) -> Duration {
    let services = u32::try_from(services).unwrap_or(u32::MAX);
    per_request
        .checked_mul(services)
        .and_then(|total| total.checked_add(FAILOVER_SLACK))
        .unwrap_or(Duration::MAX)
}

impl HttpAddressResolver {
    /// Create a resolver
    ///
    /// # Parameters
    ///
    /// - `urls`: Discovery services, tried in order
    /// - `version`: Address family to accept
    /// - `timeout`: Upper bound for each request
    pub fn new(urls: Vec<String>, version: IpVersion, timeout: Duration) -> Result<Self> {
        if urls.is_empty() {
            return Err(Error::config("At least one address discovery URL is required"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ddns-ip-http/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            urls,
            version,
            timeout,
            client,
        })
    }

    /// Create a resolver from configuration
    pub fn from_config(config: &ResolverConfig, timeout: Duration) -> Result<Self> {
        config.validate()?;
        Self::new(config.urls.clone(), config.version, timeout)
    }

    /// Resolver over [`DEFAULT_IP_SERVICES`], accepting either family
    pub fn with_defaults() -> Result<Self> {
        Self::new(
            DEFAULT_IP_SERVICES.iter().map(|url| url.to_string()).collect(),
            IpVersion::Both,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    /// Services this resolver asks, in order
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// [`failover_bound`] for this resolver's services and timeout
    pub fn failover_timeout(&self) -> Duration {
        failover_bound(self.timeout, self.urls.len())
    }

    /// Ask one service
    async fn fetch(&self, url: &str) -> Result<IpAddr> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::resolution(format!("{}: request failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::resolution(format!("{}: HTTP {}", url, status)));
        }

        if response
            .content_length()
            .is_some_and(|length| length > MAX_BODY_BYTES as u64)
        {
            return Err(Error::resolution(format!(
                "{}: response too large for an address",
                url
            )));
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::resolution(format!("{}: failed to read response: {}", url, e)))?
        {
            bytes.extend_from_slice(&chunk);
            if bytes.len() > MAX_BODY_BYTES {
                return Err(Error::resolution(format!(
                    "{}: response too large for an address",
                    url
                )));
            }
        }

        let body = String::from_utf8_lossy(&bytes);
        let body = body.trim();

        let address: IpAddr = body.parse().map_err(|_| {
            Error::resolution(format!("{}: invalid address '{}'", url, truncate(body, 64)))
        })?;

        if !self.version.accepts(&address) {
            return Err(Error::resolution(format!(
                "{}: address {} does not match requested version {:?}",
                url, address, self.version
            )));
        }

        Ok(address)
    }
}

#[async_trait::async_trait]
impl AddressResolver for HttpAddressResolver {
    async fn resolve(&self) -> Result<IpAddr> {
        let mut failures = Vec::with_capacity(self.urls.len());

        for url in &self.urls {
            match self.fetch(url).await {
                Ok(address) => {
                    tracing::debug!("Resolved public address {} via {}", address, url);
                    return Ok(address);
                }
                Err(e) => {
                    tracing::warn!("Address discovery failed: {}", e);
                    failures.push(e.to_string());
                }
            }
        }

        Err(Error::resolution(format!(
            "no discovery service answered ({})",
            failures.join("; ")
        )))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Keep error messages bounded when a service returns an HTML page
fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => format!("{}...", &text[..index]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;
    use std::future::IntoFuture;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    async fn spawn_server() -> (String, tokio::task::JoinHandle<()>) {
        let app = Router::new()
            .route("/v4", get(|| async { "203.0.113.7\n" }))
            .route("/v6", get(|| async { "  2001:db8::7  " }))
            .route("/down", get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "busy") }))
            .route("/html", get(|| async { "<html><body>Your IP is somewhere</body></html>" }))
            .route("/huge", get(|| async { "1".repeat(1024 * 1024) }))
            .route(
                "/hang",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    "198.51.100.1"
                }),
            );

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr: SocketAddr = listener.local_addr().expect("addr");
        let server = axum::serve(listener, app).into_future();
        let handle = tokio::spawn(async move {
            let _ = server.await;
        });
        (format!("http://{}", addr), handle)
    }

    fn resolver(urls: Vec<String>, version: IpVersion) -> HttpAddressResolver {
        HttpAddressResolver::new(urls, version, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn resolves_trimmed_body() {
        let (base, handle) = spawn_server().await;

        let address = resolver(vec![format!("{}/v4", base)], IpVersion::Both)
            .resolve()
            .await
            .unwrap();
        assert_eq!(address, "203.0.113.7".parse::<IpAddr>().unwrap());

        let address = resolver(vec![format!("{}/v6", base)], IpVersion::Both)
            .resolve()
            .await
            .unwrap();
        assert_eq!(address, "2001:db8::7".parse::<IpAddr>().unwrap());

        handle.abort();
    }

    #[tokio::test]
    async fn fails_over_to_next_service() {
        let (base, handle) = spawn_server().await;

        let address = resolver(
            vec![format!("{}/down", base), format!("{}/html", base), format!("{}/v4", base)],
            IpVersion::Both,
        )
        .resolve()
        .await
        .unwrap();

        assert_eq!(address, "203.0.113.7".parse::<IpAddr>().unwrap());
        handle.abort();
    }

    #[tokio::test]
    async fn version_filter_skips_wrong_family() {
        let (base, handle) = spawn_server().await;

        let address = resolver(
            vec![format!("{}/v6", base), format!("{}/v4", base)],
            IpVersion::V4,
        )
        .resolve()
        .await
        .unwrap();
        assert!(address.is_ipv4());

        let err = resolver(vec![format!("{}/v4", base)], IpVersion::V6)
            .resolve()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Resolution(_)));

        handle.abort();
    }

    #[tokio::test]
    async fn every_failure_is_a_resolution_error() {
        let (base, handle) = spawn_server().await;

        let err = resolver(
            vec![format!("{}/down", base), format!("{}/html", base)],
            IpVersion::Both,
        )
        .resolve()
        .await
        .unwrap_err();

        match err {
            Error::Resolution(message) => {
                assert!(message.contains("503"));
                assert!(message.contains("invalid address"));
            }
            other => panic!("Expected resolution error, got {:?}", other),
        }

        handle.abort();
    }

    #[tokio::test]
    async fn unreachable_service_is_a_resolution_error() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = resolver(vec![format!("http://{}/", addr)], IpVersion::Both)
            .resolve()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Resolution(_)));
    }

    #[tokio::test]
    async fn oversized_body_is_refused() {
        let (base, handle) = spawn_server().await;

        let err = resolver(vec![format!("{}/huge", base)], IpVersion::Both)
            .resolve()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("too large"));

        let address = resolver(
            vec![format!("{}/huge", base), format!("{}/v4", base)],
            IpVersion::Both,
        )
        .resolve()
        .await
        .unwrap();
        assert_eq!(address, "203.0.113.7".parse::<IpAddr>().unwrap());

        handle.abort();
    }

    #[tokio::test]
    async fn hanging_service_fails_over_within_bound() {
        let (base, handle) = spawn_server().await;

        let resolver = HttpAddressResolver::new(
            vec![format!("{}/hang", base), format!("{}/v4", base)],
            IpVersion::Both,
            Duration::from_secs(1),
        )
        .unwrap();

        let address = tokio::time::timeout(resolver.failover_timeout(), resolver.resolve())
            .await
            .expect("failover finishes within its bound")
            .unwrap();
        assert_eq!(address, "203.0.113.7".parse::<IpAddr>().unwrap());

        handle.abort();
    }

    #[test]
    fn failover_bound_covers_every_service() {
        assert_eq!(failover_bound(Duration::from_secs(10), 3), Duration::from_secs(31));
        assert_eq!(failover_bound(Duration::from_secs(10), 1), Duration::from_secs(11));
        assert_eq!(failover_bound(Duration::MAX, 2), Duration::MAX);
    }

    #[test]
    fn from_config_validates_urls() {
        let config = ResolverConfig {
            urls: vec![],
            version: IpVersion::Both,
        };
        assert!(HttpAddressResolver::from_config(&config, Duration::from_secs(5)).is_err());

        let config = ResolverConfig {
            urls: vec!["ftp://example.net/ip".to_string()],
            version: IpVersion::Both,
        };
        assert!(HttpAddressResolver::from_config(&config, Duration::from_secs(5)).is_err());
    }

    #[test]
    fn defaults_start_with_sitelutions() {
        let resolver = HttpAddressResolver::with_defaults().unwrap();
        assert_eq!(resolver.urls()[0], "https://api2.sitelutions.com/myip");
        assert_eq!(resolver.urls().len(), DEFAULT_IP_SERVICES.len());
    }

    #[test]
    fn truncate_bounds_long_bodies() {
        assert_eq!(truncate("short", 64), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }
}
