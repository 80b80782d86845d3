//! Configuration types for the DDNS client
//!
//! [`Configuration`] is what the user edits and what the settings store
//! persists. [`EngineConfig`] and [`ResolverConfig`] describe how the process
//! runs and are supplied by the embedding application.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Interval choices offered to the user
pub const INTERVAL_PRESETS: &[(&str, Duration)] = &[
    ("60 minutes", Duration::from_secs(60 * 60)),
    ("4 hours", Duration::from_secs(4 * 60 * 60)),
    ("6 hours", Duration::from_secs(6 * 60 * 60)),
    ("24 hours", Duration::from_secs(24 * 60 * 60)),
];

/// User configuration for the update loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    /// Provider endpoint and credentials
    pub provider: ProviderConfig,

    /// DNS hostname kept in sync
    pub hostname: String,

    /// Time between scheduled cycles
    #[serde(rename = "interval_secs", with = "duration_secs")]
    pub interval: Duration,

    /// Whether scheduled cycles run at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Configuration {
    /// Create an enabled configuration
    pub fn new(provider: ProviderConfig, hostname: impl Into<String>, interval: Duration) -> Self {
        Self {
            provider,
            hostname: hostname.into(),
            interval,
            enabled: true,
        }
    }

    /// Enable or disable scheduled cycles
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Validate the configuration
    ///
    /// - interval must be greater than zero
    /// - hostname and credential must be set when the configuration is enabled
    /// - the endpoint template must be an http(s) URL
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.check(self.enabled)
    }

    /// Validate as if the configuration were enabled
    ///
    /// A disabled configuration may be incomplete, but a manual update still
    /// needs everything an enabled one does.
    pub fn validate_runnable(&self) -> Result<(), crate::Error> {
        self.check(true)
    }

    fn check(&self, enabled: bool) -> Result<(), crate::Error> {
        if self.interval.is_zero() {
            return Err(crate::Error::config("Update interval must be > 0"));
        }

        if enabled && self.hostname.trim().is_empty() {
            return Err(crate::Error::config(
                "Hostname cannot be empty when updates are enabled",
            ));
        }

        self.provider.validate(enabled)
    }
}

/// Provider endpoint configuration
///
/// The endpoint is a URL template. Placeholders are substituted per request:
/// `{hostname}`, `{address}`, `{username}`, `{credential}`, `{record_id}`, `{ttl}`.
///
/// # Security
///
/// The Debug implementation does NOT expose the credential.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Update endpoint URL template
    pub endpoint_template: String,

    /// Account name (Sitelutions uses the account e-mail)
    #[serde(default)]
    pub username: String,

    /// API key or password
    /// ⚠️ NEVER log this value
    pub credential: String,

    /// Provider-side record identifier, if the provider addresses records by id
    #[serde(default)]
    pub record_id: Option<String>,

    /// TTL requested for the record
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Response body prefixes that mean the provider refused the update,
    /// even when it answered with a 2xx status
    #[serde(default = "default_rejection_markers")]
    pub rejection_markers: Vec<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("endpoint_template", &self.endpoint_template)
            .field("username", &self.username)
            .field("credential", &"<REDACTED>")
            .field("record_id", &self.record_id)
            .field("ttl", &self.ttl)
            .field("rejection_markers", &self.rejection_markers)
            .finish()
    }
}

impl ProviderConfig {
    /// Create a provider configuration with default TTL and rejection markers
    pub fn new(endpoint_template: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            endpoint_template: endpoint_template.into(),
            username: String::new(),
            credential: credential.into(),
            record_id: None,
            ttl: default_ttl(),
            rejection_markers: default_rejection_markers(),
        }
    }

    /// Set the account name
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Set the provider-side record id
    pub fn with_record_id(mut self, record_id: impl Into<String>) -> Self {
        self.record_id = Some(record_id.into());
        self
    }

    /// Set the TTL
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Validate the provider configuration
    pub fn validate(&self, enabled: bool) -> Result<(), crate::Error> {
        let template = self.endpoint_template.trim();
        if template.is_empty() {
            return Err(crate::Error::config("Provider endpoint template cannot be empty"));
        }

        if !template.starts_with("https://") && !template.starts_with("http://") {
            return Err(crate::Error::config(format!(
                "Provider endpoint must use HTTP or HTTPS scheme. Got: {}",
                template
            )));
        }

        if enabled && self.credential.is_empty() {
            return Err(crate::Error::config(
                "Provider credential cannot be empty when updates are enabled",
            ));
        }

        Ok(())
    }
}

/// Address resolver configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Discovery services, tried in order until one answers
    pub urls: Vec<String>,

    /// Address family to accept
    #[serde(default = "default_ip_version")]
    pub version: IpVersion,
}

impl ResolverConfig {
    /// Validate the resolver configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.urls.is_empty() {
            return Err(crate::Error::config("At least one address discovery URL is required"));
        }

        for url in &self.urls {
            if !url.starts_with("https://") && !url.starts_with("http://") {
                return Err(crate::Error::config(format!(
                    "Address discovery URL must use HTTP or HTTPS scheme. Got: {}",
                    url
                )));
            }
        }

        Ok(())
    }
}

/// IP version to accept from the resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpVersion {
    /// IPv4 only
    V4,
    /// IPv6 only
    V6,
    /// Either family
    Both,
}

impl IpVersion {
    /// Whether an address belongs to an accepted family
    pub fn accepts(&self, address: &std::net::IpAddr) -> bool {
        match self {
            IpVersion::V4 => address.is_ipv4(),
            IpVersion::V6 => address.is_ipv6(),
            IpVersion::Both => true,
        }
    }
}

impl std::str::FromStr for IpVersion {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "v4" | "ipv4" | "4" => Ok(IpVersion::V4),
            "v6" | "ipv6" | "6" => Ok(IpVersion::V6),
            "both" | "any" => Ok(IpVersion::Both),
            other => Err(crate::Error::config(format!(
                "Unknown IP version '{}'. Valid: v4, v6, both",
                other
            ))),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound for one address resolution (in seconds)
    #[serde(default = "default_resolve_timeout_secs")]
    pub resolve_timeout_secs: u64,

    /// Upper bound for one provider call (in seconds)
    #[serde(default = "default_dispatch_timeout_secs")]
    pub dispatch_timeout_secs: u64,

    /// Extra attempts for transient provider failures within the same cycle
    ///
    /// Defaults to 0: a transient failure is retried by the next cycle.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Delay between in-cycle retry attempts (in seconds)
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Capacity of the engine event channel
    ///
    /// When full, events are dropped with a warning log.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.resolve_timeout_secs == 0 {
            return Err(crate::Error::config("Resolve timeout must be > 0"));
        }
        if self.dispatch_timeout_secs == 0 {
            return Err(crate::Error::config("Dispatch timeout must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            resolve_timeout_secs: default_resolve_timeout_secs(),
            dispatch_timeout_secs: default_dispatch_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

/// Parse an update interval
///
/// Accepts the presets of [`INTERVAL_PRESETS`] ("60 minutes", "4 hours", ...),
/// a number with a unit suffix (`90s`, `15m`, `6h`, `1d`, `30 minutes`), or a
/// bare number of seconds.
pub fn parse_interval(input: &str) -> Result<Duration, crate::Error> {
    let input = input.trim();

    if let Some((_, duration)) = INTERVAL_PRESETS
        .iter()
        .find(|(label, _)| label.eq_ignore_ascii_case(input))
    {
        return Ok(*duration);
    }

    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (number, unit) = input.split_at(split);

    let value: u64 = number
        .parse()
        .map_err(|_| crate::Error::config(format!("Invalid update interval: '{}'", input)))?;

    let multiplier = match unit.trim().to_lowercase().as_str() {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "m" | "min" | "mins" | "minute" | "minutes" => 60,
        "h" | "hour" | "hours" => 60 * 60,
        "d" | "day" | "days" => 24 * 60 * 60,
        other => {
            return Err(crate::Error::config(format!(
                "Unknown interval unit '{}' in '{}'",
                other, input
            )));
        }
    };

    let secs = value
        .checked_mul(multiplier)
        .ok_or_else(|| crate::Error::config(format!("Update interval too large: '{}'", input)))?;

    if secs == 0 {
        return Err(crate::Error::config("Update interval must be > 0"));
    }

    Ok(Duration::from_secs(secs))
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

fn default_enabled() -> bool {
    true
}

fn default_ttl() -> u32 {
    60
}

fn default_rejection_markers() -> Vec<String> {
    ["badauth", "nohost", "notfqdn", "abuse", "badagent", "failure", "invalid"]
        .iter()
        .map(|marker| marker.to_string())
        .collect()
}

fn default_ip_version() -> IpVersion {
    IpVersion::Both
}

fn default_resolve_timeout_secs() -> u64 {
    10
}

fn default_dispatch_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> usize {
    0
}

fn default_retry_delay_secs() -> u64 {
    5
}

fn default_event_channel_capacity() -> usize {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> ProviderConfig {
        ProviderConfig::new("https://dns.example.net/update?ip={address}", "secret-key")
    }

    #[test]
    fn test_valid_configuration() {
        let config = Configuration::new(provider(), "home.example.net", Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = Configuration::new(provider(), "home.example.net", Duration::ZERO);
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }

    #[test]
    fn test_empty_hostname_only_matters_when_enabled() {
        let config = Configuration::new(provider(), "", Duration::from_secs(60));
        assert!(config.validate().is_err());

        let disabled = config.with_enabled(false);
        assert!(disabled.validate().is_ok());
        assert!(disabled.validate_runnable().is_err());

        let complete = Configuration::new(provider(), "home.example.net", Duration::from_secs(60))
            .with_enabled(false);
        assert!(complete.validate_runnable().is_ok());
    }

    #[test]
    fn test_endpoint_scheme_required() {
        let provider = ProviderConfig::new("ftp://dns.example.net", "key");
        let config = Configuration::new(provider, "home.example.net", Duration::from_secs(60));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_credential_not_exposed_in_debug() {
        let config = Configuration::new(
            ProviderConfig::new("https://dns.example.net", "secret_token_12345"),
            "home.example.net",
            Duration::from_secs(60),
        );

        let debug_str = format!("{:?}", config);
        assert!(!debug_str.contains("secret_token_12345"));
        assert!(debug_str.contains("<REDACTED>"));
    }

    #[test]
    fn test_interval_serialized_as_seconds() {
        let config = Configuration::new(provider(), "home.example.net", Duration::from_secs(3600));
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["interval_secs"], 3600);
        assert_eq!(json["enabled"], true);
    }

    #[test]
    fn test_missing_optional_fields_use_defaults() {
        let json = r#"{
            "provider": { "endpoint_template": "https://dns.example.net", "credential": "k" },
            "hostname": "home.example.net",
            "interval_secs": 600
        }"#;

        let config: Configuration = serde_json::from_str(json).unwrap();
        assert!(config.enabled);
        assert_eq!(config.provider.ttl, 60);
        assert!(config.provider.rejection_markers.contains(&"badauth".to_string()));
    }

    #[test]
    fn test_parse_interval_presets() {
        assert_eq!(parse_interval("60 minutes").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_interval("4 hours").unwrap(), Duration::from_secs(14_400));
        assert_eq!(parse_interval("6 Hours").unwrap(), Duration::from_secs(21_600));
        assert_eq!(parse_interval("24 hours").unwrap(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_parse_interval_units() {
        assert_eq!(parse_interval("90").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_interval("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_interval("15m").unwrap(), Duration::from_secs(900));
        assert_eq!(parse_interval("2 h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_interval("1d").unwrap(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_parse_interval_rejects_garbage() {
        assert!(parse_interval("").is_err());
        assert!(parse_interval("0").is_err());
        assert!(parse_interval("soon").is_err());
        assert!(parse_interval("5 fortnights").is_err());
    }

    #[test]
    fn test_ip_version_filter() {
        let v4: std::net::IpAddr = "203.0.113.7".parse().unwrap();
        let v6: std::net::IpAddr = "2001:db8::1".parse().unwrap();

        assert!(IpVersion::V4.accepts(&v4));
        assert!(!IpVersion::V4.accepts(&v6));
        assert!(IpVersion::V6.accepts(&v6));
        assert!(IpVersion::Both.accepts(&v4));
        assert_eq!("ipv6".parse::<IpVersion>().unwrap(), IpVersion::V6);
        assert!("v5".parse::<IpVersion>().is_err());
    }

    #[test]
    fn test_engine_config_validation() {
        assert!(EngineConfig::default().validate().is_ok());

        let config = EngineConfig {
            event_channel_capacity: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
