// # Daemon configuration
//
// Everything ddnsd needs is read from environment variables. The account
// settings (DDNS_API_KEY and friends) are optional: when present they are
// written into the settings store, when absent the stored configuration is
// used as-is.

use anyhow::Result;
use ddns_core::config::{IpVersion, ResolverConfig, parse_interval};
use ddns_core::{Configuration, EngineConfig, ProviderConfig};
use ddns_ip_http::{DEFAULT_IP_SERVICES, failover_bound};
use ddns_provider_http::{presets, template};
use std::path::PathBuf;
use std::time::Duration;

/// Interval bounds accepted from the environment
const MIN_INTERVAL: Duration = Duration::from_secs(60);
const MAX_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Daemon configuration
#[derive(Debug)]
pub struct DaemonConfig {
    pub settings_path: Option<PathBuf>,
    pub account: Option<AccountConfig>,
    pub ip_source_urls: Vec<String>,
    pub ip_version: IpVersion,
    pub max_retries: usize,
    pub retry_delay_secs: u64,
    pub timeout_secs: u64,
    pub log_level: String,
    pub dry_run: bool,
}

/// Account settings supplied through the environment
pub struct AccountConfig {
    pub endpoint: String,
    pub username: Option<String>,
    /// ⚠️ NEVER log this value
    api_key: String,
    pub record_id: Option<String>,
    pub hostname: Option<String>,
    pub interval: Duration,
    pub ttl: u32,
    pub enabled: bool,
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("api_key", &"<REDACTED>")
            .field("record_id", &self.record_id)
            .field("hostname", &self.hostname)
            .field("interval", &self.interval)
            .field("ttl", &self.ttl)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl DaemonConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let account = match var("DDNS_API_KEY") {
            Some(api_key) => Some(AccountConfig {
                endpoint: var("DDNS_ENDPOINT")
                    .unwrap_or_else(|| presets::SITELUTIONS_ENDPOINT.to_string()),
                username: var("DDNS_USERNAME"),
                api_key,
                record_id: var("DDNS_RECORD_ID"),
                hostname: var("DDNS_HOSTNAME"),
                interval: match var("DDNS_INTERVAL") {
                    Some(raw) => parse_interval(&raw)
                        .map_err(|e| anyhow::anyhow!("DDNS_INTERVAL: {}", e))?,
                    None => Duration::from_secs(60 * 60),
                },
                ttl: parse_number(&var, "DDNS_TTL")?.unwrap_or(presets::SITELUTIONS_TTL),
                enabled: match var("DDNS_ENABLED") {
                    Some(raw) => parse_bool("DDNS_ENABLED", &raw)?,
                    None => true,
                },
            }),
            None => None,
        };

        let ip_source_urls = match var("DDNS_IP_SOURCE_URLS") {
            Some(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => DEFAULT_IP_SERVICES.iter().map(|s| s.to_string()).collect(),
        };

        let ip_version = match var("DDNS_IP_VERSION") {
            Some(raw) => raw.parse().map_err(|e| anyhow::anyhow!("DDNS_IP_VERSION: {}", e))?,
            None => IpVersion::Both,
        };

        let dry_run = match var("DDNS_MODE").as_deref() {
            None | Some("live") => false,
            Some("dry-run") => true,
            Some(other) => anyhow::bail!(
                "DDNS_MODE '{}' is not valid. Valid modes: live, dry-run",
                other
            ),
        };

        Ok(Self {
            settings_path: var("DDNS_SETTINGS_PATH").map(PathBuf::from),
            account,
            ip_source_urls,
            ip_version,
            max_retries: parse_number(&var, "DDNS_MAX_RETRIES")?.unwrap_or(0),
            retry_delay_secs: parse_number(&var, "DDNS_RETRY_DELAY_SECS")?.unwrap_or(5),
            timeout_secs: parse_number(&var, "DDNS_TIMEOUT_SECS")?.unwrap_or(10),
            log_level: var("DDNS_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            dry_run,
        })
    }

    /// Validate the configuration
    ///
    /// This performs validation including:
    /// - Required account fields for the chosen endpoint
    /// - Placeholder credentials
    /// - Numeric ranges
    /// - URL schemes
    pub fn validate(&self) -> Result<()> {
        if let Some(account) = &self.account {
            account.validate()?;
        }

        if self.ip_source_urls.is_empty() {
            anyhow::bail!("DDNS_IP_SOURCE_URLS must contain at least one URL");
        }

        for url in &self.ip_source_urls {
            if !url.starts_with("https://") && !url.starts_with("http://") {
                anyhow::bail!(
                    "DDNS_IP_SOURCE_URLS entries must use HTTP or HTTPS scheme. Got: {}",
                    url
                );
            }

            if url.starts_with("http://") {
                eprintln!(
                    "WARNING: {} uses HTTP (not HTTPS). The reported address could be tampered with.",
                    url
                );
            }
        }

        if self.max_retries > 10 {
            anyhow::bail!(
                "DDNS_MAX_RETRIES must be between 0 and 10. Got: {}",
                self.max_retries
            );
        }

        if !(1..=300).contains(&self.retry_delay_secs) {
            anyhow::bail!(
                "DDNS_RETRY_DELAY_SECS must be between 1 and 300 seconds. Got: {}",
                self.retry_delay_secs
            );
        }

        if !(1..=120).contains(&self.timeout_secs) {
            anyhow::bail!(
                "DDNS_TIMEOUT_SECS must be between 1 and 120 seconds. Got: {}",
                self.timeout_secs
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "DDNS_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Settings file location: DDNS_SETTINGS_PATH or the platform config dir
    pub fn settings_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.settings_path {
            return Ok(path.clone());
        }

        dirs::config_dir()
            .map(|dir| dir.join("ddns").join("settings.json"))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Could not determine the configuration directory. \
                    Set it via: export DDNS_SETTINGS_PATH=/var/lib/ddns/settings.json"
                )
            })
    }

    /// Configuration to store, if the environment carries account settings
    pub fn configuration(&self) -> Option<Configuration> {
        self.account.as_ref().map(AccountConfig::to_configuration)
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            urls: self.ip_source_urls.clone(),
            version: self.ip_version,
        }
    }

    /// DDNS_TIMEOUT_SECS bounds each request; resolution as a whole gets
    /// room to try every discovery service in turn
    pub fn engine_config(&self) -> EngineConfig {
        let resolve_timeout = failover_bound(self.timeout(), self.ip_source_urls.len());

        EngineConfig {
            resolve_timeout_secs: resolve_timeout.as_secs(),
            dispatch_timeout_secs: self.timeout_secs,
            max_retries: self.max_retries,
            retry_delay_secs: self.retry_delay_secs,
            ..EngineConfig::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AccountConfig {
    fn validate(&self) -> Result<()> {
        let key_lower = self.api_key.to_lowercase();
        if key_lower.contains("your_key")
            || key_lower.contains("your_api_key")
            || key_lower.contains("replace_me")
            || key_lower == "key"
        {
            anyhow::bail!(
                "DDNS_API_KEY appears to be a placeholder. \
                Use the API key from your DNS provider account."
            );
        }

        template::validate(&self.endpoint).map_err(|e| anyhow::anyhow!("DDNS_ENDPOINT: {}", e))?;

        if template::uses_record_id(&self.endpoint) && self.record_id.is_none() {
            anyhow::bail!(
                "DDNS_RECORD_ID is required by the update endpoint. \
                Set it via: export DDNS_RECORD_ID=12345"
            );
        }

        if self.endpoint.contains("{username}") && self.username.is_none() {
            anyhow::bail!(
                "DDNS_USERNAME is required by the update endpoint. \
                Set it via: export DDNS_USERNAME=you@example.com"
            );
        }

        match &self.hostname {
            Some(hostname) => validate_domain_name(hostname)?,
            None => anyhow::bail!(
                "DDNS_HOSTNAME is required. Set it via: export DDNS_HOSTNAME=home.example.com"
            ),
        }

        if !(MIN_INTERVAL..=MAX_INTERVAL).contains(&self.interval) {
            anyhow::bail!(
                "DDNS_INTERVAL must be between 60 seconds and 7 days. Got: {}s",
                self.interval.as_secs()
            );
        }

        self.to_configuration()
            .validate()
            .map_err(|e| anyhow::anyhow!("{}", e))
    }

    fn to_configuration(&self) -> Configuration {
        let mut provider = ProviderConfig::new(&self.endpoint, &self.api_key).with_ttl(self.ttl);
        if let Some(username) = &self.username {
            provider = provider.with_username(username);
        }
        if let Some(record_id) = &self.record_id {
            provider = provider.with_record_id(record_id);
        }

        Configuration::new(
            provider,
            self.hostname.clone().unwrap_or_default(),
            self.interval,
        )
        .with_enabled(self.enabled)
    }
}

fn parse_number<T, F>(var: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    var(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| anyhow::anyhow!("{} must be a number. Got '{}': {}", key, raw, e))
        })
        .transpose()
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("{} must be true or false. Got: {}", key, raw),
    }
}

/// Validate that a string is a valid domain name
///
/// This implements basic DNS domain name validation per RFC 1035.
/// It's not comprehensive but catches common errors.
fn validate_domain_name(domain: &str) -> Result<()> {
    if domain.len() > 253 {
        anyhow::bail!(
            "Domain name too long: {} chars (max 253). Got: {}",
            domain.len(),
            domain
        );
    }

    for label in domain.split('.') {
        if label.is_empty() {
            anyhow::bail!("Domain name has empty label: '{}'", domain);
        }

        if label.len() > 63 {
            anyhow::bail!(
                "Domain label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            );
        }

        if !label.chars().all(|c| c.is_alphanumeric() || c == '-') {
            anyhow::bail!(
                "Domain label contains invalid characters. Label: '{}'. \
                Valid: alphanumeric and hyphen only.",
                label
            );
        }

        if label.starts_with('-') || label.ends_with('-') {
            anyhow::bail!(
                "Domain label cannot start or end with hyphen. Label: '{}'",
                label
            );
        }
    }

    Ok(())
}
