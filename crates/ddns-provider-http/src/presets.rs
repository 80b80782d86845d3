//! Ready-made provider configurations

use ddns_core::ProviderConfig;

/// Sitelutions dynamic DNS update endpoint
pub const SITELUTIONS_ENDPOINT: &str = "https://api2.sitelutions.com/dnsup?user={username}&pass={credential}&id={record_id}&ip={address}&ttl={ttl}";

/// TTL Sitelutions records are updated with
pub const SITELUTIONS_TTL: u32 = 60;

/// Sitelutions account: e-mail, API key and the numeric record id
pub fn sitelutions(
    email: impl Into<String>,
    api_key: impl Into<String>,
    record_id: impl Into<String>,
) -> ProviderConfig {
    ProviderConfig::new(SITELUTIONS_ENDPOINT, api_key)
        .with_username(email)
        .with_record_id(record_id)
        .with_ttl(SITELUTIONS_TTL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template;
    use ddns_core::traits::UpdateRequest;

    #[test]
    fn sitelutions_request_url() {
        let request = UpdateRequest::new(
            "home.example.net",
            "198.51.100.20".parse().unwrap(),
            sitelutions("me@example.net", "key123", "98765"),
        );

        let url = template::render(&request.provider.endpoint_template, &request).unwrap();
        assert_eq!(
            url,
            "https://api2.sitelutions.com/dnsup?user=me%40example.net&pass=key123&id=98765&ip=198.51.100.20&ttl=60"
        );
    }

    #[test]
    fn sitelutions_preset_is_valid() {
        let config = sitelutions("me@example.net", "key123", "98765");
        assert!(config.validate(true).is_ok());
        assert!(template::validate(&config.endpoint_template).is_ok());
    }
}
