//! Keyed configuration lookup.
//!
//! Components resolve settings by the key names the service has always used
//! (`CustomerOrderingUri`, `ClientId`, ...). [`EnvConfig`] reads them from the
//! process environment, trying the key verbatim first and then its
//! SCREAMING_SNAKE_CASE spelling, so `CustomerOrderingUri` can be provided as
//! `CUSTOMER_ORDERING_URI` in a `.env` file.
use std::collections::HashMap;

use crate::util::env::env_opt;

/// Well-known configuration keys.
pub mod keys {
    pub const CLIENT_ID: &str = "ClientId";
    pub const CLIENT_SECRET: &str = "ClientSecret";
    pub const PRODUCT_CONNECTION: &str = "ProductConnection";
    pub const CUSTOMER_AUTH_SERVER_URL: &str = "CustomerAuthServerUrl";
    pub const STAFF_AUTH_SERVER_URL: &str = "StaffAuthServerUrl";
    pub const CUSTOMER_AUTH_SERVER_URL_KEY: &str = "CustomerAuthServerUrlKey";
    pub const CUSTOMER_ORDERING_API_KEY: &str = "CustomerOrderingAPIKey";
    pub const CUSTOMER_ORDERING_SCOPE_KEY: &str = "CustomerOrderingScopeKey";
    pub const CUSTOMER_ORDERING_URI: &str = "CustomerOrderingUri";
    pub const CUSTOMER_ORDERING_URL: &str = "CustomerOrderingUrl";
    pub const CUSTOMER_ORDERING_SCOPE: &str = "CustomerOrderingScope";
    pub const CUSTOMER_JWT_SECRET: &str = "CUSTOMER_JWT_SECRET";
    pub const STAFF_JWT_SECRET: &str = "STAFF_JWT_SECRET";

    /// Name of the outbound HTTP client used for the ordering integration.
    pub const CUSTOMER_ORDERING_CLIENT: &str = "CustomerOrderingAPI";
}

/// Read-only access to configuration values. Empty values count as missing.
pub trait ConfigLookup: Send + Sync {
    fn value(&self, key: &str) -> Option<String>;
}

/// Process environment (after dotenv) lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvConfig;

impl ConfigLookup for EnvConfig {
    fn value(&self, key: &str) -> Option<String> {
        if key.trim().is_empty() {
            return None;
        }
        env_opt(key).or_else(|| {
            let alt = screaming_snake(key);
            if alt == key {
                None
            } else {
                env_opt(&alt)
            }
        })
    }
}

/// In-memory configuration, used by tests and by embedders that assemble
/// settings themselves.
#[derive(Debug, Clone, Default)]
pub struct MapConfig {
    values: HashMap<String, String>,
}

impl MapConfig {
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn remove(&mut self, key: &str) -> &mut Self {
        self.values.remove(key);
        self
    }
}

impl ConfigLookup for MapConfig {
    fn value(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .filter(|v| !v.trim().is_empty())
            .cloned()
    }
}

/// `CustomerOrderingAPIKey` -> `CUSTOMER_ORDERING_API_KEY`.
pub fn screaming_snake(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut out = String::with_capacity(key.len() + 8);
    for (i, &c) in chars.iter().enumerate() {
        if c == '-' || c == '.' || c == ':' {
            out.push('_');
            continue;
        }
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            if prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_lower)
            {
                out.push('_');
            }
        }
        out.push(c.to_ascii_uppercase());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screaming_snake_handles_acronyms() {
        assert_eq!(screaming_snake("CustomerOrderingUri"), "CUSTOMER_ORDERING_URI");
        assert_eq!(screaming_snake("CustomerOrderingAPIKey"), "CUSTOMER_ORDERING_API_KEY");
        assert_eq!(screaming_snake("ClientId"), "CLIENT_ID");
        assert_eq!(screaming_snake("DATABASE_URL"), "DATABASE_URL");
    }

    #[test]
    fn map_config_treats_blank_as_missing() {
        let cfg = MapConfig::from_pairs([("a", "1"), ("b", ""), ("c", "   ")]);
        assert_eq!(cfg.value("a").as_deref(), Some("1"));
        assert_eq!(cfg.value("b"), None);
        assert_eq!(cfg.value("c"), None);
        assert_eq!(cfg.value("missing"), None);
    }

    #[test]
    fn env_config_falls_back_to_screaming_snake() {
        std::env::set_var("CPS_TEST_ORDERING_URI", "/api/Product/");
        let cfg = EnvConfig;
        assert_eq!(
            cfg.value("CpsTestOrderingUri").as_deref(),
            Some("/api/Product/")
        );
        assert_eq!(cfg.value(""), None);
    }
}
