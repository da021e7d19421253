use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;
use url::Url;

use crate::config::{keys, ConfigLookup};

/// A pooled reqwest client registered under a name, optionally with a base
/// address that relative request URIs are resolved against.
#[derive(Debug, Clone)]
pub struct NamedClient {
    name: String,
    base_url: Option<Url>,
    http: reqwest::Client,
}

impl NamedClient {
    pub fn new(name: impl Into<String>, base_url: Option<Url>, http: reqwest::Client) -> Self {
        Self {
            name: name.into(),
            base_url,
            http,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Absolute URIs pass through; relative ones are joined onto the base address.
    pub fn resolve(&self, uri: &str) -> Result<Url> {
        match Url::parse(uri) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = self.base_url.as_ref().with_context(|| {
                    format!("relative uri {uri:?} but client {} has no base address", self.name)
                })?;
                base.join(uri)
                    .with_context(|| format!("joining {uri:?} onto {base}"))
            }
            Err(e) => Err(e).with_context(|| format!("invalid uri {uri:?}")),
        }
    }
}

/// Source of named HTTP clients.
pub trait HttpClientFactory: Send + Sync {
    fn create_client(&self, name: &str) -> Option<NamedClient>;
}

/// Factory holding the clients registered at startup. Clones share the
/// underlying connection pool.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredClientFactory {
    clients: HashMap<String, NamedClient>,
}

impl ConfiguredClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, client: NamedClient) -> &mut Self {
        debug!(client = client.name(), base = ?client.base_url().map(Url::as_str), "registered http client");
        self.clients.insert(client.name().to_string(), client);
        self
    }

    /// Registers the ordering client with its base address taken from
    /// `CustomerOrderingUrl`, when configured.
    pub fn from_config(config: &dyn ConfigLookup, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("customer-product-service/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to construct outbound HTTP client")?;

        let base_url = match config.value(keys::CUSTOMER_ORDERING_URL) {
            Some(raw) => Some(
                Url::parse(raw.trim())
                    .with_context(|| format!("invalid {}", keys::CUSTOMER_ORDERING_URL))?,
            ),
            None => None,
        };

        let mut factory = Self::new();
        factory.register(NamedClient::new(
            keys::CUSTOMER_ORDERING_CLIENT,
            base_url,
            http,
        ));
        Ok(factory)
    }
}

impl HttpClientFactory for ConfiguredClientFactory {
    fn create_client(&self, name: &str) -> Option<NamedClient> {
        self.clients.get(name).cloned()
    }
}
