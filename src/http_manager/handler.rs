use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::cache::TokenCache;
use super::client_factory::{HttpClientFactory, NamedClient};
use super::error::TokenError;
use super::oauth::{ClientCredentialsRequest, OAuthTransport};
use crate::config::{keys, ConfigLookup};

/// Process-wide client-credentials identity.
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Reads `ClientId` / `ClientSecret`; missing values become empty strings
    /// and surface later as token request failures.
    pub fn from_config(config: &dyn ConfigLookup) -> Self {
        Self::new(
            config.value(keys::CLIENT_ID).unwrap_or_default(),
            config.value(keys::CLIENT_SECRET).unwrap_or_default(),
        )
    }
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .finish()
    }
}

/// A named client together with the bearer token it must present.
#[derive(Debug, Clone)]
pub struct AuthorizedClient {
    client: NamedClient,
    access_token: String,
}

impl AuthorizedClient {
    pub fn new(client: NamedClient, access_token: impl Into<String>) -> Self {
        Self {
            client,
            access_token: access_token.into(),
        }
    }

    pub fn client(&self) -> &NamedClient {
        &self.client
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// POSTs `body` as JSON to `uri` (absolute, or relative to the client's base address).
    pub async fn post_json<T>(&self, uri: &str, body: &T) -> Result<reqwest::Response>
    where
        T: Serialize + ?Sized,
    {
        let url = self.client.resolve(uri)?;
        let response = self
            .client
            .http()
            .post(url)
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await?;
        Ok(response)
    }
}

/// Produces bearer-authenticated clients for outbound calls.
#[async_trait]
pub trait TokenAcquisition: Send + Sync {
    async fn get_client(
        &self,
        url_key: &str,
        client_key: &str,
        scope_key: &str,
    ) -> Option<AuthorizedClient>;
}

pub struct HttpHandler {
    factory: Arc<dyn HttpClientFactory>,
    config: Arc<dyn ConfigLookup>,
    credentials: ClientCredentials,
    transport: Arc<dyn OAuthTransport>,
    cache: Option<TokenCache>,
}

impl HttpHandler {
    pub fn new(
        factory: Arc<dyn HttpClientFactory>,
        config: Arc<dyn ConfigLookup>,
        credentials: ClientCredentials,
        transport: Arc<dyn OAuthTransport>,
    ) -> Self {
        Self {
            factory,
            config,
            credentials,
            transport,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: TokenCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Same flow as [`TokenAcquisition::get_client`], but reports why it failed.
    pub async fn try_get_client(
        &self,
        url_key: &str,
        client_key: &str,
        scope_key: &str,
    ) -> Result<AuthorizedClient, TokenError> {
        require_key("url_key", url_key)?;
        require_key("client_key", client_key)?;
        require_key("scope_key", scope_key)?;

        let authority = self.lookup(url_key)?;
        let scope = self.lookup(scope_key)?;

        let client = self
            .factory
            .create_client(client_key)
            .ok_or_else(|| TokenError::NoNamedClient(client_key.to_string()))?;

        if let Some(cache) = &self.cache {
            if let Some(token) = cache.get(&authority, &scope).await {
                debug!(client = client_key, %scope, "using cached access token");
                return Ok(AuthorizedClient::new(client, token));
            }
        }

        let disco = self
            .transport
            .discovery_document(&client, &authority)
            .await
            .map_err(|source| TokenError::Discovery {
                authority: authority.clone(),
                source,
            })?;

        let token_endpoint = disco
            .token_endpoint
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| TokenError::NoTokenEndpoint(authority.clone()))?;

        let request = ClientCredentialsRequest {
            address: token_endpoint.clone(),
            client_id: self.credentials.client_id.clone(),
            client_secret: self.credentials.client_secret.clone(),
            scope: scope.clone(),
        };
        let response = self
            .transport
            .client_credentials_token(&client, &request)
            .await
            .map_err(|source| TokenError::TokenRequest {
                endpoint: token_endpoint.clone(),
                source,
            })?;

        let access_token = response
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(TokenError::NoAccessToken(token_endpoint))?;

        if let Some(cache) = &self.cache {
            cache
                .store(&authority, &scope, &access_token, response.expires_in)
                .await;
        }
        info!(client = client_key, %scope, "access token acquired");
        Ok(AuthorizedClient::new(client, access_token))
    }

    fn lookup(&self, key: &str) -> Result<String, TokenError> {
        self.config
            .value(key)
            .ok_or_else(|| TokenError::MissingConfig(key.to_string()))
    }
}

#[async_trait]
impl TokenAcquisition for HttpHandler {
    async fn get_client(
        &self,
        url_key: &str,
        client_key: &str,
        scope_key: &str,
    ) -> Option<AuthorizedClient> {
        match self.try_get_client(url_key, client_key, scope_key).await {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(error = %e, url_key, client_key, scope_key, "token acquisition failed");
                None
            }
        }
    }
}

fn require_key(name: &'static str, value: &str) -> Result<(), TokenError> {
    if value.trim().is_empty() {
        Err(TokenError::MissingKey(name))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapConfig;
    use crate::http_manager::oauth::{DiscoveryDocument, TokenResponse};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const URL_KEY: &str = "url_key";
    const CLIENT_KEY: &str = "client_key";
    const SCOPE_KEY: &str = "scope_key";
    const AUTHORITY: &str = "http://auth.test";
    const SCOPE: &str = "scope_key_value";
    const ENDPOINT: &str = "http://auth.test/connect/token";
    const TOKEN: &str = "access_token_value";

    #[derive(Default)]
    struct CountingFactory {
        calls: AtomicUsize,
        returns_none: bool,
    }

    impl HttpClientFactory for CountingFactory {
        fn create_client(&self, name: &str) -> Option<NamedClient> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.returns_none {
                None
            } else {
                Some(NamedClient::new(name, None, reqwest::Client::new()))
            }
        }
    }

    struct ScriptedTransport {
        disco: Option<DiscoveryDocument>,
        token: Option<TokenResponse>,
        disco_calls: AtomicUsize,
        token_calls: AtomicUsize,
        requests: Mutex<Vec<ClientCredentialsRequest>>,
    }

    impl ScriptedTransport {
        fn happy() -> Self {
            Self {
                disco: Some(DiscoveryDocument {
                    issuer: Some(AUTHORITY.into()),
                    token_endpoint: Some(ENDPOINT.into()),
                }),
                token: Some(TokenResponse {
                    access_token: Some(TOKEN.into()),
                    token_type: Some("Bearer".into()),
                    expires_in: Some(3600),
                }),
                disco_calls: AtomicUsize::new(0),
                token_calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn disco_calls(&self) -> usize {
            self.disco_calls.load(Ordering::SeqCst)
        }

        fn token_calls(&self) -> usize {
            self.token_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OAuthTransport for ScriptedTransport {
        async fn discovery_document(
            &self,
            _client: &NamedClient,
            authority: &str,
        ) -> Result<DiscoveryDocument> {
            self.disco_calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(authority, AUTHORITY);
            self.disco
                .clone()
                .ok_or_else(|| anyhow::anyhow!("discovery unavailable"))
        }

        async fn client_credentials_token(
            &self,
            _client: &NamedClient,
            request: &ClientCredentialsRequest,
        ) -> Result<TokenResponse> {
            self.token_calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            self.token
                .clone()
                .ok_or_else(|| anyhow::anyhow!("token endpoint unavailable"))
        }
    }

    fn config() -> MapConfig {
        MapConfig::from_pairs([(URL_KEY, AUTHORITY), (SCOPE_KEY, SCOPE)])
    }

    fn handler(
        factory: Arc<CountingFactory>,
        config: MapConfig,
        transport: Arc<ScriptedTransport>,
    ) -> HttpHandler {
        HttpHandler::new(
            factory,
            Arc::new(config),
            ClientCredentials::new("client_id", "client_secret"),
            transport,
        )
    }

    #[tokio::test]
    async fn returns_client_with_bearer_token() {
        let factory = Arc::new(CountingFactory::default());
        let transport = Arc::new(ScriptedTransport::happy());
        let handler = handler(factory.clone(), config(), transport.clone());

        let client = handler
            .get_client(URL_KEY, CLIENT_KEY, SCOPE_KEY)
            .await
            .expect("client");

        assert_eq!(client.access_token(), TOKEN);
        assert_eq!(client.client().name(), CLIENT_KEY);
        assert_eq!(factory.calls.load(Ordering::SeqCst), 1);
        assert_eq!(transport.disco_calls(), 1);
        assert_eq!(transport.token_calls(), 1);

        let requests = transport.requests.lock().unwrap();
        assert_eq!(
            requests[0],
            ClientCredentialsRequest {
                address: ENDPOINT.into(),
                client_id: "client_id".into(),
                client_secret: "client_secret".into(),
                scope: SCOPE.into(),
            }
        );
    }

    #[tokio::test]
    async fn empty_key_arguments_make_no_calls() {
        for (url_key, client_key, scope_key) in [
            ("", CLIENT_KEY, SCOPE_KEY),
            ("  ", CLIENT_KEY, SCOPE_KEY),
            (URL_KEY, "", SCOPE_KEY),
            (URL_KEY, CLIENT_KEY, ""),
        ] {
            let factory = Arc::new(CountingFactory::default());
            let transport = Arc::new(ScriptedTransport::happy());
            let handler = handler(factory.clone(), config(), transport.clone());

            let result = handler.try_get_client(url_key, client_key, scope_key).await;

            assert!(matches!(result, Err(TokenError::MissingKey(_))));
            assert_eq!(factory.calls.load(Ordering::SeqCst), 0);
            assert_eq!(transport.disco_calls(), 0);
            assert_eq!(transport.token_calls(), 0);
        }
    }

    #[tokio::test]
    async fn missing_config_values_make_no_calls() {
        for missing in [URL_KEY, SCOPE_KEY] {
            let mut cfg = config();
            cfg.set(missing, "");
            let factory = Arc::new(CountingFactory::default());
            let transport = Arc::new(ScriptedTransport::happy());
            let handler = handler(factory.clone(), cfg, transport.clone());

            let result = handler.try_get_client(URL_KEY, CLIENT_KEY, SCOPE_KEY).await;

            assert!(matches!(result, Err(TokenError::MissingConfig(ref k)) if k == missing));
            assert_eq!(factory.calls.load(Ordering::SeqCst), 0);
            assert_eq!(transport.disco_calls(), 0);
        }
    }

    #[tokio::test]
    async fn factory_without_client_stops_before_discovery() {
        let factory = Arc::new(CountingFactory {
            returns_none: true,
            ..Default::default()
        });
        let transport = Arc::new(ScriptedTransport::happy());
        let handler = handler(factory.clone(), config(), transport.clone());

        let result = handler.try_get_client(URL_KEY, CLIENT_KEY, SCOPE_KEY).await;

        assert!(matches!(result, Err(TokenError::NoNamedClient(_))));
        assert_eq!(factory.calls.load(Ordering::SeqCst), 1);
        assert_eq!(transport.disco_calls(), 0);
    }

    #[tokio::test]
    async fn discovery_failure_yields_none() {
        let factory = Arc::new(CountingFactory::default());
        let transport = Arc::new(ScriptedTransport {
            disco: None,
            ..ScriptedTransport::happy()
        });
        let handler = handler(factory, config(), transport.clone());

        assert!(handler.get_client(URL_KEY, CLIENT_KEY, SCOPE_KEY).await.is_none());
        assert_eq!(transport.token_calls(), 0);
    }

    #[tokio::test]
    async fn missing_or_empty_token_endpoint_yields_none() {
        for endpoint in [None, Some(String::new())] {
            let transport = Arc::new(ScriptedTransport {
                disco: Some(DiscoveryDocument {
                    issuer: None,
                    token_endpoint: endpoint,
                }),
                ..ScriptedTransport::happy()
            });
            let handler = handler(Arc::new(CountingFactory::default()), config(), transport.clone());

            let result = handler.try_get_client(URL_KEY, CLIENT_KEY, SCOPE_KEY).await;

            assert!(matches!(result, Err(TokenError::NoTokenEndpoint(_))));
            assert_eq!(transport.token_calls(), 0);
        }
    }

    #[tokio::test]
    async fn token_request_failure_yields_none() {
        let transport = Arc::new(ScriptedTransport {
            token: None,
            ..ScriptedTransport::happy()
        });
        let handler = handler(Arc::new(CountingFactory::default()), config(), transport.clone());

        let result = handler.try_get_client(URL_KEY, CLIENT_KEY, SCOPE_KEY).await;

        assert!(matches!(result, Err(TokenError::TokenRequest { .. })));
        assert_eq!(transport.token_calls(), 1);
    }

    #[tokio::test]
    async fn missing_or_empty_access_token_yields_none() {
        for token in [None, Some(String::new())] {
            let transport = Arc::new(ScriptedTransport {
                token: Some(TokenResponse {
                    access_token: token,
                    token_type: None,
                    expires_in: None,
                }),
                ..ScriptedTransport::happy()
            });
            let handler = handler(Arc::new(CountingFactory::default()), config(), transport);

            let result = handler.try_get_client(URL_KEY, CLIENT_KEY, SCOPE_KEY).await;

            assert!(matches!(result, Err(TokenError::NoAccessToken(_))));
        }
    }

    #[tokio::test]
    async fn concurrent_calls_build_independent_requests() {
        let transport = Arc::new(ScriptedTransport::happy());
        let mut cfg = config();
        cfg.set("other_scope_key", "other_scope");
        let handler = Arc::new(handler(
            Arc::new(CountingFactory::default()),
            cfg,
            transport.clone(),
        ));

        let a = {
            let h = handler.clone();
            tokio::spawn(async move { h.get_client(URL_KEY, CLIENT_KEY, SCOPE_KEY).await })
        };
        let b = {
            let h = handler.clone();
            tokio::spawn(async move { h.get_client(URL_KEY, CLIENT_KEY, "other_scope_key").await })
        };
        assert!(a.await.unwrap().is_some());
        assert!(b.await.unwrap().is_some());

        let mut scopes: Vec<String> = transport
            .requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.scope.clone())
            .collect();
        scopes.sort();
        assert_eq!(scopes, vec!["other_scope".to_string(), SCOPE.to_string()]);
    }

    #[tokio::test]
    async fn cached_token_skips_discovery_and_token_calls() {
        let factory = Arc::new(CountingFactory::default());
        let transport = Arc::new(ScriptedTransport::happy());
        let handler =
            handler(factory.clone(), config(), transport.clone()).with_cache(TokenCache::new());

        let first = handler.get_client(URL_KEY, CLIENT_KEY, SCOPE_KEY).await.unwrap();
        let second = handler.get_client(URL_KEY, CLIENT_KEY, SCOPE_KEY).await.unwrap();

        assert_eq!(first.access_token(), second.access_token());
        assert_eq!(factory.calls.load(Ordering::SeqCst), 2);
        assert_eq!(transport.disco_calls(), 1);
        assert_eq!(transport.token_calls(), 1);
    }
}
