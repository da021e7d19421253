use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::client_factory::NamedClient;

const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

/// The subset of the OpenID discovery document this service needs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscoveryDocument {
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub token_endpoint: Option<String>,
}

/// One client-credentials token request. Built fresh for every acquisition
/// and never shared between calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCredentialsRequest {
    pub address: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
}

impl ClientCredentialsRequest {
    pub fn form(&self) -> [(&'static str, &str); 4] {
        [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", self.scope.as_str()),
        ]
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Network half of the client-credentials flow.
#[async_trait]
pub trait OAuthTransport: Send + Sync {
    async fn discovery_document(
        &self,
        client: &NamedClient,
        authority: &str,
    ) -> Result<DiscoveryDocument>;

    async fn client_credentials_token(
        &self,
        client: &NamedClient,
        request: &ClientCredentialsRequest,
    ) -> Result<TokenResponse>;
}

/// `https://id.example` -> `https://id.example/.well-known/openid-configuration`.
pub fn discovery_url(authority: &str) -> String {
    let trimmed = authority.trim().trim_end_matches('/');
    if trimmed.ends_with(DISCOVERY_PATH) {
        trimmed.to_string()
    } else {
        format!("{trimmed}{DISCOVERY_PATH}")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReqwestOAuthTransport;

#[async_trait]
impl OAuthTransport for ReqwestOAuthTransport {
    async fn discovery_document(
        &self,
        client: &NamedClient,
        authority: &str,
    ) -> Result<DiscoveryDocument> {
        let url = discovery_url(authority);
        debug!(client = client.name(), %url, "fetching discovery document");
        let response = client
            .http()
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("discovery request failed: {status} {body}");
        }
        response
            .json::<DiscoveryDocument>()
            .await
            .context("failed to parse discovery document")
    }

    async fn client_credentials_token(
        &self,
        client: &NamedClient,
        request: &ClientCredentialsRequest,
    ) -> Result<TokenResponse> {
        debug!(
            client = client.name(),
            endpoint = %request.address,
            scope = %request.scope,
            "requesting client-credentials token"
        );
        let response = client
            .http()
            .post(&request.address)
            .form(&request.form())
            .send()
            .await
            .with_context(|| format!("POST {}", request.address))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("token request failed: {status} {body}");
        }
        response
            .json::<TokenResponse>()
            .await
            .context("failed to parse token response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubServer;
    use actix_web::{web, HttpResponse};

    #[test]
    fn discovery_url_is_appended_once() {
        assert_eq!(
            discovery_url("https://id.example/"),
            "https://id.example/.well-known/openid-configuration"
        );
        assert_eq!(
            discovery_url("https://id.example/.well-known/openid-configuration"),
            "https://id.example/.well-known/openid-configuration"
        );
    }

    #[actix_web::test]
    async fn reqwest_transport_speaks_discovery_and_token_endpoint() {
        let server = StubServer::start(|cfg| {
            cfg.route(
                "/.well-known/openid-configuration",
                web::get().to(|req: actix_web::HttpRequest| async move {
                    let host = req.connection_info().host().to_string();
                    HttpResponse::Ok().json(serde_json::json!({
                        "issuer": format!("http://{host}"),
                        "token_endpoint": format!("http://{host}/connect/token"),
                    }))
                }),
            )
            .route(
                "/connect/token",
                web::post().to(|form: web::Form<std::collections::HashMap<String, String>>| async move {
                    let ok = form.get("grant_type").map(String::as_str) == Some("client_credentials")
                        && form.get("client_id").map(String::as_str) == Some("svc")
                        && form.get("scope").map(String::as_str) == Some("ordering");
                    if ok {
                        HttpResponse::Ok().json(serde_json::json!({
                            "access_token": "tok-123",
                            "token_type": "Bearer",
                            "expires_in": 3600,
                        }))
                    } else {
                        HttpResponse::BadRequest().finish()
                    }
                }),
            );
        })
        .await;

        let client = NamedClient::new("auth", None, reqwest::Client::new());
        let transport = ReqwestOAuthTransport;
        let disco = transport
            .discovery_document(&client, &server.base_url)
            .await
            .unwrap();
        let endpoint = disco.token_endpoint.clone().unwrap();
        assert!(endpoint.ends_with("/connect/token"));

        let request = ClientCredentialsRequest {
            address: endpoint,
            client_id: "svc".into(),
            client_secret: "secret".into(),
            scope: "ordering".into(),
        };
        let token = transport
            .client_credentials_token(&client, &request)
            .await
            .unwrap();
        assert_eq!(token.access_token.as_deref(), Some("tok-123"));
        assert_eq!(token.expires_in, Some(3600));

        let bad = ClientCredentialsRequest {
            scope: "other".into(),
            ..request
        };
        assert!(transport.client_credentials_token(&client, &bad).await.is_err());

        server.stop().await;
    }

    #[actix_web::test]
    async fn discovery_error_status_is_an_error() {
        let server = StubServer::start(|cfg| {
            cfg.route(
                "/.well-known/openid-configuration",
                web::get().to(|| async { HttpResponse::ServiceUnavailable().finish() }),
            );
        })
        .await;
        let client = NamedClient::new("auth", None, reqwest::Client::new());
        let result = ReqwestOAuthTransport
            .discovery_document(&client, &server.base_url)
            .await;
        assert!(result.is_err());
        server.stop().await;
    }
}
