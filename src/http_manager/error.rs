use thiserror::Error;

/// Why token acquisition failed. Callers of `get_client` only ever see
/// `None`; this type exists for logs and diagnostics.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("configuration key argument `{0}` is empty")]
    MissingKey(&'static str),
    #[error("configuration value for `{0}` is missing or empty")]
    MissingConfig(String),
    #[error("no HTTP client registered under `{0}`")]
    NoNamedClient(String),
    #[error("discovery document fetch from {authority} failed: {source}")]
    Discovery {
        authority: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("discovery document from {0} advertises no token endpoint")]
    NoTokenEndpoint(String),
    #[error("client-credentials token request to {endpoint} failed: {source}")]
    TokenRequest {
        endpoint: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("token response from {0} carried no access token")]
    NoAccessToken(String),
}
