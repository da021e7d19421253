//! OAuth2 client-credentials token acquisition for outbound integrations.
//!
//! [`HttpHandler::get_client`] turns three configuration keys (discovery
//! authority, named client, scope) into an [`AuthorizedClient`] carrying a
//! bearer token. Every failure collapses to `None` at that boundary; the
//! typed reason is logged and available through
//! [`HttpHandler::try_get_client`].

pub mod cache;
pub mod client_factory;
pub mod error;
pub mod handler;
pub mod oauth;

pub use cache::TokenCache;
pub use client_factory::{ConfiguredClientFactory, HttpClientFactory, NamedClient};
pub use error::TokenError;
pub use handler::{AuthorizedClient, ClientCredentials, HttpHandler, TokenAcquisition};
pub use oauth::{
    ClientCredentialsRequest, DiscoveryDocument, OAuthTransport, ReqwestOAuthTransport,
    TokenResponse,
};
