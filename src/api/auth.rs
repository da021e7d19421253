// Bearer-token authentication middleware for API endpoints

use std::future::{ready, Ready};
use std::sync::Arc;

use actix_web::{
    body::{BoxBody, EitherBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::Method,
    Error, HttpMessage, HttpResponse,
};
use anyhow::{Context, Result};
use futures::future::LocalBoxFuture;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::models::ApiResponse;
use crate::config::{keys, ConfigLookup};

/// Audience every accepted token must carry.
pub const API_AUDIENCE: &str = "customer_product_api";
/// `client_id` claim required by the staff policy.
pub const STAFF_CLIENT_ID: &str = "staff_product_api";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    pub exp: usize,
}

/// Which caller population a request must belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Customer,
    Staff,
}

impl Policy {
    /// Reads are for customers, writes for staff. Other methods are left to
    /// the router.
    pub fn for_method(method: &Method) -> Option<Policy> {
        match *method {
            Method::GET => Some(Policy::Customer),
            Method::POST => Some(Policy::Staff),
            _ => None,
        }
    }
}

struct Authority {
    key: DecodingKey,
    validation: Validation,
}

impl Authority {
    fn new(secret: &str, issuer: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[API_AUDIENCE]);
        if let Some(iss) = issuer {
            validation.set_issuer(&[iss.trim_end_matches('/')]);
        }
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

/// Token validation settings for the customer and staff authorities.
pub struct AuthSettings {
    customer: Authority,
    staff: Authority,
}

#[derive(Debug, PartialEq, Eq)]
pub enum AuthFailure {
    /// Missing, malformed, expired, or wrongly issued token.
    Unauthenticated,
    /// Valid token lacking the required claim.
    Forbidden,
}

impl AuthSettings {
    pub fn new(
        customer_secret: &str,
        customer_issuer: Option<&str>,
        staff_secret: &str,
        staff_issuer: Option<&str>,
    ) -> Self {
        Self {
            customer: Authority::new(customer_secret, customer_issuer),
            staff: Authority::new(staff_secret, staff_issuer),
        }
    }

    pub fn from_config(config: &dyn ConfigLookup) -> Result<Self> {
        let customer_secret = config
            .value(keys::CUSTOMER_JWT_SECRET)
            .with_context(|| format!("{} is required", keys::CUSTOMER_JWT_SECRET))?;
        let staff_secret = config
            .value(keys::STAFF_JWT_SECRET)
            .with_context(|| format!("{} is required", keys::STAFF_JWT_SECRET))?;
        let customer_issuer = config.value(keys::CUSTOMER_AUTH_SERVER_URL);
        let staff_issuer = config.value(keys::STAFF_AUTH_SERVER_URL);
        Ok(Self::new(
            &customer_secret,
            customer_issuer.as_deref(),
            &staff_secret,
            staff_issuer.as_deref(),
        ))
    }

    pub fn authorize(&self, policy: Policy, token: &str) -> Result<Claims, AuthFailure> {
        let authority = match policy {
            Policy::Customer => &self.customer,
            Policy::Staff => &self.staff,
        };
        let claims = decode::<Claims>(token, &authority.key, &authority.validation)
            .map_err(|e| {
                debug!(?policy, error = %e, "bearer token rejected");
                AuthFailure::Unauthenticated
            })?
            .claims;
        if policy == Policy::Staff && claims.client_id.as_deref() != Some(STAFF_CLIENT_ID) {
            return Err(AuthFailure::Forbidden);
        }
        Ok(claims)
    }
}

/// Authentication middleware that validates Bearer JWTs per [`Policy`]
pub struct Auth {
    settings: Arc<AuthSettings>,
}

impl Auth {
    pub fn new(settings: Arc<AuthSettings>) -> Self {
        Self { settings }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Auth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B, BoxBody>>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddleware {
            service,
            settings: self.settings.clone(),
        }))
    }
}

pub struct AuthMiddleware<S> {
    service: S,
    settings: Arc<AuthSettings>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B, BoxBody>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let policy = Policy::for_method(req.method());
        let open = req.path() == "/health" || req.path() == "/";

        let Some(policy) = policy.filter(|_| !open) else {
            let fut = self.service.call(req);
            return Box::pin(async move { Ok(fut.await?.map_into_left_body()) });
        };

        let token = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim);

        let outcome = match token {
            Some(t) if !t.is_empty() => self.settings.authorize(policy, t),
            _ => Err(AuthFailure::Unauthenticated),
        };

        let failure = match outcome {
            Ok(claims) => {
                req.extensions_mut().insert(claims);
                let fut = self.service.call(req);
                return Box::pin(async move { Ok(fut.await?.map_into_left_body()) });
            }
            Err(failure) => failure,
        };

        Box::pin(async move {
            let response = match failure {
                AuthFailure::Unauthenticated => HttpResponse::Unauthorized().json(
                    ApiResponse::<()>::error("Invalid or missing authentication token"),
                ),
                AuthFailure::Forbidden => HttpResponse::Forbidden()
                    .json(ApiResponse::<()>::error("Token does not grant this operation")),
            };
            Ok(req.into_response(response.map_into_right_body()))
        })
    }
}
