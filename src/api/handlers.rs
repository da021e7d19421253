// HTTP request handlers for API endpoints

use std::time::Instant;

use actix_web::{error::InternalError, web, HttpResponse, Result};

use crate::api::models::{ApiResponse, CreateResponse, HealthResponse};
use crate::api::service::{CreateError, ProductService};
use crate::catalog::{CatalogError, ProductInput, ProductQuery, QueryShape};

/// Shared state handed to every handler.
pub struct AppState {
    pub service: ProductService,
    pub started: Instant,
}

impl AppState {
    pub fn new(service: ProductService) -> Self {
        Self {
            service,
            started: Instant::now(),
        }
    }
}

/// Malformed JSON bodies are reported as 422 with the usual envelope.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let message = format!("Malformed product payload: {err}");
        let response = HttpResponse::UnprocessableEntity().json(ApiResponse::<()>::error(message));
        InternalError::from_response(err, response).into()
    })
}

/// Unparseable query values are reported as 400 with the usual envelope.
pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err, _req| {
        let message = format!("Invalid product query: {err}");
        let response = HttpResponse::BadRequest().json(ApiResponse::<()>::error(message));
        InternalError::from_response(err, response).into()
    })
}

/// Health check endpoint
pub async fn health_check(state: web::Data<AppState>) -> Result<HttpResponse> {
    let db_status = if state.service.repository().ping().await {
        "connected"
    } else {
        "disconnected"
    };

    let response = ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        database: db_status.to_string(),
        uptime_seconds: state.started.elapsed().as_secs(),
    });

    Ok(HttpResponse::Ok().json(response))
}

/// `GET /api/product`: metadata, a single product, or a filtered list
pub async fn get_products(
    state: web::Data<AppState>,
    query: web::Query<ProductQuery>,
) -> Result<HttpResponse> {
    let query = query.into_inner();
    tracing::debug!(?query, "product query");

    match state.service.get(&query).await {
        Ok(data) => Ok(HttpResponse::Ok().json(ApiResponse::success(data))),
        Err(CatalogError::NotFound(id)) => Ok(HttpResponse::NotFound()
            .json(ApiResponse::<()>::error(format!("Product {id} not found")))),
        Err(e @ CatalogError::BackendUnavailable(_)) => {
            if matches!(query.classify(), QueryShape::Single(_)) {
                Ok(HttpResponse::NotFound().json(ApiResponse::<()>::error(e.to_string())))
            } else {
                tracing::error!(error = %e, "product read failed");
                Ok(HttpResponse::ServiceUnavailable().json(ApiResponse::<()>::error(e.to_string())))
            }
        }
    }
}

/// `POST /api/product`: upsert a batch of products
pub async fn create_products(
    state: web::Data<AppState>,
    payload: web::Json<Vec<Option<ProductInput>>>,
) -> Result<HttpResponse> {
    let inputs = payload.into_inner();
    tracing::info!(records = inputs.len(), "product upsert requested");

    match state.service.create(inputs).await {
        Ok(outcome) => {
            // The notification keeps running after the response is sent.
            drop(outcome.notification);
            let response = ApiResponse::success(CreateResponse {
                updated: outcome.summary.total(),
            });
            Ok(HttpResponse::Ok().json(response))
        }
        Err(CreateError::Invalid(msg)) => {
            Ok(HttpResponse::UnprocessableEntity().json(ApiResponse::<()>::error(msg)))
        }
        Err(CreateError::Backend(e)) => {
            Ok(HttpResponse::NotFound().json(ApiResponse::<()>::error(e.to_string())))
        }
    }
}
