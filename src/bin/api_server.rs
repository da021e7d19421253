// HTTP API server binary for the customer product service

use anyhow::Result;
use customer_product_service::api::server::serve_from_env;
use customer_product_service::logging::{init_tracing, DEFAULT_FILTER};
use customer_product_service::util::env as env_util;

#[actix_web::main]
async fn main() -> Result<()> {
    env_util::init_env();
    init_tracing(DEFAULT_FILTER)?;

    tracing::info!("Initializing customer product API server");
    serve_from_env().await
}
