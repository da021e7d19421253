// API route configuration

use crate::api::handlers;
use actix_web::web;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Health check (no auth required)
        .route("/health", web::get().to(handlers::health_check))
        .route("/", web::get().to(handlers::health_check))
        // GET needs a customer token, POST a staff token
        .service(
            web::resource("/api/product")
                .route(web::get().to(handlers::get_products))
                .route(web::post().to(handlers::create_products)),
        );
}
