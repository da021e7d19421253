// HTTP surface of the product service: routing, bearer auth, middleware and
// server bootstrap. Business logic lives in `service`.

pub mod auth;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;
pub mod service;

pub use server::ApiServer;
pub use service::ProductService;
