//! Customer product catalog service: a token-secured product API backed by
//! Postgres, with product updates forwarded to the ordering service over an
//! OAuth client-credentials protected HTTP call.

pub mod api;
pub mod catalog;
pub mod config;
pub mod http_manager;
pub mod logging;
pub mod ordering;

pub mod util {
    pub mod db;
    pub mod env;
}

#[cfg(test)]
mod test_support;
