// API server bootstrap using actix-web

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};

use crate::api::auth::{Auth, AuthSettings};
use crate::api::handlers::{self, AppState};
use crate::api::service::ProductService;
use crate::api::{middleware, routes};
use crate::catalog::{InMemoryProductRepository, PgProductRepository, ProductRepository};
use crate::config::{ConfigLookup, EnvConfig};
use crate::http_manager::{
    ClientCredentials, ConfiguredClientFactory, HttpHandler, ReqwestOAuthTransport, TokenCache,
};
use crate::ordering::{
    MemoryOutbox, NotificationOutbox, OrderNotifier, OutboxRelay, PgOutbox, ProductOrderFacade,
};
use crate::util::db::Db;
use crate::util::env::{db_url, env_flag, env_opt, env_parse, init_env, preflight_check};

/// Entries re-driven per relay pass.
const RELAY_BATCH: i64 = 50;

/// Where the catalog lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

impl StoreKind {
    pub fn from_env() -> Result<Self> {
        match env_opt("CATALOG_STORE")
            .unwrap_or_else(|| "postgres".to_string())
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "postgres" | "pg" => Ok(StoreKind::Postgres),
            "memory" | "mem" => Ok(StoreKind::Memory),
            other => anyhow::bail!("unknown CATALOG_STORE {other:?} (expected postgres or memory)"),
        }
    }
}

/// Client-credentials handler for outbound calls, wired from configuration.
pub fn token_handler(config: Arc<dyn ConfigLookup>) -> Result<HttpHandler> {
    let timeout = Duration::from_secs(env_parse("HTTP_TIMEOUT_SECS", 30u64));
    let factory = ConfiguredClientFactory::from_config(config.as_ref(), timeout)?;
    let credentials = ClientCredentials::from_config(config.as_ref());
    let handler = HttpHandler::new(
        Arc::new(factory),
        config,
        credentials,
        Arc::new(ReqwestOAuthTransport),
    );
    Ok(if env_flag("TOKEN_CACHE_ENABLED", true) {
        handler.with_cache(TokenCache::new())
    } else {
        handler
    })
}

/// Everything the HTTP layer and the background relay share.
pub struct ServiceContext {
    pub repository: Arc<dyn ProductRepository>,
    pub notifier: Arc<dyn OrderNotifier>,
    pub outbox: Arc<dyn NotificationOutbox>,
    pub auth: Arc<AuthSettings>,
}

impl ServiceContext {
    pub fn new(
        repository: Arc<dyn ProductRepository>,
        notifier: Arc<dyn OrderNotifier>,
        outbox: Arc<dyn NotificationOutbox>,
        auth: Arc<AuthSettings>,
    ) -> Self {
        Self {
            repository,
            notifier,
            outbox,
            auth,
        }
    }

    pub async fn from_config(config: Arc<dyn ConfigLookup>) -> Result<Self> {
        let auth = Arc::new(AuthSettings::from_config(config.as_ref())?);
        let tokens = Arc::new(token_handler(config.clone())?);
        let notifier: Arc<dyn OrderNotifier> = Arc::new(ProductOrderFacade::new(config, tokens));

        let (repository, outbox): (Arc<dyn ProductRepository>, Arc<dyn NotificationOutbox>) =
            match StoreKind::from_env()? {
                StoreKind::Postgres => {
                    let db = connect_db().await?;
                    if env_flag("AUTO_MIGRATE", false) {
                        let applied = db.run_migrations(Path::new("migrations")).await?;
                        tracing::info!(applied, "migrations applied at startup");
                    }
                    (
                        Arc::new(PgProductRepository::new(db.clone())),
                        Arc::new(PgOutbox::new(db)),
                    )
                }
                StoreKind::Memory => {
                    tracing::warn!("using the seeded in-memory catalog; data is not persisted");
                    (
                        Arc::new(InMemoryProductRepository::seeded().await),
                        Arc::new(MemoryOutbox::new()),
                    )
                }
            };

        Ok(Self::new(repository, notifier, outbox, auth))
    }

    pub fn service(&self) -> ProductService {
        ProductService::new(
            self.repository.clone(),
            self.notifier.clone(),
            self.outbox.clone(),
        )
    }

    pub fn relay(&self) -> OutboxRelay {
        OutboxRelay::new(self.outbox.clone(), self.notifier.clone())
    }
}

/// Connects using `DATABASE_URL` (or its fallbacks) and `DB_MAX_CONNS`.
pub async fn connect_db() -> Result<Db> {
    let url = db_url()?;
    Db::connect(&url, env_parse("DB_MAX_CONNS", 10u32)).await
}

pub struct ApiServer {
    pub host: String,
    pub port: u16,
    pub allowed_origins: String,
    pub relay_interval: Option<Duration>,
}

impl ApiServer {
    /// Create server from environment variables
    pub fn from_env() -> Result<Self> {
        init_env();

        let host = env_opt("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = env_opt("API_PORT")
            .unwrap_or_else(|| "8080".to_string())
            .trim()
            .parse()
            .context("Invalid API_PORT")?;

        let allowed_origins = env_opt("ALLOWED_ORIGINS")
            .unwrap_or_else(|| "http://localhost:3000,http://localhost:8000".to_string());

        let relay_secs = env_parse("OUTBOX_RELAY_INTERVAL_SECS", 60u64);
        let relay_interval = (relay_secs > 0).then(|| Duration::from_secs(relay_secs));

        Ok(Self {
            host,
            port,
            allowed_origins,
            relay_interval,
        })
    }

    /// Start the HTTP server
    pub async fn run(self, ctx: ServiceContext) -> Result<()> {
        let bind_addr = format!("{}:{}", self.host, self.port);

        tracing::info!(
            host = %self.host,
            port = %self.port,
            "Starting customer product API server"
        );

        if let Some(interval) = self.relay_interval {
            let relay = ctx.relay();
            tokio::spawn(relay.run_forever(interval, RELAY_BATCH));
        }

        let state = web::Data::new(AppState::new(ctx.service()));
        let auth_settings = ctx.auth.clone();
        let allowed_origins = self.allowed_origins.clone();

        HttpServer::new(move || {
            let (logger, compress) = middleware::setup_middleware();
            let cors = middleware::setup_cors(&allowed_origins);
            let auth = Auth::new(auth_settings.clone());

            App::new()
                .app_data(state.clone())
                .app_data(handlers::json_config())
                .app_data(handlers::query_config())
                .wrap(auth)
                .wrap(cors)
                .wrap(compress)
                .wrap(logger)
                .configure(routes::configure_routes)
        })
        .bind(&bind_addr)
        .with_context(|| format!("Failed to bind to {}", bind_addr))?
        .run()
        .await
        .context("HTTP server error")?;

        Ok(())
    }
}

/// Loads configuration from the environment and serves until shutdown.
pub async fn serve_from_env() -> Result<()> {
    init_env();
    preflight_check(
        "customer-product-service",
        &[],
        &[
            "CATALOG_STORE",
            "DATABASE_URL",
            "ClientId",
            "ClientSecret",
            "CUSTOMER_AUTH_SERVER_URL",
            "STAFF_AUTH_SERVER_URL",
            "CUSTOMER_ORDERING_URL",
            "CUSTOMER_ORDERING_URI",
            "CUSTOMER_ORDERING_SCOPE",
            "API_HOST",
            "API_PORT",
        ],
    )?;
    let server = ApiServer::from_env()?;
    let ctx = ServiceContext::from_config(Arc::new(EnvConfig)).await?;
    server.run(ctx).await
}
