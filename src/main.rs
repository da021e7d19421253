use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use customer_product_service::api::server::{connect_db, serve_from_env, token_handler};
use customer_product_service::config::{keys, ConfigLookup, EnvConfig};
use customer_product_service::logging::{init_tracing, DEFAULT_FILTER};
use customer_product_service::ordering::{OutboxRelay, PgOutbox, ProductOrderFacade};
use customer_product_service::util::env;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "customer-product-service", version, about = "Customer product catalog API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Run the HTTP API (default)
    Serve,
    /// Apply pending SQL migrations
    Migrate {
        #[arg(long, default_value = "migrations")]
        dir: PathBuf,
    },
    /// Redeliver queued ordering notifications once and exit
    RelayOutbox {
        #[arg(long, default_value_t = 100)]
        limit: i64,
    },
    /// Acquire an access token for the ordering integration and report the outcome
    TokenCheck {
        /// Key holding the authorization server URL (defaults to CustomerAuthServerUrlKey)
        #[arg(long)]
        url_key: Option<String>,
        /// Named HTTP client (defaults to CustomerOrderingAPIKey)
        #[arg(long)]
        client_key: Option<String>,
        /// Key holding the scope (defaults to CustomerOrderingScopeKey)
        #[arg(long)]
        scope_key: Option<String>,
    },
}

#[actix_web::main]
async fn main() -> Result<()> {
    env::init_env();
    init_tracing(DEFAULT_FILTER)?;

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve_from_env().await,
        Commands::Migrate { dir } => {
            let db = connect_db().await?;
            let applied = db.run_migrations(&dir).await?;
            info!(applied, dir = %dir.display(), "migrations complete");
            Ok(())
        }
        Commands::RelayOutbox { limit } => {
            let config: Arc<dyn ConfigLookup> = Arc::new(EnvConfig);
            let tokens = Arc::new(token_handler(config.clone())?);
            let notifier = Arc::new(ProductOrderFacade::new(config, tokens));
            let outbox = Arc::new(PgOutbox::new(connect_db().await?));
            let summary = OutboxRelay::new(outbox, notifier).run_once(limit).await?;
            println!("{}", serde_json::to_string(&summary)?);
            Ok(())
        }
        Commands::TokenCheck {
            url_key,
            client_key,
            scope_key,
        } => {
            let config: Arc<dyn ConfigLookup> = Arc::new(EnvConfig);
            let pick = |arg: Option<String>, indirection: &str, fallback: &str| {
                arg.or_else(|| config.value(indirection))
                    .unwrap_or_else(|| fallback.to_string())
            };
            let url_key = pick(
                url_key,
                keys::CUSTOMER_AUTH_SERVER_URL_KEY,
                keys::CUSTOMER_AUTH_SERVER_URL,
            );
            let client_key = pick(
                client_key,
                keys::CUSTOMER_ORDERING_API_KEY,
                keys::CUSTOMER_ORDERING_CLIENT,
            );
            let scope_key = pick(
                scope_key,
                keys::CUSTOMER_ORDERING_SCOPE_KEY,
                keys::CUSTOMER_ORDERING_SCOPE,
            );

            let handler = token_handler(config.clone())?;
            let client = handler
                .try_get_client(&url_key, &client_key, &scope_key)
                .await
                .with_context(|| format!("token acquisition for {client_key} failed"))?;
            println!(
                "ok: client={} base={} token_len={}",
                client.client().name(),
                client
                    .client()
                    .base_url()
                    .map(|u| u.as_str())
                    .unwrap_or("-"),
                client.access_token().len()
            );
            Ok(())
        }
    }
}
