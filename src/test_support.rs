//! In-process HTTP stubs for exercising outbound clients in tests, plus the
//! database handle used by the Postgres-backed tests.
use std::path::Path;

use actix_web::{dev::ServerHandle, web, App, HttpServer};

use crate::util::db::Db;
use crate::util::env::{db_url, init_env};

pub(crate) struct StubServer {
    pub base_url: String,
    handle: ServerHandle,
}

impl StubServer {
    /// Binds an ephemeral localhost port and serves the routes added by `configure`.
    /// Must be called from inside an actix runtime (`#[actix_web::test]`).
    pub async fn start<F>(configure: F) -> Self
    where
        F: Fn(&mut web::ServiceConfig) + Send + Clone + 'static,
    {
        let server = HttpServer::new(move || App::new().configure(configure.clone()))
            .workers(1)
            .disable_signals()
            .bind(("127.0.0.1", 0))
            .expect("bind stub server");
        let addr = server.addrs()[0];
        let server = server.run();
        let handle = server.handle();
        actix_web::rt::spawn(server);
        Self {
            base_url: format!("http://{addr}"),
            handle,
        }
    }

    pub async fn stop(self) {
        self.handle.stop(false).await;
    }
}

/// Connects to `DATABASE_URL` (`.env` is honoured) and applies `migrations/`.
/// Tests using this are `#[ignore]`d; run them with `cargo test -- --ignored`
/// against a disposable database.
pub(crate) async fn migrated_db() -> Db {
    init_env();
    let url = db_url().expect("DATABASE_URL for Postgres tests");
    let db = Db::connect(&url, 4).await.expect("connect to test database");
    db.run_migrations(&Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"))
        .await
        .expect("apply migrations");
    db
}
