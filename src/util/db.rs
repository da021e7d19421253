use anyhow::{Context, Result};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
    Connection, PgConnection, PgPool, Row,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

/// Advisory lock key held while migrations are applied.
const MIGRATION_LOCK_KEY: i64 = 0x0c75_0001;

#[derive(Clone)]
pub struct Db {
    pub pool: PgPool,
}

impl Db {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let mut connect_options = PgConnectOptions::from_str(database_url)
            .context("invalid database URL")?;

        // Ensure TLS is enabled when DSN contains sslmode=require
        if database_url.contains("sslmode=require") {
            connect_options = connect_options.ssl_mode(PgSslMode::Require);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(connect_options)
            .await
            .context("failed to connect to database")?;
        info!(max_connections, "connected to db");
        Ok(Self { pool })
    }

    /// Applies pending `NNNN_description.sql` files from `dir` in version
    /// order. Applied versions are tracked in `_schema_migrations`; files
    /// without a numeric prefix are ignored. Concurrent callers are
    /// serialized on a session advisory lock.
    pub async fn run_migrations(&self, dir: &Path) -> Result<usize> {
        if !dir.exists() {
            anyhow::bail!("migrations directory not found: {:?}", dir);
        }
        let mut conn = self.pool.acquire().await?;
        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *conn)
            .await
            .context("acquire migration lock")?;

        let outcome = apply_pending(&mut *conn, dir).await;

        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *conn)
            .await
            .context("release migration lock")?;
        let applied_now = outcome?;
        info!(applied = applied_now, "migrations up-to-date");
        Ok(applied_now)
    }

    pub async fn ping(&self) -> bool {
        sqlx::query_scalar::<_, bool>("SELECT true")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }
}

async fn apply_pending(conn: &mut PgConnection, dir: &Path) -> Result<usize> {
    sqlx::raw_sql(
        "CREATE TABLE IF NOT EXISTS _schema_migrations (
            version BIGINT PRIMARY KEY,
            description TEXT,
            installed_at TIMESTAMPTZ DEFAULT now()
         )",
    )
    .execute(&mut *conn)
    .await?;

    let applied_rows = sqlx::query("SELECT version FROM _schema_migrations")
        .fetch_all(&mut *conn)
        .await?;
    let mut applied: HashSet<i64> = HashSet::new();
    for r in applied_rows {
        applied.insert(r.try_get::<i64, _>(0)?);
    }

    let mut applied_now = 0usize;
    for (version, desc, path) in pending_migrations(dir, &applied)? {
        let sql = std::fs::read_to_string(&path)
            .with_context(|| format!("reading migration {:?}", path))?;
        info!(version, file = ?path, "applying migration");

        let mut tx = conn.begin().await?;
        sqlx::raw_sql(&sql)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("migration {version} ({desc}) failed"))?;
        sqlx::query("INSERT INTO _schema_migrations (version, description) VALUES ($1, $2)")
            .bind(version)
            .bind(&desc)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        applied_now += 1;
    }
    Ok(applied_now)
}

fn pending_migrations(dir: &Path, applied: &HashSet<i64>) -> Result<Vec<(i64, String, PathBuf)>> {
    let mut candidates: Vec<(i64, String, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(fname) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        if let Some((version, desc)) = parse_migration_filename(fname) {
            if !applied.contains(&version) {
                candidates.push((version, desc, path));
            }
        }
    }
    candidates.sort_by_key(|(v, _, _)| *v);
    Ok(candidates)
}

/// `0002_seed_catalog.sql` -> `(2, "seed_catalog")`.
fn parse_migration_filename(fname: &str) -> Option<(i64, String)> {
    let stem = fname.strip_suffix(".sql")?;
    let digits: String = stem.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let rest = stem[digits.len()..].strip_prefix('_')?;
    let version = digits.parse::<i64>().ok()?;
    Some((version, rest.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_versioned_migration_names() {
        assert_eq!(
            parse_migration_filename("0002_seed_catalog.sql"),
            Some((2, "seed_catalog".to_string()))
        );
        assert_eq!(parse_migration_filename("database_settings.sql"), None);
        assert_eq!(parse_migration_filename("0003_outbox.txt"), None);
        assert_eq!(parse_migration_filename("0004.sql"), None);
    }

    #[test]
    fn pending_skips_applied_and_sorts() {
        let dir = std::env::temp_dir().join(format!("cps-migrations-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        for name in ["0003_c.sql", "0001_a.sql", "0002_b.sql", "notes.md"] {
            std::fs::write(dir.join(name), "SELECT 1;").unwrap();
        }
        let applied: HashSet<i64> = [1].into_iter().collect();
        let pending = pending_migrations(&dir, &applied).unwrap();
        let versions: Vec<i64> = pending.iter().map(|(v, _, _)| *v).collect();
        assert_eq!(versions, vec![2, 3]);
        std::fs::remove_dir_all(&dir).ok();
    }
}
