use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::types::Json;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::models::ProductUpdate;
use crate::util::db::Db;

/// Upper bound on the delay between delivery attempts.
pub const MAX_BACKOFF_SECS: i64 = 3600;

/// Delay before the next attempt once an entry has failed `attempts` times.
pub fn backoff_secs(attempts: i32) -> i64 {
    let exp = attempts.clamp(0, 12) as u32;
    2_i64.pow(exp).min(MAX_BACKOFF_SECS)
}

/// A batch awaiting (re)delivery to the ordering service.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct OutboxEntry {
    pub id: i64,
    #[sqlx(rename = "payload")]
    pub batch: Json<Vec<ProductUpdate>>,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub next_attempt_at: DateTime<Utc>,
}

#[async_trait]
pub trait NotificationOutbox: Send + Sync {
    async fn enqueue(&self, batch: &[ProductUpdate]) -> Result<i64>;
    /// Undelivered entries whose next attempt is due, oldest first.
    async fn due(&self, limit: i64) -> Result<Vec<OutboxEntry>>;
    async fn mark_delivered(&self, id: i64) -> Result<()>;
    async fn mark_failed(&self, id: i64, error: &str) -> Result<()>;
}

/// Outbox stored in `products.notification_outbox`.
#[derive(Clone)]
pub struct PgOutbox {
    db: Db,
}

impl PgOutbox {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NotificationOutbox for PgOutbox {
    async fn enqueue(&self, batch: &[ProductUpdate]) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO products.notification_outbox (payload) VALUES ($1) RETURNING id",
        )
        .bind(Json(batch))
        .fetch_one(&self.db.pool)
        .await
        .context("enqueue notification batch")?;
        info!(outbox_id = id, count = batch.len(), "queued product updates for redelivery");
        Ok(id)
    }

    async fn due(&self, limit: i64) -> Result<Vec<OutboxEntry>> {
        let rows = sqlx::query_as::<_, OutboxEntry>(
            r#"SELECT id, payload, attempts, last_error, created_at, next_attempt_at
               FROM products.notification_outbox
               WHERE delivered_at IS NULL AND next_attempt_at <= now()
               ORDER BY id
               LIMIT $1"#,
        )
        .bind(limit)
        .fetch_all(&self.db.pool)
        .await
        .context("load due outbox entries")?;
        Ok(rows)
    }

    async fn mark_delivered(&self, id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE products.notification_outbox SET delivered_at = now(), last_error = NULL WHERE id = $1",
        )
        .bind(id)
        .execute(&self.db.pool)
        .await
        .with_context(|| format!("mark outbox entry {id} delivered"))?;
        Ok(())
    }

    async fn mark_failed(&self, id: i64, error: &str) -> Result<()> {
        sqlx::query(
            r#"UPDATE products.notification_outbox
               SET attempts = attempts + 1,
                   last_error = $2,
                   next_attempt_at = now() + make_interval(secs => LEAST(power(2, LEAST(attempts + 1, 12)), $3))
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(error)
        .bind(MAX_BACKOFF_SECS as f64)
        .execute(&self.db.pool)
        .await
        .with_context(|| format!("mark outbox entry {id} failed"))?;
        Ok(())
    }
}

#[derive(Default)]
struct MemoryOutboxState {
    next_id: i64,
    entries: Vec<OutboxEntry>,
}

/// Process-local outbox used with the in-memory catalog store.
#[derive(Clone, Default)]
pub struct MemoryOutbox {
    state: Arc<Mutex<MemoryOutboxState>>,
}

impl MemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Undelivered entries, in insertion order.
    pub async fn pending(&self) -> Vec<OutboxEntry> {
        self.state.lock().await.entries.clone()
    }
}

#[async_trait]
impl NotificationOutbox for MemoryOutbox {
    async fn enqueue(&self, batch: &[ProductUpdate]) -> Result<i64> {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = state.next_id;
        let now = Utc::now();
        state.entries.push(OutboxEntry {
            id,
            batch: Json(batch.to_vec()),
            attempts: 0,
            last_error: None,
            created_at: now,
            next_attempt_at: now,
        });
        debug!(outbox_id = id, count = batch.len(), "queued product updates in memory");
        Ok(id)
    }

    async fn due(&self, limit: i64) -> Result<Vec<OutboxEntry>> {
        let now = Utc::now();
        let state = self.state.lock().await;
        Ok(state
            .entries
            .iter()
            .filter(|e| e.next_attempt_at <= now)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn mark_delivered(&self, id: i64) -> Result<()> {
        self.state.lock().await.entries.retain(|e| e.id != id);
        Ok(())
    }

    async fn mark_failed(&self, id: i64, error: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let entry = state
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .with_context(|| format!("unknown outbox entry {id}"))?;
        entry.attempts += 1;
        entry.last_error = Some(error.to_string());
        entry.next_attempt_at = Utc::now() + Duration::seconds(backoff_secs(entry.attempts));
        Ok(())
    }
}
