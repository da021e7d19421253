use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tracing::{error, info, warn};

use super::facade::OrderNotifier;
use super::outbox::NotificationOutbox;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelaySummary {
    pub delivered: usize,
    pub failed: usize,
}

/// Re-drives outbox entries through the notifier. Assumes one relay per
/// outbox; concurrent relays may deliver an entry twice, which the receiver
/// tolerates.
pub struct OutboxRelay {
    outbox: Arc<dyn NotificationOutbox>,
    notifier: Arc<dyn OrderNotifier>,
}

impl OutboxRelay {
    pub fn new(outbox: Arc<dyn NotificationOutbox>, notifier: Arc<dyn OrderNotifier>) -> Self {
        Self { outbox, notifier }
    }

    pub async fn run_once(&self, limit: i64) -> Result<RelaySummary> {
        let mut summary = RelaySummary::default();
        for entry in self.outbox.due(limit).await? {
            if self.notifier.notify_update(&entry.batch.0).await {
                self.outbox.mark_delivered(entry.id).await?;
                summary.delivered += 1;
            } else {
                warn!(outbox_id = entry.id, attempts = entry.attempts + 1, "redelivery failed");
                self.outbox
                    .mark_failed(entry.id, "ordering notification not accepted")
                    .await?;
                summary.failed += 1;
            }
        }
        if summary.delivered + summary.failed > 0 {
            info!(delivered = summary.delivered, failed = summary.failed, "outbox relay pass finished");
        }
        Ok(summary)
    }

    /// Runs a pass every `interval` until the task is dropped. Pass errors are
    /// logged and the loop continues.
    pub async fn run_forever(self, interval: Duration, limit: i64) {
        info!(interval_secs = interval.as_secs(), "outbox relay started");
        loop {
            if let Err(e) = self.run_once(limit).await {
                error!(error = %e, "outbox relay pass failed");
            }
            tokio::time::sleep(interval).await;
        }
    }
}
