// Product controller logic, independent of the HTTP layer

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::api::models::ProductResponse;
use crate::catalog::{
    CatalogError, ProductInput, ProductQuery, ProductRepository, QueryShape, UpsertSummary,
};
use crate::ordering::{NotificationOutbox, OrderNotifier, ProductUpdate};

#[derive(Debug, Error)]
pub enum CreateError {
    #[error("invalid product batch: {0}")]
    Invalid(String),
    #[error(transparent)]
    Backend(#[from] CatalogError),
}

/// What happened to the ordering notification for a committed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationOutcome {
    Delivered,
    Queued(i64),
    Lost,
}

pub struct CreateOutcome {
    pub summary: UpsertSummary,
    /// Background notification; dropping the handle detaches it.
    pub notification: JoinHandle<NotificationOutcome>,
}

#[derive(Clone)]
pub struct ProductService {
    repo: Arc<dyn ProductRepository>,
    notifier: Arc<dyn OrderNotifier>,
    outbox: Arc<dyn NotificationOutbox>,
}

impl ProductService {
    pub fn new(
        repo: Arc<dyn ProductRepository>,
        notifier: Arc<dyn OrderNotifier>,
        outbox: Arc<dyn NotificationOutbox>,
    ) -> Self {
        Self {
            repo,
            notifier,
            outbox,
        }
    }

    pub fn repository(&self) -> &Arc<dyn ProductRepository> {
        &self.repo
    }

    pub async fn get(&self, query: &ProductQuery) -> Result<ProductResponse, CatalogError> {
        match query.classify() {
            QueryShape::Metadata => Ok(ProductResponse::Info(self.repo.product_info().await?)),
            QueryShape::Single(id) => match self.repo.get_product(id).await {
                Ok(view) => Ok(ProductResponse::Product(view)),
                Err(e @ CatalogError::NotFound(_)) => {
                    info!(product_id = id, "product not found");
                    Err(e)
                }
                Err(e) => {
                    error!(product_id = id, error = %e, "product lookup failed");
                    Err(e)
                }
            },
            QueryShape::Filtered(filter) => {
                Ok(ProductResponse::Products(self.repo.find_products(&filter).await?))
            }
        }
    }

    /// Upserts the batch, then notifies the ordering service in the
    /// background. A notification that is not accepted goes to the outbox.
    pub async fn create(
        &self,
        inputs: Vec<Option<ProductInput>>,
    ) -> Result<CreateOutcome, CreateError> {
        if inputs.is_empty() {
            return Err(CreateError::Invalid("empty product list".into()));
        }
        let inputs: Vec<ProductInput> = inputs
            .into_iter()
            .enumerate()
            .map(|(i, p)| p.ok_or_else(|| CreateError::Invalid(format!("product at index {i} is null"))))
            .collect::<Result<_, _>>()?;

        let summary = self.repo.upsert_catalog(&inputs).await.map_err(|e| {
            error!(error = %e, records = inputs.len(), "catalog upsert failed");
            e
        })?;

        let updates: Vec<ProductUpdate> = inputs.iter().map(ProductInput::to_update).collect();
        let notifier = self.notifier.clone();
        let outbox = self.outbox.clone();
        let notification = tokio::spawn(async move {
            if notifier.notify_update(&updates).await {
                return NotificationOutcome::Delivered;
            }
            warn!(count = updates.len(), "ordering notification failed; queueing for redelivery");
            match outbox.enqueue(&updates).await {
                Ok(id) => NotificationOutcome::Queued(id),
                Err(e) => {
                    error!(error = %e, count = updates.len(), "failed to queue product updates");
                    NotificationOutcome::Lost
                }
            }
        });

        Ok(CreateOutcome {
            summary,
            notification,
        })
    }
}
