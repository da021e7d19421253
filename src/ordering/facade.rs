use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::models::ProductUpdate;
use crate::config::{keys, ConfigLookup};
use crate::http_manager::TokenAcquisition;

/// Delivers product-update batches downstream. `true` only when the
/// receiver acknowledged the batch with a 2xx.
#[async_trait]
pub trait OrderNotifier: Send + Sync {
    async fn notify_update(&self, products: &[ProductUpdate]) -> bool;
}

/// Posts product updates to the customer ordering API.
///
/// Three configuration values name *other* keys (authority, named client,
/// scope) that are handed to token acquisition; `CustomerOrderingUri` is the
/// POST destination. A single attempt is made per call.
pub struct ProductOrderFacade {
    config: Arc<dyn ConfigLookup>,
    tokens: Arc<dyn TokenAcquisition>,
}

struct OrderingTarget {
    auth_url_key: String,
    api_key: String,
    scope_key: String,
    uri: String,
}

impl ProductOrderFacade {
    pub fn new(config: Arc<dyn ConfigLookup>, tokens: Arc<dyn TokenAcquisition>) -> Self {
        Self { config, tokens }
    }

    fn target(&self) -> Option<OrderingTarget> {
        let lookup = |key: &str| {
            let value = self.config.value(key);
            if value.is_none() {
                warn!(key, "ordering notification not configured");
            }
            value
        };
        Some(OrderingTarget {
            auth_url_key: lookup(keys::CUSTOMER_AUTH_SERVER_URL_KEY)?,
            api_key: lookup(keys::CUSTOMER_ORDERING_API_KEY)?,
            scope_key: lookup(keys::CUSTOMER_ORDERING_SCOPE_KEY)?,
            uri: lookup(keys::CUSTOMER_ORDERING_URI)?,
        })
    }
}

#[async_trait]
impl OrderNotifier for ProductOrderFacade {
    async fn notify_update(&self, products: &[ProductUpdate]) -> bool {
        if products.is_empty() {
            debug!("empty product update batch; nothing to send");
            return false;
        }
        let Some(target) = self.target() else {
            return false;
        };

        let Some(client) = self
            .tokens
            .get_client(&target.auth_url_key, &target.api_key, &target.scope_key)
            .await
        else {
            warn!(client = %target.api_key, "no authorized client for ordering notification");
            return false;
        };

        match client.post_json(&target.uri, products).await {
            Ok(resp) if resp.status().is_success() => {
                info!(count = products.len(), status = %resp.status(), "ordering service accepted product updates");
                true
            }
            Ok(resp) => {
                warn!(
                    count = products.len(),
                    status = %resp.status(),
                    uri = %target.uri,
                    "ordering service rejected product updates"
                );
                false
            }
            Err(e) => {
                warn!(count = products.len(), uri = %target.uri, error = %e, "product update POST failed");
                false
            }
        }
    }
}
