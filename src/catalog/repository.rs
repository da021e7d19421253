use async_trait::async_trait;
use serde::Serialize;

use super::error::CatalogError;
use super::filter::ProductFilter;
use super::models::{ProductInfo, ProductInput, ProductView};

/// Row counts from one catalog upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
}

impl UpsertSummary {
    pub fn total(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Catalog storage. Reads only return products whose brand and category both
/// resolve.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn get_product(&self, product_id: i32) -> Result<ProductView, CatalogError>;

    /// Products matching every supplied filter, ordered by id.
    async fn find_products(&self, filter: &ProductFilter) -> Result<Vec<ProductView>, CatalogError>;

    async fn product_info(&self) -> Result<ProductInfo, CatalogError>;

    /// Upserts the referenced brands, categories and products as one unit.
    /// Existing products are overwritten field by field; quantity is assigned,
    /// not added. Within a batch the last record for an id wins.
    async fn upsert_catalog(&self, inputs: &[ProductInput]) -> Result<UpsertSummary, CatalogError>;

    async fn ping(&self) -> bool;
}
