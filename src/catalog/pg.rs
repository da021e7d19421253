use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use tracing::{debug, info, instrument};

use super::error::CatalogError;
use super::filter::ProductFilter;
use super::models::{ProductInfo, ProductInput, ProductView};
use super::repository::{ProductRepository, UpsertSummary};
use crate::util::db::Db;

/// Inner joins: products with a dangling brand or category never surface.
const VIEW_SELECT: &str = "SELECT p.product_id, p.name, p.description, p.quantity, \
     p.brand_id, b.brand_name AS brand, p.category_id, c.category_name AS category, p.price \
     FROM products.products p \
     JOIN products.brands b ON b.brand_id = p.brand_id \
     JOIN products.categories c ON c.category_id = p.category_id \
     WHERE TRUE";

/// Rows per multi-VALUES insert; keeps each statement well under the bind limit.
const UPSERT_CHUNK: usize = 1000;

#[derive(Clone)]
pub struct PgProductRepository {
    db: Db,
}

impl PgProductRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

/// The distinct brands, categories and products of a batch; later records
/// replace earlier ones with the same id.
#[derive(Debug, Default, PartialEq)]
struct CatalogBatch<'a> {
    brands: BTreeMap<i32, &'a str>,
    categories: BTreeMap<i32, &'a str>,
    products: BTreeMap<i32, &'a ProductInput>,
}

impl<'a> CatalogBatch<'a> {
    fn collect(inputs: &'a [ProductInput]) -> Self {
        let mut batch = Self::default();
        for input in inputs {
            batch.brands.insert(input.brand_id, input.brand.as_str());
            batch.categories.insert(input.category_id, input.category.as_str());
            batch.products.insert(input.product_id, input);
        }
        batch
    }
}

#[async_trait]
impl ProductRepository for PgProductRepository {
    #[instrument(skip(self))]
    async fn get_product(&self, product_id: i32) -> Result<ProductView, CatalogError> {
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(VIEW_SELECT);
        qb.push(" AND p.product_id = ").push_bind(product_id);
        qb.build_query_as::<ProductView>()
            .persistent(false)
            .fetch_optional(&self.db.pool)
            .await?
            .ok_or(CatalogError::NotFound(product_id))
    }

    #[instrument(skip(self))]
    async fn find_products(&self, filter: &ProductFilter) -> Result<Vec<ProductView>, CatalogError> {
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(VIEW_SELECT);
        filter.push_conditions(&mut qb);
        qb.push(" ORDER BY p.product_id");
        let rows = qb
            .build_query_as::<ProductView>()
            .persistent(false)
            .fetch_all(&self.db.pool)
            .await?;
        debug!(count = rows.len(), "products matched filter");
        Ok(rows)
    }

    async fn product_info(&self) -> Result<ProductInfo, CatalogError> {
        let brands: Vec<String> = sqlx::query_scalar(
            "SELECT brand_name FROM products.brands \
             GROUP BY brand_name ORDER BY min(brand_id)",
        )
        .persistent(false)
        .fetch_all(&self.db.pool)
        .await?;
        let categories: Vec<String> = sqlx::query_scalar(
            "SELECT category_name FROM products.categories \
             GROUP BY category_name ORDER BY min(category_id)",
        )
        .persistent(false)
        .fetch_all(&self.db.pool)
        .await?;
        Ok(ProductInfo { brands, categories })
    }

    #[instrument(skip(self, inputs), fields(records = inputs.len()))]
    async fn upsert_catalog(&self, inputs: &[ProductInput]) -> Result<UpsertSummary, CatalogError> {
        let batch = CatalogBatch::collect(inputs);
        let mut summary = UpsertSummary::default();
        if batch.products.is_empty() {
            return Ok(summary);
        }

        let mut tx = self.db.pool.begin().await?;

        let brands: Vec<(i32, &str)> = batch.brands.iter().map(|(k, v)| (*k, *v)).collect();
        for chunk in brands.chunks(UPSERT_CHUNK) {
            let mut qb: QueryBuilder<'_, Postgres> =
                QueryBuilder::new("INSERT INTO products.brands (brand_id, brand_name) ");
            qb.push_values(chunk, |mut b, (id, name)| {
                b.push_bind(*id).push_bind(name.to_string());
            });
            qb.push(
                " ON CONFLICT (brand_id) DO UPDATE SET brand_name = EXCLUDED.brand_name \
                 WHERE products.brands.brand_name IS DISTINCT FROM EXCLUDED.brand_name",
            );
            qb.build().persistent(false).execute(&mut *tx).await?;
        }

        let categories: Vec<(i32, &str)> =
            batch.categories.iter().map(|(k, v)| (*k, *v)).collect();
        for chunk in categories.chunks(UPSERT_CHUNK) {
            let mut qb: QueryBuilder<'_, Postgres> =
                QueryBuilder::new("INSERT INTO products.categories (category_id, category_name) ");
            qb.push_values(chunk, |mut b, (id, name)| {
                b.push_bind(*id).push_bind(name.to_string());
            });
            qb.push(
                " ON CONFLICT (category_id) DO UPDATE SET category_name = EXCLUDED.category_name \
                 WHERE products.categories.category_name IS DISTINCT FROM EXCLUDED.category_name",
            );
            qb.build().persistent(false).execute(&mut *tx).await?;
        }

        let products: Vec<&ProductInput> = batch.products.values().copied().collect();
        for chunk in products.chunks(UPSERT_CHUNK) {
            let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(
                "INSERT INTO products.products \
                 (product_id, name, description, quantity, brand_id, category_id, price) ",
            );
            qb.push_values(chunk, |mut b, p| {
                b.push_bind(p.product_id)
                    .push_bind(p.name.clone())
                    .push_bind(p.description.clone())
                    .push_bind(p.quantity)
                    .push_bind(p.brand_id)
                    .push_bind(p.category_id)
                    .push_bind(p.price);
            });
            qb.push(
                " ON CONFLICT (product_id) DO UPDATE SET \
                 name = EXCLUDED.name, description = EXCLUDED.description, \
                 quantity = EXCLUDED.quantity, brand_id = EXCLUDED.brand_id, \
                 category_id = EXCLUDED.category_id, price = EXCLUDED.price \
                 RETURNING (xmax = 0) AS inserted",
            );
            let inserted: Vec<bool> = qb
                .build_query_scalar::<bool>()
                .persistent(false)
                .fetch_all(&mut *tx)
                .await?;
            for was_insert in inserted {
                if was_insert {
                    summary.inserted += 1;
                } else {
                    summary.updated += 1;
                }
            }
        }

        tx.commit().await?;
        info!(
            brands = brands.len(),
            categories = categories.len(),
            inserted = summary.inserted,
            updated = summary.updated,
            "catalog upsert committed"
        );
        Ok(summary)
    }

    async fn ping(&self) -> bool {
        self.db.ping().await
    }
}
