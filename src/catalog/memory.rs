use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::error::CatalogError;
use super::filter::ProductFilter;
use super::models::{Brand, Category, Product, ProductInfo, ProductInput, ProductView};
use super::repository::{ProductRepository, UpsertSummary};

#[derive(Debug, Default, Clone)]
struct CatalogState {
    brands: BTreeMap<i32, Brand>,
    categories: BTreeMap<i32, Category>,
    products: BTreeMap<i32, Product>,
}

impl CatalogState {
    fn view(&self, product: &Product) -> Option<ProductView> {
        let brand = self.brands.get(&product.brand_id)?;
        let category = self.categories.get(&product.category_id)?;
        Some(ProductView {
            product_id: product.product_id,
            name: product.name.clone(),
            description: product.description.clone(),
            quantity: product.quantity,
            brand_id: product.brand_id,
            brand: brand.brand_name.clone(),
            category_id: product.category_id,
            category: category.category_name.clone(),
            price: product.price,
        })
    }
}

/// Catalog held in process memory. Mirrors the Postgres backend's join and
/// upsert semantics; `set_failing(true)` makes every call report the backend
/// as unavailable.
#[derive(Clone, Default)]
pub struct InMemoryProductRepository {
    state: Arc<RwLock<CatalogState>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryProductRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Two brands, two categories and four products (ids 1..=4).
    pub async fn seeded() -> Self {
        let repo = Self::new();
        for id in 1..=2 {
            repo.insert_brand(id, &format!("Brand {id}")).await;
            repo.insert_category(id, &format!("Category {id}")).await;
        }
        for (id, brand_id, category_id, price) in [
            (1, 1, 1, 1.99),
            (2, 2, 2, 2.99),
            (3, 1, 2, 3.99),
            (4, 2, 1, 4.99),
        ] {
            repo.insert_product(Product {
                product_id: id,
                name: format!("Product {id}"),
                description: format!("Description {id}"),
                quantity: id * 10,
                brand_id,
                category_id,
                price,
            })
            .await;
        }
        repo
    }

    pub async fn insert_brand(&self, brand_id: i32, name: &str) {
        self.state.write().await.brands.insert(
            brand_id,
            Brand {
                brand_id,
                brand_name: name.to_string(),
            },
        );
    }

    pub async fn insert_category(&self, category_id: i32, name: &str) {
        self.state.write().await.categories.insert(
            category_id,
            Category {
                category_id,
                category_name: name.to_string(),
            },
        );
    }

    /// Stores the row as-is; brand and category are not checked.
    pub async fn insert_product(&self, product: Product) {
        self.state
            .write()
            .await
            .products
            .insert(product.product_id, product);
    }

    /// Raw stored row, including products hidden by the join.
    pub async fn stored_product(&self, product_id: i32) -> Option<Product> {
        self.state.read().await.products.get(&product_id).cloned()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), CatalogError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(CatalogError::BackendUnavailable(
                "in-memory catalog marked unavailable".into(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ProductRepository for InMemoryProductRepository {
    async fn get_product(&self, product_id: i32) -> Result<ProductView, CatalogError> {
        self.check_available()?;
        let state = self.state.read().await;
        state
            .products
            .get(&product_id)
            .and_then(|p| state.view(p))
            .ok_or(CatalogError::NotFound(product_id))
    }

    async fn find_products(&self, filter: &ProductFilter) -> Result<Vec<ProductView>, CatalogError> {
        self.check_available()?;
        let state = self.state.read().await;
        let brands: Vec<Brand> = state.brands.values().cloned().collect();
        let categories: Vec<Category> = state.categories.values().cloned().collect();
        Ok(state
            .products
            .values()
            .filter_map(|p| state.view(p))
            .filter(|v| filter.matches(v, &brands, &categories))
            .collect())
    }

    async fn product_info(&self) -> Result<ProductInfo, CatalogError> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(ProductInfo {
            brands: distinct(state.brands.values().map(|b| b.brand_name.as_str())),
            categories: distinct(state.categories.values().map(|c| c.category_name.as_str())),
        })
    }

    async fn upsert_catalog(&self, inputs: &[ProductInput]) -> Result<UpsertSummary, CatalogError> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let mut touched: BTreeMap<i32, bool> = BTreeMap::new();
        for input in inputs {
            state.brands.insert(
                input.brand_id,
                Brand {
                    brand_id: input.brand_id,
                    brand_name: input.brand.clone(),
                },
            );
            state.categories.insert(
                input.category_id,
                Category {
                    category_id: input.category_id,
                    category_name: input.category.clone(),
                },
            );
            let existed = state
                .products
                .insert(input.product_id, input.product())
                .is_some();
            touched.entry(input.product_id).or_insert(existed);
        }

        let updated = touched.values().filter(|existed| **existed).count();
        Ok(UpsertSummary {
            inserted: touched.len() - updated,
            updated,
        })
    }

    async fn ping(&self) -> bool {
        !self.failing.load(Ordering::SeqCst)
    }
}

/// Names in first-seen order, repeats dropped.
fn distinct<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .filter(|name| seen.insert(*name))
        .map(str::to_string)
        .collect()
}
