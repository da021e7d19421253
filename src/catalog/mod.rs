//! Product catalog: models, query filters, and the repository backends.

pub mod error;
pub mod filter;
pub mod memory;
pub mod models;
pub mod pg;
pub mod repository;

pub use error::CatalogError;
pub use filter::{ProductFilter, ProductQuery, QueryShape};
pub use memory::InMemoryProductRepository;
pub use models::{Brand, Category, Product, ProductInfo, ProductInput, ProductView};
pub use pg::PgProductRepository;
pub use repository::{ProductRepository, UpsertSummary};
