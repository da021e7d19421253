use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("product {0} not found")]
    NotFound(i32),
    #[error("catalog backend unavailable: {0}")]
    BackendUnavailable(String),
}

impl From<sqlx::Error> for CatalogError {
    fn from(e: sqlx::Error) -> Self {
        CatalogError::BackendUnavailable(e.to_string())
    }
}
