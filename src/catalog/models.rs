use serde::{Deserialize, Serialize};

use crate::ordering::ProductUpdate;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Brand {
    pub brand_id: i32,
    pub brand_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub category_id: i32,
    pub category_name: String,
}

/// Stored product row. Ids are assigned by the caller, never generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub product_id: i32,
    pub name: String,
    pub description: String,
    pub quantity: i32,
    pub brand_id: i32,
    pub category_id: i32,
    pub price: f64,
}

/// A product joined with its brand and category names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProductView {
    pub product_id: i32,
    pub name: String,
    pub description: String,
    pub quantity: i32,
    pub brand_id: i32,
    pub brand: String,
    pub category_id: i32,
    pub category: String,
    pub price: f64,
}

/// Inbound write record; carries the same fields as the read view.
pub type ProductInput = ProductView;

impl ProductView {
    pub fn product(&self) -> Product {
        Product {
            product_id: self.product_id,
            name: self.name.clone(),
            description: self.description.clone(),
            quantity: self.quantity,
            brand_id: self.brand_id,
            category_id: self.category_id,
            price: self.price,
        }
    }

    pub fn to_update(&self) -> ProductUpdate {
        ProductUpdate {
            product_id: self.product_id,
            name: self.name.clone(),
            quantity: self.quantity,
            price: self.price,
        }
    }
}

/// Every known brand and category name, ordered by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub brands: Vec<String>,
    pub categories: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_deserializes_from_camel_case() {
        let input: ProductInput = serde_json::from_value(serde_json::json!({
            "productId": 3,
            "name": "Kettle",
            "description": "Boils water",
            "quantity": 4,
            "brandId": 1,
            "brand": "Brand 1",
            "categoryId": 2,
            "category": "Category 2",
            "price": 3.99
        }))
        .unwrap();
        assert_eq!(input.product_id, 3);
        assert_eq!(input.category, "Category 2");

        let update = input.to_update();
        assert_eq!(update.product_id, 3);
        assert_eq!(update.quantity, 4);
        assert_eq!(update.price, 3.99);
    }
}
