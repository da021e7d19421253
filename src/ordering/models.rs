use serde::{Deserialize, Serialize};

/// Stock/price update sent to the ordering service. The receiver upserts by
/// `product_id`, so a batch may be delivered more than once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductUpdate {
    pub product_id: i32,
    pub name: String,
    pub quantity: i32,
    pub price: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_camel_case() {
        let update = ProductUpdate {
            product_id: 7,
            name: "Widget".into(),
            quantity: 3,
            price: 1.5,
        };
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"productId": 7, "name": "Widget", "quantity": 3, "price": 1.5})
        );
    }
}
