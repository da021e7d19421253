//! Optional product filters.
//!
//! A filter counts as supplied only when it carries a meaningful value: ids
//! must be positive, prices at least [`MIN_PRICE`], text non-empty. Anything
//! else is treated exactly like an absent parameter.
use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use sqlx::{Postgres, QueryBuilder};

use super::models::{Brand, Category, ProductView};

/// Smallest price that counts as a supplied price bound.
pub const MIN_PRICE: f64 = 0.01;

pub fn id_supplied(value: Option<i32>) -> Option<i32> {
    value.filter(|v| *v > 0)
}

pub fn price_supplied(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v >= MIN_PRICE)
}

pub fn text_supplied(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

/// Query-string parameters of `GET /api/product`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProductQuery {
    #[serde(deserialize_with = "blank_as_none")]
    pub product_id: Option<i32>,
    #[serde(deserialize_with = "blank_as_none")]
    pub brand_id: Option<i32>,
    #[serde(deserialize_with = "blank_as_none")]
    pub category_id: Option<i32>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub search_string: Option<String>,
    #[serde(deserialize_with = "blank_as_none")]
    pub min_price: Option<f64>,
    #[serde(deserialize_with = "blank_as_none")]
    pub max_price: Option<f64>,
}

/// What a read request asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryShape {
    Metadata,
    Single(i32),
    Filtered(ProductFilter),
}

impl ProductQuery {
    /// A supplied `product_id` wins over every other filter.
    pub fn classify(&self) -> QueryShape {
        if let Some(id) = id_supplied(self.product_id) {
            return QueryShape::Single(id);
        }
        let filter = ProductFilter {
            brand_id: id_supplied(self.brand_id),
            category_id: id_supplied(self.category_id),
            brand: text_supplied(self.brand.as_deref()).map(str::to_string),
            category: text_supplied(self.category.as_deref()).map(str::to_string),
            search: text_supplied(self.search_string.as_deref()).map(str::to_string),
            min_price: price_supplied(self.min_price),
            max_price: price_supplied(self.max_price),
        };
        if filter.is_empty() {
            QueryShape::Metadata
        } else {
            QueryShape::Filtered(filter)
        }
    }
}

/// The supplied subset of a [`ProductQuery`]; every present field must match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductFilter {
    pub brand_id: Option<i32>,
    pub category_id: Option<i32>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub search: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

impl ProductFilter {
    pub fn is_empty(&self) -> bool {
        self.brand_id.is_none()
            && self.category_id.is_none()
            && self.brand.is_none()
            && self.category.is_none()
            && self.search.is_none()
            && self.min_price.is_none()
            && self.max_price.is_none()
    }

    /// In-memory evaluation. `brands` and `categories` resolve the name
    /// filters; the lowest id carrying the exact name is used.
    pub fn matches(&self, view: &ProductView, brands: &[Brand], categories: &[Category]) -> bool {
        if self.brand_id.is_some_and(|id| view.brand_id != id) {
            return false;
        }
        if self.category_id.is_some_and(|id| view.category_id != id) {
            return false;
        }
        if self.min_price.is_some_and(|min| view.price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| view.price > max) {
            return false;
        }
        if let Some(s) = &self.search {
            if !view.name.contains(s.as_str()) && !view.description.contains(s.as_str()) {
                return false;
            }
        }
        if let Some(name) = &self.brand {
            let resolved = brands
                .iter()
                .filter(|b| &b.brand_name == name)
                .map(|b| b.brand_id)
                .min();
            if resolved != Some(view.brand_id) {
                return false;
            }
        }
        if let Some(name) = &self.category {
            let resolved = categories
                .iter()
                .filter(|c| &c.category_name == name)
                .map(|c| c.category_id)
                .min();
            if resolved != Some(view.category_id) {
                return false;
            }
        }
        true
    }

    /// Appends ` AND ...` conditions over the `p` (products) alias. The caller
    /// must already have opened a `WHERE` clause.
    pub fn push_conditions(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        if let Some(id) = self.brand_id {
            qb.push(" AND p.brand_id = ").push_bind(id);
        }
        if let Some(id) = self.category_id {
            qb.push(" AND p.category_id = ").push_bind(id);
        }
        if let Some(min) = self.min_price {
            qb.push(" AND p.price >= ").push_bind(min);
        }
        if let Some(max) = self.max_price {
            qb.push(" AND p.price <= ").push_bind(max);
        }
        if let Some(s) = &self.search {
            // strpos keeps the match case-sensitive and free of LIKE wildcards
            qb.push(" AND (strpos(p.name, ")
                .push_bind(s.clone())
                .push(") > 0 OR strpos(p.description, ")
                .push_bind(s.clone())
                .push(") > 0)");
        }
        if let Some(name) = &self.brand {
            qb.push(" AND p.brand_id = (SELECT brand_id FROM products.brands WHERE brand_name = ")
                .push_bind(name.clone())
                .push(" ORDER BY brand_id LIMIT 1)");
        }
        if let Some(name) = &self.category {
            qb.push(
                " AND p.category_id = (SELECT category_id FROM products.categories WHERE category_name = ",
            )
            .push_bind(name.clone())
            .push(" ORDER BY category_id LIMIT 1)");
        }
    }
}

/// Treats `?productId=` like an absent parameter instead of a parse error.
fn blank_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse::<T>().map(Some).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brands() -> Vec<Brand> {
        vec![
            Brand { brand_id: 1, brand_name: "Brand 1".into() },
            Brand { brand_id: 2, brand_name: "Brand 2".into() },
        ]
    }

    fn categories() -> Vec<Category> {
        vec![
            Category { category_id: 1, category_name: "Category 1".into() },
            Category { category_id: 2, category_name: "Category 2".into() },
        ]
    }

    fn view(id: i32, brand_id: i32, category_id: i32, price: f64) -> ProductView {
        ProductView {
            product_id: id,
            name: format!("Product {id}"),
            description: format!("Description {id}"),
            quantity: id * 10,
            brand_id,
            brand: format!("Brand {brand_id}"),
            category_id,
            category: format!("Category {category_id}"),
            price,
        }
    }

    fn fixture() -> Vec<ProductView> {
        vec![
            view(1, 1, 1, 1.99),
            view(2, 2, 2, 2.99),
            view(3, 1, 2, 3.99),
            view(4, 2, 1, 4.99),
        ]
    }

    fn run(filter: &ProductFilter) -> Vec<i32> {
        let (b, c) = (brands(), categories());
        fixture()
            .iter()
            .filter(|v| filter.matches(v, &b, &c))
            .map(|v| v.product_id)
            .collect()
    }

    fn parse(qs: &str) -> ProductQuery {
        actix_web::web::Query::<ProductQuery>::from_query(qs)
            .unwrap()
            .into_inner()
    }

    #[test]
    fn unset_values_are_equivalent_to_absent() {
        let unset = ProductQuery {
            product_id: Some(0),
            brand_id: Some(-3),
            category_id: Some(0),
            brand: Some(String::new()),
            category: Some(String::new()),
            search_string: Some(String::new()),
            min_price: Some(0.0),
            max_price: Some(0.009),
        };
        assert_eq!(unset.classify(), QueryShape::Metadata);
        assert_eq!(ProductQuery::default().classify(), QueryShape::Metadata);
    }

    #[test]
    fn product_id_takes_precedence() {
        let q = ProductQuery {
            product_id: Some(1),
            brand_id: Some(2),
            search_string: Some("nothing".into()),
            ..Default::default()
        };
        assert_eq!(q.classify(), QueryShape::Single(1));
    }

    #[test]
    fn only_supplied_filters_survive_classification() {
        let q = ProductQuery {
            brand_id: Some(0),
            category_id: Some(2),
            min_price: Some(0.0),
            max_price: Some(5.0),
            ..Default::default()
        };
        let QueryShape::Filtered(filter) = q.classify() else {
            panic!("expected filtered");
        };
        assert_eq!(
            filter,
            ProductFilter {
                category_id: Some(2),
                max_price: Some(5.0),
                ..Default::default()
            }
        );
    }

    #[test]
    fn filters_compose_as_intersection() {
        let both = ProductFilter {
            brand_id: Some(1),
            category_id: Some(1),
            ..Default::default()
        };
        assert_eq!(run(&both), vec![1]);

        let brand_only = ProductFilter { brand_id: Some(1), ..Default::default() };
        let category_only = ProductFilter { category_id: Some(1), ..Default::default() };
        let a = run(&brand_only);
        let b = run(&category_only);
        let intersection: Vec<i32> = a.iter().copied().filter(|id| b.contains(id)).collect();
        assert_eq!(run(&both), intersection);
    }

    #[test]
    fn price_bounds_are_inclusive() {
        let f = ProductFilter {
            min_price: Some(2.99),
            max_price: Some(3.99),
            ..Default::default()
        };
        assert_eq!(run(&f), vec![2, 3]);
    }

    #[test]
    fn name_filters_resolve_exact_names() {
        let f = ProductFilter { brand: Some("Brand 1".into()), ..Default::default() };
        assert_eq!(run(&f), vec![1, 3]);

        let f = ProductFilter { category: Some("Category 1".into()), ..Default::default() };
        assert_eq!(run(&f), vec![1, 4]);

        let unknown = ProductFilter { brand: Some("brand 1".into()), ..Default::default() };
        assert!(run(&unknown).is_empty());
    }

    #[test]
    fn search_is_case_sensitive_over_name_and_description() {
        let f = ProductFilter { search: Some("Description 3".into()), ..Default::default() };
        assert_eq!(run(&f), vec![3]);

        let f = ProductFilter { search: Some("Product".into()), ..Default::default() };
        assert_eq!(run(&f), vec![1, 2, 3, 4]);

        let f = ProductFilter { search: Some("product".into()), ..Default::default() };
        assert!(run(&f).is_empty());
    }

    #[test]
    fn query_string_uses_camel_case_and_ignores_blanks() {
        let q = parse("productId=&brandId=2&searchString=Kettle&minPrice=1.5");
        assert_eq!(q.product_id, None);
        assert_eq!(q.brand_id, Some(2));
        assert_eq!(q.search_string.as_deref(), Some("Kettle"));
        assert_eq!(q.min_price, Some(1.5));
        assert!(actix_web::web::Query::<ProductQuery>::from_query("brandId=abc").is_err());
    }

    #[test]
    fn sql_conditions_bind_every_value() {
        let f = ProductFilter {
            brand_id: Some(1),
            search: Some("x".into()),
            brand: Some("Brand 1".into()),
            ..Default::default()
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 FROM products.products p WHERE TRUE");
        f.push_conditions(&mut qb);
        assert_eq!(
            qb.sql(),
            "SELECT 1 FROM products.products p WHERE TRUE AND p.brand_id = $1 \
             AND (strpos(p.name, $2) > 0 OR strpos(p.description, $3) > 0) \
             AND p.brand_id = (SELECT brand_id FROM products.brands WHERE brand_name = $4 ORDER BY brand_id LIMIT 1)"
        );
    }
}
